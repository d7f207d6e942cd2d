//! zigbee2mqtt side of the harness for one device.

use super::binding::{BindRequest, BindingController};
use super::client::{MqttClient, MqttTransport};
use super::message::StateMessage;
use super::observer::StateObserver;
use crate::config::MqttConfig;
use crate::error::{HarnessError, Result};
use log::info;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// How long to wait for the broker's ConnAck.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Device-scoped access to zigbee2mqtt: state reports, `/set` and `/get`
/// requests, and bindings.
pub struct ZigbeeBridge {
    transport: Arc<dyn MqttTransport>,
    observer: StateObserver,
    bindings: BindingController,
    base_topic: String,
    device_name: String,
    timeout: Duration,
    event_loop: Option<JoinHandle<()>>,
}

impl ZigbeeBridge {
    /// Build a bridge over an existing transport and report queue.
    pub fn new(
        transport: Arc<dyn MqttTransport>,
        messages: mpsc::Receiver<StateMessage>,
        base_topic: impl Into<String>,
        device_name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let base_topic = base_topic.into();
        let device_name = device_name.into();
        let topic = format!("{}/{}", base_topic, device_name);
        Self {
            observer: StateObserver::new(transport.clone(), topic, messages),
            bindings: BindingController::new(transport.clone(), base_topic.clone()),
            transport,
            base_topic,
            device_name,
            timeout,
            event_loop: None,
        }
    }

    /// Connect to the broker and start the event loop task.
    pub async fn connect(
        config: &MqttConfig,
        device_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        info!(
            "[MQTT] Connecting to {}:{}",
            config.broker_host, config.broker_port
        );

        let mqtt_client = MqttClient::new(config);
        let client = mqtt_client.client();

        let (msg_tx, msg_rx) = mpsc::channel::<StateMessage>(config.message_queue.max(1));
        let (connected_tx, connected_rx) = oneshot::channel();

        // Start MQTT event loop FIRST (so it can establish connection)
        let event_loop = tokio::spawn(async move {
            mqtt_client.run(msg_tx, Some(connected_tx)).await;
        });

        match tokio::time::timeout(CONNECT_TIMEOUT, connected_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                return Err(HarnessError::TransportClosed(
                    "MQTT event loop ended before connecting".to_string(),
                ));
            }
            Err(_) => {
                event_loop.abort();
                return Err(HarnessError::TransportClosed(format!(
                    "no ConnAck from {}:{} within {:?}",
                    config.broker_host, config.broker_port, CONNECT_TIMEOUT
                )));
            }
        }

        let mut bridge = Self::new(
            Arc::new(client),
            msg_rx,
            config.base_topic.clone(),
            device_name,
            timeout,
        );
        bridge.event_loop = Some(event_loop);
        Ok(bridge)
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn observer(&mut self) -> &mut StateObserver {
        &mut self.observer
    }

    pub async fn subscribe(&mut self) -> Result<()> {
        self.observer.subscribe().await
    }

    /// Publish `{key: value}` to the device's `/set` topic.
    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        let topic = format!("{}/{}/set", self.base_topic, self.device_name);
        self.publish_single(&topic, key, value).await
    }

    /// Publish `{key: ""}` to the device's `/get` topic.
    pub async fn get(&self, key: &str) -> Result<()> {
        let topic = format!("{}/{}/get", self.base_topic, self.device_name);
        self.publish_single(&topic, key, Value::String(String::new()))
            .await
    }

    async fn publish_single(&self, topic: &str, key: &str, value: Value) -> Result<()> {
        let mut payload = Map::new();
        payload.insert(key.to_string(), value);
        let payload = serde_json::to_string(&payload)?;
        self.transport.publish(topic, &payload).await
    }

    /// Next state report, with the bridge's default timeout.
    pub async fn wait_msg(&mut self) -> Result<StateMessage> {
        self.observer.wait_next_message(self.timeout).await
    }

    /// Value of the next report carrying `key`, with the default timeout.
    pub async fn wait_attribute(&mut self, key: &str) -> Result<Value> {
        self.observer.wait_attribute(key, self.timeout).await
    }

    pub async fn bind(&self, request: &BindRequest) -> Result<()> {
        self.bindings.bind(request).await
    }

    pub async fn unbind(&self, request: &BindRequest) -> Result<()> {
        self.bindings.unbind(request).await
    }
}

impl Drop for ZigbeeBridge {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop.take() {
            handle.abort();
        }
    }
}
