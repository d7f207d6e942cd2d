//! MQTT client wrapper for zigbee2mqtt communication.

use super::message::StateMessage;
use crate::config::MqttConfig;
use crate::error::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Delay between reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Publish/subscribe operations the harness needs from the broker connection.
#[async_trait]
pub trait MqttTransport: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<()>;

    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;
}

#[async_trait]
impl MqttTransport for AsyncClient {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        info!("[MQTT] Subscribing to {}", topic);
        AsyncClient::subscribe(self, topic, QoS::AtMostOnce).await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        debug!("[MQTT] Publishing to {}: {}", topic, payload);
        AsyncClient::publish(self, topic, QoS::AtMostOnce, false, payload.as_bytes()).await?;
        Ok(())
    }
}

/// MQTT client for zigbee2mqtt communication.
pub struct MqttClient {
    client: AsyncClient,
    event_loop: EventLoop,
    max_reconnect_attempts: u32,
}

impl MqttClient {
    /// Create a new MQTT client from configuration.
    pub fn new(config: &MqttConfig) -> Self {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(30));

        // Set credentials if provided
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(options, 100);

        Self {
            client,
            event_loop,
            max_reconnect_attempts: config.max_reconnect_attempts,
        }
    }

    /// Run the MQTT event loop and forward state reports to the provided channel.
    ///
    /// Signals `connected` on the first ConnAck. Returns when the channel is
    /// closed or the connection fails more than `max_reconnect_attempts`
    /// times in a row; either way `tx` is dropped, which the consumer sees as
    /// a closed transport.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<StateMessage>,
        mut connected: Option<oneshot::Sender<()>>,
    ) {
        info!("[MQTT] Starting event loop");
        let mut failures = 0u32;

        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    failures = 0;
                    info!("[MQTT] Connected");
                    if let Some(signal) = connected.take() {
                        let _ = signal.send(());
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let msg = match StateMessage::parse(&publish.topic, &publish.payload) {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!(
                                "[MQTT] Ignoring non-JSON-object payload on {}: {}",
                                publish.topic, e
                            );
                            continue;
                        }
                    };

                    debug!("[MQTT] Received on {}: {:?}", msg.topic, msg.payload);

                    if tx.send(msg).await.is_err() {
                        info!("[MQTT] Message channel closed, stopping event loop");
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    failures += 1;
                    error!(
                        "[MQTT] Connection error ({}/{}): {:?}",
                        failures, self.max_reconnect_attempts, e
                    );
                    if failures > self.max_reconnect_attempts {
                        error!("[MQTT] Giving up on broker connection");
                        break;
                    }
                    // Wait before reconnecting
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// Get a clone of the async client for publishing from other tasks.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }
}
