//! zigbee2mqtt bind/unbind requests.
//!
//! Bindings live in the coordinator, not here: a request is encoded, published
//! once and forgotten. The bridge answers on `bridge/response/device/...`,
//! which the harness does not wait for.

use super::client::MqttTransport;
use crate::error::Result;
use log::info;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumString};

/// Clusters a switch endpoint can be bound on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum Cluster {
    GenOnOff,
    GenLevelCtrl,
    GenOnOffSwitchCfg,
    GenMultistateInput,
}

/// `<device>/<endpoint>` source address understood by zigbee2mqtt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPath {
    pub device: String,
    pub endpoint: u8,
}

impl EndpointPath {
    pub fn new(device: impl Into<String>, endpoint: u8) -> Self {
        Self {
            device: device.into(),
            endpoint,
        }
    }
}

impl fmt::Display for EndpointPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.endpoint)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum BindAction {
    Bind,
    Unbind,
}

/// Relay `cluster` reports from `source` to `destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub cluster: Cluster,
    pub source: EndpointPath,
    pub destination: String,
}

#[derive(Serialize)]
struct BindPayload<'a> {
    from: String,
    to: &'a str,
    clusters: [Cluster; 1],
}

impl BindRequest {
    pub fn new(cluster: Cluster, source: EndpointPath, destination: impl Into<String>) -> Self {
        Self {
            cluster,
            source,
            destination: destination.into(),
        }
    }

    /// Bridge request topic for `action` under `base_topic`.
    pub fn topic(base_topic: &str, action: BindAction) -> String {
        format!("{}/bridge/request/device/{}", base_topic, action)
    }

    pub fn to_payload(&self) -> Result<String> {
        let payload = BindPayload {
            from: self.source.to_string(),
            to: &self.destination,
            clusters: [self.cluster],
        };
        Ok(serde_json::to_string(&payload)?)
    }
}

/// Publishes bind/unbind requests through the broker connection.
#[derive(Clone)]
pub struct BindingController {
    transport: Arc<dyn MqttTransport>,
    base_topic: String,
}

impl BindingController {
    pub fn new(transport: Arc<dyn MqttTransport>, base_topic: impl Into<String>) -> Self {
        Self {
            transport,
            base_topic: base_topic.into(),
        }
    }

    pub async fn bind(&self, request: &BindRequest) -> Result<()> {
        self.send(BindAction::Bind, request).await
    }

    /// Unbinding something that was never bound is not an error.
    pub async fn unbind(&self, request: &BindRequest) -> Result<()> {
        self.send(BindAction::Unbind, request).await
    }

    async fn send(&self, action: BindAction, request: &BindRequest) -> Result<()> {
        info!(
            "[MQTT] {} {} {} -> {}",
            action, request.cluster, request.source, request.destination
        );
        let topic = BindRequest::topic(&self.base_topic, action);
        self.transport
            .publish(&topic, &request.to_payload()?)
            .await
    }
}
