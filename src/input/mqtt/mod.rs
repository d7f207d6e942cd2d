//! MQTT channel for zigbee2mqtt state reports and bridge requests.
//!
//! This module provides the broker connection, the ordered state report
//! observer and the bind/unbind request encoder used by the harness.

mod binding;
mod bridge;
mod client;
mod message;
mod observer;

pub use binding::{BindAction, BindRequest, BindingController, Cluster, EndpointPath};
pub use bridge::ZigbeeBridge;
pub use client::{MqttClient, MqttTransport};
pub use message::StateMessage;
pub use observer::StateObserver;
