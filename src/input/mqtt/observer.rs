//! Ordered consumption of a device's zigbee2mqtt state reports.

use super::client::MqttTransport;
use super::message::StateMessage;
use crate::error::{HarnessError, Result};
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, timeout_at};

/// Single-consumer view of the state reports for one device topic.
///
/// The MQTT event loop pushes into a bounded queue; every `wait*` call pops
/// from it in arrival order. A message is handed out at most once, and
/// messages a wait does not accept are consumed along the way.
pub struct StateObserver {
    transport: Arc<dyn MqttTransport>,
    topic: String,
    messages: mpsc::Receiver<StateMessage>,
    subscribed: bool,
    latest: Option<StateMessage>,
}

impl StateObserver {
    pub fn new(
        transport: Arc<dyn MqttTransport>,
        topic: impl Into<String>,
        messages: mpsc::Receiver<StateMessage>,
    ) -> Self {
        Self {
            transport,
            topic: topic.into(),
            messages,
            subscribed: false,
            latest: None,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Subscribe to the device topic. Repeated calls are no-ops.
    pub async fn subscribe(&mut self) -> Result<()> {
        if self.subscribed {
            return Ok(());
        }
        self.transport.subscribe(&self.topic).await?;
        self.subscribed = true;
        Ok(())
    }

    /// The last message handed out by a wait.
    pub fn latest(&self) -> Option<&StateMessage> {
        self.latest.as_ref()
    }

    /// Wait for the next state report.
    pub async fn wait_next_message(&mut self, timeout: Duration) -> Result<StateMessage> {
        self.wait_matching("any state report", timeout, |_| true)
            .await
    }

    /// Consume reports until one carries `key`, and return its value.
    pub async fn wait_attribute(&mut self, key: &str, timeout: Duration) -> Result<Value> {
        let msg = self
            .wait_matching(key, timeout, |msg| msg.payload.contains_key(key))
            .await?;
        msg.payload
            .get(key)
            .cloned()
            .ok_or_else(|| HarnessError::ScenarioFailed(format!("{key} vanished from payload")))
    }

    /// Consume reports until `accept` returns true for one of them.
    pub async fn wait_matching<F>(
        &mut self,
        expected: &str,
        timeout: Duration,
        mut accept: F,
    ) -> Result<StateMessage>
    where
        F: FnMut(&StateMessage) -> bool,
    {
        if !self.subscribed {
            warn!(
                "[MQTT] Waiting for {:?} on {} before subscribing",
                expected, self.topic
            );
        }

        let start = Instant::now();
        let deadline = start + timeout;

        loop {
            let msg = match timeout_at(deadline, self.messages.recv()).await {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    return Err(HarnessError::TransportClosed(format!(
                        "MQTT message stream ended while waiting for {:?}",
                        expected
                    )));
                }
                Err(_) => {
                    return Err(HarnessError::Timeout {
                        expected: format!("{} on {}", expected, self.topic),
                        elapsed: start.elapsed(),
                    });
                }
            };

            if msg.topic != self.topic {
                debug!("[MQTT] Dropping report for {}", msg.topic);
                continue;
            }

            if accept(&msg) {
                self.latest = Some(msg.clone());
                return Ok(msg);
            }
            debug!("[MQTT] Skipping report without {:?}: {:?}", expected, msg.payload);
        }
    }

    /// Drop every queued report. Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let mut dropped = 0;
        while self.messages.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}
