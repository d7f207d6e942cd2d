//! State reports published by zigbee2mqtt.

use chrono::{DateTime, Local};
use serde_json::{Map, Value};

/// One JSON state report received on a device topic.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMessage {
    pub topic: String,
    pub payload: Map<String, Value>,
    pub received_at: DateTime<Local>,
}

impl StateMessage {
    pub fn new(topic: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            received_at: Local::now(),
        }
    }

    /// Parse a raw publish. Only JSON objects are state reports.
    pub fn parse(topic: &str, payload: &[u8]) -> Result<Self, serde_json::Error> {
        let payload: Map<String, Value> = serde_json::from_slice(payload)?;
        Ok(Self::new(topic, payload))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// The `action` field, if this report carries a button action.
    pub fn action(&self) -> Option<&str> {
        self.get("action").and_then(Value::as_str)
    }

    /// The `debug.command` field sent by the switch in client mode.
    pub fn debug_command(&self) -> Option<&str> {
        self.get("debug")
            .and_then(|d| d.get("command"))
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_payload() {
        let msg = StateMessage::parse(
            "zigbee2mqtt/my_test_switch",
            br#"{"action":"single_button_1","linkquality":120}"#,
        )
        .unwrap();
        assert_eq!(msg.action(), Some("single_button_1"));
        assert_eq!(msg.get("linkquality"), Some(&Value::from(120)));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(StateMessage::parse("zigbee2mqtt/x/action", b"single").is_err());
        assert!(StateMessage::parse("zigbee2mqtt/x", b"[1,2]").is_err());
    }

    #[test]
    fn test_debug_command() {
        let msg = StateMessage::parse(
            "zigbee2mqtt/my_test_switch",
            br#"{"debug":{"command":"commandToggle"}}"#,
        )
        .unwrap();
        assert_eq!(msg.debug_command(), Some("commandToggle"));
        assert_eq!(msg.action(), None);
    }
}
