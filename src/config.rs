use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Load environment variables from .env file with robust parsing.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    if !env_path.exists() {
        return;
    }

    let content = match fs::read_to_string(env_path) {
        Ok(c) => c,
        Err(_) => return,
    };

    for (key, value) in parse_dotenv(&content) {
        // Only set if not already set (env vars take precedence)
        if std::env::var(key).is_err() {
            // SAFETY: We're single-threaded at this point (called before any async runtime)
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // Find the first '=' and split there
        if let Some(eq_pos) = line.find('=') {
            let key = line[..eq_pos].trim();
            let mut value = line[eq_pos + 1..].trim();

            // Remove surrounding quotes if present
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }

            pairs.push((key, value));
        }
    }

    pairs
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub serial: SerialConfig,
    pub mqtt: MqttConfig,
    pub device: DeviceConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout of the underlying port; bounds how long the reader thread
    /// holds the port before re-checking for shutdown.
    pub read_timeout_ms: u64,
    /// Capacity of the line queue between the reader thread and the watcher.
    pub line_queue: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// zigbee2mqtt base topic
    pub base_topic: String,
    /// Capacity of the per-subscription message queue.
    pub message_queue: usize,
    /// Consecutive connection failures tolerated before the transport is
    /// reported closed.
    pub max_reconnect_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Friendly name of the switch in zigbee2mqtt
    pub name: String,
    /// Binding destination for device initiated reports
    pub coordinator: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub serial_secs: f64,
    pub mqtt_secs: f64,
}

impl TimeoutConfig {
    pub fn serial(&self) -> Duration {
        Duration::from_secs_f64(self.serial_secs.max(0.0))
    }

    pub fn mqtt(&self) -> Duration {
        Duration::from_secs_f64(self.mqtt_secs.max(0.0))
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 115_200,
                read_timeout_ms: 100,
                line_queue: 1024,
            },
            mqtt: MqttConfig {
                broker_host: "localhost".to_string(),
                broker_port: 1883,
                client_id: "smartswitch-harness".to_string(),
                username: None,
                password: None,
                base_topic: "zigbee2mqtt".to_string(),
                message_queue: 64,
                max_reconnect_attempts: 3,
            },
            device: DeviceConfig {
                name: "my_test_switch".to_string(),
                coordinator: "Coordinator".to_string(),
            },
            timeouts: TimeoutConfig {
                serial_secs: 5.0,
                mqtt_secs: 5.0,
            },
        }
    }
}

impl HarnessConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Serial configuration
        if let Ok(port) = std::env::var("SERIAL_PORT") {
            config.serial.port = port;
        }
        if let Ok(baud) = std::env::var("SERIAL_BAUD")
            && let Ok(b) = baud.parse()
        {
            config.serial.baud_rate = b;
        }

        // MQTT configuration
        if let Ok(host) = std::env::var("MQTT_BROKER_HOST") {
            config.mqtt.broker_host = host;
        }
        if let Ok(port) = std::env::var("MQTT_BROKER_PORT")
            && let Ok(p) = port.parse()
        {
            config.mqtt.broker_port = p;
        }
        if let Ok(client_id) = std::env::var("MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }
        if let Ok(username) = std::env::var("MQTT_USERNAME") {
            config.mqtt.username = Some(username);
        }
        if let Ok(password) = std::env::var("MQTT_PASSWORD") {
            config.mqtt.password = Some(password);
        }
        if let Ok(base_topic) = std::env::var("MQTT_BASE_TOPIC") {
            config.mqtt.base_topic = base_topic;
        }

        // Device under test
        if let Ok(name) = std::env::var("DEVICE_NAME") {
            config.device.name = name;
        }

        // Wait deadlines
        if let Ok(secs) = std::env::var("SERIAL_TIMEOUT_SECS")
            && let Ok(s) = secs.parse()
        {
            config.timeouts.serial_secs = s;
        }
        if let Ok(secs) = std::env::var("MQTT_TIMEOUT_SECS")
            && let Ok(s) = secs.parse()
        {
            config.timeouts.mqtt_secs = s;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv_skips_comments_and_strips_quotes() {
        let content = "# comment\n\nSERIAL_PORT=/dev/ttyACM0\nDEVICE_NAME=\"my switch\"\nBROKEN\n";
        let pairs = parse_dotenv(content);
        assert_eq!(
            pairs,
            vec![("SERIAL_PORT", "/dev/ttyACM0"), ("DEVICE_NAME", "my switch")]
        );
    }

    #[test]
    fn test_default_matches_z2m_conventions() {
        let config = HarnessConfig::default();
        assert_eq!(config.mqtt.base_topic, "zigbee2mqtt");
        assert_eq!(config.device.coordinator, "Coordinator");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.timeouts.serial(), Duration::from_secs(5));
    }

    #[test]
    fn test_negative_timeout_clamps_to_zero() {
        let timeouts = TimeoutConfig {
            serial_secs: -1.0,
            mqtt_secs: 0.25,
        };
        assert_eq!(timeouts.serial(), Duration::ZERO);
        assert_eq!(timeouts.mqtt(), Duration::from_millis(250));
    }
}
