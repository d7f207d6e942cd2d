use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum HarnessError {
    #[error("Timed out after {elapsed:?} waiting for {expected:?}")]
    Timeout { expected: String, elapsed: Duration },

    #[error("No write confirmation for attribute {attribute} after {elapsed:?}")]
    AttributeWriteTimeout {
        attribute: String,
        elapsed: Duration,
    },

    #[error("Unknown attribute name: {0}")]
    UnknownAttribute(String),

    #[error("Invalid value {value:?} for attribute {attribute}")]
    InvalidAttributeValue { attribute: String, value: String },

    #[error("Transport closed: {0}")]
    TransportClosed(String),

    #[error("Scenario failed: {0}")]
    ScenarioFailed(String),

    #[error(transparent)]
    SerialError(#[from] serialport::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl HarnessError {
    /// Whether re-running the scenario may succeed. The harness itself never retries.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            HarnessError::Timeout { .. } | HarnessError::AttributeWriteTimeout { .. }
        )
    }

    /// Errors that must abort the whole session rather than a single wait.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::TransportClosed(_)
                | HarnessError::UnknownAttribute(_)
                | HarnessError::InvalidAttributeValue { .. }
                | HarnessError::SerialError(_)
                | HarnessError::IoError(_)
        )
    }
}

impl From<rumqttc::ClientError> for HarnessError {
    fn from(e: rumqttc::ClientError) -> Self {
        // The request channel only fails once the event loop is gone
        HarnessError::TransportClosed(format!("MQTT client: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
