//! On/Off Switch Configuration attributes exposed by the switch.
//!
//! The attribute table is closed: names map to the identifiers the firmware
//! logs in its `ZCL Write Attribute` / `ZCL Read Attribute` lines.

use crate::error::{HarnessError, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// ZCL cluster id (hex, as logged by the firmware) holding the switch options.
pub const SWITCH_CFG_CLUSTER: &str = "0007";

/// ZCL cluster id of On/Off.
pub const ON_OFF_CLUSTER: &str = "0006";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Attribute {
    SwitchMode,
    SwitchActions,
    RelayMode,
    MaxPause,
    MinLongPress,
    LongPressMode,
}

/// How an attribute's value is represented on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// enum8 with a closed set of names
    Enumeration,
    /// uint16
    Numeric,
}

impl Attribute {
    /// Parse a logical attribute name.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::from_str(name).map_err(|_| HarnessError::UnknownAttribute(name.to_string()))
    }

    /// Attribute identifier as logged by the firmware.
    pub fn wire_id(self) -> &'static str {
        match self {
            Attribute::SwitchMode => "ff00",
            Attribute::SwitchActions => "0010",
            Attribute::RelayMode => "ff01",
            Attribute::MaxPause => "ff02",
            Attribute::MinLongPress => "ff03",
            Attribute::LongPressMode => "ff04",
        }
    }

    pub fn kind(self) -> AttributeKind {
        match self {
            Attribute::MaxPause | Attribute::MinLongPress => AttributeKind::Numeric,
            _ => AttributeKind::Enumeration,
        }
    }

    /// Accepted names for enumeration attributes; empty for numeric ones.
    pub fn allowed_values(self) -> Vec<&'static str> {
        fn names<E: IntoEnumIterator + Into<&'static str>>() -> Vec<&'static str> {
            E::iter().map(Into::into).collect()
        }

        match self {
            Attribute::SwitchMode => names::<SwitchMode>(),
            Attribute::SwitchActions => names::<SwitchActions>(),
            Attribute::RelayMode => names::<RelayMode>(),
            Attribute::LongPressMode => names::<LongPressMode>(),
            Attribute::MaxPause | Attribute::MinLongPress => Vec::new(),
        }
    }

    /// Check `value` against the attribute's domain and build the value to publish.
    ///
    /// Numeric values are published as text with surrounding whitespace
    /// removed, which is what zigbee2mqtt echoes back on set.
    pub fn validate(self, value: &str) -> Result<Value> {
        let accepted = match self.kind() {
            AttributeKind::Numeric => {
                let trimmed = value.trim();
                trimmed.parse::<u16>().is_ok().then_some(trimmed)
            }
            AttributeKind::Enumeration => self.allowed_values().contains(&value).then_some(value),
        };

        if let Some(accepted) = accepted {
            Ok(Value::String(accepted.to_string()))
        } else {
            Err(HarnessError::InvalidAttributeValue {
                attribute: self.to_string(),
                value: value.to_string(),
            })
        }
    }

    /// zigbee2mqtt property name for this attribute on an endpoint.
    pub fn property(self, endpoint_name: &str) -> String {
        format!("{}_{}", self, endpoint_name)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "camelCase")]
pub enum SwitchMode {
    Toggle,
    Momentary,
    Multifunction,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "camelCase")]
pub enum SwitchActions {
    OnOff,
    OffOn,
    Toggle,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "camelCase")]
pub enum RelayMode {
    Unlinked,
    Front,
    Single,
    Double,
    Tripple,
    Long,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "camelCase")]
pub enum LongPressMode {
    None,
    LevelCtrlUp,
    LevelCtrlDown,
}

/// A value read back from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    Number(i64),
}

impl AttributeValue {
    /// Convert a reported JSON value without any coercion.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => AttributeValue::Text(s.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Number(i),
                None => AttributeValue::Text(n.to_string()),
            },
            other => AttributeValue::Text(other.to_string()),
        }
    }

    /// Convert a reported value for `attribute`, turning numeric strings
    /// into numbers for numeric attributes.
    pub fn coerce(attribute: Attribute, value: &Value) -> Self {
        match (attribute.kind(), Self::from_json(value)) {
            (AttributeKind::Numeric, AttributeValue::Text(s)) => match s.trim().parse::<i64>() {
                Ok(n) => AttributeValue::Number(n),
                Err(_) => AttributeValue::Text(s),
            },
            (_, v) => v,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Number(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(_) => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(s) => write!(f, "{}", s),
            AttributeValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl PartialEq<&str> for AttributeValue {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl PartialEq<i64> for AttributeValue {
    fn eq(&self, other: &i64) -> bool {
        self.as_i64() == Some(*other)
    }
}
