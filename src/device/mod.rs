//! The smart switch under test, as seen from the harness.

pub mod attributes;
pub mod button;
mod serial_device;
mod smart_switch;

pub use attributes::{
    Attribute, AttributeKind, AttributeValue, LongPressMode, RelayMode, SwitchActions, SwitchMode,
};
pub use button::{ActionKind, ButtonState, LevelCommand, SwitchCommand};
pub use serial_device::SerialDevice;
pub use smart_switch::SmartSwitch;
