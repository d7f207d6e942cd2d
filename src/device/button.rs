//! Labels for the switch's observable button behaviour.

use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Button state names printed by the firmware on every transition.
///
/// Only used to build wait patterns; legality of a transition sequence is up
/// to the scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, AsRefStr)]
pub enum ButtonState {
    #[strum(serialize = "IDLE")]
    Idle,
    #[strum(serialize = "PRESSED1")]
    Pressed1,
    #[strum(serialize = "PAUSE1")]
    Pause1,
    #[strum(serialize = "PRESSED2")]
    Pressed2,
    #[strum(serialize = "PAUSE2")]
    Pause2,
    #[strum(serialize = "PRESSED3")]
    Pressed3,
    #[strum(serialize = "LONG_PRESS")]
    LongPress,
}

/// Values accepted by the `state_<name>` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum SwitchCommand {
    On,
    Off,
    Toggle,
}

/// Prefix of the `action` values reported by zigbee2mqtt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ActionKind {
    Single,
    Double,
    Hold,
    Release,
}

/// Level Control commands the switch logs when it sends them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum LevelCommand {
    Move,
    Stop,
}

/// Multistate values reported for a button.
pub mod multistate {
    pub const RELEASED: u8 = 0;
    pub const LONG_PRESS: u8 = 255;
}
