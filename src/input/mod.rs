//! Channels to the device under test.
//!
//! - `serial`: command lines out, diagnostic lines in
//! - `mqtt`: zigbee2mqtt state reports and bridge requests

pub mod mqtt;
pub mod serial;
