//! Smart switch test harness library.
//!
//! Drives a Zigbee smart switch over its serial port and through
//! zigbee2mqtt, and checks that the firmware's log lines and the network's
//! state reports show up in the expected order.

pub mod config;
pub mod device;
pub mod error;
pub mod input;
pub mod instance_lock;
pub mod scenarios;

#[cfg(test)]
mod testing;
