//! Serial channel to the device under test.
//!
//! Commands go out as text lines; the device's free-form diagnostic output
//! comes back as lines that scenarios wait on by substring.

mod link;
mod watcher;

pub use link::{DeviceLink, LineSplitter, RawLine, SerialLink};
pub use watcher::{LineMatch, LogLine, SerialWatcher};
