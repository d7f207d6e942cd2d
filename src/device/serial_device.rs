//! Serial side of the device under test: commands out, log lines in.

use crate::error::Result;
use crate::input::serial::{DeviceLink, LineMatch, SerialWatcher};
use std::time::Duration;

pub struct SerialDevice {
    link: Box<dyn DeviceLink>,
    watcher: SerialWatcher,
    timeout: Duration,
}

impl SerialDevice {
    pub fn new(link: Box<dyn DeviceLink>, watcher: SerialWatcher, timeout: Duration) -> Self {
        Self {
            link,
            watcher,
            timeout,
        }
    }

    pub fn watcher(&mut self) -> &mut SerialWatcher {
        &mut self.watcher
    }

    pub fn send_str(&self, line: &str) -> Result<()> {
        self.link.send_line(line)
    }

    /// Wait for `pattern` with the default timeout.
    pub async fn wait_str(&mut self, pattern: &str) -> Result<LineMatch> {
        self.watcher.wait_for_line(pattern, self.timeout).await
    }

    /// Reset the device and drop whatever it printed before the reset.
    pub fn reset(&mut self) -> Result<()> {
        self.link.reset()?;
        self.watcher.discard_pending();
        Ok(())
    }
}
