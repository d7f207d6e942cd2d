//! Pattern waits over the device's diagnostic output.

use super::link::RawLine;
use crate::error::{HarnessError, Result};
use chrono::{DateTime, Local};
use log::{debug, trace};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, timeout_at};

/// A decoded diagnostic line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub text: String,
    pub received_at: DateTime<Local>,
}

impl LogLine {
    /// Decode a raw line. Returns `None` for non UTF-8 input.
    pub fn decode(raw: &RawLine) -> Option<Self> {
        let text = std::str::from_utf8(&raw.bytes).ok()?;
        Some(Self {
            text: text.trim_end().to_string(),
            received_at: raw.received_at,
        })
    }
}

/// Result of a successful wait.
#[derive(Debug, Clone)]
pub struct LineMatch {
    /// The line that contained the pattern.
    pub line: LogLine,
    /// Decoded lines discarded before the match.
    pub skipped: Vec<LogLine>,
}

/// Consumes the serial line stream and blocks until a pattern shows up.
///
/// Lines are consumed in stream order; anything that does not match is
/// dropped, so consecutive waits observe consecutive positions in the stream.
pub struct SerialWatcher {
    lines: mpsc::Receiver<RawLine>,
}

impl SerialWatcher {
    pub fn new(lines: mpsc::Receiver<RawLine>) -> Self {
        Self { lines }
    }

    /// Wait until a line containing `pattern` arrives or `timeout` elapses.
    ///
    /// A zero timeout still returns a matching line that is already queued.
    pub async fn wait_for_line(&mut self, pattern: &str, timeout: Duration) -> Result<LineMatch> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut skipped = Vec::new();

        loop {
            // The receive is polled before the deadline, so queued lines win over an expired timer
            let raw = match timeout_at(deadline, self.lines.recv()).await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    return Err(HarnessError::TransportClosed(format!(
                        "serial line stream ended while waiting for {:?}",
                        pattern
                    )));
                }
                Err(_) => {
                    debug!(
                        "[SERIAL] Gave up on {:?} after skipping {} line(s)",
                        pattern,
                        skipped.len()
                    );
                    return Err(HarnessError::Timeout {
                        expected: pattern.to_string(),
                        elapsed: start.elapsed(),
                    });
                }
            };

            let Some(line) = LogLine::decode(&raw) else {
                trace!("[SERIAL] Undecodable line ({} bytes)", raw.bytes.len());
                continue;
            };

            debug!("[SERIAL] << {}", line.text);

            if line.text.contains(pattern) {
                return Ok(LineMatch { line, skipped });
            }
            skipped.push(line);
        }
    }

    /// Drop every line that is already queued. Returns how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let mut dropped = 0;
        while self.lines.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("[SERIAL] Discarded {} stale line(s)", dropped);
        }
        dropped
    }
}
