//! Line-oriented wrapper around the device's serial port.
//!
//! A dedicated reader thread splits the byte stream into newline terminated
//! lines and hands them to the async side through a bounded channel. Writes
//! and the DTR reset pulse go through the shared port handle.

use crate::config::SerialConfig;
use crate::error::Result;
use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serialport::{ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::mpsc;

/// Lines longer than this are flushed without a terminator.
const MAX_LINE_LEN: usize = 4096;

/// How long DTR is held asserted to reset the device.
const RESET_PULSE: Duration = Duration::from_millis(10);

/// A raw, undecoded line as read from the port.
#[derive(Debug, Clone)]
pub struct RawLine {
    pub bytes: Vec<u8>,
    pub received_at: DateTime<Local>,
}

impl RawLine {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            received_at: Local::now(),
        }
    }
}

impl From<&str> for RawLine {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

/// Outbound side of the device connection.
pub trait DeviceLink: Send + Sync {
    /// Write one newline terminated command line.
    fn send_line(&self, line: &str) -> Result<()>;

    /// Power-cycle the device.
    fn reset(&self) -> Result<()>;
}

/// Splits an arbitrary byte stream into lines.
#[derive(Debug, Default)]
pub struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    /// Feed bytes, returning every line completed by them (without `\r\n`).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\n' {
                let mut line = std::mem::take(&mut self.pending);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                lines.push(line);
            } else {
                self.pending.push(b);
                if self.pending.len() >= MAX_LINE_LEN {
                    lines.push(std::mem::take(&mut self.pending));
                }
            }
        }
        lines
    }
}

/// Serial port connection to the device under test.
pub struct SerialLink {
    port: Arc<Mutex<Box<dyn SerialPort>>>,
    port_name: String,
    running: Arc<AtomicBool>,
}

impl SerialLink {
    /// Open the port and start the reader thread.
    ///
    /// Returns the link and the receiving end of the line queue, which is
    /// closed when the port fails or the link is dropped.
    pub fn open(config: &SerialConfig) -> Result<(Self, mpsc::Receiver<RawLine>)> {
        info!(
            "[SERIAL] Opening {} at {} baud",
            config.port, config.baud_rate
        );

        let mut port = serialport::new(config.port.as_str(), config.baud_rate)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()?;

        // Release the reset line so the device can boot
        port.write_data_terminal_ready(false)?;

        let reader_port = port.try_clone()?;
        let (tx, rx) = mpsc::channel(config.line_queue.max(1));
        let running = Arc::new(AtomicBool::new(true));

        let reader_running = running.clone();
        let port_name = config.port.clone();
        thread::Builder::new()
            .name("serial-reader".into())
            .spawn(move || read_loop(reader_port, tx, reader_running))?;

        Ok((
            Self {
                port: Arc::new(Mutex::new(port)),
                port_name,
                running,
            },
            rx,
        ))
    }

}

impl DeviceLink for SerialLink {
    fn send_line(&self, line: &str) -> Result<()> {
        debug!("[SERIAL] >> {}", line);
        let mut port = self.port.lock();
        port.write_all(line.as_bytes())?;
        port.write_all(b"\n")?;
        port.flush()?;
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        info!("[SERIAL] Resetting device on {}", self.port_name);
        blocking(|| -> Result<()> {
            let mut port = self.port.lock();
            port.write_data_terminal_ready(true)?;
            thread::sleep(RESET_PULSE);
            port.clear(ClearBuffer::Input)?;
            port.write_data_terminal_ready(false)?;
            Ok(())
        })
    }
}

/// Run `f` without stalling other tasks when called from a multi-threaded
/// runtime worker. Elsewhere `f` just runs inline.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Reader thread body. Dropping `tx` on exit closes the line queue.
fn read_loop(mut port: Box<dyn SerialPort>, tx: mpsc::Sender<RawLine>, running: Arc<AtomicBool>) {
    let mut splitter = LineSplitter::default();
    let mut buf = [0u8; 256];

    while running.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                for line in splitter.push(&buf[..n]) {
                    if tx.blocking_send(RawLine::new(line)).is_err() {
                        debug!("[SERIAL] Line queue closed, stopping reader");
                        return;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {
                warn!("[SERIAL] Read interrupted, retrying");
            }
            Err(e) => {
                error!("[SERIAL] Read error, closing line stream: {}", e);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splitter_handles_partial_lines() {
        let mut splitter = LineSplitter::default();
        assert!(splitter.push(b"Switching but").is_empty());
        let lines = splitter.push(b"ton 2 state to IDLE\r\nnext");
        assert_eq!(lines, vec![b"Switching button 2 state to IDLE".to_vec()]);
        let lines = splitter.push(b"\n");
        assert_eq!(lines, vec![b"next".to_vec()]);
    }

    #[test]
    fn test_splitter_keeps_empty_lines() {
        let mut splitter = LineSplitter::default();
        let lines = splitter.push(b"\r\n\n");
        assert_eq!(lines, vec![Vec::<u8>::new(), Vec::new()]);
    }

    #[test]
    fn test_blocking_outside_runtime_runs_inline() {
        assert_eq!(blocking(|| 7), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_on_worker_thread() {
        let started = std::time::Instant::now();
        blocking(|| thread::sleep(RESET_PULSE));
        assert!(started.elapsed() >= RESET_PULSE);
    }

    #[tokio::test]
    async fn test_blocking_on_current_thread_runtime() {
        assert_eq!(blocking(|| "done"), "done");
    }

    #[test]
    fn test_splitter_flushes_overlong_line() {
        let mut splitter = LineSplitter::default();
        let lines = splitter.push(&vec![b'x'; MAX_LINE_LEN + 3]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), MAX_LINE_LEN);
        assert_eq!(splitter.push(b"\n"), vec![b"xxx".to_vec()]);
    }
}
