//! Single instance lock per serial port using a Unix socket.
//!
//! Prevents two harness sessions from driving the same device at once. Uses a
//! Unix socket which is automatically cleaned up by the OS when the process
//! dies, avoiding stale lock files.

use std::io;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for instance lock operations.
#[derive(Debug, Error)]
pub enum InstanceLockError {
    /// Another session already owns the port.
    #[error("another harness session is already using {0}")]
    AlreadyRunning(String),

    /// I/O error during lock acquisition.
    #[error("failed to acquire instance lock: {0}")]
    Io(#[from] io::Error),
}

/// Session lock for one serial port.
///
/// The lock is held as long as this struct exists. When dropped, the socket
/// file is removed. If the process crashes, the OS automatically removes
/// the socket, preventing stale locks.
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl InstanceLock {
    /// Attempt to acquire the lock for `port`.
    pub fn acquire(port: &str) -> Result<Self, InstanceLockError> {
        let path = Self::socket_path(port);

        // Remove stale socket if it exists but no process holds it
        if path.exists() {
            match std::os::unix::net::UnixStream::connect(&path) {
                Ok(_) => {
                    return Err(InstanceLockError::AlreadyRunning(port.to_string()));
                }
                Err(_) => {
                    let _ = std::fs::remove_file(&path);
                }
            }
        }

        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self {
                _listener: listener,
                path,
            }),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                // Race condition: another session bound between our check and bind
                Err(InstanceLockError::AlreadyRunning(port.to_string()))
            }
            Err(e) => Err(InstanceLockError::Io(e)),
        }
    }

    /// Get the path to the socket file for `port`.
    pub fn socket_path(port: &str) -> PathBuf {
        // Use XDG_RUNTIME_DIR if available (auto-cleaned on logout)
        // Fallback to /tmp
        let dir = std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"));
        dir.join(format!("smartswitch-harness-{}.sock", Self::sanitize(port)))
    }

    fn sanitize(port: &str) -> String {
        port.trim_start_matches('/')
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        // Clean up the socket file on normal exit
        let _ = std::fs::remove_file(&self.path);
    }
}
