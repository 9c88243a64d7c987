//! Per-transmitter process lock using a Unix socket.
//!
//! Two bridge processes keying the same GPIO pin would garble each other's
//! waveforms, so the lock is scoped to the pin rather than to the program.
//! The socket is released by the OS when the process dies, so a crash never
//! leaves a stale lock that blocks the next start.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstanceLockError {
    /// Another process already drives this GPIO pin.
    #[error("another bridge is already transmitting on GPIO {0}")]
    AlreadyRunning(u32),

    #[error("failed to acquire transmitter lock: {0}")]
    Io(#[from] io::Error),
}

/// Held for as long as this process owns the transmitter on `gpio_pin`.
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
    gpio_pin: u32,
}

impl InstanceLock {
    /// Acquire the lock for `gpio_pin` in the default runtime directory.
    pub fn acquire(gpio_pin: u32) -> Result<Self, InstanceLockError> {
        Self::acquire_in(&Self::runtime_dir(), gpio_pin)
    }

    pub fn acquire_in(dir: &Path, gpio_pin: u32) -> Result<Self, InstanceLockError> {
        let path = Self::socket_path(dir, gpio_pin);

        if path.exists() {
            // A socket nobody answers on belongs to a process that was killed.
            if UnixStream::connect(&path).is_ok() {
                return Err(InstanceLockError::AlreadyRunning(gpio_pin));
            }
            let _ = std::fs::remove_file(&path);
        }

        match UnixListener::bind(&path) {
            Ok(listener) => Ok(Self {
                _listener: listener,
                path,
                gpio_pin,
            }),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                Err(InstanceLockError::AlreadyRunning(gpio_pin))
            }
            Err(e) => Err(InstanceLockError::Io(e)),
        }
    }

    pub fn gpio_pin(&self) -> u32 {
        self.gpio_pin
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `XDG_RUNTIME_DIR` when set, `/tmp` otherwise.
    pub fn runtime_dir() -> PathBuf {
        std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }

    pub fn socket_path(dir: &Path, gpio_pin: u32) -> PathBuf {
        dir.join(format!("rf-switch-bridge-gpio{gpio_pin}.sock"))
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rf-lock-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_socket_path_is_per_pin() {
        assert_eq!(
            InstanceLock::socket_path(Path::new("/run/user/1000"), 17),
            PathBuf::from("/run/user/1000/rf-switch-bridge-gpio17.sock")
        );
    }

    #[test]
    fn test_second_lock_on_same_pin_fails() {
        let dir = temp_dir();
        let lock = InstanceLock::acquire_in(&dir, 17).unwrap();
        assert!(matches!(
            InstanceLock::acquire_in(&dir, 17),
            Err(InstanceLockError::AlreadyRunning(17))
        ));
        let other_pin = InstanceLock::acquire_in(&dir, 27).unwrap();
        assert_eq!(other_pin.gpio_pin(), 27);

        drop(lock);
        assert!(InstanceLock::acquire_in(&dir, 17).is_ok());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_stale_socket_is_reclaimed() {
        let dir = temp_dir();
        let path = InstanceLock::socket_path(&dir, 17);
        // Bind and drop the listener without removing the file, like a killed process.
        drop(UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let lock = InstanceLock::acquire_in(&dir, 17).unwrap();
        assert_eq!(lock.path(), path.as_path());
        let _ = std::fs::remove_dir_all(dir);
    }
}
