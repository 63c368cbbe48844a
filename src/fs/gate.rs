//! Storage Access Gate
//!
//! One process-wide lock around every data transfer into or out of the
//! storage engine. The engine's read/write paths are not reentrant; two
//! processes writing different files can still share buffer-cache and
//! free-map state underneath.
//!
//! The guard lives only for the single delegated call, so it is dropped
//! on every return path before control goes back to the dispatcher.

use spin::Mutex;

use super::OpenFile;

/// Serializes `read`/`write` calls into the storage engine.
pub struct StorageGate {
    lock: Mutex<()>,
}

impl StorageGate {
    pub const fn new() -> Self {
        Self {
            lock: Mutex::new(()),
        }
    }

    /// Read from `file` into `buf` while holding the gate.
    pub fn read(&self, file: &mut dyn OpenFile, buf: &mut [u8]) -> usize {
        let _guard = self.lock.lock();
        file.read(buf)
    }

    /// Write `buf` to `file` while holding the gate.
    pub fn write(&self, file: &mut dyn OpenFile, buf: &[u8]) -> usize {
        let _guard = self.lock.lock();
        file.write(buf)
    }

    /// Check whether some transfer currently holds the gate.
    pub fn is_held(&self) -> bool {
        self.lock.is_locked()
    }
}

impl Default for StorageGate {
    fn default() -> Self {
        Self::new()
    }
}
