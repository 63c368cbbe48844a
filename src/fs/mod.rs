//! File Storage Interface
//!
//! The storage engine itself (inodes, directories, on-disk layout) lives
//! outside this crate. This module names the primitives the syscall layer
//! calls and the gate that serializes data transfers through them.
//!
//! # Locking Scope
//! - `read`/`write` on an open file go through the [`StorageGate`]
//! - Metadata calls (`open`, `create`, `remove`, `seek`, `tell`, `length`,
//!   close-by-drop) are issued without the gate

mod gate;

use alloc::boxed::Box;

pub use gate::StorageGate;

/// Path-level storage primitives.
pub trait FileSystem: Send + Sync {
    /// Open the file at `path`, `None` if it does not exist.
    fn open(&self, path: &str) -> Option<Box<dyn OpenFile>>;

    /// Create an empty file of `initial_size` bytes.
    ///
    /// Returns false if the file exists or the engine refuses.
    fn create(&self, path: &str, initial_size: u32) -> bool;

    /// Remove the file at `path`.
    fn remove(&self, path: &str) -> bool;
}

/// An open file handle.
///
/// Dropping the handle closes it and releases the engine's resources.
pub trait OpenFile: Send {
    /// Read into `buf` from the current position, returning bytes read.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Write `buf` at the current position, returning bytes written.
    fn write(&mut self, buf: &[u8]) -> usize;

    /// Move the current position.
    fn seek(&mut self, position: u32);

    /// Current position.
    fn tell(&self) -> u32;

    /// File length in bytes.
    fn length(&self) -> u32;
}
