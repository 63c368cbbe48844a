//! File Descriptor Table
//!
//! A per-process table mapping small integers to open file handles.
//!
//! # Design
//! - Fixed-capacity array of slots, sized when the process is created
//! - Slots 0 and 1 are the console and never hold a handle
//! - Descriptors are handed out from a monotonic counter and never reused
//! - One validator (`lookup`) backs every descriptor-taking syscall

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::fs::OpenFile;

/// A descriptor number known to name an allocated file slot.
///
/// This is a newtype to prevent using arbitrary integers as slot indices.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(transparent)]
pub struct Fd(u32);

impl Fd {
    /// Console input.
    pub const STDIN: Self = Self(0);

    /// Console output.
    pub const STDOUT: Self = Self(1);

    /// First descriptor backed by a real file.
    pub const FIRST_FILE: Self = Self(2);

    /// Get the index value.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Value returned to user code.
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self.0 as i32
    }
}

/// What a user-supplied descriptor refers to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Descriptor {
    /// fd 0, keyboard input.
    ConsoleIn,
    /// fd 1, console output.
    ConsoleOut,
    /// An occupied file slot.
    File(Fd),
}

/// Error type for descriptor table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdError {
    /// A console descriptor was used where a file is required.
    Reserved,
    /// Negative, or never allocated in this process.
    OutOfRange,
    /// Allocated once, since closed.
    Closed,
    /// No descriptor numbers left.
    TableFull,
}

impl core::fmt::Display for FdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Reserved => write!(f, "console descriptor used as a file"),
            Self::OutOfRange => write!(f, "descriptor was never allocated"),
            Self::Closed => write!(f, "descriptor already closed"),
            Self::TableFull => write!(f, "descriptor table is full"),
        }
    }
}

/// Descriptor table for a process.
pub struct FdTable {
    slots: Vec<Option<Box<dyn OpenFile>>>,
    next_fd: u32,
}

impl FdTable {
    /// Create an empty table holding at most `capacity` descriptors,
    /// the two console slots included.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(Fd::FIRST_FILE.index());
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            next_fd: Fd::FIRST_FILE.0,
        }
    }

    /// Next descriptor number `install` would hand out.
    #[inline]
    pub fn next_fd(&self) -> i32 {
        self.next_fd as i32
    }

    /// Number of open files.
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Store an open handle under the next descriptor number.
    ///
    /// On `TableFull` the handle is dropped, which closes it.
    pub fn install(&mut self, file: Box<dyn OpenFile>) -> Result<Fd, FdError> {
        let fd = Fd(self.next_fd);
        match self.slots.get_mut(fd.index()) {
            Some(slot) => {
                debug_assert!(slot.is_none());
                *slot = Some(file);
                self.next_fd += 1;
                Ok(fd)
            }
            None => Err(FdError::TableFull),
        }
    }

    /// Decide what a raw descriptor refers to.
    ///
    /// Console descriptors are classified without touching the table;
    /// anything else must name an occupied slot.
    pub fn classify(&self, raw: i32) -> Result<Descriptor, FdError> {
        match raw {
            0 => Ok(Descriptor::ConsoleIn),
            1 => Ok(Descriptor::ConsoleOut),
            _ => self.lookup(raw).map(Descriptor::File),
        }
    }

    /// Validate a raw descriptor that must name an open file.
    ///
    /// The descriptor must be in `[2, next_fd)` and its slot occupied.
    pub fn lookup(&self, raw: i32) -> Result<Fd, FdError> {
        if raw == Fd::STDIN.as_raw() || raw == Fd::STDOUT.as_raw() {
            return Err(FdError::Reserved);
        }
        if raw < Fd::FIRST_FILE.as_raw() || raw >= self.next_fd() {
            return Err(FdError::OutOfRange);
        }
        let fd = Fd(raw as u32);
        match self.slots[fd.index()] {
            Some(_) => Ok(fd),
            None => Err(FdError::Closed),
        }
    }

    /// Borrow the handle behind a validated descriptor.
    pub fn file_mut(&mut self, fd: Fd) -> Result<&mut (dyn OpenFile + 'static), FdError> {
        self.slots
            .get_mut(fd.index())
            .and_then(|slot| slot.as_deref_mut())
            .ok_or(FdError::Closed)
    }

    /// Borrow the handle behind a raw descriptor, validating it first.
    pub fn get_mut(&mut self, raw: i32) -> Result<&mut (dyn OpenFile + 'static), FdError> {
        let fd = self.lookup(raw)?;
        self.file_mut(fd)
    }

    /// Close a descriptor, releasing its handle.
    ///
    /// Closing twice fails with `Closed`.
    pub fn close(&mut self, raw: i32) -> Result<(), FdError> {
        let fd = self.lookup(raw)?;
        let file = self.slots[fd.index()].take();
        drop(file);
        Ok(())
    }

    /// Close every open descriptor. Used at process exit.
    pub fn close_all(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.take();
        }
    }
}

impl core::fmt::Debug for FdTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FdTable")
            .field("capacity", &self.slots.len())
            .field("next_fd", &self.next_fd)
            .field("open", &self.open_count())
            .finish()
    }
}
