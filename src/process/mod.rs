//! User Processes
//!
//! A process is one running program image bound to one kernel thread.
//!
//! # Design
//! - [`Process`] holds what only the owning thread touches: the address
//!   space and the descriptor table. The thread owns it outright.
//! - [`Lifecycle`] holds what parent and child share: state, exit code,
//!   the spawn handshake. Parent links are process identifiers looked up
//!   in its registry, never references.

pub mod lifecycle;
pub mod sched;

use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;

use crate::fd::FdTable;
use crate::mm::AddressSpace;

pub use lifecycle::{Lifecycle, ProcessState, SpawnStatus, WaitError};
pub use sched::{Loader, Scheduler, SpawnRequest};

/// Process identifier, equal to the identifier of its kernel thread.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Reinterpret a syscall argument as a process identifier.
    #[inline]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        if raw < 0 {
            None
        } else {
            Some(Self(raw as u32))
        }
    }

    /// Value returned to user code.
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-process control block owned by the process's kernel thread.
pub struct Process {
    pid: Pid,
    name: String,
    space: Option<Box<dyn AddressSpace>>,
    files: FdTable,
}

impl Process {
    pub(crate) fn new(
        pid: Pid,
        name: String,
        space: Box<dyn AddressSpace>,
        max_open_files: usize,
    ) -> Self {
        Self {
            pid,
            name,
            space: Some(space),
            files: FdTable::new(max_open_files),
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Program name, as printed in the exit message.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The process's page tables, `None` once it has terminated.
    pub fn address_space(&self) -> Option<&dyn AddressSpace> {
        self.space.as_deref()
    }

    pub fn files(&self) -> &FdTable {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut FdTable {
        &mut self.files
    }

    /// Both the address space and the descriptor table, borrowed together.
    pub(crate) fn split_mut(&mut self) -> (Option<&dyn AddressSpace>, &mut FdTable) {
        (self.space.as_deref(), &mut self.files)
    }

    pub fn is_terminated(&self) -> bool {
        self.space.is_none()
    }

    /// Close every descriptor and tear down the address space.
    ///
    /// Returns false if the resources were already released.
    pub(crate) fn release_resources(&mut self) -> bool {
        let Some(space) = self.space.take() else {
            return false;
        };
        self.files.close_all();
        drop(space);
        true
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .field("terminated", &self.is_terminated())
            .field("files", &self.files)
            .finish()
    }
}

/// Program name: the first word of a command line.
pub fn program_name(cmdline: &str) -> &str {
    cmdline.split_whitespace().next().unwrap_or("")
}
