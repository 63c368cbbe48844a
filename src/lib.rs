//! PantherOS User Programs - Syscall Boundary
//!
//! The kernel side of the user/kernel trust boundary: it receives a
//! syscall trap, validates everything the caller handed over, and
//! dispatches to process control and file I/O.
//!
//! # Components
//! - Pointer validation against the caller's page tables (`syscall::validate`)
//! - Per-process descriptor tables (`fd`)
//! - A gate serializing data transfers into the storage engine (`fs`)
//! - Parent/child lifecycle: exec handshake, wait, exit (`process`)
//! - The dispatcher tying them together (`syscall`, `kernel`)
//!
//! # Security Features
//! - No user address is dereferenced before every byte of it has been
//!   checked against the page tables
//! - Argument words are validated as a block before any is interpreted
//! - Every fault terminates only the faulting process, with status -1
//!
//! # Collaborators
//! The storage engine, page tables, scheduler, console device and program
//! loader are supplied by the rest of the kernel through the traits
//! re-exported here.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod fd;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod syscall;

#[cfg(test)]
mod testing;

pub use config::KernelConfig;
pub use drivers::Console;
pub use fs::{FileSystem, OpenFile};
pub use kernel::Kernel;
pub use mm::{AddressSpace, PageFlags, VirtAddr};
pub use process::{Loader, Pid, Process, Scheduler, SpawnRequest};
pub use syscall::{Control, SyscallFrame};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
