//! Syscall Trap Frame
//!
//! The slice of saved user state the syscall layer reads and writes. The
//! trap entry code fills it in from the interrupt frame and copies `eax`
//! back before returning to user mode.
//!
//! # User Stack Layout at the Trap
//! ```text
//!   esp + 12 ─► arg 2
//!   esp +  8 ─► arg 1
//!   esp +  4 ─► arg 0
//!   esp      ─► syscall number
//! ```

use crate::mm::VirtAddr;

/// Saved user state relevant to a syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallFrame {
    /// User stack pointer at the trap.
    pub esp: VirtAddr,
    /// Return value register.
    pub eax: u32,
}

impl SyscallFrame {
    pub const fn new(esp: VirtAddr) -> Self {
        Self { esp, eax: 0 }
    }

    /// Return value as the signed integer user code sees.
    #[inline]
    pub const fn ret(&self) -> i32 {
        self.eax as i32
    }
}

/// What the trap layer does after a syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Return to user mode.
    Resume,
    /// The process has exited with this status and its resources are
    /// released; the thread must not return to user mode.
    Exit(i32),
    /// Power the machine off.
    PowerOff,
}
