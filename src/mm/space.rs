//! Per-Process Address Space
//!
//! The page-table subsystem lives outside this crate. The syscall layer
//! only needs two things from it: whether a page is present (and with
//! which permissions), and a way to copy bytes in and out of user memory
//! once the range has been approved.
//!
//! # Security Properties
//! - Presence is always queried from the page tables, never inferred from
//!   the address value alone
//! - Raw copies are only issued for ranges the validator has approved

use bitflags::bitflags;

use super::address::VirtAddr;

bitflags! {
    /// Permission bits of a present user page.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        /// Page is mapped.
        const PRESENT = 1 << 0;
        /// Page may be written.
        const WRITABLE = 1 << 1;
        /// Page is accessible from user mode.
        const USER = 1 << 2;

        /// Read-only user page (code, rodata).
        const USER_RO = Self::PRESENT.bits() | Self::USER.bits();
        /// Read/write user page (data, bss, stack).
        const USER_RW = Self::USER_RO.bits() | Self::WRITABLE.bits();
    }
}

/// Handle to one process's page tables.
///
/// Owned by the process; dropping it tears the address space down.
pub trait AddressSpace: Send {
    /// Look up the page containing `page`.
    ///
    /// Returns `None` if no mapping exists.
    fn page_flags(&self, page: VirtAddr) -> Option<PageFlags>;

    /// Copy `dst.len()` bytes out of user memory starting at `addr`.
    ///
    /// Only called on ranges approved by the syscall validator.
    fn read(&self, addr: VirtAddr, dst: &mut [u8]);

    /// Copy `src` into user memory starting at `addr`.
    ///
    /// Only called on ranges approved by the syscall validator.
    fn write(&self, addr: VirtAddr, src: &[u8]);
}
