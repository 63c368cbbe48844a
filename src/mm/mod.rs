//! Memory management interface for the syscall layer
//!
//! Provides:
//! - User virtual address type and the user/kernel split
//! - The address-space collaborator the pointer validator queries
//!
//! # Security Principles
//! - User addresses are plain numbers until validated
//! - Mapping presence comes from the page tables

mod address;
mod space;

pub use address::{
    pages_spanned, VirtAddr, PAGE_SIZE, PAGE_SHIFT, PHYS_BASE, USER_IMAGE_BASE, WORD_SIZE,
};
pub use space::{AddressSpace, PageFlags};
