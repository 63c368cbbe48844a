//! Per-Process File Descriptors
//!
//! # Design
//! - Each process owns one `FdTable`
//! - Descriptors are small integers handed to user code
//! - Only the owning process touches its table, so no lock is needed

pub mod table;

pub use table::{Descriptor, Fd, FdError, FdTable};
