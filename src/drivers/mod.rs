//! Device interfaces used by the syscall layer
//!
//! All drivers follow these principles:
//! - The device is a collaborator behind a trait
//! - No unbounded buffer is ever handed to a device in one call

pub mod console;

pub use console::Console;
