//! System Call Interface
//!
//! The boundary between untrusted user programs and kernel services.
//!
//! # Security Model
//! - Whitelist approach: only the enumerated syscalls are allowed
//! - The stack pointer, every argument word, and every referenced buffer
//!   are validated before use
//! - Invalid inputs terminate the caller; they never panic the kernel
//!
//! # Current Syscalls
//! - 0: halt()
//! - 1: exit(status)
//! - 2: exec(cmdline) -> pid
//! - 3: wait(pid) -> status
//! - 4: create(path, size) -> bool
//! - 5: remove(path) -> bool
//! - 6: open(path) -> fd
//! - 7: filesize(fd) -> len
//! - 8: read(fd, buf, len) -> n
//! - 9: write(fd, buf, len) -> n
//! - 10: seek(fd, pos)
//! - 11: tell(fd) -> pos
//! - 12: close(fd)

mod frame;
mod handler;
pub mod numbers;
pub mod validate;

pub use frame::{Control, SyscallFrame};
pub use handler::{dispatch, Fault, EXIT_FAULT};
pub use numbers::Syscall;
pub use validate::{UserBuffer, UserBufferMut};
