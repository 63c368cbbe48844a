//! Thread and Loader Collaborators
//!
//! Every user process runs on exactly one kernel thread, and the thread's
//! identifier doubles as the process identifier.

use alloc::string::String;
use alloc::sync::Arc;

use super::Pid;
use crate::kernel::Kernel;

/// Low-level thread primitives supplied by the scheduler.
pub trait Scheduler: Send + Sync {
    /// Identifier of the calling kernel thread.
    fn current(&self) -> Pid;

    /// Put the calling thread to sleep until it is unblocked.
    ///
    /// Park semantics: an `unblock` delivered before `block` makes the
    /// next `block` return at once. `block` may also return spuriously,
    /// so callers re-check their wake condition in a loop.
    fn block(&self);

    /// Make `pid` runnable again.
    fn unblock(&self, pid: Pid);
}

/// Request to run a new program on behalf of `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnRequest {
    /// Process performing `exec`.
    pub parent: Pid,
    /// Full command line, program name first.
    pub cmdline: String,
}

/// Creates kernel threads for new programs.
pub trait Loader: Send + Sync {
    /// Start a new kernel thread for `request`.
    ///
    /// The new thread must call [`Kernel::start_process`] with
    /// `Some(request.parent)`, loading the image inside its closure.
    /// Returns false if no thread could be created; the thread is then
    /// never started and nobody is signalled.
    fn spawn(&self, kernel: Arc<Kernel>, request: SpawnRequest) -> bool;
}
