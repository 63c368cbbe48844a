//! Kernel Instance
//!
//! Wires the external collaborators (storage engine, console, scheduler,
//! program loader) to the syscall layer's own state: the storage gate and
//! the process lifecycle registry.
//!
//! One `Kernel` is shared by every kernel thread through an `Arc`.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::sync::Arc;

use log::info;

use crate::config::KernelConfig;
use crate::drivers::console::{self, Console};
use crate::fs::{FileSystem, StorageGate};
use crate::mm::AddressSpace;
use crate::process::{
    program_name, Lifecycle, Loader, Pid, Process, Scheduler, SpawnRequest, SpawnStatus, WaitError,
};
use crate::syscall::{self, Control, SyscallFrame};

/// The syscall layer of one running system.
pub struct Kernel {
    config: KernelConfig,
    fs: Box<dyn FileSystem>,
    console: Box<dyn Console>,
    sched: Box<dyn Scheduler>,
    loader: Box<dyn Loader>,
    gate: StorageGate,
    lifecycle: Lifecycle,
}

impl Kernel {
    pub fn new(
        config: KernelConfig,
        fs: Box<dyn FileSystem>,
        console: Box<dyn Console>,
        sched: Box<dyn Scheduler>,
        loader: Box<dyn Loader>,
    ) -> Arc<Self> {
        info!(
            "[BOOT] syscall layer up (console chunk {} bytes, {} descriptors per process)",
            config.console_chunk, config.max_open_files
        );
        Arc::new(Self {
            config,
            fs,
            console,
            sched,
            loader,
            gate: StorageGate::new(),
            lifecycle: Lifecycle::new(),
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub(crate) fn fs(&self) -> &dyn FileSystem {
        &*self.fs
    }

    pub(crate) fn console(&self) -> &dyn Console {
        &*self.console
    }

    pub(crate) fn gate(&self) -> &StorageGate {
        &self.gate
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Handle one syscall trap from `process`.
    pub fn syscall(self: &Arc<Self>, process: &mut Process, frame: &mut SyscallFrame) -> Control {
        syscall::dispatch(self, process, frame)
    }

    /// Turn the calling kernel thread into a user process.
    ///
    /// Registers the thread as a pending child of `parent`, runs `load` to
    /// build the address space, then reports the outcome to a parent
    /// blocked in `exec`. Returns `None` if loading failed; the thread
    /// then simply ends.
    pub fn start_process<F>(&self, parent: Option<Pid>, cmdline: &str, load: F) -> Option<Process>
    where
        F: FnOnce() -> Option<Box<dyn AddressSpace>>,
    {
        let pid = self.sched.current();
        self.lifecycle.register(pid, parent);

        let space = load();
        self.lifecycle.finish_load(&*self.sched, pid, space.is_some());

        let Some(space) = space else {
            info!("[PROCESS] {}: load of {:?} failed", pid, cmdline);
            return None;
        };
        let name = program_name(cmdline).to_string();
        info!("[PROCESS] {} started as {}", name, pid);
        Some(Process::new(pid, name, space, self.config.max_open_files))
    }

    /// Spawn `cmdline` as a child of `parent` and block until it has
    /// loaded.
    ///
    /// Returns the child's pid, or `None` if no thread could be created
    /// or the image failed to load.
    pub fn exec(self: &Arc<Self>, parent: Pid, cmdline: String) -> Option<Pid> {
        let request = SpawnRequest { parent, cmdline };
        if !self.loader.spawn(Arc::clone(self), request) {
            return None;
        }
        match self.lifecycle.await_spawn(&*self.sched, parent) {
            SpawnStatus::Loaded(child) => Some(child),
            SpawnStatus::Failed => None,
        }
    }

    /// Block `parent` until `child` exits and collect its status.
    pub fn wait(&self, parent: Pid, child: Pid) -> Result<i32, WaitError> {
        self.lifecycle.wait(&*self.sched, parent, child)
    }

    /// Terminate `process` with `status`.
    ///
    /// Releases its descriptors and address space, prints the exit
    /// message, then makes the status available to its parent. Calling
    /// this on a process that already exited does nothing. Also the path
    /// for user faults outside syscalls (page faults).
    pub fn terminate(&self, process: &mut Process, status: i32) {
        if !process.release_resources() {
            return;
        }
        let message = format!("{}: exit({})\n", process.name(), status);
        console::write_chunked(&*self.console, message.as_bytes(), self.config.console_chunk);
        info!("[PROCESS] {} ({}) exited with {}", process.name(), process.pid(), status);
        self.lifecycle.exit(&*self.sched, process.pid(), status);
    }
}
