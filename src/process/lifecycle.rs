//! Process Lifecycle Coordinator
//!
//! Tracks parent/child relationships and mediates the three points where
//! one process waits for another:
//!
//! ```text
//!   exec:  parent ── spawn ──► child loads ── spawn_signal ──► parent resumes
//!   wait:  parent blocks ◄────────────── child exit ── wake parent
//! ```
//!
//! # States
//! `Pending` (loading) → `Running` → `Zombie` (exited, code not yet
//! collected) → reaped (record removed). A process without a live parent
//! skips `Zombie` and is reaped at exit.
//!
//! # Locking
//! All records live behind one registry lock. A signal is always written
//! under that lock and the sleeper woken after it is released; nobody
//! blocks while holding it.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use log::debug;
use spin::Mutex;

use super::sched::Scheduler;
use super::Pid;

/// Exit code a process carries until it exits normally.
pub const EXIT_UNSET: i32 = -1;

/// Lifecycle state of a registered process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Thread created, image still loading.
    Pending,
    /// Executing user code.
    Running,
    /// Exited; exit code waiting for the parent.
    Zombie,
}

/// Outcome delivered to a parent blocked in `exec`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnStatus {
    /// The child loaded and is running under this identifier.
    Loaded(Pid),
    /// The image could not be loaded; no process was left behind.
    Failed,
}

/// Error type for `wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The identifier does not name a child of the caller.
    NotChild,
    /// The child's exit code was already collected.
    AlreadyReaped,
}

impl core::fmt::Display for WaitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotChild => write!(f, "not a child of the caller"),
            Self::AlreadyReaped => write!(f, "child already waited for"),
        }
    }
}

#[derive(Debug)]
struct ProcessRecord {
    parent: Option<Pid>,
    state: ProcessState,
    exit_code: i32,
    /// Result of the child this process is currently exec'ing.
    spawn_signal: Option<SpawnStatus>,
    /// This process is blocked waiting for `spawn_signal`.
    spawn_waiting: bool,
    /// Parent blocked in `wait` on this process.
    waited_by: Option<Pid>,
    /// Children whose exit codes this process collected and that have
    /// not yet answered a repeat `wait`.
    reaped: Vec<Pid>,
}

impl ProcessRecord {
    fn new(parent: Option<Pid>) -> Self {
        Self {
            parent,
            state: ProcessState::Pending,
            exit_code: EXIT_UNSET,
            spawn_signal: None,
            spawn_waiting: false,
            waited_by: None,
            reaped: Vec::new(),
        }
    }

    fn is_live(&self) -> bool {
        self.state != ProcessState::Zombie
    }
}

/// Registry of every process that has not yet been reaped.
pub struct Lifecycle {
    registry: Mutex<BTreeMap<Pid, ProcessRecord>>,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            registry: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register `pid` as `Pending`, child of `parent`.
    ///
    /// A parent that is not registered, or has already exited, is
    /// recorded as no parent at all.
    pub fn register(&self, pid: Pid, parent: Option<Pid>) {
        let mut registry = self.registry.lock();
        let parent = parent.filter(|p| registry.get(p).is_some_and(ProcessRecord::is_live));
        debug!("[PROCESS] register {} (parent {:?})", pid, parent);
        registry.insert(pid, ProcessRecord::new(parent));
    }

    /// Finish loading `pid`, moving it to `Running` on success or removing
    /// it on failure, then deliver the outcome to the exec'ing parent.
    pub fn finish_load(&self, sched: &dyn Scheduler, pid: Pid, loaded: bool) {
        let mut registry = self.registry.lock();
        let parent = if loaded {
            match registry.get_mut(&pid) {
                Some(record) => {
                    record.state = ProcessState::Running;
                    record.parent
                }
                None => None,
            }
        } else {
            registry.remove(&pid).and_then(|record| record.parent)
        };

        let status = if loaded {
            SpawnStatus::Loaded(pid)
        } else {
            SpawnStatus::Failed
        };
        debug!("[PROCESS] load of {} finished: {:?}", pid, status);

        let Some(parent) = parent else {
            return;
        };
        let wake = match registry.get_mut(&parent) {
            Some(record) => {
                record.spawn_signal = Some(status);
                core::mem::take(&mut record.spawn_waiting)
            }
            None => false,
        };
        drop(registry);

        if wake {
            sched.unblock(parent);
        }
    }

    /// Block `parent` until the child it is spawning reports in, then
    /// consume and return the report.
    pub fn await_spawn(&self, sched: &dyn Scheduler, parent: Pid) -> SpawnStatus {
        loop {
            {
                let mut registry = self.registry.lock();
                let Some(record) = registry.get_mut(&parent) else {
                    return SpawnStatus::Failed;
                };
                if let Some(status) = record.spawn_signal.take() {
                    record.spawn_waiting = false;
                    return status;
                }
                record.spawn_waiting = true;
            }
            sched.block();
        }
    }

    /// Block `parent` until `child` exits, then collect its exit code and
    /// reap it.
    ///
    /// Fails without blocking if `child` is not a child of `parent`, or
    /// was already collected. A collected child is reported as such once;
    /// after that it is forgotten and reads as `NotChild`.
    pub fn wait(&self, sched: &dyn Scheduler, parent: Pid, child: Pid) -> Result<i32, WaitError> {
        loop {
            {
                let mut registry = self.registry.lock();
                let is_child = registry
                    .get(&child)
                    .is_some_and(|record| record.parent == Some(parent));
                if !is_child {
                    let reaped = registry
                        .get_mut(&parent)
                        .is_some_and(|p| forget_reaped(&mut p.reaped, child));
                    return Err(if reaped {
                        WaitError::AlreadyReaped
                    } else {
                        WaitError::NotChild
                    });
                }
                let Some(record) = registry.get_mut(&child) else {
                    return Err(WaitError::NotChild);
                };

                if record.state == ProcessState::Zombie {
                    let code = core::mem::replace(&mut record.exit_code, EXIT_UNSET);
                    registry.remove(&child);
                    if let Some(p) = registry.get_mut(&parent) {
                        p.reaped.push(child);
                    }
                    debug!("[PROCESS] {} reaped {} (exit {})", parent, child, code);
                    return Ok(code);
                }
                record.waited_by = Some(parent);
            }
            sched.block();
        }
    }

    /// Record `code` as the exit status of `pid` and hand it to the
    /// parent.
    ///
    /// The caller has already released the process's files and address
    /// space. Children of `pid` are orphaned; those already exited are
    /// reaped on the spot.
    pub fn exit(&self, sched: &dyn Scheduler, pid: Pid, code: i32) {
        let mut registry = self.registry.lock();

        registry.retain(|child_pid, child| {
            if child.parent != Some(pid) {
                return true;
            }
            if child.state == ProcessState::Zombie {
                debug!("[PROCESS] reclaiming orphaned zombie {}", child_pid);
                return false;
            }
            child.parent = None;
            true
        });

        let Some(record) = registry.get_mut(&pid) else {
            return;
        };
        record.exit_code = code;
        record.state = ProcessState::Zombie;
        let waiter = record.waited_by.take();
        let parent = record.parent;

        let parent_live = parent
            .and_then(|p| registry.get(&p))
            .is_some_and(ProcessRecord::is_live);
        if !parent_live {
            debug!("[PROCESS] {} exited with no parent, reclaimed", pid);
            registry.remove(&pid);
        }
        drop(registry);

        if let Some(waiter) = waiter {
            sched.unblock(waiter);
        }
    }

    /// Whether `pid` is blocked in `exec` until its child reports in.
    pub fn is_awaiting_spawn(&self, pid: Pid) -> bool {
        self.registry
            .lock()
            .get(&pid)
            .is_some_and(|record| record.spawn_waiting)
    }

    /// Current state of `pid`, `None` once reaped.
    pub fn state(&self, pid: Pid) -> Option<ProcessState> {
        self.registry.lock().get(&pid).map(|record| record.state)
    }

    /// Parent of `pid`, if it has a live one.
    pub fn parent(&self, pid: Pid) -> Option<Pid> {
        self.registry.lock().get(&pid).and_then(|record| record.parent)
    }

    /// Exit code currently stored for `pid`.
    pub fn exit_code(&self, pid: Pid) -> Option<i32> {
        self.registry.lock().get(&pid).map(|record| record.exit_code)
    }

    /// Number of processes not yet reaped.
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn forget_reaped(reaped: &mut Vec<Pid>, child: Pid) -> bool {
    match reaped.iter().position(|&pid| pid == child) {
        Some(at) => {
            reaped.swap_remove(at);
            true
        }
        None => false,
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
