//! System Call Handler
//!
//! Dispatches system calls and implements individual syscall handlers.
//!
//! # Security Considerations
//! - The stack pointer is validated before the syscall number is read
//! - All argument words are validated before any of them is interpreted
//! - Buffers and strings are validated before they are touched
//! - Any failed check terminates the caller with status -1

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, warn};

use super::frame::{Control, SyscallFrame};
use super::numbers::Syscall;
use super::validate::{self, Args, UserStrError};
use crate::drivers::console;
use crate::fd::{Descriptor, FdError};
use crate::kernel::Kernel;
use crate::mm::VirtAddr;
use crate::process::{Pid, Process};

/// Exit status of a process terminated by the kernel.
pub const EXIT_FAULT: i32 = -1;

/// Value returned to user code for a failed `exec`, `wait` or `open`.
const FAILED: i32 = -1;

/// Reasons a syscall terminates its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The stack pointer does not reach a readable syscall number.
    BadStackPointer(VirtAddr),
    /// An argument word is not in mapped user memory.
    BadArgument(VirtAddr),
    /// A buffer or string argument is not in mapped user memory.
    BadPointer(VirtAddr),
    /// A descriptor does not name an open file.
    BadDescriptor(FdError),
    /// Reading fd 1 or writing fd 0.
    ConsoleMisuse(i32),
    /// No such syscall.
    UnknownSyscall(u32),
    /// The process has already exited.
    Terminated,
}

impl core::fmt::Display for Fault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadStackPointer(addr) => write!(f, "bad stack pointer {}", addr),
            Self::BadArgument(addr) => write!(f, "bad argument word at {}", addr),
            Self::BadPointer(addr) => write!(f, "bad user pointer {}", addr),
            Self::BadDescriptor(err) => write!(f, "bad descriptor: {}", err),
            Self::ConsoleMisuse(fd) => write!(f, "console descriptor {} used in wrong direction", fd),
            Self::UnknownSyscall(no) => write!(f, "unknown syscall {}", no),
            Self::Terminated => write!(f, "process already terminated"),
        }
    }
}

impl From<FdError> for Fault {
    fn from(err: FdError) -> Self {
        Self::BadDescriptor(err)
    }
}

/// Dispatch a system call
///
/// # Arguments
/// * `kernel` - The kernel instance
/// * `process` - The calling process, owned by the calling thread
/// * `frame` - Saved user state; `eax` receives the return value
///
/// # Returns
/// What the trap layer must do next. On any fault the process has
/// already been terminated with status -1.
pub fn dispatch(kernel: &Arc<Kernel>, process: &mut Process, frame: &mut SyscallFrame) -> Control {
    match handle(kernel, process, frame) {
        Ok(control) => control,
        Err(fault) => {
            warn!("[SYSCALL] {} ({}): {}, terminating", process.name(), process.pid(), fault);
            kernel.terminate(process, EXIT_FAULT);
            Control::Exit(EXIT_FAULT)
        }
    }
}

fn handle(kernel: &Arc<Kernel>, process: &mut Process, frame: &mut SyscallFrame) -> Result<Control, Fault> {
    let space = process.address_space().ok_or(Fault::Terminated)?;
    let number = validate::read_word(space, frame.esp).ok_or(Fault::BadStackPointer(frame.esp))?;
    let call = Syscall::try_from(number)?;
    let args = validate::read_args(space, frame.esp, call.arity())?;
    debug!("[SYSCALL] {} {:?}", process.pid(), call);

    let ret = match call {
        Syscall::Halt => {
            warn!("[SYSCALL] halt requested by {}", process.pid());
            return Ok(Control::PowerOff);
        }
        Syscall::Exit => {
            let status = args.int(0);
            kernel.terminate(process, status);
            return Ok(Control::Exit(status));
        }
        Syscall::Exec => Some(sys_exec(kernel, process, args.ptr(0))?),
        Syscall::Wait => Some(sys_wait(kernel, process, args.int(0))),
        Syscall::Create => Some(sys_create(kernel, process, args)? as i32),
        Syscall::Remove => Some(sys_remove(kernel, process, args.ptr(0))? as i32),
        Syscall::Open => Some(sys_open(kernel, process, args.ptr(0))?),
        Syscall::Filesize => Some(sys_filesize(process, args.int(0))?),
        Syscall::Read => Some(sys_read(kernel, process, args)?),
        Syscall::Write => Some(sys_write(kernel, process, args)?),
        Syscall::Seek => {
            sys_seek(process, args.int(0), args.uint(1))?;
            None
        }
        Syscall::Tell => Some(sys_tell(process, args.int(0))? as i32),
        Syscall::Close => {
            sys_close(process, args.int(0))?;
            None
        }
    };

    if let Some(value) = ret {
        frame.eax = value as u32;
    }
    Ok(Control::Resume)
}

/// Copy in a path argument.
///
/// An inaccessible byte is fatal; an over-long or non-UTF-8 path is
/// reported as `Ok(None)` so the caller can fail the syscall softly.
fn user_path(
    process: &Process,
    ptr: VirtAddr,
    max_len: usize,
) -> Result<Option<alloc::string::String>, Fault> {
    let space = process.address_space().ok_or(Fault::Terminated)?;
    match validate::copy_in_str(space, ptr, max_len) {
        Ok(path) => Ok(Some(path)),
        Err(UserStrError::Fault(fault)) => Err(fault),
        Err(err) => {
            debug!("[SYSCALL] {}: rejected path: {}", process.pid(), err);
            Ok(None)
        }
    }
}

/// Exec system call
///
/// Starts a new process and waits until it has either loaded or failed.
///
/// # Returns
/// The child's pid, or -1 if it could not be started.
fn sys_exec(kernel: &Arc<Kernel>, process: &Process, cmdline: VirtAddr) -> Result<i32, Fault> {
    let Some(cmdline) = user_path(process, cmdline, kernel.config().max_cmdline_len)? else {
        return Ok(FAILED);
    };
    Ok(match kernel.exec(process.pid(), cmdline) {
        Some(child) => child.as_raw(),
        None => FAILED,
    })
}

/// Wait system call
///
/// # Returns
/// The child's exit status, or -1 if `pid` is not a child of the caller
/// or has already been waited for.
fn sys_wait(kernel: &Kernel, process: &Process, pid: i32) -> i32 {
    let Some(child) = Pid::from_raw(pid) else {
        return FAILED;
    };
    match kernel.wait(process.pid(), child) {
        Ok(status) => status,
        Err(err) => {
            debug!("[SYSCALL] {}: wait({}) failed: {}", process.pid(), pid, err);
            FAILED
        }
    }
}

/// Create system call
fn sys_create(kernel: &Kernel, process: &Process, args: Args) -> Result<bool, Fault> {
    let Some(path) = user_path(process, args.ptr(0), kernel.config().max_path_len)? else {
        return Ok(false);
    };
    Ok(!path.is_empty() && kernel.fs().create(&path, args.uint(1)))
}

/// Remove system call
fn sys_remove(kernel: &Kernel, process: &Process, path: VirtAddr) -> Result<bool, Fault> {
    let Some(path) = user_path(process, path, kernel.config().max_path_len)? else {
        return Ok(false);
    };
    Ok(!path.is_empty() && kernel.fs().remove(&path))
}

/// Open system call
///
/// # Returns
/// A new descriptor, or -1 if the file cannot be opened or the table is
/// full. Neither failure terminates the caller.
fn sys_open(kernel: &Kernel, process: &mut Process, path: VirtAddr) -> Result<i32, Fault> {
    let Some(path) = user_path(process, path, kernel.config().max_path_len)? else {
        return Ok(FAILED);
    };
    if path.is_empty() {
        return Ok(FAILED);
    }
    let Some(file) = kernel.fs().open(&path) else {
        debug!("[FD] {}: open({:?}) failed", process.pid(), path);
        return Ok(FAILED);
    };
    match process.files_mut().install(file) {
        Ok(fd) => {
            debug!("[FD] {}: open({:?}) = {}", process.pid(), path, fd.as_raw());
            Ok(fd.as_raw())
        }
        Err(err) => {
            warn!("[FD] {}: open({:?}): {}", process.pid(), path, err);
            Ok(FAILED)
        }
    }
}

/// Filesize system call
fn sys_filesize(process: &mut Process, fd: i32) -> Result<i32, Fault> {
    Ok(count(process.files_mut().get_mut(fd)?.length() as usize))
}

/// Bytes one `read`/`write` moves at most, so the count fits the return
/// register. Longer requests are short transfers.
const MAX_TRANSFER: usize = i32::MAX as usize;

fn transfer_len(len: u32) -> usize {
    (len as usize).min(MAX_TRANSFER)
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Kernel-side staging buffer for one transfer.
///
/// Data moves through it `console_chunk` bytes at a time, so kernel memory
/// use does not depend on the length user code asks for.
fn bounce_buffer(kernel: &Kernel, len: usize) -> Vec<u8> {
    vec![0u8; kernel.config().console_chunk.max(1).min(len)]
}

/// Read system call
///
/// fd 0 reads exactly `len` bytes of keyboard input; file descriptors
/// read through the storage gate, one chunk per gate acquisition, and
/// stop at end of file.
fn sys_read(kernel: &Kernel, process: &mut Process, args: Args) -> Result<i32, Fault> {
    let (fd, buf, len) = (args.int(0), args.ptr(1), transfer_len(args.uint(2)));
    let (space, files) = process.split_mut();
    let space = space.ok_or(Fault::Terminated)?;

    let dest = validate::validate_user_write(space, buf, len)?;
    let source = files.classify(fd)?;
    if source == Descriptor::ConsoleOut {
        return Err(Fault::ConsoleMisuse(fd));
    }

    let mut bounce = bounce_buffer(kernel, dest.len());
    let mut done = 0;
    while done < dest.len() {
        let want = bounce.len().min(dest.len() - done);
        let chunk = &mut bounce[..want];
        let n = match source {
            Descriptor::File(fd) => kernel.gate().read(files.file_mut(fd)?, chunk),
            _ => console::read_exact(kernel.console(), chunk),
        };
        done += dest.write_at(space, done, &chunk[..n]);
        if n < want {
            break;
        }
    }
    Ok(count(done))
}

/// Write system call
///
/// fd 1 goes to the console in bounded bursts; file descriptors write
/// through the storage gate, one chunk per gate acquisition.
fn sys_write(kernel: &Kernel, process: &mut Process, args: Args) -> Result<i32, Fault> {
    let (fd, buf, len) = (args.int(0), args.ptr(1), transfer_len(args.uint(2)));
    let (space, files) = process.split_mut();
    let space = space.ok_or(Fault::Terminated)?;

    let src = validate::validate_user_read(space, buf, len)?;
    let sink = files.classify(fd)?;
    if sink == Descriptor::ConsoleIn {
        return Err(Fault::ConsoleMisuse(fd));
    }

    let chunk_size = kernel.config().console_chunk;
    let mut bounce = bounce_buffer(kernel, src.len());
    let mut done = 0;
    while done < src.len() {
        let n = src.read_at(space, done, &mut bounce);
        let written = match sink {
            Descriptor::File(fd) => kernel.gate().write(files.file_mut(fd)?, &bounce[..n]),
            _ => console::write_chunked(kernel.console(), &bounce[..n], chunk_size),
        };
        done += written;
        if written < n {
            break;
        }
    }
    Ok(count(done))
}

/// Seek system call
fn sys_seek(process: &mut Process, fd: i32, position: u32) -> Result<(), Fault> {
    process.files_mut().get_mut(fd)?.seek(position);
    Ok(())
}

/// Tell system call
fn sys_tell(process: &mut Process, fd: i32) -> Result<u32, Fault> {
    Ok(process.files_mut().get_mut(fd)?.tell())
}

/// Close system call
fn sys_close(process: &mut Process, fd: i32) -> Result<(), Fault> {
    process.files_mut().close(fd)?;
    debug!("[FD] {}: close({})", process.pid(), fd);
    Ok(())
}
