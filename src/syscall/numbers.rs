//! System call numbers

use super::handler::Fault;

pub const SYS_HALT: u32 = 0;
pub const SYS_EXIT: u32 = 1;
pub const SYS_EXEC: u32 = 2;
pub const SYS_WAIT: u32 = 3;
pub const SYS_CREATE: u32 = 4;
pub const SYS_REMOVE: u32 = 5;
pub const SYS_OPEN: u32 = 6;
pub const SYS_FILESIZE: u32 = 7;
pub const SYS_READ: u32 = 8;
pub const SYS_WRITE: u32 = 9;
pub const SYS_SEEK: u32 = 10;
pub const SYS_TELL: u32 = 11;
pub const SYS_CLOSE: u32 = 12;

/// Largest argument count of any syscall.
pub const MAX_ARGS: usize = 3;

/// A recognised system call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Syscall {
    Halt = SYS_HALT,
    Exit = SYS_EXIT,
    Exec = SYS_EXEC,
    Wait = SYS_WAIT,
    Create = SYS_CREATE,
    Remove = SYS_REMOVE,
    Open = SYS_OPEN,
    Filesize = SYS_FILESIZE,
    Read = SYS_READ,
    Write = SYS_WRITE,
    Seek = SYS_SEEK,
    Tell = SYS_TELL,
    Close = SYS_CLOSE,
}

impl Syscall {
    /// Number of argument words above the syscall number.
    pub const fn arity(self) -> usize {
        match self {
            Self::Halt => 0,
            Self::Exit
            | Self::Exec
            | Self::Wait
            | Self::Remove
            | Self::Open
            | Self::Filesize
            | Self::Tell
            | Self::Close => 1,
            Self::Create | Self::Seek => 2,
            Self::Read | Self::Write => 3,
        }
    }
}

impl TryFrom<u32> for Syscall {
    type Error = Fault;

    fn try_from(no: u32) -> Result<Self, Self::Error> {
        Ok(match no {
            SYS_HALT => Self::Halt,
            SYS_EXIT => Self::Exit,
            SYS_EXEC => Self::Exec,
            SYS_WAIT => Self::Wait,
            SYS_CREATE => Self::Create,
            SYS_REMOVE => Self::Remove,
            SYS_OPEN => Self::Open,
            SYS_FILESIZE => Self::Filesize,
            SYS_READ => Self::Read,
            SYS_WRITE => Self::Write,
            SYS_SEEK => Self::Seek,
            SYS_TELL => Self::Tell,
            SYS_CLOSE => Self::Close,
            _ => return Err(Fault::UnknownSyscall(no)),
        })
    }
}
