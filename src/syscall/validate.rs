//! System Call Input Validation
//!
//! Decides whether user-supplied addresses may be touched, and performs the
//! copies once they have been approved.
//!
//! # Security Principles
//! - Validate ALL inputs before use, argument words included
//! - Fail-secure: a range is accepted only if every page it touches is
//!   present, user-accessible and below `PHYS_BASE`
//! - Prevent common vulnerabilities:
//!   - Null pointer dereference (explicit check)
//!   - Wrap-around ranges (checked arithmetic)
//!   - Unmapped holes inside plausible ranges (per-page lookup)
//!   - TOCTOU races (data is copied into kernel buffers)

use alloc::string::String;
use alloc::vec::Vec;

use super::handler::Fault;
use super::numbers::MAX_ARGS;
use crate::mm::{pages_spanned, AddressSpace, PageFlags, VirtAddr, PHYS_BASE, WORD_SIZE};

/// Check that `[ptr, ptr + len)` is mapped in `space`, user-accessible,
/// below the kernel split, and does not start at null.
pub fn validate(space: &dyn AddressSpace, ptr: VirtAddr, len: usize) -> bool {
    check_range(space, ptr, len, PageFlags::USER_RO)
}

/// Like [`validate`], and additionally require every page to be writable.
pub fn validate_writable(space: &dyn AddressSpace, ptr: VirtAddr, len: usize) -> bool {
    check_range(space, ptr, len, PageFlags::USER_RW)
}

fn check_range(space: &dyn AddressSpace, ptr: VirtAddr, len: usize, required: PageFlags) -> bool {
    if ptr.is_null() || !ptr.is_user() {
        return false;
    }
    match ptr.checked_add(len) {
        Some(end) if end.as_usize() <= PHYS_BASE => {}
        _ => return false,
    }
    let Some(mut pages) = pages_spanned(ptr, len) else {
        return false;
    };
    pages.all(|page| {
        space
            .page_flags(page)
            .is_some_and(|flags| flags.contains(required))
    })
}

/// A validated user buffer the kernel may read from.
///
/// This type guarantees that:
/// - The whole range is mapped and user-accessible in its address space
/// - The length doesn't overflow
#[derive(Debug, Clone, Copy)]
pub struct UserBuffer {
    addr: VirtAddr,
    len: usize,
}

impl UserBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy bytes starting `offset` bytes into the buffer into `dst`.
    ///
    /// Copies at most `dst.len()` bytes and never past the end of the
    /// buffer; returns the number copied. `space` must be the address
    /// space the buffer was validated against.
    pub fn read_at(&self, space: &dyn AddressSpace, offset: usize, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len.saturating_sub(offset));
        if n > 0 {
            space.read(VirtAddr::new(self.addr.as_usize() + offset), &mut dst[..n]);
        }
        n
    }
}

/// A validated user buffer the kernel may write into.
#[derive(Debug, Clone, Copy)]
pub struct UserBufferMut {
    addr: VirtAddr,
    len: usize,
}

impl UserBufferMut {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy `src` into the buffer starting `offset` bytes in, truncated at
    /// the end of the buffer.
    ///
    /// Returns the number of bytes copied.
    pub fn write_at(&self, space: &dyn AddressSpace, offset: usize, src: &[u8]) -> usize {
        let n = src.len().min(self.len.saturating_sub(offset));
        if n > 0 {
            space.write(VirtAddr::new(self.addr.as_usize() + offset), &src[..n]);
        }
        n
    }
}

/// Validate a user-space buffer the kernel will read.
///
/// # Security Checks
/// 1. Pointer is not null and below `PHYS_BASE`
/// 2. Pointer + length doesn't overflow or cross into the kernel
/// 3. Every page of the range is present and user-accessible
pub fn validate_user_read(
    space: &dyn AddressSpace,
    ptr: VirtAddr,
    len: usize,
) -> Result<UserBuffer, Fault> {
    if !validate(space, ptr, len) {
        return Err(Fault::BadPointer(ptr));
    }
    Ok(UserBuffer { addr: ptr, len })
}

/// Validate a user-space buffer the kernel will write.
///
/// Same as read validation, plus every page must be writable.
pub fn validate_user_write(
    space: &dyn AddressSpace,
    ptr: VirtAddr,
    len: usize,
) -> Result<UserBufferMut, Fault> {
    if !validate_writable(space, ptr, len) {
        return Err(Fault::BadPointer(ptr));
    }
    Ok(UserBufferMut { addr: ptr, len })
}

/// Read one word from user memory, validating it first.
pub fn read_word(space: &dyn AddressSpace, addr: VirtAddr) -> Option<u32> {
    if !validate(space, addr, WORD_SIZE) {
        return None;
    }
    let mut word = [0u8; WORD_SIZE];
    space.read(addr, &mut word);
    Some(u32::from_le_bytes(word))
}

/// Argument words of one syscall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Args {
    words: [u32; MAX_ARGS],
}

impl Args {
    /// Argument `i` as a signed integer.
    #[inline]
    pub fn int(&self, i: usize) -> i32 {
        self.words[i] as i32
    }

    /// Argument `i` as an unsigned integer.
    #[inline]
    pub fn uint(&self, i: usize) -> u32 {
        self.words[i]
    }

    /// Argument `i` as a user pointer.
    #[inline]
    pub fn ptr(&self, i: usize) -> VirtAddr {
        VirtAddr::new(self.words[i] as usize)
    }
}

/// Fetch the `count` argument words above the syscall number at `esp`.
///
/// The whole argument block is validated before any word is read.
pub fn read_args(space: &dyn AddressSpace, esp: VirtAddr, count: usize) -> Result<Args, Fault> {
    let count = count.min(MAX_ARGS);
    let mut words = [0u32; MAX_ARGS];
    if count == 0 {
        return Ok(Args { words });
    }

    let base = esp.checked_add(WORD_SIZE).ok_or(Fault::BadArgument(esp))?;
    if !validate(space, base, count * WORD_SIZE) {
        return Err(Fault::BadArgument(base));
    }

    let mut raw = [0u8; MAX_ARGS * WORD_SIZE];
    space.read(base, &mut raw[..count * WORD_SIZE]);
    for (word, bytes) in words.iter_mut().zip(raw.chunks_exact(WORD_SIZE)).take(count) {
        *word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    }
    Ok(Args { words })
}

/// Error type for copying in a NUL-terminated user string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStrError {
    /// Some byte before the terminator is not accessible.
    Fault(Fault),
    /// No terminator within the length limit.
    TooLong,
    /// The bytes are not UTF-8.
    NotUtf8,
}

impl From<Fault> for UserStrError {
    fn from(fault: Fault) -> Self {
        Self::Fault(fault)
    }
}

impl core::fmt::Display for UserStrError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Fault(fault) => write!(f, "{}", fault),
            Self::TooLong => write!(f, "string exceeds length limit"),
            Self::NotUtf8 => write!(f, "string is not UTF-8"),
        }
    }
}

/// Copy a NUL-terminated string of at most `max_len` bytes out of user
/// memory.
///
/// Every byte up to and including the terminator is validated before it
/// is read; validation is repeated only when the string crosses a page.
pub fn copy_in_str(
    space: &dyn AddressSpace,
    ptr: VirtAddr,
    max_len: usize,
) -> Result<String, UserStrError> {
    let mut bytes = Vec::new();
    let mut checked_page = None;

    for offset in 0..=max_len {
        let addr = ptr.checked_add(offset).ok_or(Fault::BadPointer(ptr))?;
        let page = addr.align_down();
        if checked_page != Some(page) {
            if !validate(space, addr, 1) {
                return Err(Fault::BadPointer(addr).into());
            }
            checked_page = Some(page);
        }

        let mut byte = [0u8; 1];
        space.read(addr, &mut byte);
        if byte[0] == 0 {
            return String::from_utf8(bytes).map_err(|_| UserStrError::NotUtf8);
        }
        bytes.push(byte[0]);
    }
    Err(UserStrError::TooLong)
}
