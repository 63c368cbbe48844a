//! User Virtual Address Type
//!
//! Type-safe wrapper for addresses supplied by user programs. A `VirtAddr`
//! is only a number: nothing here dereferences it. Reaching the memory
//! behind it goes through the owning [`AddressSpace`](super::AddressSpace)
//! after the syscall validator has approved the range.
//!
//! # Security Properties
//! - Arithmetic is checked; a range that wraps the address space is rejected
//! - The user/kernel split is a single constant, `PHYS_BASE`

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// Base of the kernel's half of every address space.
///
/// User mappings live strictly below this address.
pub const PHYS_BASE: usize = 0xC000_0000;

/// Lowest address a user program image is linked at.
pub const USER_IMAGE_BASE: usize = 0x0804_8000;

/// Width of one syscall argument word on the user stack.
pub const WORD_SIZE: usize = 4;

/// A user virtual address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// Create a new virtual address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check for the null address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check if the address is page-aligned.
    #[inline]
    pub const fn is_aligned(self) -> bool {
        self.0 & PAGE_MASK == 0
    }

    /// Align the address down to the nearest page boundary.
    #[inline]
    pub const fn align_down(self) -> Self {
        Self(self.0 & !PAGE_MASK)
    }

    /// Get the virtual page number.
    #[inline]
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Add an offset to this address, `None` on overflow.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Check if this address lies in user space (below `PHYS_BASE`).
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 < PHYS_BASE
    }

    /// Check if this address lies in the kernel's half.
    #[inline]
    pub const fn is_kernel(self) -> bool {
        self.0 >= PHYS_BASE
    }
}

impl fmt::Debug for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtAddr({:#010x})", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Iterate over the page-aligned addresses of every page touched by
/// `[start, start + len)`.
///
/// Returns `None` if the range wraps around the address space.
pub fn pages_spanned(start: VirtAddr, len: usize) -> Option<impl Iterator<Item = VirtAddr>> {
    let (first_page, last_page) = if len == 0 {
        // Empty range: yields nothing.
        (1, 0)
    } else {
        let last = start.checked_add(len - 1)?;
        (start.page_number(), last.page_number())
    };
    Some((first_page..=last_page).map(page_start))
}

#[inline]
fn page_start(page: usize) -> VirtAddr {
    VirtAddr(page << PAGE_SHIFT)
}
