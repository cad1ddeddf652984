//! User Virtual Address Types
//!
//! Type-safe wrapper for user-space virtual addresses as they arrive in
//! system call arguments (32-bit words) and page fault reports.
//!
//! # Security Properties
//! - User addresses never carry a kernel pointer; they are only resolved
//!   through the owning process's page table
//! - Arithmetic that could wrap is checked and reported, never silent

use core::fmt;

/// Page size (4 KiB)
pub const PAGE_SIZE: usize = 4096;
/// Page size mask
pub const PAGE_MASK: usize = PAGE_SIZE - 1;
/// Bits to shift for page number
pub const PAGE_SHIFT: usize = 12;

/// First address above user space.
///
/// Everything at or above this boundary belongs to the kernel and is
/// rejected by the validator before any page lookup.
pub const USER_TOP: usize = 0xC000_0000;

/// A user-space virtual address.
///
/// The wrapped value is whatever the process handed us; nothing about it is
/// trusted until the validator has checked it against the page table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(usize);

impl VirtAddr {
    /// The null address.
    pub const NULL: Self = Self(0);

    /// Create a new virtual address.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Create an address from a raw 32-bit argument word.
    #[inline]
    pub const fn from_word(word: u32) -> Self {
        Self(word as usize)
    }

    /// Get the raw address value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check if this is the null address.
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

    /// Get the page offset (lowest 12 bits).
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & PAGE_MASK
    }

    /// Get the virtual page number.
    #[inline]
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Add an offset, returning `None` on wrap-around.
    #[inline]
    pub const fn checked_add(self, offset: usize) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }

    /// Add a whole number of pages, returning `None` on wrap-around.
    #[inline]
    pub const fn checked_add_pages(self, pages: usize) -> Option<Self> {
        match pages.checked_mul(PAGE_SIZE) {
            Some(bytes) => self.checked_add(bytes),
            None => None,
        }
    }

    /// Distance in bytes from `base` up to this address.
    #[inline]
    pub const fn offset_from(self, base: Self) -> usize {
        self.0 - base.0
    }

    /// Check if this is a user address (non-null, below `USER_TOP`).
    #[inline]
    pub const fn is_user(self) -> bool {
        self.0 != 0 && self.0 < USER_TOP
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

/// Number of pages needed to hold `bytes` bytes.
#[inline]
pub const fn pages_for(bytes: usize) -> usize {
    (bytes + PAGE_MASK) >> PAGE_SHIFT
}
