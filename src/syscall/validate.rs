//! User Memory Validation
//!
//! Every pointer, buffer, and string a process passes to the kernel is
//! checked here before the kernel touches it.
//!
//! # Security Principles
//! - Validate ALL inputs before use
//! - Fail-secure: any failure terminates the calling process
//! - Prevent common vulnerabilities:
//!   - Kernel memory disclosure (user range check on every address)
//!   - Wrap-around spans (last byte checked first)
//!   - Writes through read-only pages (permission check per page)
//!   - TOCTOU races (strings and write buffers are copied to kernel space)
//!
//! # Lazy Pages
//! A page that is not resident is handed to the build's fault path, which
//! may fill it from its mapping. Validation therefore must never run with
//! the filesystem lock held.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use log::debug;

use crate::fs::FilesysLock;
use crate::mm::fault::{self, FaultContext, FaultPath};
use crate::mm::{AddressSpace, VirtAddr, PAGE_SIZE};

/// Longest string (excluding the terminator) the kernel will accept.
pub const MAX_STRING_LEN: usize = 4095;

/// Why a user address was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadAccess {
    /// The null address.
    Null,
    /// An address at or above the user/kernel split.
    KernelAddress(VirtAddr),
    /// The page is neither resident nor fillable.
    Unmapped(VirtAddr),
    /// A write to a read-only page.
    ReadOnly(VirtAddr),
    /// The span wraps around the address space.
    Overflow,
    /// No terminator within [`MAX_STRING_LEN`] bytes.
    StringTooLong,
}

impl core::fmt::Display for BadAccess {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Null => write!(f, "null pointer"),
            Self::KernelAddress(addr) => write!(f, "kernel address {}", addr),
            Self::Unmapped(addr) => write!(f, "unmapped address {}", addr),
            Self::ReadOnly(addr) => write!(f, "write to read-only page at {}", addr),
            Self::Overflow => write!(f, "span wraps around"),
            Self::StringTooLong => write!(f, "string longer than {} bytes", MAX_STRING_LEN),
        }
    }
}

/// A validated user-space buffer to read from.
///
/// This type guarantees that every page of the span was resident and
/// readable when it was constructed.
#[derive(Debug, Clone, Copy)]
pub struct UserBuffer {
    addr: VirtAddr,
    len: usize,
}

/// A validated user-space buffer to write into.
#[derive(Debug, Clone, Copy)]
pub struct UserBufferMut {
    addr: VirtAddr,
    len: usize,
}

impl UserBuffer {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl UserBufferMut {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The calling process's memory, seen through the validator.
pub struct UserMemory<'a> {
    space: &'a mut AddressSpace,
    fs: &'a FilesysLock,
    user_sp: VirtAddr,
}

impl<'a> UserMemory<'a> {
    /// `user_sp` is the stack pointer saved at trap time, passed to the
    /// fault path as context.
    pub fn new(space: &'a mut AddressSpace, fs: &'a FilesysLock, user_sp: VirtAddr) -> Self {
        Self { space, fs, user_sp }
    }

    /// Check that `addr` may be accessed, faulting its page in if needed.
    pub fn translate(&mut self, addr: VirtAddr, for_write: bool) -> Result<(), BadAccess> {
        if addr.is_null() {
            return Err(BadAccess::Null);
        }
        if !addr.is_user() {
            return Err(BadAccess::KernelAddress(addr));
        }

        if let Some(entry) = self.space.page_table().lookup(addr) {
            if entry.is_present() {
                return if for_write && !entry.is_writable() {
                    Err(BadAccess::ReadOnly(addr))
                } else {
                    Ok(())
                };
            }
        }

        let fault = FaultContext {
            addr,
            write: for_write,
            user_sp: self.user_sp,
        };
        if fault::Active::resolve(self.space, self.fs, fault) {
            Ok(())
        } else {
            Err(BadAccess::Unmapped(addr))
        }
    }

    /// Check that every page touched by `[ptr, ptr + size)` is accessible.
    ///
    /// The last byte is checked first to reject out-of-range and wrapping
    /// spans cheaply; then the first byte of each page is checked. Any byte
    /// in a confirmed page is reachable, so no per-byte walk is needed.
    pub fn check_buffer(&mut self, ptr: VirtAddr, size: usize, for_write: bool) -> Result<(), BadAccess> {
        // Zero-length spans touch no page
        if size == 0 {
            return Ok(());
        }

        let last = ptr.checked_add(size - 1).ok_or(BadAccess::Overflow)?;
        self.translate(last, for_write)?;

        self.translate(ptr, for_write)?;
        let mut page = ptr.align_down().as_usize() + PAGE_SIZE;
        let last_page = last.align_down().as_usize();
        while page < last_page {
            self.translate(VirtAddr::new(page), for_write)?;
            page += PAGE_SIZE;
        }
        Ok(())
    }

    /// Validate a buffer the kernel will read from.
    pub fn readable(&mut self, ptr: VirtAddr, size: usize) -> Result<UserBuffer, BadAccess> {
        self.check_buffer(ptr, size, false)?;
        Ok(UserBuffer { addr: ptr, len: size })
    }

    /// Validate a buffer the kernel will write into.
    pub fn writable(&mut self, ptr: VirtAddr, size: usize) -> Result<UserBufferMut, BadAccess> {
        self.check_buffer(ptr, size, true)?;
        Ok(UserBufferMut { addr: ptr, len: size })
    }

    /// Validate a NUL-terminated string and copy it into kernel memory.
    ///
    /// Translation is rechecked exactly when the scan crosses into a new
    /// page. Bytes that are not valid UTF-8 are replaced.
    pub fn check_string(&mut self, ptr: VirtAddr) -> Result<String, BadAccess> {
        self.translate(ptr, false)?;

        let mut bytes = Vec::new();
        let mut cur = ptr;
        loop {
            let byte = self.space.read_byte(cur).ok_or(BadAccess::Unmapped(cur))?;
            if byte == 0 {
                break;
            }
            if bytes.len() == MAX_STRING_LEN {
                debug!("[SYSCALL] string at {} exceeds {} bytes", ptr, MAX_STRING_LEN);
                return Err(BadAccess::StringTooLong);
            }
            bytes.push(byte);
            cur = cur.checked_add(1).ok_or(BadAccess::Overflow)?;
            if cur.is_aligned() {
                self.translate(cur, false)?;
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Copy a validated buffer into kernel memory.
    pub fn copy_in(&mut self, buf: &UserBuffer) -> Result<Vec<u8>, BadAccess> {
        let mut data = vec![0u8; buf.len];
        self.space
            .copy_from_user(buf.addr, &mut data)
            .map_err(|_| BadAccess::Unmapped(buf.addr))?;
        Ok(data)
    }

    /// Copy `data` into a validated buffer. At most `buf.len()` bytes are
    /// copied.
    pub fn copy_out(&mut self, buf: &UserBufferMut, data: &[u8]) -> Result<(), BadAccess> {
        let n = data.len().min(buf.len);
        self.space
            .copy_to_user(buf.addr, &data[..n])
            .map_err(|_| BadAccess::Unmapped(buf.addr))
    }
}
