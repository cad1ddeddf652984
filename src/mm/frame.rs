//! User Page Frames
//!
//! Kernel-owned backing storage for resident user pages.
//!
//! # Security Properties
//! - Every frame is zeroed before it is handed out, so a page never exposes
//!   data left behind by a previous owner
//! - Frames are owned by exactly one page table entry and released on drop
//! - A released frame is scrubbed with volatile writes before its memory
//!   returns to the allocator

use alloc::boxed::Box;
use alloc::vec;
use core::ptr;
use core::sync::atomic::{compiler_fence, Ordering};

use super::address::PAGE_SIZE;

/// A single resident page worth of memory.
///
/// Released automatically when the owning page table entry is dropped,
/// which keeps cleanup correct on every error path.
pub struct Frame {
    bytes: Box<[u8]>,
}

impl Frame {
    /// Allocate a new zeroed frame.
    pub fn alloc_zeroed() -> Self {
        Self {
            bytes: vec![0u8; PAGE_SIZE].into_boxed_slice(),
        }
    }

    /// Borrow the frame contents.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Borrow the frame contents mutably.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        scrub(&mut self.bytes);
    }
}

/// Overwrite `bytes` with zeros in a way the compiler cannot elide.
fn scrub(bytes: &mut [u8]) {
    for byte in bytes.iter_mut() {
        // SAFETY: `byte` is a valid, exclusive reference
        unsafe {
            ptr::write_volatile(byte, 0);
        }
    }
    compiler_fence(Ordering::SeqCst);
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Frame({:p})", self.bytes.as_ptr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_zeroed() {
        let frame = Frame::alloc_zeroed();
        assert_eq!(frame.as_bytes().len(), PAGE_SIZE);
        assert!(frame.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_scrub() {
        let mut data = [0x42u8; 16];
        scrub(&mut data);
        assert!(data.iter().all(|&b| b == 0));
    }
}
