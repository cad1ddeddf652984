//! Syscall Frame
//!
//! The slice of the trap frame the system call layer uses: the user stack
//! pointer at trap time (call number at `esp`, arguments above it) and the
//! result register.

use crate::mm::VirtAddr;

/// Register state for one system call.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct SyscallFrame {
    /// User stack pointer at trap time.
    pub esp: u32,
    /// Result register.
    pub eax: u32,
}

impl SyscallFrame {
    pub const fn new(esp: u32) -> Self {
        Self { esp, eax: 0 }
    }

    /// Stack pointer as a user address.
    #[inline]
    pub const fn stack_pointer(&self) -> VirtAddr {
        VirtAddr::from_word(self.esp)
    }

    /// Store a call result.
    #[inline]
    pub fn set_result(&mut self, value: i32) {
        self.eax = value as u32;
    }

    /// The stored result, reinterpreted as signed.
    #[inline]
    pub const fn result(&self) -> i32 {
        self.eax as i32
    }
}
