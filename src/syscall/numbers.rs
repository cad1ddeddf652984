//! System Call Numbers and Signatures
//!
//! Each call declares its arguments as an ordered list of [`ArgKind`]s.
//! The dispatcher validates exactly that many argument bytes above the call
//! number and decodes them in one place, so no handler does its own stack
//! offset arithmetic.

/// How a raw argument word is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Signed integer (status codes, descriptors, pids, mapping ids).
    Int,
    /// Unsigned integer (sizes, file positions).
    Uint,
    /// User-space pointer.
    Ptr,
}

impl ArgKind {
    /// Width of the argument on the user stack, in bytes.
    #[inline]
    pub const fn width(self) -> usize {
        4
    }
}

/// System call numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SyscallNumber {
    Halt = 0,
    Exit = 1,
    Exec = 2,
    Wait = 3,
    Create = 4,
    Remove = 5,
    Open = 6,
    Filesize = 7,
    Read = 8,
    Write = 9,
    Seek = 10,
    Tell = 11,
    Close = 12,
    Mmap = 13,
    Munmap = 14,
}

impl SyscallNumber {
    /// Decode a raw call number.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Halt,
            1 => Self::Exit,
            2 => Self::Exec,
            3 => Self::Wait,
            4 => Self::Create,
            5 => Self::Remove,
            6 => Self::Open,
            7 => Self::Filesize,
            8 => Self::Read,
            9 => Self::Write,
            10 => Self::Seek,
            11 => Self::Tell,
            12 => Self::Close,
            13 => Self::Mmap,
            14 => Self::Munmap,
            _ => return None,
        })
    }

    /// Argument layout of this call.
    pub const fn signature(self) -> &'static [ArgKind] {
        use ArgKind::*;
        match self {
            Self::Halt => &[],
            Self::Exit => &[Int],
            Self::Exec => &[Ptr],
            Self::Wait => &[Int],
            Self::Create => &[Ptr, Uint],
            Self::Remove => &[Ptr],
            Self::Open => &[Ptr],
            Self::Filesize => &[Int],
            Self::Read => &[Int, Ptr, Uint],
            Self::Write => &[Int, Ptr, Uint],
            Self::Seek => &[Int, Uint],
            Self::Tell => &[Int],
            Self::Close => &[Int],
            Self::Mmap => &[Int, Ptr],
            Self::Munmap => &[Int],
        }
    }

    /// Bytes of arguments above the call number.
    pub fn arg_bytes(self) -> usize {
        self.signature().iter().map(|kind| kind.width()).sum()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::Exit => "exit",
            Self::Exec => "exec",
            Self::Wait => "wait",
            Self::Create => "create",
            Self::Remove => "remove",
            Self::Open => "open",
            Self::Filesize => "filesize",
            Self::Read => "read",
            Self::Write => "write",
            Self::Seek => "seek",
            Self::Tell => "tell",
            Self::Close => "close",
            Self::Mmap => "mmap",
            Self::Munmap => "munmap",
        }
    }
}
