//! System Call Interface
//!
//! The trusted boundary between user processes and the kernel.
//!
//! # Security Model
//! - Whitelist approach: only the fifteen numbered calls are accepted
//! - Every pointer, buffer, and string is validated before use
//! - Misuse of the interface (bad pointer, unknown call, unknown
//!   descriptor) terminates the caller with status -1
//! - Ordinary failures (missing file, bad mapping request) are returned in
//!   the result register and the caller continues
//!
//! # Calls
//! | # | call | args | # | call | args |
//! |---|------|------|---|------|------|
//! | 0 | halt | | 8 | read | fd, buf, size |
//! | 1 | exit | status | 9 | write | fd, buf, size |
//! | 2 | exec | cmd_line | 10 | seek | fd, position |
//! | 3 | wait | pid | 11 | tell | fd |
//! | 4 | create | name, size | 12 | close | fd |
//! | 5 | remove | name | 13 | mmap | fd, addr |
//! | 6 | open | name | 14 | munmap | mapid |
//! | 7 | filesize | fd | | | |

mod file;
mod frame;
mod handler;
mod memory;
mod numbers;
mod process;
mod validate;

pub use frame::SyscallFrame;
pub use handler::{dispatch, SyscallContext, Termination};
pub use numbers::{ArgKind, SyscallNumber};
pub use validate::{BadAccess, UserBuffer, UserBufferMut, UserMemory, MAX_STRING_LEN};
