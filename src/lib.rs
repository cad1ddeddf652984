//! PantherOS User Program Layer
//!
//! The boundary between user processes and the kernel: system call decoding
//! and dispatch, validation of every user-supplied pointer, per-process
//! file descriptors, and demand-paged file mappings (explicit `mmap` regions
//! and lazily loaded executable segments).
//!
//! # Security Features
//! - No kernel code dereferences user memory before it is validated
//! - Misuse of the system call interface terminates only the offending
//!   process
//! - One lock serializes all access to the non-reentrant filesystem
//! - Process exit releases every file and mapping, writing dirty pages back
//!
//! # Collaborators
//! The embedding kernel supplies the filesystem ([`fs::FileSystem`]), the
//! console ([`drivers::Console`]), and process creation
//! ([`kernel::ProcessHost`]), then routes traps through [`kernel::Kernel`].
//!
//! # Features
//! - `vm` (default): demand paging for mappings and segments, plus the
//!   `mmap`/`munmap` calls

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

pub mod drivers;
pub mod fs;
pub mod kernel;
pub mod mm;
pub mod process;
pub mod syscall;

#[cfg(test)]
mod testing;

pub use kernel::{Flow, Kernel, ProcessHost};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
