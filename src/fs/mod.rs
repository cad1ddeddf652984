//! Backing Filesystem Interface
//!
//! The filesystem itself lives outside this crate. User processes reach it
//! only through the [`FileSystem`] and [`File`] traits, and every call is
//! serialized by the process-wide [`FilesysLock`].
//!
//! # Security Considerations
//! - The filesystem is not reentrant; all access goes through the lock
//! - File names are copied into kernel memory before they reach the filesystem
//! - Filesystem results are authoritative; nothing is retried

mod lock;

use alloc::boxed::Box;

pub use lock::FilesysLock;

/// An open file owned by the kernel on behalf of a process.
pub type FileBox = Box<dyn File>;

/// An open file as exposed by the backing filesystem.
///
/// Positional reads and writes (`read_at`/`write_at`) leave the file
/// position untouched; `read`/`write` advance it.
pub trait File: Send {
    /// Read from the current position, returning bytes read.
    fn read(&mut self, buf: &mut [u8]) -> usize;
    /// Write at the current position, returning bytes written.
    fn write(&mut self, buf: &[u8]) -> usize;
    /// Read at `offset`, returning bytes read.
    fn read_at(&mut self, buf: &mut [u8], offset: u32) -> usize;
    /// Write at `offset`, returning bytes written.
    fn write_at(&mut self, buf: &[u8], offset: u32) -> usize;
    /// Move the file position.
    fn seek(&mut self, position: u32);
    /// Current file position.
    fn tell(&self) -> u32;
    /// File length in bytes.
    fn length(&self) -> u32;
    /// Open the same underlying file again with an independent position.
    fn reopen(&self) -> Option<FileBox>;
}

/// The backing filesystem.
pub trait FileSystem: Send {
    /// Open `name`, or `None` if it does not exist.
    fn open(&mut self, name: &str) -> Option<FileBox>;
    /// Create `name` with `initial_size` zero bytes.
    fn create(&mut self, name: &str, initial_size: u32) -> bool;
    /// Remove `name`.
    fn remove(&mut self, name: &str) -> bool;
}
