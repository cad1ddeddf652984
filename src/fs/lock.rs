//! Filesystem Serialization Lock
//!
//! One spinlock guards the whole backing filesystem. Each method acquires
//! the lock for exactly one filesystem operation and releases it when the
//! guard drops, so no exit path (error return or process termination) can
//! leave it held.
//!
//! The lock is never held across user memory validation: a page fault fill
//! takes the lock itself, and `spin::Mutex` is not reentrant.

use alloc::boxed::Box;

use spin::Mutex;

use super::{File, FileBox, FileSystem};

/// Process-wide lock around the non-reentrant backing filesystem.
pub struct FilesysLock {
    fs: Mutex<Box<dyn FileSystem>>,
}

impl FilesysLock {
    /// Wrap the backing filesystem.
    pub fn new(fs: Box<dyn FileSystem>) -> Self {
        Self { fs: Mutex::new(fs) }
    }

    /// Run `op` with the filesystem held.
    ///
    /// Used for collaborator calls (process creation) that load from the
    /// filesystem internally.
    pub fn serialize<R>(&self, op: impl FnOnce() -> R) -> R {
        let _held = self.fs.lock();
        op()
    }

    pub fn open(&self, name: &str) -> Option<FileBox> {
        self.fs.lock().open(name)
    }

    pub fn create(&self, name: &str, initial_size: u32) -> bool {
        self.fs.lock().create(name, initial_size)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.fs.lock().remove(name)
    }

    /// Close `file`, releasing it while the filesystem is held.
    pub fn close(&self, file: FileBox) {
        let _held = self.fs.lock();
        drop(file);
    }

    pub fn reopen(&self, file: &dyn File) -> Option<FileBox> {
        let _held = self.fs.lock();
        file.reopen()
    }

    pub fn length(&self, file: &dyn File) -> u32 {
        let _held = self.fs.lock();
        file.length()
    }

    pub fn read(&self, file: &mut dyn File, buf: &mut [u8]) -> usize {
        let _held = self.fs.lock();
        file.read(buf)
    }

    pub fn write(&self, file: &mut dyn File, buf: &[u8]) -> usize {
        let _held = self.fs.lock();
        file.write(buf)
    }

    pub fn read_at(&self, file: &mut dyn File, buf: &mut [u8], offset: u32) -> usize {
        let _held = self.fs.lock();
        file.read_at(buf, offset)
    }

    pub fn write_at(&self, file: &mut dyn File, buf: &[u8], offset: u32) -> usize {
        let _held = self.fs.lock();
        file.write_at(buf, offset)
    }

    pub fn seek(&self, file: &mut dyn File, position: u32) {
        let _held = self.fs.lock();
        file.seek(position);
    }

    pub fn tell(&self, file: &dyn File) -> u32 {
        let _held = self.fs.lock();
        file.tell()
    }

    /// Check if the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.fs.is_locked()
    }
}
