//! File Descriptor Table
//!
//! Per-process ordered list of open files. Descriptors 0 and 1 are the
//! console and never name a table entry.
//!
//! # Design
//! - Ids come from a per-process counter starting at [`FIRST_FD`]
//! - Ids are never reused within a process, so a stale descriptor can only
//!   miss, never alias a newer file

use alloc::vec::Vec;

use crate::fs::{File, FileBox};

use super::Pid;

/// A file descriptor as seen by user mode.
pub type Fd = i32;

/// Console input.
pub const STDIN_FILENO: Fd = 0;
/// Console output.
pub const STDOUT_FILENO: Fd = 1;
/// First descriptor handed out by `open`.
pub const FIRST_FD: Fd = 2;

/// Check if `fd` names one of the console streams.
#[inline]
pub const fn is_stdio(fd: Fd) -> bool {
    fd == STDIN_FILENO || fd == STDOUT_FILENO
}

/// An open file owned by one process.
pub struct FileHandle {
    fd: Fd,
    owner: Pid,
    file: FileBox,
}

impl FileHandle {
    #[inline]
    pub fn fd(&self) -> Fd {
        self.fd
    }

    #[inline]
    pub fn owner(&self) -> Pid {
        self.owner
    }

    #[inline]
    pub fn file(&self) -> &dyn File {
        self.file.as_ref()
    }

    #[inline]
    pub fn file_mut(&mut self) -> &mut dyn File {
        self.file.as_mut()
    }

    /// Give up the file so it can be closed under the filesystem lock.
    pub fn into_file(self) -> FileBox {
        self.file
    }
}

impl core::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "FileHandle(fd={}, owner={})", self.fd, self.owner)
    }
}

/// The open files of one process.
#[derive(Debug)]
pub struct FdTable {
    owner: Pid,
    handles: Vec<FileHandle>,
    next_fd: Fd,
}

impl FdTable {
    pub const fn new(owner: Pid) -> Self {
        Self {
            owner,
            handles: Vec::new(),
            next_fd: FIRST_FD,
        }
    }

    /// Take ownership of `file` and return its new descriptor.
    pub fn insert(&mut self, file: FileBox) -> Fd {
        let fd = self.next_fd;
        self.next_fd += 1;
        self.handles.push(FileHandle {
            fd,
            owner: self.owner,
            file,
        });
        fd
    }

    pub fn get(&self, fd: Fd) -> Option<&FileHandle> {
        self.handles.iter().find(|h| h.fd == fd)
    }

    pub fn get_mut(&mut self, fd: Fd) -> Option<&mut FileHandle> {
        self.handles.iter_mut().find(|h| h.fd == fd)
    }

    /// Remove and return the handle for `fd`.
    pub fn remove(&mut self, fd: Fd) -> Option<FileHandle> {
        let index = self.handles.iter().position(|h| h.fd == fd)?;
        Some(self.handles.remove(index))
    }

    /// Remove every handle, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = FileHandle> + '_ {
        self.handles.drain(..)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
