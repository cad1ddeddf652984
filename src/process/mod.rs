//! User Process State
//!
//! The parts of a process the system call layer owns: its open files, its
//! address space and mappings, and the status records linking it to its
//! parent and children. Scheduling and thread mechanics stay with the
//! embedding kernel.
//!
//! # Ownership
//! - File handles and mappings belong to exactly one process and are never
//!   shared
//! - Termination releases all of them (writing back dirty mappings) before
//!   the process's storage is reclaimed

mod child;
pub mod fd;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{info, warn};

use crate::fs::FilesysLock;
use crate::mm::{AddressSpace, VirtAddr};

pub use child::ChildStatus;
pub use fd::{Fd, FdTable, FileHandle, FIRST_FD, STDIN_FILENO, STDOUT_FILENO};

/// Process identifier.
pub type Pid = i32;

/// The kernel-side state of one user process.
#[derive(Debug)]
pub struct Process {
    pub(crate) pid: Pid,
    pub(crate) name: String,
    pub(crate) files: FdTable,
    pub(crate) space: AddressSpace,
    pub(crate) children: Vec<Arc<ChildStatus>>,
    pub(crate) parent: Option<Arc<ChildStatus>>,
    /// User stack pointer saved at the most recent trap.
    pub(crate) user_sp: VirtAddr,
}

impl Process {
    /// Create a process with an empty address space.
    ///
    /// `parent` is the status record shared with the parent, if any.
    pub fn new(pid: Pid, name: &str, parent: Option<Arc<ChildStatus>>) -> Self {
        Self {
            pid,
            name: String::from(name),
            files: FdTable::new(pid),
            space: AddressSpace::new(),
            children: Vec::new(),
            parent,
            user_sp: VirtAddr::NULL,
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn files(&self) -> &FdTable {
        &self.files
    }

    #[inline]
    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    #[inline]
    pub fn space_mut(&mut self) -> &mut AddressSpace {
        &mut self.space
    }

    #[inline]
    pub fn user_sp(&self) -> VirtAddr {
        self.user_sp
    }

    /// Track a newly created child.
    pub fn adopt(&mut self, child: Arc<ChildStatus>) {
        self.children.push(child);
    }

    /// Wait for child `pid` to exit and return its status.
    ///
    /// Returns -1 if `pid` is not a child of this process or was already
    /// waited for. The child record is consumed.
    pub fn wait_child(&mut self, pid: Pid) -> i32 {
        let index = match self.children.iter().position(|c| c.pid() == pid) {
            Some(index) => index,
            None => return -1,
        };
        let child = self.children.remove(index);
        child.wait_exit()
    }

    /// Release everything the process owns and publish its exit status.
    ///
    /// Files are closed under the filesystem lock and mappings are written
    /// back. Children are detached so their later exits are not recorded.
    /// The status is published last: a parent woken by it sees every
    /// written-back page.
    pub fn terminate(&mut self, fs: &FilesysLock, code: i32) {
        info!("[PROCESS] {}: exit({})", self.name, code);

        for handle in self.files.drain() {
            fs.close(handle.into_file());
        }

        if let Err(err) = self.space.release(fs) {
            warn!("[PROCESS] {}: mapping teardown incomplete: {}", self.name, err);
        }

        for child in self.children.drain(..) {
            child.detach();
        }

        if let Some(parent) = self.parent.take() {
            parent.record_exit(code);
        }
    }
}
