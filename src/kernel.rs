//! Kernel Entry Points
//!
//! [`Kernel`] holds the state shared by every process (the filesystem lock,
//! the console, and the host that creates processes) and exposes what the
//! embedding kernel's trap and loader code calls into: system calls, page
//! faults, segment loading, and process exit.

use alloc::boxed::Box;
use alloc::sync::Arc;

use log::{info, warn};

use crate::drivers::{Console, ConsoleLock};
use crate::fs::{FileBox, FileSystem, FilesysLock};
use crate::mm::fault::{self, FaultContext, FaultPath};
use crate::mm::VirtAddr;
use crate::process::{ChildStatus, Process};
use crate::syscall::{self, SyscallContext, SyscallFrame, Termination};

/// Process creation and machine control, provided by the embedding kernel.
pub trait ProcessHost: Send + Sync {
    /// Create a process running `cmd_line`.
    ///
    /// Returns the status record shared with the new child, on which the
    /// child reports its load outcome and later its exit status. `None` if
    /// no process could be created.
    ///
    /// Called with the filesystem lock held, which is not reentrant. This
    /// must only create the process; loading the executable belongs on the
    /// child's own path, after `execute` has returned.
    fn execute(&self, cmd_line: &str) -> Option<Arc<ChildStatus>>;

    /// Power the machine off.
    fn power_off(&self);
}

/// What the trap handler does after a system call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Return to the process; the result is in the frame.
    Resume,
    /// The process has been torn down with this status.
    Exited(i32),
    /// The machine is powering off.
    Halted,
}

/// Kernel-wide state for the user program layer.
pub struct Kernel {
    filesys: FilesysLock,
    console: ConsoleLock,
    host: Box<dyn ProcessHost>,
}

impl Kernel {
    pub fn new(fs: Box<dyn FileSystem>, console: Box<dyn Console>, host: Box<dyn ProcessHost>) -> Self {
        Self {
            filesys: FilesysLock::new(fs),
            console: ConsoleLock::new(console),
            host,
        }
    }

    #[inline]
    pub fn filesys(&self) -> &FilesysLock {
        &self.filesys
    }

    #[inline]
    pub fn console(&self) -> &ConsoleLock {
        &self.console
    }

    /// Handle a system call trap from `proc`.
    ///
    /// A terminating call releases everything the process owns before this
    /// returns; the caller then only has to stop scheduling it.
    pub fn syscall(&self, proc: &mut Process, frame: &mut SyscallFrame) -> Flow {
        let mut ctx = SyscallContext::new(proc, &self.filesys, &self.console, self.host.as_ref());
        match syscall::dispatch(&mut ctx, frame) {
            Ok(()) => Flow::Resume,
            Err(Termination::Exit(code)) => {
                self.exit(proc, code);
                Flow::Exited(code)
            }
            Err(Termination::Halt) => {
                info!("[SYSCALL] {}: halt", proc.name());
                self.host.power_off();
                Flow::Halted
            }
        }
    }

    /// Handle a user page fault. `esp` is the user stack pointer saved by
    /// the faulting trap.
    ///
    /// Returns false if the access is invalid, in which case the caller
    /// should [`exit`](Self::exit) the process with -1.
    pub fn page_fault(&self, proc: &mut Process, addr: VirtAddr, write: bool, esp: VirtAddr) -> bool {
        let fault = FaultContext {
            addr,
            write,
            user_sp: esp,
        };
        if !addr.is_user() {
            warn!("[FAULT] {}: kernel address {}", proc.name(), addr);
            return false;
        }
        fault::Active::resolve(proc.space_mut(), &self.filesys, fault)
    }

    /// Map one executable segment of `proc` for the loader.
    ///
    /// `file` is an independently opened handle to the executable; the
    /// segment keeps it for as long as it exists.
    #[allow(clippy::too_many_arguments)]
    pub fn load_segment(
        &self,
        proc: &mut Process,
        file: FileBox,
        offset: u32,
        upage: VirtAddr,
        read_bytes: u32,
        zero_bytes: u32,
        writable: bool,
    ) -> bool {
        match proc
            .space_mut()
            .load_segment(&self.filesys, file, offset, upage, read_bytes, zero_bytes, writable)
        {
            Ok(_) => true,
            Err(err) => {
                warn!("[MMAP] {}: segment at {} not loaded: {}", proc.name(), upage, err);
                false
            }
        }
    }

    /// Terminate `proc` with `code`, releasing its files and mappings.
    pub fn exit(&self, proc: &mut Process, code: i32) {
        proc.terminate(&self.filesys, code);
    }
}
