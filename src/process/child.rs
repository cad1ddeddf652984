//! Parent/Child Status Records
//!
//! A [`ChildStatus`] is shared between a parent and one child. The child
//! (or whoever loads it) reports whether its executable loaded and, later,
//! its exit status; the parent blocks on either.
//!
//! Both reports are one-shot `spin::Once` cells, so a report can never be
//! overwritten and a waiter never misses one that already happened.

use core::sync::atomic::{AtomicBool, Ordering};

use spin::Once;

use super::Pid;

/// Shared record linking a parent to one child.
#[derive(Debug)]
pub struct ChildStatus {
    pid: Pid,
    loaded: Once<bool>,
    exit_code: Once<i32>,
    parent_detached: AtomicBool,
}

impl ChildStatus {
    pub const fn new(pid: Pid) -> Self {
        Self {
            pid,
            loaded: Once::new(),
            exit_code: Once::new(),
            parent_detached: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Report the outcome of loading the child's executable.
    pub fn report_load(&self, success: bool) {
        self.loaded.call_once(|| success);
    }

    /// Block until the child has tried to load; true if it succeeded.
    pub fn wait_loaded(&self) -> bool {
        *self.loaded.wait()
    }

    /// Record the child's exit status unless the parent is gone.
    pub fn record_exit(&self, code: i32) {
        if self.parent_detached.load(Ordering::Acquire) {
            return;
        }
        self.exit_code.call_once(|| code);
    }

    /// Block until the child has exited and return its status.
    pub fn wait_exit(&self) -> i32 {
        *self.exit_code.wait()
    }

    /// The exit status, if the child has exited.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code.get().copied()
    }

    /// Mark the parent as gone; later exits are not recorded.
    pub fn detach(&self) {
        self.parent_detached.store(true, Ordering::Release);
    }

    pub fn is_detached(&self) -> bool {
        self.parent_detached.load(Ordering::Acquire)
    }
}
