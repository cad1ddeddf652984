//! Memory Mapping Calls
//!
//! `mmap` and `munmap`. Both report failure through the result register;
//! neither ever terminates the caller.

use log::debug;

use super::handler::SyscallContext;
use crate::mm::{MapId, VirtAddr, MAP_FAILED};
use crate::process::fd::{is_stdio, Fd};

/// Map the file open as `fd` at `addr`.
pub(super) fn mmap(ctx: &mut SyscallContext<'_>, fd: Fd, addr: VirtAddr) -> i32 {
    if is_stdio(fd) || addr.is_null() || !addr.is_aligned() {
        debug!("[MMAP] {}: mmap({}, {}) rejected", ctx.proc.name, fd, addr);
        return MAP_FAILED;
    }
    let handle = match ctx.proc.files.get(fd) {
        Some(handle) => handle,
        None => {
            debug!("[MMAP] {}: mmap on unknown fd {}", ctx.proc.name, fd);
            return MAP_FAILED;
        }
    };
    match ctx.proc.space.mmap(ctx.filesys, handle.file(), addr) {
        Ok(id) => id.as_i32(),
        Err(err) => {
            debug!("[MMAP] {}: mmap({}, {}) failed: {}", ctx.proc.name, fd, addr, err);
            MAP_FAILED
        }
    }
}

/// Remove mapping `id`, writing back dirty pages. Returns 0, or -1 if the
/// id is unknown or some page could not be released.
pub(super) fn munmap(ctx: &mut SyscallContext<'_>, id: i32) -> i32 {
    match ctx.proc.space.munmap(ctx.filesys, MapId::new(id)) {
        Ok(()) => 0,
        Err(err) => {
            debug!("[MMAP] {}: munmap({}) failed: {}", ctx.proc.name, id, err);
            -1
        }
    }
}
