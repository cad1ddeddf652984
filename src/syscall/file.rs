//! File and Console Calls
//!
//! `open`, `create`, `remove`, `filesize`, `read`, `write`, `seek`, `tell`
//! and `close`. Descriptor 0 is console input and descriptor 1 console
//! output; every other descriptor names a [`FileHandle`] of the caller.
//!
//! User memory is validated (and lazy pages filled) before the filesystem
//! lock is taken, and data crosses the boundary through kernel buffers.

use alloc::vec;

use log::{debug, warn};

use super::handler::{SysResult, SyscallContext, Termination};
use crate::mm::VirtAddr;
use crate::process::{Fd, FileHandle, Process, STDIN_FILENO, STDOUT_FILENO};

/// Look up a descriptor of the caller, terminating it if none exists.
fn handle<'a>(proc: &'a mut Process, call: &str, fd: Fd) -> Result<&'a mut FileHandle, Termination> {
    let name = &proc.name;
    match proc.files.get_mut(fd) {
        Some(handle) => Ok(handle),
        None => {
            warn!("[SYSCALL] {}: {} on bad fd {}", name, call, fd);
            Err(Termination::Exit(-1))
        }
    }
}

pub(super) fn open(ctx: &mut SyscallContext<'_>, name: VirtAddr) -> SysResult {
    let name = ctx.user().check_string(name)?;
    match ctx.filesys.open(&name) {
        Some(file) => {
            let fd = ctx.proc.files.insert(file);
            debug!("[SYSCALL] {}: open(\"{}\") = {}", ctx.proc.name, name, fd);
            Ok(fd)
        }
        None => Ok(-1),
    }
}

pub(super) fn create(ctx: &mut SyscallContext<'_>, name: VirtAddr, initial_size: u32) -> SysResult {
    let name = ctx.user().check_string(name)?;
    Ok(ctx.filesys.create(&name, initial_size) as i32)
}

pub(super) fn remove(ctx: &mut SyscallContext<'_>, name: VirtAddr) -> SysResult {
    let name = ctx.user().check_string(name)?;
    Ok(ctx.filesys.remove(&name) as i32)
}

pub(super) fn filesize(ctx: &mut SyscallContext<'_>, fd: Fd) -> SysResult {
    let handle = handle(ctx.proc, "filesize", fd)?;
    Ok(ctx.filesys.length(handle.file()) as i32)
}

/// Read up to `size` bytes into the user buffer at `buf`.
pub(super) fn read(ctx: &mut SyscallContext<'_>, fd: Fd, buf: VirtAddr, size: u32) -> SysResult {
    let out = ctx.user().writable(buf, size as usize)?;
    if fd == STDOUT_FILENO {
        warn!("[SYSCALL] {}: read from stdout", ctx.proc.name);
        return Err(Termination::Exit(-1));
    }

    let mut data = vec![0u8; out.len()];
    let count = if fd == STDIN_FILENO {
        ctx.console.read(&mut data);
        data.len()
    } else {
        let handle = handle(ctx.proc, "read", fd)?;
        ctx.filesys.read(handle.file_mut(), &mut data)
    };
    ctx.user().copy_out(&out, &data[..count])?;
    Ok(count as i32)
}

/// Write `size` bytes from the user buffer at `buf`.
pub(super) fn write(ctx: &mut SyscallContext<'_>, fd: Fd, buf: VirtAddr, size: u32) -> SysResult {
    let data = {
        let mut user = ctx.user();
        let input = user.readable(buf, size as usize)?;
        user.copy_in(&input)?
    };
    if fd == STDIN_FILENO {
        warn!("[SYSCALL] {}: write to stdin", ctx.proc.name);
        return Err(Termination::Exit(-1));
    }

    if fd == STDOUT_FILENO {
        ctx.console.write(&data);
        return Ok(data.len() as i32);
    }
    let handle = handle(ctx.proc, "write", fd)?;
    Ok(ctx.filesys.write(handle.file_mut(), &data) as i32)
}

pub(super) fn seek(ctx: &mut SyscallContext<'_>, fd: Fd, position: u32) -> SysResult {
    let handle = handle(ctx.proc, "seek", fd)?;
    ctx.filesys.seek(handle.file_mut(), position);
    Ok(0)
}

pub(super) fn tell(ctx: &mut SyscallContext<'_>, fd: Fd) -> SysResult {
    let handle = handle(ctx.proc, "tell", fd)?;
    Ok(ctx.filesys.tell(handle.file()) as i32)
}

pub(super) fn close(ctx: &mut SyscallContext<'_>, fd: Fd) -> SysResult {
    // Looked up first so a bad fd is reported the same way as elsewhere
    handle(ctx.proc, "close", fd)?;
    if let Some(handle) = ctx.proc.files.remove(fd) {
        ctx.filesys.close(handle.into_file());
    }
    Ok(0)
}
