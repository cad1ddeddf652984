//! Process Calls
//!
//! `exec` and `wait`. `halt` and `exit` never return to the caller and are
//! resolved by the dispatcher.

use log::{debug, info};

use super::handler::{SysResult, SyscallContext};
use crate::mm::VirtAddr;
use crate::process::Pid;

/// Start a child from `cmd_line` and wait until it has tried to load.
///
/// Returns the child's pid, or -1 if it could not be created or its
/// executable failed to load. A child that failed to load is never
/// tracked, so nothing is left for `wait`.
pub(super) fn exec(ctx: &mut SyscallContext<'_>, cmd_line: VirtAddr) -> SysResult {
    let cmd_line = ctx.user().check_string(cmd_line)?;

    let host = ctx.host;
    let child = match ctx.filesys.serialize(|| host.execute(&cmd_line)) {
        Some(child) => child,
        None => {
            debug!("[PROCESS] {}: exec(\"{}\") could not start", ctx.proc.name, cmd_line);
            return Ok(-1);
        }
    };

    // Blocks without the filesystem lock; the child needs it to load
    if !child.wait_loaded() {
        debug!("[PROCESS] {}: exec(\"{}\") failed to load", ctx.proc.name, cmd_line);
        return Ok(-1);
    }

    let pid = child.pid();
    info!("[PROCESS] {}: exec(\"{}\") = {}", ctx.proc.name, cmd_line, pid);
    ctx.proc.adopt(child);
    Ok(pid)
}

pub(super) fn wait(ctx: &mut SyscallContext<'_>, pid: Pid) -> i32 {
    ctx.proc.wait_child(pid)
}
