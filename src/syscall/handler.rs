//! System Call Dispatcher
//!
//! Decodes the call number and its arguments from the user stack and routes
//! to the handler families.
//!
//! # Security Considerations
//! - The call number word is validated before it is read
//! - Unknown call numbers terminate the caller
//! - Argument words are validated and decoded in one place, driven by each
//!   call's declared signature
//! - A handler never sees an unchecked pointer: pointer arguments are
//!   validated by the handler before any dereference

use log::{trace, warn};

use super::frame::SyscallFrame;
use super::numbers::{ArgKind, SyscallNumber};
use super::validate::{BadAccess, UserMemory};
use super::{file, memory, process};
use crate::drivers::ConsoleLock;
use crate::fs::FilesysLock;
use crate::kernel::ProcessHost;
use crate::mm::{VirtAddr, DEMAND_PAGING};
use crate::process::Process;

/// Most arguments any call takes.
const MAX_ARGS: usize = 3;

/// Width of the call number word.
const CALL_WORD: usize = 4;

/// Why a system call does not return to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exits with this status.
    Exit(i32),
    /// The machine powers off.
    Halt,
}

impl From<BadAccess> for Termination {
    fn from(err: BadAccess) -> Self {
        warn!("[SYSCALL] bad user access: {}", err);
        Self::Exit(-1)
    }
}

/// Result of a handler: the value for the result register, or termination.
pub(crate) type SysResult = Result<i32, Termination>;

/// Everything a handler may touch while serving one call.
pub struct SyscallContext<'a> {
    pub(crate) proc: &'a mut Process,
    pub(crate) filesys: &'a FilesysLock,
    pub(crate) console: &'a ConsoleLock,
    pub(crate) host: &'a dyn ProcessHost,
}

impl<'a> SyscallContext<'a> {
    pub fn new(
        proc: &'a mut Process,
        filesys: &'a FilesysLock,
        console: &'a ConsoleLock,
        host: &'a dyn ProcessHost,
    ) -> Self {
        Self {
            proc,
            filesys,
            console,
            host,
        }
    }

    /// The caller's memory, behind the validator.
    pub(crate) fn user(&mut self) -> UserMemory<'_> {
        UserMemory::new(&mut self.proc.space, self.filesys, self.proc.user_sp)
    }
}

/// Decoded argument words of one call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Args {
    call: SyscallNumber,
    words: [u32; MAX_ARGS],
}

impl Args {
    /// Validate and read the argument words above the call number.
    fn decode(user: &mut UserMemory<'_>, esp: VirtAddr, call: SyscallNumber) -> Result<Self, BadAccess> {
        let mut words = [0u32; MAX_ARGS];
        let bytes = call.arg_bytes();
        if bytes > 0 {
            let base = esp.checked_add(CALL_WORD).ok_or(BadAccess::Overflow)?;
            let buf = user.readable(base, bytes)?;
            let raw = user.copy_in(&buf)?;

            let mut offset = 0;
            for (word, kind) in words.iter_mut().zip(call.signature()) {
                *word = read_word(&raw[offset..offset + kind.width()]);
                offset += kind.width();
            }
        }
        Ok(Self { call, words })
    }

    fn word(&self, index: usize, kind: ArgKind) -> u32 {
        debug_assert_eq!(self.call.signature().get(index), Some(&kind));
        self.words[index]
    }

    pub(crate) fn int(&self, index: usize) -> i32 {
        self.word(index, ArgKind::Int) as i32
    }

    pub(crate) fn uint(&self, index: usize) -> u32 {
        self.word(index, ArgKind::Uint)
    }

    pub(crate) fn ptr(&self, index: usize) -> VirtAddr {
        VirtAddr::from_word(self.word(index, ArgKind::Ptr))
    }
}

fn read_word(bytes: &[u8]) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(word)
}

/// Dispatch one system call.
///
/// On return the result, if the call produces one, is in `frame`. An `Err`
/// means the caller must not resume; the kernel finishes the termination.
pub fn dispatch(ctx: &mut SyscallContext<'_>, frame: &mut SyscallFrame) -> Result<(), Termination> {
    let esp = frame.stack_pointer();
    ctx.proc.user_sp = esp;

    let raw = {
        let mut user = ctx.user();
        let buf = user.readable(esp, CALL_WORD)?;
        read_word(&user.copy_in(&buf)?)
    };
    let call = match SyscallNumber::from_raw(raw) {
        Some(call) => call,
        None => {
            warn!("[SYSCALL] {}: unknown syscall {}", ctx.proc.name, raw);
            return Err(Termination::Exit(-1));
        }
    };
    let args = Args::decode(&mut ctx.user(), esp, call)?;
    trace!("[SYSCALL] {}: {} {:?}", ctx.proc.name, call.name(), &args.words[..call.signature().len()]);

    let result = match call {
        SyscallNumber::Halt => return Err(Termination::Halt),
        SyscallNumber::Exit => return Err(Termination::Exit(args.int(0))),
        SyscallNumber::Exec => process::exec(ctx, args.ptr(0))?,
        SyscallNumber::Wait => process::wait(ctx, args.int(0)),
        SyscallNumber::Create => file::create(ctx, args.ptr(0), args.uint(1))?,
        SyscallNumber::Remove => file::remove(ctx, args.ptr(0))?,
        SyscallNumber::Open => file::open(ctx, args.ptr(0))?,
        SyscallNumber::Filesize => file::filesize(ctx, args.int(0))?,
        SyscallNumber::Read => file::read(ctx, args.int(0), args.ptr(1), args.uint(2))?,
        SyscallNumber::Write => file::write(ctx, args.int(0), args.ptr(1), args.uint(2))?,
        SyscallNumber::Seek => file::seek(ctx, args.int(0), args.uint(1))?,
        SyscallNumber::Tell => file::tell(ctx, args.int(0))?,
        SyscallNumber::Close => file::close(ctx, args.int(0))?,
        // Accepted without demand paging, but nothing is mapped
        SyscallNumber::Mmap | SyscallNumber::Munmap if !DEMAND_PAGING => return Ok(()),
        SyscallNumber::Mmap => memory::mmap(ctx, args.int(0), args.ptr(1)),
        SyscallNumber::Munmap => memory::munmap(ctx, args.int(0)),
    };
    frame.set_result(result);
    Ok(())
}
