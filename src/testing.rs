//! In-memory collaborators for unit tests: a filesystem, a console, a
//! process host, and a harness that issues system calls from a fake user
//! stack.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use crate::drivers::{Console, ConsoleLock};
use crate::fs::{File, FileBox, FileSystem, FilesysLock};
use crate::kernel::ProcessHost;
use crate::mm::{VirtAddr, PAGE_SIZE, USER_TOP};
use crate::process::{ChildStatus, Pid, Process};
use crate::syscall::{dispatch, SyscallContext, SyscallFrame, Termination, UserMemory};

type Inode = Arc<Mutex<Vec<u8>>>;

/// A filesystem whose files live in shared byte vectors. Clones share the
/// same files, so a test can inspect what the kernel wrote.
#[derive(Clone, Default)]
pub struct MemFs {
    files: Arc<Mutex<BTreeMap<String, Inode>>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite `name`. Open files see the new contents.
    pub fn insert(&self, name: &str, contents: &[u8]) {
        let mut files = self.files.lock();
        match files.get(name) {
            Some(inode) => *inode.lock() = contents.to_vec(),
            None => {
                files.insert(name.to_string(), Arc::new(Mutex::new(contents.to_vec())));
            }
        }
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().get(name).map(|inode| inode.lock().clone())
    }
}

impl FileSystem for MemFs {
    fn open(&mut self, name: &str) -> Option<FileBox> {
        let inode = self.files.lock().get(name)?.clone();
        Some(Box::new(MemFile { inode, pos: 0 }))
    }

    fn create(&mut self, name: &str, initial_size: u32) -> bool {
        let mut files = self.files.lock();
        if name.is_empty() || files.contains_key(name) {
            return false;
        }
        let inode = Arc::new(Mutex::new(alloc::vec![0u8; initial_size as usize]));
        files.insert(name.to_string(), inode);
        true
    }

    fn remove(&mut self, name: &str) -> bool {
        self.files.lock().remove(name).is_some()
    }
}

/// An open [`MemFs`] file. Writes past the end extend it.
pub struct MemFile {
    inode: Inode,
    pos: u32,
}

impl File for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = self.read_at(buf, self.pos);
        self.pos += n as u32;
        n
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let n = self.write_at(buf, self.pos);
        self.pos += n as u32;
        n
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u32) -> usize {
        let data = self.inode.lock();
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        n
    }

    fn write_at(&mut self, buf: &[u8], offset: u32) -> usize {
        let mut data = self.inode.lock();
        let start = offset as usize;
        if data.len() < start + buf.len() {
            data.resize(start + buf.len(), 0);
        }
        data[start..start + buf.len()].copy_from_slice(buf);
        buf.len()
    }

    fn seek(&mut self, position: u32) {
        self.pos = position;
    }

    fn tell(&self) -> u32 {
        self.pos
    }

    fn length(&self) -> u32 {
        self.inode.lock().len() as u32
    }

    fn reopen(&self) -> Option<FileBox> {
        Some(Box::new(MemFile {
            inode: self.inode.clone(),
            pos: 0,
        }))
    }
}

/// A console with scripted input and captured output.
pub struct FakeConsole {
    input: Arc<Mutex<VecDeque<u8>>>,
    output: Arc<Mutex<Vec<u8>>>,
}

impl FakeConsole {
    pub fn with_input(input: &[u8]) -> Self {
        Self {
            input: Arc::new(Mutex::new(input.iter().copied().collect())),
            output: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to everything written so far.
    pub fn output(&self) -> Arc<Mutex<Vec<u8>>> {
        self.output.clone()
    }

    /// Shared handle to the pending input.
    pub fn input(&self) -> Arc<Mutex<VecDeque<u8>>> {
        self.input.clone()
    }
}

impl Console for FakeConsole {
    fn getc(&mut self) -> u8 {
        // Exhausted input reads as NUL rather than blocking forever
        self.input.lock().pop_front().unwrap_or(0)
    }

    fn putbuf(&mut self, buf: &[u8]) {
        self.output.lock().extend_from_slice(buf);
    }
}

#[derive(Default)]
struct HostState {
    programs: BTreeMap<String, i32>,
    next_pid: Pid,
    refuse: bool,
    last_command: Option<String>,
    powered_off: bool,
}

/// A process host whose children load and exit immediately.
///
/// A program added with [`add_program`](Self::add_program) loads and exits
/// with its preset status; anything else fails to load.
#[derive(Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_program(&self, name: &str, exit_code: i32) {
        self.state.lock().programs.insert(name.to_string(), exit_code);
    }

    /// Make every later `execute` fail to create a process.
    pub fn refuse_spawn(&self) {
        self.state.lock().refuse = true;
    }

    pub fn last_command(&self) -> Option<String> {
        self.state.lock().last_command.clone()
    }

    pub fn powered_off(&self) -> bool {
        self.state.lock().powered_off
    }
}

impl ProcessHost for FakeHost {
    fn execute(&self, cmd_line: &str) -> Option<Arc<ChildStatus>> {
        let mut state = self.state.lock();
        state.last_command = Some(cmd_line.to_string());
        if state.refuse {
            return None;
        }
        state.next_pid += 1;
        let child = Arc::new(ChildStatus::new(100 + state.next_pid));

        let program = cmd_line.split_whitespace().next().unwrap_or("");
        match state.programs.get(program) {
            Some(&code) => {
                child.report_load(true);
                child.record_exit(code);
            }
            None => child.report_load(false),
        }
        Some(child)
    }

    fn power_off(&self) {
        self.state.lock().powered_off = true;
    }
}

/// Numeric form of a user address, as pushed on the user stack.
pub trait Word {
    fn word(self) -> u32;
}

impl Word for VirtAddr {
    fn word(self) -> u32 {
        self.as_usize() as u32
    }
}

/// Base of the harness's scratch data pages.
const DATA_BASE: usize = 0x0804_8000;
/// Scratch data pages mapped by the harness.
const DATA_PAGES: usize = 4;
/// A read-only page mapped by the harness.
const READ_ONLY: usize = 0x0900_0000;

/// A process with a mapped stack and scratch pages, plus every collaborator
/// the system call layer needs.
pub struct Harness {
    pub fs: MemFs,
    pub filesys: FilesysLock,
    pub console: ConsoleLock,
    pub host: FakeHost,
    pub proc: Process,
    input: Arc<Mutex<VecDeque<u8>>>,
    output: Arc<Mutex<Vec<u8>>>,
    next_data: usize,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_input(b"")
    }

    pub fn with_input(input: &[u8]) -> Self {
        let fs = MemFs::new();
        let console = FakeConsole::with_input(input);
        let (input, output) = (console.input(), console.output());

        let mut proc = Process::new(1, "test", None);
        let space = proc.space_mut();
        space.map_anonymous(VirtAddr::new(USER_TOP - PAGE_SIZE), true).unwrap();
        for i in 0..DATA_PAGES {
            space
                .map_anonymous(VirtAddr::new(DATA_BASE + i * PAGE_SIZE), true)
                .unwrap();
        }
        space.map_anonymous(VirtAddr::new(READ_ONLY), false).unwrap();

        Self {
            filesys: FilesysLock::new(Box::new(fs.clone())),
            console: ConsoleLock::new(Box::new(console)),
            fs,
            host: FakeHost::new(),
            proc,
            input,
            output,
            next_data: DATA_BASE,
        }
    }

    /// Pages mapped before the test starts.
    pub fn baseline_pages(&self) -> usize {
        DATA_PAGES + 2
    }

    /// One past the highest stack byte.
    pub fn stack_top(&self) -> VirtAddr {
        VirtAddr::new(USER_TOP)
    }

    /// First unmapped address past the scratch data pages.
    pub fn data_end(&self) -> VirtAddr {
        VirtAddr::new(DATA_BASE + DATA_PAGES * PAGE_SIZE)
    }

    pub fn read_only_page(&self) -> VirtAddr {
        VirtAddr::new(READ_ONLY)
    }

    /// A fresh 256-byte scratch buffer.
    pub fn data(&mut self) -> VirtAddr {
        let addr = VirtAddr::new(self.next_data);
        self.next_data += 256;
        addr
    }

    /// Store `s` NUL-terminated in scratch memory.
    pub fn string(&mut self, s: &str) -> VirtAddr {
        let addr = self.data();
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.poke(addr, &bytes);
        addr
    }

    pub fn poke(&mut self, addr: VirtAddr, bytes: &[u8]) {
        self.proc.space_mut().copy_to_user(addr, bytes).unwrap();
    }

    /// Read user memory, faulting in lazy pages as the kernel would.
    pub fn peek(&mut self, addr: VirtAddr, len: usize) -> Vec<u8> {
        let sp = self.proc.user_sp();
        let mut user = UserMemory::new(self.proc.space_mut(), &self.filesys, sp);
        let buf = user.readable(addr, len).unwrap();
        user.copy_in(&buf).unwrap()
    }

    pub fn console_input(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }

    pub fn console_output(&self) -> Vec<u8> {
        self.output.lock().clone()
    }

    /// Push `words` (call number first) and issue the call.
    pub fn call(&mut self, words: &[u32]) -> Result<i32, Termination> {
        self.call_raw(words, 0)
    }

    /// Like [`call`](Self::call), with the result register preset.
    pub fn call_raw(&mut self, words: &[u32], eax: u32) -> Result<i32, Termination> {
        let esp = VirtAddr::new(USER_TOP - 64);
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.poke(esp, &bytes);
        let mut frame = SyscallFrame::new(esp.word());
        frame.eax = eax;
        self.run(&mut frame)
    }

    /// Issue a call with the stack pointer at `esp`, without pushing.
    pub fn call_at(&mut self, esp: VirtAddr) -> Result<i32, Termination> {
        let mut frame = SyscallFrame::new(esp.word());
        self.run(&mut frame)
    }

    fn run(&mut self, frame: &mut SyscallFrame) -> Result<i32, Termination> {
        let mut ctx = SyscallContext::new(&mut self.proc, &self.filesys, &self.console, &self.host);
        dispatch(&mut ctx, frame)?;
        Ok(frame.result())
    }
}
