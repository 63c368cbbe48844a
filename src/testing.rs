//! In-memory collaborators for host tests.
//!
//! Kernel threads are std threads; blocking is `park`/`unpark`. User
//! programs are closures driving a [`UserProgram`], which lays out a small
//! address space and issues syscalls by writing the number and argument
//! words onto its user stack, exactly as the trap would find them.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

use crate::config::KernelConfig;
use crate::drivers::Console;
use crate::fs::{FileSystem, OpenFile};
use crate::kernel::Kernel;
use crate::mm::{pages_spanned, AddressSpace, PageFlags, VirtAddr, PAGE_SIZE, PHYS_BASE, USER_IMAGE_BASE};
use crate::process::{program_name, Loader, Pid, Process, Scheduler, SpawnRequest};
use crate::syscall::numbers::*;
use crate::syscall::{Control, SyscallFrame};

// ---------------------------------------------------------------------------
// Address space

struct Page {
    flags: PageFlags,
    data: Vec<u8>,
}

/// Page-granular fake page tables with backing memory.
///
/// Clones share the same pages, so a test can keep a handle while the
/// process owns another.
#[derive(Clone, Default)]
pub struct MockSpace {
    pages: Arc<Mutex<BTreeMap<usize, Page>>>,
    largest_access: Arc<AtomicUsize>,
}

impl MockSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map every page touched by `[start, start + len)`.
    pub fn map(&self, start: VirtAddr, len: usize, flags: PageFlags) {
        let mut pages = self.pages.lock().unwrap();
        for page in pages_spanned(start, len).unwrap() {
            pages.insert(
                page.page_number(),
                Page {
                    flags,
                    data: vec![0; PAGE_SIZE],
                },
            );
        }
    }

    pub fn unmap(&self, page: VirtAddr) {
        self.pages.lock().unwrap().remove(&page.page_number());
    }

    /// Write bytes regardless of permissions. Panics on unmapped memory.
    pub fn poke(&self, addr: VirtAddr, bytes: &[u8]) {
        let mut pages = self.pages.lock().unwrap();
        for (i, byte) in bytes.iter().enumerate() {
            let at = VirtAddr::new(addr.as_usize() + i);
            let page = pages.get_mut(&at.page_number()).expect("poke into unmapped page");
            page.data[at.page_offset()] = *byte;
        }
    }

    pub fn poke_words(&self, addr: VirtAddr, words: &[u32]) {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.poke(addr, &bytes);
    }

    /// Read bytes regardless of permissions. Panics on unmapped memory.
    pub fn peek(&self, addr: VirtAddr, len: usize) -> Vec<u8> {
        let pages = self.pages.lock().unwrap();
        (0..len)
            .map(|i| {
                let at = VirtAddr::new(addr.as_usize() + i);
                let page = pages.get(&at.page_number()).expect("peek at unmapped page");
                page.data[at.page_offset()]
            })
            .collect()
    }

    /// Longest single `read`/`write` the kernel has issued.
    pub fn largest_access(&self) -> usize {
        self.largest_access.load(Ordering::SeqCst)
    }

    /// Number of live handles on these page tables.
    pub fn owners(&self) -> usize {
        Arc::strong_count(&self.pages)
    }
}

impl AddressSpace for MockSpace {
    fn page_flags(&self, page: VirtAddr) -> Option<PageFlags> {
        self.pages
            .lock()
            .unwrap()
            .get(&page.page_number())
            .map(|page| page.flags)
    }

    fn read(&self, addr: VirtAddr, dst: &mut [u8]) {
        self.largest_access.fetch_max(dst.len(), Ordering::SeqCst);
        dst.copy_from_slice(&self.peek(addr, dst.len()));
    }

    fn write(&self, addr: VirtAddr, src: &[u8]) {
        self.largest_access.fetch_max(src.len(), Ordering::SeqCst);
        self.poke(addr, src);
    }
}

// ---------------------------------------------------------------------------
// File system

#[derive(Default)]
struct MemFsInner {
    files: Mutex<HashMap<String, Arc<Mutex<Vec<u8>>>>>,
    open: AtomicUsize,
    in_transfer: AtomicUsize,
    max_in_transfer: AtomicUsize,
    largest_transfer: AtomicUsize,
    slow: AtomicBool,
}

/// In-memory storage engine that records overlapping data transfers.
#[derive(Clone, Default)]
pub struct MemFs {
    inner: Arc<MemFsInner>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<B: AsRef<[u8]>>(files: &[(&str, B)]) -> Self {
        let fs = Self::new();
        for (name, contents) in files {
            fs.put(name, contents.as_ref());
        }
        fs
    }

    pub fn put(&self, name: &str, contents: &[u8]) {
        self.inner
            .files
            .lock()
            .unwrap()
            .insert(name.into(), Arc::new(Mutex::new(contents.to_vec())));
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        let files = self.inner.files.lock().unwrap();
        files.get(name).map(|data| data.lock().unwrap().clone())
    }

    /// Handles opened and not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Largest number of reads/writes ever in progress at once.
    pub fn max_concurrent_transfers(&self) -> usize {
        self.inner.max_in_transfer.load(Ordering::SeqCst)
    }

    /// Longest single read/write handed to a file.
    pub fn largest_transfer(&self) -> usize {
        self.inner.largest_transfer.load(Ordering::SeqCst)
    }

    /// Stretch every transfer so overlaps become likely.
    pub fn set_slow(&self, slow: bool) {
        self.inner.slow.store(slow, Ordering::SeqCst);
    }
}

impl FileSystem for MemFs {
    fn open(&self, path: &str) -> Option<Box<dyn OpenFile>> {
        let data = self.inner.files.lock().unwrap().get(path).cloned()?;
        self.inner.open.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(MemFile {
            data,
            pos: 0,
            fs: Arc::clone(&self.inner),
        }))
    }

    fn create(&self, path: &str, initial_size: u32) -> bool {
        let mut files = self.inner.files.lock().unwrap();
        if files.contains_key(path) {
            return false;
        }
        files.insert(path.into(), Arc::new(Mutex::new(vec![0; initial_size as usize])));
        true
    }

    fn remove(&self, path: &str) -> bool {
        self.inner.files.lock().unwrap().remove(path).is_some()
    }
}

struct MemFile {
    data: Arc<Mutex<Vec<u8>>>,
    pos: u32,
    fs: Arc<MemFsInner>,
}

struct Transfer<'a>(&'a MemFsInner);

impl<'a> Transfer<'a> {
    fn begin(fs: &'a MemFsInner, len: usize) -> Self {
        fs.largest_transfer.fetch_max(len, Ordering::SeqCst);
        let now = fs.in_transfer.fetch_add(1, Ordering::SeqCst) + 1;
        fs.max_in_transfer.fetch_max(now, Ordering::SeqCst);
        if fs.slow.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_micros(200));
        }
        Self(fs)
    }
}

impl Drop for Transfer<'_> {
    fn drop(&mut self) {
        self.0.in_transfer.fetch_sub(1, Ordering::SeqCst);
    }
}

impl OpenFile for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let _transfer = Transfer::begin(&self.fs, buf.len());
        let data = self.data.lock().unwrap();
        let start = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u32;
        n
    }

    fn write(&mut self, buf: &[u8]) -> usize {
        let _transfer = Transfer::begin(&self.fs, buf.len());
        let mut data = self.data.lock().unwrap();
        let start = self.pos as usize;
        if data.len() < start + buf.len() {
            data.resize(start + buf.len(), 0);
        }
        data[start..start + buf.len()].copy_from_slice(buf);
        self.pos += buf.len() as u32;
        buf.len()
    }

    fn seek(&mut self, position: u32) {
        self.pos = position;
    }

    fn tell(&self) -> u32 {
        self.pos
    }

    fn length(&self) -> u32 {
        self.data.lock().unwrap().len() as u32
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        self.fs.open.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Console

#[derive(Default)]
struct ConsoleState {
    output: Vec<u8>,
    bursts: Vec<usize>,
    input: VecDeque<u8>,
}

/// Console that records every burst and replays scripted keyboard input.
#[derive(Clone, Default)]
pub struct RecordingConsole {
    state: Arc<Mutex<ConsoleState>>,
}

impl RecordingConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: &[u8]) -> Self {
        let console = Self::new();
        console.state.lock().unwrap().input.extend(input);
        console
    }

    pub fn output(&self) -> Vec<u8> {
        self.state.lock().unwrap().output.clone()
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output()).into_owned()
    }

    pub fn bursts(&self) -> Vec<usize> {
        self.state.lock().unwrap().bursts.clone()
    }
}

impl Console for RecordingConsole {
    fn put_bytes(&self, bytes: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.output.extend_from_slice(bytes);
        state.bursts.push(bytes.len());
    }

    fn get_byte(&self) -> u8 {
        self.state.lock().unwrap().input.pop_front().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Scheduler

static NEXT_TID: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static TID: Cell<Option<Pid>> = const { Cell::new(None) };
}

/// One std thread per kernel thread; identifiers are handed out on first
/// use.
#[derive(Clone, Default)]
pub struct ThreadScheduler {
    threads: Arc<Mutex<HashMap<Pid, Thread>>>,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for ThreadScheduler {
    fn current(&self) -> Pid {
        let pid = TID.with(|tid| match tid.get() {
            Some(pid) => pid,
            None => {
                let pid = Pid::new(NEXT_TID.fetch_add(1, Ordering::SeqCst));
                tid.set(Some(pid));
                pid
            }
        });
        self.threads
            .lock()
            .unwrap()
            .entry(pid)
            .or_insert_with(thread::current);
        pid
    }

    fn block(&self) {
        thread::park();
    }

    fn unblock(&self, pid: Pid) {
        if let Some(thread) = self.threads.lock().unwrap().get(&pid) {
            thread.unpark();
        }
    }
}

// ---------------------------------------------------------------------------
// Loader and user programs

/// A scripted user program; the return value is its `main` result.
pub type Program = Arc<dyn Fn(&mut UserProgram) -> i32 + Send + Sync>;

/// Closed while held; loads wait at it until released.
#[derive(Default)]
struct Latch {
    held: Mutex<bool>,
    opened: Condvar,
}

impl Latch {
    fn set(&self, held: bool) {
        *self.held.lock().unwrap() = held;
        if !held {
            self.opened.notify_all();
        }
    }

    fn pass(&self) {
        let mut held = self.held.lock().unwrap();
        while *held {
            held = self.opened.wait(held).unwrap();
        }
    }
}

#[derive(Default)]
struct LoaderInner {
    programs: Mutex<HashMap<String, Program>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    refuse: AtomicBool,
    loads: Latch,
}

/// Runs each spawned program on its own std thread.
#[derive(Clone, Default)]
pub struct ScriptLoader {
    inner: Arc<LoaderInner>,
}

impl ScriptLoader {
    pub fn install<F>(&self, name: &str, program: F)
    where
        F: Fn(&mut UserProgram) -> i32 + Send + Sync + 'static,
    {
        self.inner
            .programs
            .lock()
            .unwrap()
            .insert(name.into(), Arc::new(program));
    }

    /// Make `spawn` fail as if no thread could be created.
    pub fn refuse_threads(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Stall every load, successful or not, until `release_loads`.
    pub fn hold_loads(&self) {
        self.inner.loads.set(true);
    }

    pub fn release_loads(&self) {
        self.inner.loads.set(false);
    }

    pub fn join_all(&self) {
        loop {
            let handle = self.inner.threads.lock().unwrap().pop();
            match handle {
                Some(handle) => handle.join().unwrap(),
                None => break,
            }
        }
    }
}

impl Loader for ScriptLoader {
    fn spawn(&self, kernel: Arc<Kernel>, request: SpawnRequest) -> bool {
        if self.inner.refuse.load(Ordering::SeqCst) {
            return false;
        }
        let program = self
            .inner
            .programs
            .lock()
            .unwrap()
            .get(program_name(&request.cmdline))
            .cloned();

        let inner = Arc::clone(&self.inner);
        let handle = thread::spawn(move || {
            let space = MockSpace::new();
            let process = kernel.start_process(Some(request.parent), &request.cmdline, || {
                inner.loads.pass();
                program.as_ref()?;
                UserProgram::layout(&space);
                Some(Box::new(space.clone()) as Box<dyn AddressSpace>)
            });
            if let (Some(process), Some(program)) = (process, program) {
                let mut user = UserProgram::new(kernel, process, space);
                let status = program(&mut user);
                user.finish(status);
            }
        });
        self.inner.threads.lock().unwrap().push(handle);
        true
    }
}

/// Read-only image page.
pub const CODE_BASE: usize = USER_IMAGE_BASE;
/// Read/write data area used for strings and buffers.
pub const DATA_BASE: usize = 0x1000_0000;
pub const DATA_PAGES: usize = 4;
/// One stack page just below `PHYS_BASE`.
pub const STACK_PAGE: usize = PHYS_BASE - PAGE_SIZE;
/// Where syscall frames are written.
pub const TRAP_ESP: usize = PHYS_BASE - 64;

/// A running user process driven from test code.
pub struct UserProgram {
    kernel: Arc<Kernel>,
    process: Process,
    space: MockSpace,
    heap: usize,
    exited: Option<i32>,
    halted: bool,
}

impl UserProgram {
    pub fn layout(space: &MockSpace) {
        space.map(VirtAddr::new(CODE_BASE), PAGE_SIZE, PageFlags::USER_RO);
        space.map(VirtAddr::new(DATA_BASE), DATA_PAGES * PAGE_SIZE, PageFlags::USER_RW);
        space.map(VirtAddr::new(STACK_PAGE), PAGE_SIZE, PageFlags::USER_RW);
    }

    pub fn new(kernel: Arc<Kernel>, process: Process, space: MockSpace) -> Self {
        Self {
            kernel,
            process,
            space,
            heap: DATA_BASE,
            exited: None,
            halted: false,
        }
    }

    pub fn pid(&self) -> Pid {
        self.process.pid()
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    pub fn space(&self) -> &MockSpace {
        &self.space
    }

    pub fn exited(&self) -> Option<i32> {
        self.exited
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Reserve `len` bytes in the data area.
    pub fn alloc(&mut self, len: usize) -> u32 {
        let at = self.heap;
        self.heap += len;
        assert!(self.heap <= DATA_BASE + DATA_PAGES * PAGE_SIZE, "test data area exhausted");
        at as u32
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> u32 {
        let at = self.alloc(bytes.len());
        self.space.poke(VirtAddr::new(at as usize), bytes);
        at
    }

    /// Store a NUL-terminated string.
    pub fn put_str(&mut self, s: &str) -> u32 {
        let at = self.put_bytes(s.as_bytes());
        self.put_bytes(&[0]);
        at
    }

    pub fn peek(&self, addr: u32, len: usize) -> Vec<u8> {
        self.space.peek(VirtAddr::new(addr as usize), len)
    }

    /// Trap with `number` and `args` on the user stack.
    pub fn syscall(&mut self, number: u32, args: &[u32]) -> i32 {
        let esp = VirtAddr::new(TRAP_ESP);
        let mut words = vec![number];
        words.extend_from_slice(args);
        self.space.poke_words(esp, &words);
        let mut frame = SyscallFrame::new(esp);
        self.trap(&mut frame)
    }

    /// Trap with a caller-built frame.
    pub fn trap(&mut self, frame: &mut SyscallFrame) -> i32 {
        if self.exited.is_some() {
            return -1;
        }
        match self.kernel.syscall(&mut self.process, frame) {
            Control::Resume => frame.ret(),
            Control::Exit(status) => {
                self.exited = Some(status);
                status
            }
            Control::PowerOff => {
                self.halted = true;
                0
            }
        }
    }

    /// Return from `main`: exit with `status` unless already exited.
    pub fn finish(&mut self, status: i32) {
        if self.exited.is_none() && !self.halted {
            self.exit(status);
        }
    }

    pub fn halt(&mut self) {
        self.syscall(SYS_HALT, &[]);
    }

    pub fn exit(&mut self, status: i32) {
        self.syscall(SYS_EXIT, &[status as u32]);
    }

    pub fn exec(&mut self, cmdline: &str) -> i32 {
        let at = self.put_str(cmdline);
        self.syscall(SYS_EXEC, &[at])
    }

    pub fn wait(&mut self, pid: i32) -> i32 {
        self.syscall(SYS_WAIT, &[pid as u32])
    }

    pub fn create(&mut self, path: &str, size: u32) -> bool {
        let at = self.put_str(path);
        self.syscall(SYS_CREATE, &[at, size]) != 0
    }

    pub fn remove(&mut self, path: &str) -> bool {
        let at = self.put_str(path);
        self.syscall(SYS_REMOVE, &[at]) != 0
    }

    pub fn open(&mut self, path: &str) -> i32 {
        let at = self.put_str(path);
        self.syscall(SYS_OPEN, &[at])
    }

    pub fn filesize(&mut self, fd: i32) -> i32 {
        self.syscall(SYS_FILESIZE, &[fd as u32])
    }

    pub fn read(&mut self, fd: i32, buf: u32, len: u32) -> i32 {
        self.syscall(SYS_READ, &[fd as u32, buf, len])
    }

    pub fn write(&mut self, fd: i32, bytes: &[u8]) -> i32 {
        let at = self.put_bytes(bytes);
        self.syscall(SYS_WRITE, &[fd as u32, at, bytes.len() as u32])
    }

    pub fn seek(&mut self, fd: i32, position: u32) {
        self.syscall(SYS_SEEK, &[fd as u32, position]);
    }

    pub fn tell(&mut self, fd: i32) -> u32 {
        self.syscall(SYS_TELL, &[fd as u32]) as u32
    }

    pub fn close(&mut self, fd: i32) {
        self.syscall(SYS_CLOSE, &[fd as u32]);
    }
}

// ---------------------------------------------------------------------------
// Harness

/// A kernel wired to in-memory collaborators.
pub struct Harness {
    pub kernel: Arc<Kernel>,
    pub fs: MemFs,
    pub console: RecordingConsole,
    pub loader: ScriptLoader,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        Self::build(config, MemFs::new(), RecordingConsole::new())
    }

    pub fn build(config: KernelConfig, fs: MemFs, console: RecordingConsole) -> Self {
        let loader = ScriptLoader::default();
        let kernel = Kernel::new(
            config,
            Box::new(fs.clone()),
            Box::new(console.clone()),
            Box::new(ThreadScheduler::new()),
            Box::new(loader.clone()),
        );
        Self {
            kernel,
            fs,
            console,
            loader,
        }
    }

    /// Turn the test thread into a parentless process.
    pub fn root(&self, cmdline: &str) -> UserProgram {
        let space = MockSpace::new();
        UserProgram::layout(&space);
        let handle = space.clone();
        let process = self
            .kernel
            .start_process(None, cmdline, move || Some(Box::new(handle) as Box<dyn AddressSpace>))
            .expect("root process loads");
        UserProgram::new(Arc::clone(&self.kernel), process, space)
    }

    pub fn install<F>(&self, name: &str, program: F)
    where
        F: Fn(&mut UserProgram) -> i32 + Send + Sync + 'static,
    {
        self.loader.install(name, program);
    }
}
