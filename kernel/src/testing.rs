//! In-memory collaborators for the hosted test suite
//!
//! Stand-ins for every platform seam, shared by the unit tests and the
//! lifecycle suite under `tests/`. Each fake is a cheap clone over
//! shared state, so a test keeps an observer handle while the boxed
//! copy lives inside the services. [`Services`] bundles the paging-level
//! collaborators; [`harness`] puts a whole [`ProcessManager`] on top.

use alloc::{
    boxed::Box,
    collections::{BTreeMap, BTreeSet},
    string::String,
    sync::Arc,
    vec,
    vec::Vec,
};
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::{
    error::{KernelError, KernelResult},
    fs::{FileHandle, FileSystem, FsService},
    mm::{
        round_up_to_page, FrameAllocator, FrameNumber, FrameService, MapConflict, Mmu,
        MmuService, PageContext, RootId, SwapDevice, SwapService, SwapSlot, VirtualAddress,
        PAGE_SIZE,
    },
    process::{LoadMode, Pid, Platform, ProcessManager},
    sched::{FatalHook, InitialRegisters, Scheduler, UserMode},
};

// ===========================================================================
// Filesystem
// ===========================================================================

/// Byte-store filesystem keyed by name.
#[derive(Clone, Default)]
pub struct MemFileSystem {
    state: Arc<Mutex<FsState>>,
}

#[derive(Default)]
struct FsState {
    files: BTreeMap<String, Vec<u8>>,
    handles: BTreeMap<u64, OpenFile>,
    next_handle: u64,
}

struct OpenFile {
    name: String,
    denied: bool,
}

impl MemFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a file.
    pub fn insert(&self, name: &str, data: Vec<u8>) {
        self.state.lock().files.insert(String::from(name), data);
    }

    /// Handles currently open.
    pub fn open_handles(&self) -> usize {
        self.state.lock().handles.len()
    }

    /// Whether any open handle on `name` currently rejects writers.
    pub fn write_denied(&self, name: &str) -> bool {
        self.state
            .lock()
            .handles
            .values()
            .any(|open| open.name == name && open.denied)
    }
}

impl FileSystem for MemFileSystem {
    fn open(&mut self, name: &str) -> Option<FileHandle> {
        let mut state = self.state.lock();
        if !state.files.contains_key(name) {
            return None;
        }
        state.next_handle += 1;
        let handle = state.next_handle;
        state.handles.insert(
            handle,
            OpenFile {
                name: String::from(name),
                denied: false,
            },
        );
        Some(FileHandle(handle))
    }

    fn close(&mut self, handle: FileHandle) {
        // The denial dies with the handle.
        self.state.lock().handles.remove(&handle.0);
    }

    fn read_at(&mut self, handle: FileHandle, buf: &mut [u8], offset: u64) -> usize {
        let state = self.state.lock();
        let Some(open) = state.handles.get(&handle.0) else {
            return 0;
        };
        let Some(data) = state.files.get(&open.name) else {
            return 0;
        };
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        n
    }

    fn length(&mut self, handle: FileHandle) -> u64 {
        let state = self.state.lock();
        state
            .handles
            .get(&handle.0)
            .and_then(|open| state.files.get(&open.name))
            .map(|data| data.len() as u64)
            .unwrap_or(0)
    }

    fn deny_write(&mut self, handle: FileHandle) {
        if let Some(open) = self.state.lock().handles.get_mut(&handle.0) {
            open.denied = true;
        }
    }

    fn allow_write(&mut self, handle: FileHandle) {
        if let Some(open) = self.state.lock().handles.get_mut(&handle.0) {
            open.denied = false;
        }
    }
}

// ===========================================================================
// Frames
// ===========================================================================

/// Live-allocation counter that outlives the boxed allocator.
#[derive(Default)]
pub struct FrameStats {
    live: AtomicUsize,
}

impl FrameStats {
    /// Frames currently allocated.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// Bounded frame pool backed by heap pages.
///
/// Frame numbers are never reused, so a stale number held across a free
/// trips the lookup panic instead of silently reading the next tenant.
pub struct MemFrameAllocator {
    frames: BTreeMap<u64, Vec<u8>>,
    next: u64,
    capacity: usize,
    stats: Arc<FrameStats>,
}

impl MemFrameAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: BTreeMap::new(),
            next: 0,
            capacity,
            stats: Arc::new(FrameStats::default()),
        }
    }

    /// Counter handle, valid after the allocator is boxed away.
    pub fn stats(&self) -> Arc<FrameStats> {
        Arc::clone(&self.stats)
    }
}

impl FrameAllocator for MemFrameAllocator {
    fn allocate(&mut self, zeroed: bool) -> Option<FrameNumber> {
        if self.frames.len() >= self.capacity {
            return None;
        }
        self.next += 1;
        // A scribble in unzeroed frames makes missing fills visible.
        let fill = if zeroed { 0x00 } else { 0xCD };
        self.frames.insert(self.next, vec![fill; PAGE_SIZE]);
        self.stats.live.fetch_add(1, Ordering::SeqCst);
        Some(FrameNumber::new(self.next))
    }

    fn free(&mut self, frame: FrameNumber) {
        let removed = self.frames.remove(&frame.as_u64());
        assert!(removed.is_some(), "double free of {}", frame);
        self.stats.live.fetch_sub(1, Ordering::SeqCst);
    }

    fn frame(&self, frame: FrameNumber) -> &[u8] {
        match self.frames.get(&frame.as_u64()) {
            Some(data) => data,
            None => panic!("{} is not allocated", frame),
        }
    }

    fn frame_mut(&mut self, frame: FrameNumber) -> &mut [u8] {
        match self.frames.get_mut(&frame.as_u64()) {
            Some(data) => data,
            None => panic!("{} is not allocated", frame),
        }
    }
}

// ===========================================================================
// MMU
// ===========================================================================

/// What happened to the fake MMU, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmuEvent {
    CreatedRoot(RootId),
    Activated(Option<RootId>),
    DestroyedRoot(RootId),
}

/// Software translation tables with per-mapping accessed/dirty bits.
///
/// The bits are only ever set explicitly (`set_accessed`, `set_dirty`);
/// nothing here simulates hardware touching them, so eviction tests
/// control exactly which pages look recently used.
#[derive(Clone, Default)]
pub struct MemMmu {
    state: Arc<Mutex<MmuState>>,
}

#[derive(Default)]
struct MmuState {
    roots: BTreeMap<u64, BTreeMap<u64, Mapping>>,
    active: Option<u64>,
    next: u64,
    events: Vec<MmuEvent>,
}

#[derive(Clone, Copy)]
struct Mapping {
    frame: FrameNumber,
    writable: bool,
    accessed: bool,
    dirty: bool,
}

impl MemMmu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writability of the mapping at `va`, if one exists.
    pub fn writable(&self, root: RootId, va: VirtualAddress) -> Option<bool> {
        self.state
            .lock()
            .roots
            .get(&root.0)?
            .get(&va.as_u64())
            .map(|mapping| mapping.writable)
    }

    /// Set the accessed bit, as hardware would on a touch.
    pub fn set_accessed(&self, root: RootId, va: VirtualAddress) {
        let mut state = self.state.lock();
        if let Some(mapping) = state
            .roots
            .get_mut(&root.0)
            .and_then(|mappings| mappings.get_mut(&va.as_u64()))
        {
            mapping.accessed = true;
        }
    }

    /// Set the dirty bit, as hardware would on a store.
    pub fn set_dirty(&self, root: RootId, va: VirtualAddress) {
        let mut state = self.state.lock();
        if let Some(mapping) = state
            .roots
            .get_mut(&root.0)
            .and_then(|mappings| mappings.get_mut(&va.as_u64()))
        {
            mapping.dirty = true;
        }
    }

    /// Every event so far, in order.
    pub fn events(&self) -> Vec<MmuEvent> {
        self.state.lock().events.clone()
    }

    /// Roots currently alive.
    pub fn root_count(&self) -> usize {
        self.state.lock().roots.len()
    }
}

impl Mmu for MemMmu {
    fn create_root(&mut self) -> Option<RootId> {
        let mut state = self.state.lock();
        state.next += 1;
        let root = RootId(state.next);
        state.roots.insert(root.0, BTreeMap::new());
        state.events.push(MmuEvent::CreatedRoot(root));
        Some(root)
    }

    fn activate(&mut self, root: Option<RootId>) {
        let mut state = self.state.lock();
        if let Some(root) = root {
            assert!(
                state.roots.contains_key(&root.0),
                "activating unknown {}",
                root
            );
        }
        state.active = root.map(|root| root.0);
        state.events.push(MmuEvent::Activated(root));
    }

    fn active_root(&self) -> Option<RootId> {
        self.state.lock().active.map(RootId)
    }

    fn destroy_root(&mut self, root: RootId) -> Vec<FrameNumber> {
        let mut state = self.state.lock();
        assert_ne!(state.active, Some(root.0), "destroying the active root");
        let mappings = state.roots.remove(&root.0).unwrap_or_default();
        state.events.push(MmuEvent::DestroyedRoot(root));
        mappings.into_values().map(|mapping| mapping.frame).collect()
    }

    fn map(
        &mut self,
        root: RootId,
        va: VirtualAddress,
        frame: FrameNumber,
        writable: bool,
    ) -> Result<(), MapConflict> {
        let mut state = self.state.lock();
        let Some(mappings) = state.roots.get_mut(&root.0) else {
            return Err(MapConflict);
        };
        if mappings.contains_key(&va.as_u64()) {
            return Err(MapConflict);
        }
        mappings.insert(
            va.as_u64(),
            Mapping {
                frame,
                writable,
                accessed: false,
                dirty: false,
            },
        );
        Ok(())
    }

    fn translate(&self, root: RootId, va: VirtualAddress) -> Option<FrameNumber> {
        self.state
            .lock()
            .roots
            .get(&root.0)?
            .get(&va.as_u64())
            .map(|mapping| mapping.frame)
    }

    fn unmap(&mut self, root: RootId, va: VirtualAddress) -> Option<FrameNumber> {
        self.state
            .lock()
            .roots
            .get_mut(&root.0)?
            .remove(&va.as_u64())
            .map(|mapping| mapping.frame)
    }

    fn is_accessed(&self, root: RootId, va: VirtualAddress) -> bool {
        self.state
            .lock()
            .roots
            .get(&root.0)
            .and_then(|mappings| mappings.get(&va.as_u64()))
            .map(|mapping| mapping.accessed)
            .unwrap_or(false)
    }

    fn clear_accessed(&mut self, root: RootId, va: VirtualAddress) {
        let mut state = self.state.lock();
        if let Some(mapping) = state
            .roots
            .get_mut(&root.0)
            .and_then(|mappings| mappings.get_mut(&va.as_u64()))
        {
            mapping.accessed = false;
        }
    }

    fn is_dirty(&self, root: RootId, va: VirtualAddress) -> bool {
        self.state
            .lock()
            .roots
            .get(&root.0)
            .and_then(|mappings| mappings.get(&va.as_u64()))
            .map(|mapping| mapping.dirty)
            .unwrap_or(false)
    }
}

// ===========================================================================
// Swap
// ===========================================================================

/// Slot store with a fixed capacity.
#[derive(Clone)]
pub struct MemSwap {
    state: Arc<Mutex<SwapState>>,
}

struct SwapState {
    slots: BTreeMap<u64, Vec<u8>>,
    next: u64,
    capacity: usize,
}

impl MemSwap {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SwapState {
                slots: BTreeMap::new(),
                next: 0,
                capacity,
            })),
        }
    }

    /// Slots currently holding a page.
    pub fn live_slots(&self) -> usize {
        self.state.lock().slots.len()
    }
}

impl SwapDevice for MemSwap {
    fn write_out(&mut self, data: &[u8]) -> KernelResult<SwapSlot> {
        assert_eq!(data.len(), PAGE_SIZE);
        let mut state = self.state.lock();
        if state.slots.len() >= state.capacity {
            return Err(KernelError::SwapExhausted);
        }
        state.next += 1;
        let slot = state.next;
        state.slots.insert(slot, data.to_vec());
        Ok(SwapSlot(slot))
    }

    fn read_in(&mut self, slot: SwapSlot, buf: &mut [u8]) -> KernelResult<()> {
        let data = self.state.lock().slots.remove(&slot.0).ok_or(
            KernelError::InvalidState {
                expected: "an occupied swap slot",
                actual: "a free one",
            },
        )?;
        buf.copy_from_slice(&data);
        Ok(())
    }

    fn discard(&mut self, slot: SwapSlot) {
        self.state.lock().slots.remove(&slot.0);
    }
}

// ===========================================================================
// Scheduler, user mode, fatal
// ===========================================================================

/// Scheduler that runs spawned bodies inline, in the caller's thread.
///
/// `spawn` pushes the child pid as current, runs the whole body, then
/// restores the caller. That is the "child runs to completion before
/// spawn returns" interleaving, the harshest one for the lifecycle
/// handshake. Unblocks are latched; a `block_current` with no latched
/// unblock can never return here and panics instead of hanging the
/// suite.
#[derive(Clone)]
pub struct InlineScheduler {
    state: Arc<Mutex<SchedState>>,
}

struct SchedState {
    current: Vec<Pid>,
    latched: BTreeSet<Pid>,
    fail_spawns: usize,
}

impl InlineScheduler {
    pub fn new(boot: Pid) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedState {
                current: vec![boot],
                latched: BTreeSet::new(),
                fail_spawns: 0,
            })),
        }
    }

    /// Run `f` with `pid` as the current context.
    pub fn run_as<R>(&self, pid: Pid, f: impl FnOnce() -> R) -> R {
        self.state.lock().current.push(pid);
        let result = f();
        self.state.lock().current.pop();
        result
    }

    /// Make the next spawn fail.
    pub fn fail_next_spawn(&self) {
        self.state.lock().fail_spawns += 1;
    }
}

impl Scheduler for InlineScheduler {
    fn current(&self) -> Pid {
        let state = self.state.lock();
        match state.current.last() {
            Some(pid) => *pid,
            None => panic!("no current context"),
        }
    }

    fn spawn(&self, pid: Pid, _name: &str, body: Box<dyn FnOnce() + Send>) -> KernelResult<()> {
        {
            let mut state = self.state.lock();
            if state.fail_spawns > 0 {
                state.fail_spawns -= 1;
                return Err(KernelError::SpawnFailed { pid: pid.0 });
            }
            state.current.push(pid);
        }
        body();
        self.state.lock().current.pop();
        Ok(())
    }

    fn block_current(&self) {
        let current = self.current();
        let mut state = self.state.lock();
        assert!(
            state.latched.remove(&current),
            "deadlock: pid {} blocked with nobody left to unblock it",
            current
        );
    }

    fn unblock(&self, pid: Pid) {
        self.state.lock().latched.insert(pid);
    }
}

/// Records each handoff into user mode instead of performing it.
#[derive(Clone, Default)]
pub struct UserModeRecorder {
    entries: Arc<Mutex<Vec<InitialRegisters>>>,
}

impl UserModeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register states handed over so far, in order.
    pub fn entries(&self) -> Vec<InitialRegisters> {
        self.entries.lock().clone()
    }

    /// The most recent handoff.
    pub fn last(&self) -> Option<InitialRegisters> {
        self.entries.lock().last().copied()
    }
}

impl UserMode for UserModeRecorder {
    fn enter(&self, regs: InitialRegisters) {
        self.entries.lock().push(regs);
    }
}

/// Turns fatal conditions into test panics.
pub struct PanicFatal;

impl FatalHook for PanicFatal {
    fn fatal(&self, msg: &str) -> ! {
        panic!("kernel fatal: {}", msg);
    }
}

// ===========================================================================
// Executable images
// ===========================================================================

/// Builds syntactically valid ELF64 images for loader tests.
///
/// Segment data is laid out from the second page of the image onward,
/// one page-aligned region per segment, so the offset/vaddr parity rule
/// holds by construction. `raw_phdr` emits a header with no backing
/// bytes, for images that lie about their contents.
pub struct ElfBuilder {
    entry: u64,
    phdrs: Vec<[u8; 56]>,
    chunks: Vec<(u64, Vec<u8>)>,
    cursor: u64,
}

impl ElfBuilder {
    pub fn new(entry: u64) -> Self {
        Self {
            entry,
            phdrs: Vec::new(),
            chunks: Vec::new(),
            cursor: PAGE_SIZE as u64,
        }
    }

    /// Append a loadable segment holding `data`, `memsz` bytes in memory.
    pub fn segment(mut self, vaddr: u64, data: &[u8], memsz: u64, writable: bool) -> Self {
        let offset = self.cursor + vaddr % PAGE_SIZE as u64;
        let flags = if writable { 0b110 } else { 0b101 };
        self.cursor = round_up_to_page(offset + data.len() as u64);
        self.chunks.push((offset, data.to_vec()));
        self.raw_phdr(1, flags, offset, vaddr, data.len() as u64, memsz)
    }

    /// Append a program header exactly as given.
    pub fn raw_phdr(
        mut self,
        p_type: u32,
        p_flags: u32,
        p_offset: u64,
        p_vaddr: u64,
        p_filesz: u64,
        p_memsz: u64,
    ) -> Self {
        let mut phdr = [0u8; 56];
        phdr[0..4].copy_from_slice(&p_type.to_le_bytes());
        phdr[4..8].copy_from_slice(&p_flags.to_le_bytes());
        phdr[8..16].copy_from_slice(&p_offset.to_le_bytes());
        phdr[16..24].copy_from_slice(&p_vaddr.to_le_bytes());
        // p_paddr mirrors p_vaddr, the way linkers emit it.
        phdr[24..32].copy_from_slice(&p_vaddr.to_le_bytes());
        phdr[32..40].copy_from_slice(&p_filesz.to_le_bytes());
        phdr[40..48].copy_from_slice(&p_memsz.to_le_bytes());
        phdr[48..56].copy_from_slice(&(PAGE_SIZE as u64).to_le_bytes());
        self.phdrs.push(phdr);
        self
    }

    /// Place raw bytes at a file offset, growing the image as needed.
    pub fn data(mut self, offset: u64, bytes: &[u8]) -> Self {
        self.chunks.push((offset, bytes.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut image = vec![0u8; 64 + 56 * self.phdrs.len()];
        image[0..4].copy_from_slice(&[0x7f, b'E', b'L', b'F']);
        image[4] = 2; // ELFCLASS64
        image[5] = 1; // little endian
        image[6] = 1; // ident version
        image[16..18].copy_from_slice(&2u16.to_le_bytes()); // executable
        image[18..20].copy_from_slice(&62u16.to_le_bytes()); // x86-64
        image[20..24].copy_from_slice(&1u32.to_le_bytes());
        image[24..32].copy_from_slice(&self.entry.to_le_bytes());
        image[32..40].copy_from_slice(&64u64.to_le_bytes()); // phoff
        image[52..54].copy_from_slice(&64u16.to_le_bytes()); // ehsize
        image[54..56].copy_from_slice(&56u16.to_le_bytes()); // phentsize
        image[56..58].copy_from_slice(&(self.phdrs.len() as u16).to_le_bytes());
        for (i, phdr) in self.phdrs.iter().enumerate() {
            let at = 64 + 56 * i;
            image[at..at + 56].copy_from_slice(phdr);
        }
        for (offset, bytes) in self.chunks {
            let end = offset as usize + bytes.len();
            if image.len() < end {
                image.resize(end, 0);
            }
            image[offset as usize..end].copy_from_slice(&bytes);
        }
        image
    }
}

/// A minimal valid executable: sixteen bytes of code at `entry`.
pub fn sample_executable(entry: u64) -> Vec<u8> {
    let code: Vec<u8> = (0..16u8).collect();
    ElfBuilder::new(entry).segment(entry, &code, 16, false).build()
}

// ===========================================================================
// Bundles
// ===========================================================================

/// The paging-level services plus the fake handles behind them.
pub struct Services {
    pub fs: FsService,
    pub frames: FrameService,
    pub mmu: MmuService,
    pub swap: SwapService,
    pub mem_fs: MemFileSystem,
    pub mem_mmu: MemMmu,
    pub mem_swap: MemSwap,
    pub frame_stats: Arc<FrameStats>,
}

impl Services {
    /// Fresh fakes with `frame_capacity` frames and plenty of swap.
    pub fn new(frame_capacity: usize) -> Self {
        let mem_fs = MemFileSystem::new();
        let mem_mmu = MemMmu::new();
        let mem_swap = MemSwap::new(64);
        let allocator = MemFrameAllocator::new(frame_capacity);
        let frame_stats = allocator.stats();
        Self {
            fs: FsService::new(Box::new(mem_fs.clone())),
            frames: FrameService::new(Box::new(allocator)),
            mmu: MmuService::new(Box::new(mem_mmu.clone())),
            swap: SwapService::new(Box::new(mem_swap.clone())),
            mem_fs,
            mem_mmu,
            mem_swap,
            frame_stats,
        }
    }

    /// The context the paging paths take.
    pub fn context(&self) -> PageContext<'_> {
        PageContext {
            fs: &self.fs,
            frames: &self.frames,
            mmu: &self.mmu,
            swap: &self.swap,
        }
    }
}

/// A [`ProcessManager`] over fresh fakes, with the observer handles
/// alongside.
pub struct Harness {
    pub manager: Arc<ProcessManager>,
    pub scheduler: InlineScheduler,
    pub fs: MemFileSystem,
    pub mmu: MemMmu,
    pub swap: MemSwap,
    pub frames: Arc<FrameStats>,
    pub user_mode: UserModeRecorder,
    /// The adopted boot process.
    pub init: Pid,
}

/// Manager plus fakes, with the calling context adopted as pid 1.
pub fn harness(mode: LoadMode, frame_capacity: usize) -> Harness {
    let fs = MemFileSystem::new();
    let mmu = MemMmu::new();
    let swap = MemSwap::new(64);
    let allocator = MemFrameAllocator::new(frame_capacity);
    let frames = allocator.stats();
    let scheduler = InlineScheduler::new(Pid(1));
    let user_mode = UserModeRecorder::new();

    let manager = ProcessManager::new(
        mode,
        Platform {
            fs: Box::new(fs.clone()),
            frames: Box::new(allocator),
            mmu: Box::new(mmu.clone()),
            swap: Box::new(swap.clone()),
            scheduler: Box::new(scheduler.clone()),
            user_mode: Box::new(user_mode.clone()),
            fatal: Box::new(PanicFatal),
        },
    );
    let init = manager.adopt_current("init");

    Harness {
        manager,
        scheduler,
        fs,
        mmu,
        swap,
        frames,
        user_mode,
        init,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_fs_reads_clamp_to_the_file() {
        let fs = MemFileSystem::new();
        fs.insert("f", vec![1, 2, 3, 4]);
        let mut boxed: Box<dyn FileSystem> = Box::new(fs.clone());

        let handle = boxed.open("f").unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(boxed.read_at(handle, &mut buf, 2), 2);
        assert_eq!(&buf[..2], &[3, 4]);
        assert_eq!(boxed.read_at(handle, &mut buf, 100), 0);

        boxed.close(handle);
        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn test_frame_pool_is_bounded() {
        let mut pool = MemFrameAllocator::new(1);
        let stats = pool.stats();
        let frame = pool.allocate(true).unwrap();
        assert!(pool.allocate(true).is_none());
        assert_eq!(stats.live(), 1);
        pool.free(frame);
        assert_eq!(stats.live(), 0);
        assert!(pool.allocate(false).is_some());
    }

    #[test]
    fn test_swap_slots_are_consumed_on_read() {
        let mut swap = MemSwap::new(2);
        let slot = swap.write_out(&[9u8; PAGE_SIZE]).unwrap();
        assert_eq!(swap.live_slots(), 1);

        let mut buf = [0u8; PAGE_SIZE];
        swap.read_in(slot, &mut buf).unwrap();
        assert_eq!(buf[0], 9);
        assert_eq!(swap.live_slots(), 0);
        assert!(swap.read_in(slot, &mut buf).is_err());
    }

    #[test]
    fn test_builder_emits_a_loadable_header() {
        let image = sample_executable(0x40_0000);
        assert_eq!(&image[0..4], &[0x7f, b'E', b'L', b'F']);
        assert_eq!(image[4], 2);
        let phnum = u16::from_le_bytes(image[56..58].try_into().unwrap());
        assert_eq!(phnum, 1);
        // The segment's bytes start on the second page.
        assert_eq!(image[PAGE_SIZE], 0);
        assert_eq!(image[PAGE_SIZE + 1], 1);
    }
}
