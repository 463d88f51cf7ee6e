//! Process lifecycle
//!
//! The [`ProcessManager`] owns the process table and every collaborator
//! service, and carries the whole lifecycle protocol: `create` spawns a
//! child context, blocks until the child reports its load outcome
//! through the parent-side [`ChildRecord`], and returns the new pid or
//! the load failure; `wait` collects an exited child exactly once;
//! `exit` reports to the parent, releases the executable, and tears the
//! address space down in an order that never frees an active
//! translation root.
//!
//! Both lifecycle signals count: a raise that happens before anyone
//! waits is remembered, so the protocol has no lost-wakeup window no
//! matter how child and parent interleave.

pub mod creation;
pub mod exit;
pub mod pcb;
pub mod sync;
pub mod table;
pub mod wait;

pub use pcb::{ChildRecord, ChildStatus, Process, ProcessState};
pub use sync::Signal;
pub use table::ProcessTable;

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use alloc::{boxed::Box, string::String, sync::Arc};

use crate::{
    error::{KernelError, KernelResult},
    fs::{FileSystem, FsService},
    mm::{
        FrameAllocator, FrameService, Mmu, MmuService, PageContext, SwapDevice, SwapService,
        VirtualAddress,
    },
    sched::{FatalHook, Scheduler, UserMode},
};

/// Process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u64);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Exit status of a process whose load failed, and the result `wait`
/// reports for a pid that is not an unwaited child of the caller.
pub const EXIT_FAILURE: i32 = -1;

/// Whether segments materialize at load time or on first fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Eager,
    Demand,
}

/// Every collaborator the process core runs against, in one bundle.
pub struct Platform {
    pub fs: Box<dyn FileSystem>,
    pub frames: Box<dyn FrameAllocator>,
    pub mmu: Box<dyn Mmu>,
    pub swap: Box<dyn SwapDevice>,
    pub scheduler: Box<dyn Scheduler>,
    pub user_mode: Box<dyn UserMode>,
    pub fatal: Box<dyn FatalHook>,
}

/// Owner of the process table and the collaborator services; every
/// lifecycle operation goes through it.
pub struct ProcessManager {
    pub(crate) mode: LoadMode,
    pub(crate) fs: FsService,
    pub(crate) frames: FrameService,
    pub(crate) mmu: MmuService,
    pub(crate) swap: SwapService,
    pub(crate) scheduler: Box<dyn Scheduler>,
    pub(crate) user_mode: Box<dyn UserMode>,
    pub(crate) fatal: Box<dyn FatalHook>,
    pub(crate) table: ProcessTable,
    next_pid: AtomicU64,
}

impl ProcessManager {
    pub fn new(mode: LoadMode, platform: Platform) -> Arc<Self> {
        Arc::new(Self {
            mode,
            fs: FsService::new(platform.fs),
            frames: FrameService::new(platform.frames),
            mmu: MmuService::new(platform.mmu),
            swap: SwapService::new(platform.swap),
            scheduler: platform.scheduler,
            user_mode: platform.user_mode,
            fatal: platform.fatal,
            table: ProcessTable::new(),
            next_pid: AtomicU64::new(1),
        })
    }

    /// Register the calling context as a process, so it can create
    /// children and wait on them. Idempotent per context.
    pub fn adopt_current(&self, name: &str) -> Pid {
        let pid = self.scheduler.current();
        // Allocator-issued pids must stay disjoint from scheduler-issued
        // ones.
        self.next_pid.fetch_max(pid.0 + 1, Ordering::Relaxed);
        if self.table.get(pid).is_none() {
            let process = Arc::new(Process::new(pid, None, String::from(name), None));
            process.set_state(ProcessState::Running);
            self.table.insert(process);
            log::debug!(target: "process", "adopted current context as pid {}", pid);
        }
        pid
    }

    /// Live table entries: running processes plus unreaped zombies.
    pub fn process_count(&self) -> usize {
        self.table.len()
    }

    /// Resolve a page fault at `va` for the current process.
    ///
    /// `UnmappedPage` means no supplemental entry covers the page; the
    /// caller should treat the fault as a genuine access violation.
    pub fn handle_fault(&self, va: VirtualAddress) -> KernelResult<()> {
        let process = self
            .current()
            .ok_or(KernelError::UnmappedPage { addr: va.as_u64() })?;
        let root = (*process.root.lock()).ok_or(KernelError::UnmappedPage { addr: va.as_u64() })?;
        log::debug!(target: "vm", "fault at {} (pid {})", va, process.pid);
        let result = process
            .pages
            .lock()
            .demand_load(va.page_round_down(), root, &self.page_context());
        result
    }

    /// The service bundle loads and fault resolutions run against.
    pub fn page_context(&self) -> PageContext<'_> {
        PageContext {
            fs: &self.fs,
            frames: &self.frames,
            mmu: &self.mmu,
            swap: &self.swap,
        }
    }

    /// Handle of the process whose context is executing, if the table
    /// knows it.
    pub(crate) fn current(&self) -> Option<Arc<Process>> {
        self.table.get(self.scheduler.current())
    }

    pub(crate) fn alloc_pid(&self) -> Pid {
        Pid(self.next_pid.fetch_add(1, Ordering::Relaxed))
    }
}
