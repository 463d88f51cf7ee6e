//! Process control block
//!
//! [`Process`] is the per-process handle: identity, address-space
//! ownership, parent-side child bookkeeping, and the two lifecycle
//! signals. Handles live in the process table as `Arc<Process>`, so a
//! parent blocked on a signal keeps the child's bookkeeping alive even
//! after the child's context is gone.

use core::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use alloc::{string::String, vec::Vec};
use spin::Mutex;

use super::{sync::Signal, Pid};
use crate::{fs::FileHandle, mm::RootId, mm::SupplementalPageTable};

/// Lifecycle stage of a process.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Spawned; the loader has not reported yet.
    Creating = 0,
    /// Load succeeded; executing (or about to execute) user code.
    Running = 1,
    /// Exited; stays in the table until reaped.
    Exited = 2,
}

/// Load and exit outcome of one child, as its parent sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildStatus {
    /// No outcome reported yet.
    Pending,
    /// The loader rejected the executable; the child never ran user
    /// code. Terminal: the child's own exit(-1) does not overwrite it.
    LoadFailed,
    /// Load succeeded; the child is (or was) running.
    Loaded,
    /// Final exit status.
    Exited(i32),
}

/// Parent-owned record tracking one spawned child.
///
/// Created at spawn; removed by exactly one of a successful `wait` or
/// the parent's own exit sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildRecord {
    pub pid: Pid,
    pub status: ChildStatus,
}

/// Per-process handle.
pub struct Process {
    pub pid: Pid,
    pub name: String,
    /// Parent pid, kept as a lookup key only: resolving it goes through
    /// the process table and fails once the parent is reaped.
    pub parent: Option<Pid>,
    state: AtomicU32,
    exit_status: AtomicI32,
    /// Owned translation root, present from load until teardown.
    pub root: Mutex<Option<RootId>>,
    /// Write-denied executable handle, held open for the process
    /// lifetime so demand paging can keep reading from it.
    pub executable: Mutex<Option<FileHandle>>,
    /// Where each known virtual page currently lives.
    pub pages: Mutex<SupplementalPageTable>,
    /// Spawned and not yet waited-for children.
    pub children: Mutex<Vec<ChildRecord>>,
    /// Raised once, when the load outcome is known.
    pub loaded: Signal,
    /// Raised once, at exit.
    pub finished: Signal,
}

impl Process {
    pub fn new(pid: Pid, parent: Option<Pid>, name: String, executable: Option<FileHandle>) -> Self {
        Self {
            pid,
            name,
            parent,
            state: AtomicU32::new(ProcessState::Creating as u32),
            exit_status: AtomicI32::new(0),
            root: Mutex::new(None),
            executable: Mutex::new(executable),
            pages: Mutex::new(SupplementalPageTable::new()),
            children: Mutex::new(Vec::new()),
            loaded: Signal::new(),
            finished: Signal::new(),
        }
    }

    pub fn state(&self) -> ProcessState {
        match self.state.load(Ordering::Acquire) {
            0 => ProcessState::Creating,
            1 => ProcessState::Running,
            _ => ProcessState::Exited,
        }
    }

    pub fn set_state(&self, state: ProcessState) {
        self.state.store(state as u32, Ordering::Release);
    }

    /// Status recorded by `exit`; meaningless before it runs.
    pub fn exit_status(&self) -> i32 {
        self.exit_status.load(Ordering::Acquire)
    }

    pub(crate) fn set_exit_status(&self, status: i32) {
        self.exit_status.store(status, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips() {
        let process = Process::new(Pid(3), None, String::from("p"), None);
        assert_eq!(process.state(), ProcessState::Creating);
        process.set_state(ProcessState::Running);
        assert_eq!(process.state(), ProcessState::Running);
        process.set_state(ProcessState::Exited);
        assert_eq!(process.state(), ProcessState::Exited);
    }

    #[test]
    fn test_new_process_starts_empty() {
        let process = Process::new(Pid(4), Some(Pid(1)), String::from("p"), None);
        assert!(process.root.lock().is_none());
        assert!(process.children.lock().is_empty());
        assert!(process.pages.lock().is_empty());
        assert_eq!(process.exit_status(), 0);
    }
}
