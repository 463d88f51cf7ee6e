//! Process table
//!
//! System-wide pid-to-handle map. Exited processes stay in it as
//! zombies until reaped, because their recorded status and `finished`
//! signal must outlive their context: a successful `wait`, the parent's
//! exit sweep, or the orphan's own exit removes the entry.

use alloc::{collections::BTreeMap, sync::Arc};

use spin::Mutex;

use super::{pcb::Process, Pid};

pub struct ProcessTable {
    entries: Mutex<BTreeMap<Pid, Arc<Process>>>,
}

impl ProcessTable {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Insert a freshly created process. Pids are allocated uniquely, so
    /// a collision is a caller bug.
    pub fn insert(&self, process: Arc<Process>) {
        let previous = self.entries.lock().insert(process.pid, process);
        debug_assert!(previous.is_none());
    }

    pub fn get(&self, pid: Pid) -> Option<Arc<Process>> {
        self.entries.lock().get(&pid).cloned()
    }

    /// Remove (reap) an entry. The handle stays alive for whoever still
    /// holds an `Arc` to it.
    pub fn remove(&self, pid: Pid) -> Option<Arc<Process>> {
        self.entries.lock().remove(&pid)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}
