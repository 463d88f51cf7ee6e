//! Parent-side wait and child status bookkeeping.

use super::{
    pcb::{ChildStatus, Process},
    Pid, ProcessManager, EXIT_FAILURE,
};

impl ProcessManager {
    /// Wait for direct child `pid` to exit and return its exit status.
    ///
    /// Returns [`EXIT_FAILURE`] when `pid` is not a child of the calling
    /// process, when it failed to load, or when it was already waited
    /// for. A successful wait reaps the child: its record and table entry
    /// are gone afterwards, so a second wait on the same pid fails.
    pub fn wait(&self, pid: Pid) -> i32 {
        let Some(parent) = self.current() else {
            return EXIT_FAILURE;
        };

        if !parent
            .children
            .lock()
            .iter()
            .any(|record| record.pid == pid)
        {
            return EXIT_FAILURE;
        }

        // The signal counts raises, so a child that already exited does
        // not block us. A missing table entry means the child is gone and
        // its record already carries the final status.
        if let Some(child) = self.table.get(pid) {
            child.finished.wait(self.scheduler.as_ref());
        }

        let record = {
            let mut children = parent.children.lock();
            let Some(index) = children.iter().position(|record| record.pid == pid) else {
                return EXIT_FAILURE;
            };
            children.remove(index)
        };
        self.table.remove(pid);
        log::debug!(target: "process", "{}: reaped pid {}", parent.name, pid);

        match record.status {
            ChildStatus::Exited(status) => status,
            _ => EXIT_FAILURE,
        }
    }

    /// Record a load outcome or exit status in the parent's child list.
    ///
    /// `LoadFailed` is terminal: the failing child still exits through the
    /// normal path, and that exit must not overwrite the load verdict
    /// before the parent has read it.
    pub(crate) fn update_child_status(&self, parent: &Process, child: Pid, status: ChildStatus) {
        let mut children = parent.children.lock();
        let Some(record) = children.iter_mut().find(|record| record.pid == child) else {
            return;
        };
        if record.status == ChildStatus::LoadFailed {
            return;
        }
        record.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{pcb::ChildRecord, LoadMode};
    use crate::testing::harness;

    #[test]
    fn test_wait_on_stranger_fails() {
        let bench = harness(LoadMode::Eager, 8);
        assert_eq!(bench.manager.wait(Pid(99)), EXIT_FAILURE);
    }

    #[test]
    fn test_load_failed_is_terminal() {
        let bench = harness(LoadMode::Eager, 8);
        let parent = bench.manager.current().unwrap();
        parent.children.lock().push(ChildRecord {
            pid: Pid(7),
            status: ChildStatus::Pending,
        });

        bench
            .manager
            .update_child_status(&parent, Pid(7), ChildStatus::LoadFailed);
        bench
            .manager
            .update_child_status(&parent, Pid(7), ChildStatus::Exited(0));

        let children = parent.children.lock();
        assert_eq!(children[0].status, ChildStatus::LoadFailed);
    }

    #[test]
    fn test_update_with_equal_status_is_a_no_op() {
        let bench = harness(LoadMode::Eager, 8);
        let parent = bench.manager.current().unwrap();
        parent.children.lock().push(ChildRecord {
            pid: Pid(9),
            status: ChildStatus::Pending,
        });

        bench
            .manager
            .update_child_status(&parent, Pid(9), ChildStatus::Loaded);
        bench
            .manager
            .update_child_status(&parent, Pid(9), ChildStatus::Loaded);

        let children = parent.children.lock();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].status, ChildStatus::Loaded);
    }

    #[test]
    fn test_update_ignores_unknown_children() {
        let bench = harness(LoadMode::Eager, 8);
        let parent = bench.manager.current().unwrap();
        bench
            .manager
            .update_child_status(&parent, Pid(42), ChildStatus::Exited(3));
        assert!(parent.children.lock().is_empty());
    }
}
