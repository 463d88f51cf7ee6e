//! Process creation and the child-side bootstrap

use alloc::{boxed::Box, string::String, sync::Arc};

use super::{
    pcb::{ChildRecord, ChildStatus, Process, ProcessState},
    Pid, ProcessManager, EXIT_FAILURE,
};
use crate::{
    error::{KernelError, KernelResult, LoadError},
    loader,
};

impl ProcessManager {
    /// Create a process running executable `name` with
    /// whitespace-separated `args`.
    ///
    /// Opens and write-denies the executable for the child's lifetime,
    /// spawns the child context, then blocks until the child reports its
    /// load outcome through the parent-side [`ChildRecord`]. Returns the
    /// new pid, or `LoadFailed` when the child reported a failed load.
    /// On spawn failure everything done so far is rolled back.
    pub fn create(self: &Arc<Self>, name: &str, args: &str) -> KernelResult<Pid> {
        let parent = self.current().ok_or(KernelError::ProcessNotFound {
            pid: self.scheduler.current().0,
        })?;

        // Own copies: the child context outlives the caller's borrows.
        let name = String::from(name);
        let args = String::from(args);

        // Writers are rejected from here until the child's exit releases
        // the denial.
        let executable = {
            let mut fs = self.fs.lock();
            match fs.open(&name) {
                Some(handle) => {
                    fs.deny_write(handle);
                    handle
                }
                None => return Err(LoadError::OpenFailed.into()),
            }
        };

        let pid = self.alloc_pid();
        let child = Arc::new(Process::new(
            pid,
            Some(parent.pid),
            name.clone(),
            Some(executable),
        ));
        self.table.insert(Arc::clone(&child));
        parent.children.lock().push(ChildRecord {
            pid,
            status: ChildStatus::Pending,
        });
        log::info!(target: "process", "create {} (pid {})", name, pid);

        let manager = Arc::clone(self);
        let body = Box::new(move || manager.bootstrap(pid, &args));
        if let Err(err) = self.scheduler.spawn(pid, &name, body) {
            parent.children.lock().retain(|record| record.pid != pid);
            self.table.remove(pid);
            let mut fs = self.fs.lock();
            fs.allow_write(executable);
            fs.close(executable);
            return Err(err);
        }

        // Block until the load outcome is known. The signal counts, so a
        // child that already ran to completion does not block us.
        child.loaded.wait(self.scheduler.as_ref());

        let status = parent
            .children
            .lock()
            .iter()
            .find(|record| record.pid == pid)
            .map(|record| record.status);
        match status {
            Some(ChildStatus::LoadFailed) => Err(KernelError::LoadFailed { pid: pid.0 }),
            _ => Ok(pid),
        }
    }

    /// Body of a freshly spawned child context: load the executable,
    /// report the outcome, then either hand off to user code or exit
    /// without ever running any.
    fn bootstrap(self: &Arc<Self>, pid: Pid, args: &str) {
        let Some(process) = self.table.get(pid) else {
            return;
        };

        match loader::load(
            &self.page_context(),
            &process,
            self.mode,
            &process.name,
            args,
        ) {
            Ok(regs) => {
                self.report_load(&process, ChildStatus::Loaded);
                process.set_state(ProcessState::Running);
                process.loaded.raise(self.scheduler.as_ref());
                self.user_mode.enter(regs);
            }
            Err(err) => {
                log::warn!(target: "loader", "{}: {}", process.name, err);
                self.report_load(&process, ChildStatus::LoadFailed);
                process.loaded.raise(self.scheduler.as_ref());
                self.exit(EXIT_FAILURE);
            }
        }
    }

    fn report_load(&self, process: &Process, status: ChildStatus) {
        if let Some(parent) = process.parent.and_then(|pid| self.table.get(pid)) {
            self.update_child_status(&parent, process.pid, status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::LoadMode;
    use crate::testing::{harness, sample_executable};

    #[test]
    fn test_create_reports_the_new_pid() {
        let bench = harness(LoadMode::Eager, 16);
        bench.fs.insert("app", sample_executable(0x40_0000));

        let pid = bench.manager.create("app", "one two").unwrap();
        assert!(pid.0 > bench.init.0);
        // The child loaded and is waiting in user mode.
        assert_eq!(bench.user_mode.entries().len(), 1);
        assert_eq!(bench.manager.process_count(), 2);
    }

    #[test]
    fn test_create_without_executable_fails_fast() {
        let bench = harness(LoadMode::Eager, 16);
        let err = bench.manager.create("missing", "").unwrap_err();
        assert_eq!(err, KernelError::LoadError(LoadError::OpenFailed));
        assert_eq!(bench.manager.process_count(), 1);
        assert!(bench.user_mode.entries().is_empty());
    }

    #[test]
    fn test_create_surfaces_load_failure() {
        let bench = harness(LoadMode::Eager, 16);
        bench.fs.insert("garbage", alloc::vec![0u8; 128]);

        let err = bench.manager.create("garbage", "").unwrap_err();
        assert!(matches!(err, KernelError::LoadFailed { .. }));
        // The child never reached user mode.
        assert!(bench.user_mode.entries().is_empty());
    }

    #[test]
    fn test_spawn_failure_rolls_back() {
        let bench = harness(LoadMode::Eager, 16);
        bench.fs.insert("app", sample_executable(0x40_0000));
        bench.scheduler.fail_next_spawn();

        let err = bench.manager.create("app", "").unwrap_err();
        assert!(matches!(err, KernelError::SpawnFailed { .. }));
        assert_eq!(bench.manager.process_count(), 1);
        assert!(!bench.fs.write_denied("app"));
        assert_eq!(bench.fs.open_handles(), 0);
    }
}
