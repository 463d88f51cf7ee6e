//! Process exit and address-space teardown.

use alloc::vec::Vec;

use super::{
    pcb::{ChildStatus, ProcessState},
    ProcessManager,
};

impl ProcessManager {
    /// Terminate the calling process with `status`.
    ///
    /// Releases the executable's write denial, reaps already-exited
    /// children, records the status with the parent and wakes it, then
    /// tears down the address space: registered pages are dropped, the
    /// translation root is deactivated before any of its frames are
    /// freed, and every installed frame goes back to the allocator.
    pub fn exit(&self, status: i32) {
        let Some(process) = self.current() else {
            self.fatal.fatal("exit from a context with no process");
        };

        process.set_exit_status(status);
        process.set_state(ProcessState::Exited);

        if let Some(executable) = process.executable.lock().take() {
            let mut fs = self.fs.lock();
            fs.allow_write(executable);
            fs.close(executable);
        }

        // Children we never waited for: running ones keep going without a
        // parent, exited ones are zombies only we could have reaped.
        let children: Vec<_> = {
            let mut children = process.children.lock();
            children.drain(..).collect()
        };
        for record in children {
            if matches!(record.status, ChildStatus::Exited(_) | ChildStatus::LoadFailed) {
                self.table.remove(record.pid);
            }
        }

        let parent = process.parent.and_then(|pid| self.table.get(pid));
        if let Some(parent) = &parent {
            if parent.state() != ProcessState::Exited {
                self.update_child_status(parent, process.pid, ChildStatus::Exited(status));
            }
        }
        process.finished.raise(self.scheduler.as_ref());
        log::info!(target: "process", "{}: exit({})", process.name, status);

        // Nobody left to wait for us: reap ourselves.
        let orphaned = parent
            .map(|parent| parent.state() == ProcessState::Exited)
            .unwrap_or(true);
        if orphaned {
            self.table.remove(process.pid);
        }

        process.pages.lock().teardown(&self.swap);

        let root = process.root.lock().take();
        if let Some(root) = root {
            // The kernel must not free frames that are still reachable
            // through the active root.
            self.mmu.activate(None);
            if self.mmu.active_root().is_some() {
                self.fatal
                    .fatal("exit: a translation root is still active after the kernel switch");
            }
            for frame in self.mmu.destroy_root(root) {
                self.frames.free(frame);
            }
        }
    }
}
