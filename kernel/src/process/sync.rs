//! Lifecycle signals
//!
//! [`Signal`] is the one-shot counting primitive behind *loaded* and
//! *finished*: a raise that happens before anyone waits is remembered,
//! so a waiter arriving after the fact consumes the count instead of
//! blocking forever. This is what makes the create/exit handshake safe
//! when the child runs to completion before the parent ever looks.

use core::sync::atomic::{AtomicU32, Ordering};

use spin::Mutex;

use super::Pid;
use crate::sched::Scheduler;

/// Counting one-shot signal.
///
/// The lifecycle protocol has at most one waiter per signal (the
/// parent), so a single waiter slot suffices.
pub struct Signal {
    count: AtomicU32,
    waiter: Mutex<Option<Pid>>,
}

impl Signal {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(0),
            waiter: Mutex::new(None),
        }
    }

    /// Consume one raise, blocking the current context until one has
    /// arrived.
    pub fn wait(&self, sched: &dyn Scheduler) {
        loop {
            let count = self.count.load(Ordering::Acquire);
            if count > 0 {
                if self
                    .count
                    .compare_exchange(count, count - 1, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
                continue;
            }
            *self.waiter.lock() = Some(sched.current());
            // A raise may have landed between the count check and the
            // registration; re-check before suspending.
            if self.count.load(Ordering::Acquire) == 0 {
                sched.block_current();
            }
            *self.waiter.lock() = None;
        }
    }

    /// Record one raise and wake the waiter, if any.
    pub fn raise(&self, sched: &dyn Scheduler) {
        self.count.fetch_add(1, Ordering::Release);
        if let Some(pid) = self.waiter.lock().take() {
            sched.unblock(pid);
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InlineScheduler;

    #[test]
    fn test_raise_before_wait_is_remembered() {
        let sched = InlineScheduler::new(Pid(1));
        let signal = Signal::new();
        signal.raise(&sched);
        // Returns immediately; a lost wakeup would deadlock here.
        signal.wait(&sched);
    }

    #[test]
    fn test_raises_accumulate() {
        let sched = InlineScheduler::new(Pid(1));
        let signal = Signal::new();
        signal.raise(&sched);
        signal.raise(&sched);
        signal.wait(&sched);
        signal.wait(&sched);
    }

    #[test]
    #[should_panic(expected = "deadlock")]
    fn test_wait_without_raise_deadlocks() {
        let sched = InlineScheduler::new(Pid(1));
        Signal::new().wait(&sched);
    }
}
