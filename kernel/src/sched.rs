//! Execution-context collaborator seams
//!
//! Context switching, blocking, and the return into user mode are
//! platform concerns. The process core sees them through three narrow
//! traits: [`Scheduler`] for spawn/block/unblock, [`UserMode`] for the
//! one-way handoff into the loaded program, and [`FatalHook`] for
//! programming-bug states that must not be reported as `Result`s.

use alloc::boxed::Box;

use crate::{error::KernelResult, mm::VirtualAddress, process::Pid};

/// Initial register state for a freshly loaded program.
///
/// Everything the startup handoff needs: where to begin executing and
/// where the argument stack ends. How these reach the hardware registers
/// is the [`UserMode`] implementation's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialRegisters {
    /// Entry address recorded in the executable header.
    pub entry: VirtualAddress,
    /// Stack pointer after argument marshalling.
    pub stack_pointer: VirtualAddress,
}

/// Scheduler operations the lifecycle protocol depends on.
///
/// `spawn` runs `body` in a new execution context associated with `pid`.
/// The new context may run, and even exit, before `spawn` returns; the
/// lifecycle signals are counting one-shots precisely so callers survive
/// that interleaving.
pub trait Scheduler: Send + Sync {
    /// Pid of the process whose context is currently executing.
    fn current(&self) -> Pid;

    /// Create a context for `pid` executing `body`.
    fn spawn(&self, pid: Pid, name: &str, body: Box<dyn FnOnce() + Send>) -> KernelResult<()>;

    /// Block the current context until some `unblock(current)` call.
    fn block_current(&self);

    /// Make a context blocked in `block_current` runnable again.
    ///
    /// An unblock that arrives before the matching `block_current` must
    /// not be lost: implementations latch it and let the next block
    /// return immediately.
    fn unblock(&self, pid: Pid);
}

/// Begin executing user code with the given initial register state.
///
/// On real hardware this never returns: the implementation manufactures
/// whatever frame its architecture needs and drops into user mode. Hosted
/// implementations may record the registers and return, which ends the
/// child body.
pub trait UserMode: Send + Sync {
    fn enter(&self, regs: InitialRegisters);
}

/// Last-resort termination for states that indicate a kernel bug, such
/// as destroying the active translation root.
pub trait FatalHook: Send + Sync {
    fn fatal(&self, msg: &str) -> !;
}
