//! Hardware translation-table collaborator seam
//!
//! One [`RootId`] names one per-process translation root. Frames
//! installed into a root are owned by that root: `destroy_root` detaches
//! and returns them so the caller can hand them back to the allocator.
//! That single-owner rule is what keeps frame release double-free-proof;
//! the supplemental page table only ever stores non-owning frame numbers.

use alloc::{boxed::Box, vec::Vec};
use core::fmt;

use spin::Mutex;

use crate::{
    error::{KernelError, KernelResult},
    mm::{FrameNumber, VirtualAddress},
};

/// Index of a hardware translation root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RootId(pub u64);

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "root#{}", self.0)
    }
}

/// Operations the process core needs from the paging hardware.
pub trait Mmu: Send {
    /// Create an empty per-process root. `None` when the platform cannot.
    fn create_root(&mut self) -> Option<RootId>;

    /// Make `root` the active translation root; `None` activates the
    /// kernel-only root.
    fn activate(&mut self, root: Option<RootId>);

    /// The currently active per-process root, if any.
    fn active_root(&self) -> Option<RootId>;

    /// Destroy a root and detach every frame still installed in it.
    ///
    /// The root must not be active. Returns the orphaned frames; the
    /// caller owns them and is expected to free them.
    fn destroy_root(&mut self, root: RootId) -> Vec<FrameNumber>;

    /// Install `frame` at `va`. Fails if `va` is already mapped.
    fn map(
        &mut self,
        root: RootId,
        va: VirtualAddress,
        frame: FrameNumber,
        writable: bool,
    ) -> Result<(), MapConflict>;

    /// Frame currently mapped at `va`, if any.
    fn translate(&self, root: RootId, va: VirtualAddress) -> Option<FrameNumber>;

    /// Remove the mapping at `va`, returning its frame to the caller's
    /// ownership.
    fn unmap(&mut self, root: RootId, va: VirtualAddress) -> Option<FrameNumber>;

    /// Hardware accessed bit for the page at `va`.
    fn is_accessed(&self, root: RootId, va: VirtualAddress) -> bool;

    /// Clear the accessed bit for the page at `va`.
    fn clear_accessed(&mut self, root: RootId, va: VirtualAddress);

    /// Hardware dirty bit for the page at `va`.
    fn is_dirty(&self, root: RootId, va: VirtualAddress) -> bool;
}

/// Error type for [`Mmu::map`]: the slot was already occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapConflict;

/// Shared front over the platform MMU.
pub struct MmuService {
    inner: Mutex<Box<dyn Mmu>>,
}

impl MmuService {
    pub fn new(mmu: Box<dyn Mmu>) -> Self {
        Self {
            inner: Mutex::new(mmu),
        }
    }

    pub fn create_root(&self) -> Option<RootId> {
        self.inner.lock().create_root()
    }

    pub fn activate(&self, root: Option<RootId>) {
        self.inner.lock().activate(root);
    }

    pub fn active_root(&self) -> Option<RootId> {
        self.inner.lock().active_root()
    }

    pub fn destroy_root(&self, root: RootId) -> Vec<FrameNumber> {
        self.inner.lock().destroy_root(root)
    }

    /// Install `frame` at `va`, reporting conflicts as [`KernelError`].
    pub fn map(
        &self,
        root: RootId,
        va: VirtualAddress,
        frame: FrameNumber,
        writable: bool,
    ) -> KernelResult<()> {
        self.inner
            .lock()
            .map(root, va, frame, writable)
            .map_err(|MapConflict| KernelError::InstallConflict { addr: va.as_u64() })
    }

    pub fn translate(&self, root: RootId, va: VirtualAddress) -> Option<FrameNumber> {
        self.inner.lock().translate(root, va)
    }

    pub fn unmap(&self, root: RootId, va: VirtualAddress) -> Option<FrameNumber> {
        self.inner.lock().unmap(root, va)
    }

    pub fn is_accessed(&self, root: RootId, va: VirtualAddress) -> bool {
        self.inner.lock().is_accessed(root, va)
    }

    pub fn clear_accessed(&self, root: RootId, va: VirtualAddress) {
        self.inner.lock().clear_accessed(root, va);
    }

    pub fn is_dirty(&self, root: RootId, va: VirtualAddress) -> bool {
        self.inner.lock().is_dirty(root, va)
    }
}
