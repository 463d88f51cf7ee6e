//! RAII wrappers for kernel resources
//!
//! A frame between allocation and installation belongs to nobody in the
//! bookkeeping: the guard closes that window. On success the frame is
//! promoted into a translation root and the guard is defused with
//! [`FrameGuard::leak`]; on any early return the guard's drop returns
//! the frame to the allocator.

use crate::mm::{FrameNumber, FrameService};

/// RAII wrapper for a physical frame not yet owned by a translation root.
pub struct FrameGuard<'a> {
    frame: FrameNumber,
    frames: &'a FrameService,
}

impl<'a> FrameGuard<'a> {
    /// Allocate one frame under guard. `None` when the pool is exhausted.
    pub fn allocate(frames: &'a FrameService, zeroed: bool) -> Option<Self> {
        let frame = frames.allocate(zeroed)?;
        Some(Self { frame, frames })
    }

    /// Wrap a frame the caller already owns.
    pub fn new(frame: FrameNumber, frames: &'a FrameService) -> Self {
        Self { frame, frames }
    }

    /// The guarded frame's index.
    pub fn frame(&self) -> FrameNumber {
        self.frame
    }

    /// Release ownership of the frame without deallocating.
    pub fn leak(self) -> FrameNumber {
        let frame = self.frame;
        core::mem::forget(self);
        frame
    }
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.frames.free(self.frame);
    }
}
