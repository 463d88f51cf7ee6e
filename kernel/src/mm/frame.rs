//! Physical frame collaborator seam
//!
//! Frames are referred to by index ([`FrameNumber`]), never by pointer.
//! The platform's [`FrameAllocator`] owns the backing memory and exposes
//! frame contents as slices keyed by index, so the process core can fill
//! and inspect frames without knowing where they live. [`FrameService`]
//! is the shared, mutex-guarded front the rest of the crate uses.

use alloc::boxed::Box;
use core::fmt;

use spin::Mutex;

use crate::mm::PAGE_SIZE;

/// Index of a physical frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameNumber(u64);

impl FrameNumber {
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame#{}", self.0)
    }
}

/// Operations the process core needs from the physical allocator.
///
/// `frame` / `frame_mut` return the `PAGE_SIZE` content slice of an
/// allocated frame. Passing a frame number that is not currently
/// allocated is a caller bug and implementations may panic.
pub trait FrameAllocator: Send {
    /// Allocate one frame, optionally zero-filled. `None` when exhausted.
    fn allocate(&mut self, zeroed: bool) -> Option<FrameNumber>;

    /// Return a frame to the pool.
    fn free(&mut self, frame: FrameNumber);

    fn frame(&self, frame: FrameNumber) -> &[u8];

    fn frame_mut(&mut self, frame: FrameNumber) -> &mut [u8];
}

/// Shared front over the platform allocator.
pub struct FrameService {
    inner: Mutex<Box<dyn FrameAllocator>>,
}

impl FrameService {
    pub fn new(allocator: Box<dyn FrameAllocator>) -> Self {
        Self {
            inner: Mutex::new(allocator),
        }
    }

    /// Allocate one frame, optionally zero-filled.
    pub fn allocate(&self, zeroed: bool) -> Option<FrameNumber> {
        self.inner.lock().allocate(zeroed)
    }

    /// Return a frame to the pool.
    pub fn free(&self, frame: FrameNumber) {
        self.inner.lock().free(frame);
    }

    /// Run `f` over the frame's contents.
    pub fn with_frame<R>(&self, frame: FrameNumber, f: impl FnOnce(&[u8]) -> R) -> R {
        let guard = self.inner.lock();
        let slice = guard.frame(frame);
        debug_assert_eq!(slice.len(), PAGE_SIZE);
        f(slice)
    }

    /// Run `f` over the frame's contents, mutably.
    pub fn with_frame_mut<R>(&self, frame: FrameNumber, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut guard = self.inner.lock();
        let slice = guard.frame_mut(frame);
        debug_assert_eq!(slice.len(), PAGE_SIZE);
        f(slice)
    }
}
