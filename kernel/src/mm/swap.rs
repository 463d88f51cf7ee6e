//! Swap device collaborator seam
//!
//! Eviction writes a page-sized buffer out to a fresh slot; a later
//! fault reads it back in, which releases the slot. Slots belonging to
//! pages that are never faulted back in are released at table teardown
//! via `discard`.

use alloc::boxed::Box;
use core::fmt;

use spin::Mutex;

use crate::error::KernelResult;

/// Index of a page-sized slot on the swap device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SwapSlot(pub u64);

impl fmt::Display for SwapSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "swap#{}", self.0)
    }
}

/// Operations the eviction path needs from the swap device.
pub trait SwapDevice: Send {
    /// Write one page of data to a fresh slot.
    fn write_out(&mut self, data: &[u8]) -> KernelResult<SwapSlot>;

    /// Read a slot back and release it.
    fn read_in(&mut self, slot: SwapSlot, buf: &mut [u8]) -> KernelResult<()>;

    /// Release a slot without reading it.
    fn discard(&mut self, slot: SwapSlot);
}

/// Shared front over the platform swap device.
pub struct SwapService {
    inner: Mutex<Box<dyn SwapDevice>>,
}

impl SwapService {
    pub fn new(device: Box<dyn SwapDevice>) -> Self {
        Self {
            inner: Mutex::new(device),
        }
    }

    pub fn write_out(&self, data: &[u8]) -> KernelResult<SwapSlot> {
        self.inner.lock().write_out(data)
    }

    pub fn read_in(&self, slot: SwapSlot, buf: &mut [u8]) -> KernelResult<()> {
        self.inner.lock().read_in(slot, buf)
    }

    pub fn discard(&self, slot: SwapSlot) {
        self.inner.lock().discard(slot);
    }
}
