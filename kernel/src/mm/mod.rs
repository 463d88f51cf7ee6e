//! Memory management for the process core
//!
//! Address arithmetic, the frame/MMU/swap collaborator seams, and the
//! per-process supplemental page table.

pub mod frame;
pub mod mmu;
pub mod spt;
pub mod swap;

pub use frame::{FrameAllocator, FrameNumber, FrameService};
pub use mmu::{MapConflict, Mmu, MmuService, RootId};
pub use spt::{PageContext, PageEntry, PageState, SupplementalPageTable};
pub use swap::{SwapDevice, SwapService, SwapSlot};

use core::fmt;

/// Size of a virtual page and a physical frame in bytes.
pub const PAGE_SIZE: usize = 4096;

/// First address past the user portion of the address space.
///
/// User mappings must lie entirely below this; the canonical lower half
/// of the x86_64 layout.
pub const USER_SPACE_END: u64 = 0x0000_8000_0000_0000;

/// Initial user stack pointer. The first stack page is mapped just below.
pub const USER_STACK_TOP: u64 = USER_SPACE_END;

/// A virtual address.
///
/// Plain `u64` arithmetic invites mixing file offsets, lengths, and
/// addresses; the newtype keeps page rounding in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Offset of this address within its page.
    pub const fn page_offset(self) -> u64 {
        self.0 % PAGE_SIZE as u64
    }

    /// Round down to the containing page boundary.
    pub const fn page_round_down(self) -> Self {
        Self(self.0 - self.page_offset())
    }

    pub const fn is_page_aligned(self) -> bool {
        self.page_offset() == 0
    }

    /// Whether the address lies within the user portion of the space.
    pub const fn is_user(self) -> bool {
        self.0 < USER_SPACE_END
    }

    pub const fn add(self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }

    pub const fn sub(self, bytes: u64) -> Self {
        Self(self.0 - bytes)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Round a byte count up to a whole number of pages.
pub const fn round_up_to_page(bytes: u64) -> u64 {
    let page = PAGE_SIZE as u64;
    bytes.div_ceil(page) * page
}
