//! Supplemental page table
//!
//! Per-process registry recording, for every known virtual page, where
//! its content currently lives: nowhere yet ([`PageState::Zero`]), in the
//! executable file ([`PageState::FileBacked`]), on the swap device
//! ([`PageState::Swapped`]), or in a physical frame
//! ([`PageState::Resident`]). The loader registers pages here in demand
//! mode and [`SupplementalPageTable::demand_load`] resolves the fault
//! when the page is first touched.
//!
//! Frame ownership: an installed frame belongs to the translation root
//! it was installed into, and `Mmu::destroy_root` is its single release
//! point. Entries hold non-owning [`FrameNumber`] indices; the only
//! window where a frame is loose is inside `demand_load`, covered by
//! [`FrameGuard`].

use alloc::collections::{btree_map, BTreeMap, VecDeque};

use crate::{
    error::{KernelError, KernelResult},
    fs::{FileHandle, FsService},
    mm::{
        FrameNumber, FrameService, MmuService, RootId, SwapService, SwapSlot, VirtualAddress,
        PAGE_SIZE,
    },
    raii::FrameGuard,
};

// ===========================================================================
// Entry types
// ===========================================================================

/// Where a page's content currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Never materialized; filled with zeros on first access.
    Zero,
    /// Still in the executable: `read_len` bytes at `offset`, the
    /// remaining `zero_len` bytes of the page zero-filled.
    FileBacked {
        file: FileHandle,
        offset: u64,
        read_len: usize,
        zero_len: usize,
    },
    /// Evicted to the swap device.
    Swapped { slot: SwapSlot },
    /// In a physical frame, installed in the hardware table. `dirty` is
    /// true when the frame is the only copy of the content.
    Resident { frame: FrameNumber, dirty: bool },
}

/// One supplemental entry.
///
/// `writable` lives on the entry rather than the state so the page keeps
/// its protection across the FileBacked → Resident → Swapped → Resident
/// round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageEntry {
    pub writable: bool,
    pub state: PageState,
}

/// The collaborator services a fault resolution runs against.
#[derive(Clone, Copy)]
pub struct PageContext<'a> {
    pub fs: &'a FsService,
    pub frames: &'a FrameService,
    pub mmu: &'a MmuService,
    pub swap: &'a SwapService,
}

// ===========================================================================
// Table
// ===========================================================================

/// Per-process map from page-aligned virtual address to [`PageEntry`],
/// plus the second-chance ring its eviction policy walks.
pub struct SupplementalPageTable {
    entries: BTreeMap<VirtualAddress, PageEntry>,
    resident: VecDeque<VirtualAddress>,
}

impl SupplementalPageTable {
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            resident: VecDeque::new(),
        }
    }

    /// Register a zero-fill page at `va`.
    pub fn register_zero(&mut self, va: VirtualAddress, writable: bool) -> KernelResult<()> {
        self.register(
            va,
            PageEntry {
                writable,
                state: PageState::Zero,
            },
        )
    }

    /// Register a file-backed page at `va`: `read_len` bytes from `file`
    /// at `offset`, then `zero_len` bytes of fill.
    pub fn register_file_backed(
        &mut self,
        va: VirtualAddress,
        file: FileHandle,
        offset: u64,
        read_len: usize,
        zero_len: usize,
        writable: bool,
    ) -> KernelResult<()> {
        debug_assert_eq!(read_len + zero_len, PAGE_SIZE);
        self.register(
            va,
            PageEntry {
                writable,
                state: PageState::FileBacked {
                    file,
                    offset,
                    read_len,
                    zero_len,
                },
            },
        )
    }

    fn register(&mut self, va: VirtualAddress, entry: PageEntry) -> KernelResult<()> {
        if !va.is_page_aligned() {
            return Err(KernelError::InvalidAddress { addr: va.as_u64() });
        }
        match self.entries.entry(va) {
            btree_map::Entry::Occupied(_) => {
                Err(KernelError::AlreadyMapped { addr: va.as_u64() })
            }
            btree_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                Ok(())
            }
        }
    }

    /// The entry registered at `va`, if any.
    pub fn lookup(&self, va: VirtualAddress) -> Option<&PageEntry> {
        self.entries.get(&va)
    }

    /// Number of registered pages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Materialize the page at `va` into `root`.
    ///
    /// `UnmappedPage` means no entry covers `va` and the caller should
    /// treat the fault as a genuine access violation. A Resident entry is
    /// a no-op success. Allocation failure evicts one of this table's own
    /// resident pages and retries once; a second failure is fatal to the
    /// process (`OutOfMemory`, never retried).
    pub fn demand_load(
        &mut self,
        va: VirtualAddress,
        root: RootId,
        ctx: &PageContext<'_>,
    ) -> KernelResult<()> {
        if !va.is_page_aligned() {
            return Err(KernelError::InvalidAddress { addr: va.as_u64() });
        }
        let entry = *self
            .entries
            .get(&va)
            .ok_or(KernelError::UnmappedPage { addr: va.as_u64() })?;
        if let PageState::Resident { .. } = entry.state {
            return Ok(());
        }

        // Swap content overwrites the whole page; the other states rely
        // on a zeroed frame for their fill bytes.
        let zeroed = !matches!(entry.state, PageState::Swapped { .. });
        let guard = self.obtain_frame(zeroed, root, ctx)?;

        // Install first, populate second: nothing observes the mapping
        // until the faulting context resumes, and the frame has a single
        // owner (the root) from here on.
        ctx.mmu.map(root, va, guard.frame(), entry.writable)?;
        let frame = guard.leak();

        let populated = match entry.state {
            PageState::Zero => Ok(false),
            PageState::FileBacked {
                file,
                offset,
                read_len,
                ..
            } => {
                let mut fs = ctx.fs.lock();
                let got = ctx
                    .frames
                    .with_frame_mut(frame, |buf| fs.read_at(file, &mut buf[..read_len], offset));
                if got == read_len {
                    Ok(false)
                } else {
                    Err(KernelError::DiskReadFailed {
                        requested: read_len,
                        got,
                    })
                }
            }
            PageState::Swapped { slot } => ctx
                .frames
                .with_frame_mut(frame, |buf| ctx.swap.read_in(slot, buf))
                .map(|()| true),
            PageState::Resident { .. } => Ok(false),
        };

        let dirty = match populated {
            Ok(dirty) => dirty,
            Err(err) => {
                // Take the frame back from the root and return it.
                if let Some(frame) = ctx.mmu.unmap(root, va) {
                    ctx.frames.free(frame);
                }
                return Err(err);
            }
        };

        if let Some(entry) = self.entries.get_mut(&va) {
            entry.state = PageState::Resident { frame, dirty };
        }
        self.resident.push_back(va);
        log::debug!(target: "vm", "demand-loaded {} into {}", va, frame);
        Ok(())
    }

    /// Release the table's bookkeeping.
    ///
    /// Swapped entries return their slots to the device. Frames of
    /// Resident entries are left alone: they belong to the translation
    /// root and come back through `Mmu::destroy_root`.
    pub fn teardown(&mut self, swap: &SwapService) {
        for (_, entry) in core::mem::take(&mut self.entries) {
            if let PageState::Swapped { slot } = entry.state {
                swap.discard(slot);
            }
        }
        self.resident.clear();
    }

    // =======================================================================
    // Eviction
    // =======================================================================

    fn obtain_frame<'a>(
        &mut self,
        zeroed: bool,
        root: RootId,
        ctx: &PageContext<'a>,
    ) -> KernelResult<FrameGuard<'a>> {
        if let Some(guard) = FrameGuard::allocate(ctx.frames, zeroed) {
            return Ok(guard);
        }
        self.evict_one(root, ctx)?;
        FrameGuard::allocate(ctx.frames, zeroed)
            .ok_or(KernelError::OutOfMemory { requested_pages: 1 })
    }

    /// Second-chance replacement over this table's own resident pages.
    ///
    /// Pages whose accessed bit is set get the bit cleared and go to the
    /// back of the ring; the first page found with a clear bit is written
    /// to a fresh swap slot, unmapped, and its frame freed. The faulting
    /// page is never resident, so it is structurally never a candidate.
    /// Two sweeps bound the walk: after the first, every surviving
    /// candidate has a clear bit.
    fn evict_one(&mut self, root: RootId, ctx: &PageContext<'_>) -> KernelResult<()> {
        let mut budget = self.resident.len() * 2 + 1;
        while budget > 0 {
            budget -= 1;
            let va = match self.resident.pop_front() {
                Some(va) => va,
                None => break,
            };
            // Entries that stopped being resident since they were queued
            // are stale; drop them.
            let (frame, was_dirty) = match self.entries.get(&va) {
                Some(PageEntry {
                    state: PageState::Resident { frame, dirty },
                    ..
                }) => (*frame, *dirty),
                _ => continue,
            };
            if ctx.mmu.is_accessed(root, va) {
                ctx.mmu.clear_accessed(root, va);
                self.resident.push_back(va);
                continue;
            }

            let dirty = was_dirty || ctx.mmu.is_dirty(root, va);
            let slot = match ctx.frames.with_frame(frame, |buf| ctx.swap.write_out(buf)) {
                Ok(slot) => slot,
                Err(err) => {
                    self.resident.push_front(va);
                    return Err(err);
                }
            };
            let unmapped = ctx.mmu.unmap(root, va);
            debug_assert_eq!(unmapped, Some(frame));
            ctx.frames.free(frame);
            if let Some(entry) = self.entries.get_mut(&va) {
                entry.state = PageState::Swapped { slot };
            }
            log::debug!(
                target: "vm",
                "evicted {} ({}) to {}",
                va,
                if dirty { "dirty" } else { "clean" },
                slot
            );
            return Ok(());
        }
        Err(KernelError::OutOfMemory { requested_pages: 1 })
    }
}

impl Default for SupplementalPageTable {
    fn default() -> Self {
        Self::new()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Services;

    fn page(n: u64) -> VirtualAddress {
        VirtualAddress::new(n * PAGE_SIZE as u64)
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let mut spt = SupplementalPageTable::new();
        spt.register_zero(page(1), true).unwrap();

        let err = spt
            .register_file_backed(page(1), FileHandle(9), 0, 64, PAGE_SIZE - 64, false)
            .unwrap_err();
        assert_eq!(
            err,
            KernelError::AlreadyMapped {
                addr: page(1).as_u64()
            }
        );
        // The first registration is untouched.
        assert_eq!(spt.lookup(page(1)).unwrap().state, PageState::Zero);
        assert_eq!(spt.len(), 1);
    }

    #[test]
    fn test_register_requires_page_alignment() {
        let mut spt = SupplementalPageTable::new();
        let err = spt
            .register_zero(VirtualAddress::new(0x1004), true)
            .unwrap_err();
        assert_eq!(err, KernelError::InvalidAddress { addr: 0x1004 });
    }

    #[test]
    fn test_demand_load_unregistered_page() {
        let services = Services::new(4);
        let root = services.mmu.create_root().unwrap();
        let mut spt = SupplementalPageTable::new();

        let err = spt
            .demand_load(page(3), root, &services.context())
            .unwrap_err();
        assert_eq!(
            err,
            KernelError::UnmappedPage {
                addr: page(3).as_u64()
            }
        );
    }

    #[test]
    fn test_zero_page_resolves_to_zeroed_frame() {
        let services = Services::new(4);
        let root = services.mmu.create_root().unwrap();
        let mut spt = SupplementalPageTable::new();
        spt.register_zero(page(2), true).unwrap();

        spt.demand_load(page(2), root, &services.context()).unwrap();

        let frame = services.mmu.translate(root, page(2)).unwrap();
        services
            .frames
            .with_frame(frame, |buf| assert!(buf.iter().all(|&b| b == 0)));
        assert_eq!(
            spt.lookup(page(2)).unwrap().state,
            PageState::Resident { frame, dirty: false }
        );

        // Resident pages are a no-op success.
        spt.demand_load(page(2), root, &services.context()).unwrap();
        assert_eq!(services.mmu.translate(root, page(2)), Some(frame));
    }

    #[test]
    fn test_file_backed_page_reads_and_fills() {
        let services = Services::new(4);
        services.mem_fs.insert("app", alloc::vec![0xAB; 100]);
        let root = services.mmu.create_root().unwrap();

        let file = {
            let mut fs = services.fs.lock();
            fs.open("app").unwrap()
        };

        let mut spt = SupplementalPageTable::new();
        spt.register_file_backed(page(4), file, 0, 100, PAGE_SIZE - 100, false)
            .unwrap();
        spt.demand_load(page(4), root, &services.context()).unwrap();

        let frame = services.mmu.translate(root, page(4)).unwrap();
        services.frames.with_frame(frame, |buf| {
            assert!(buf[..100].iter().all(|&b| b == 0xAB));
            assert!(buf[100..].iter().all(|&b| b == 0));
        });
        assert_eq!(services.mem_mmu.writable(root, page(4)), Some(false));
    }

    #[test]
    fn test_short_file_read_fails_and_releases_frame() {
        let services = Services::new(4);
        services.mem_fs.insert("tiny", alloc::vec![1u8; 10]);
        let root = services.mmu.create_root().unwrap();
        let file = {
            let mut fs = services.fs.lock();
            fs.open("tiny").unwrap()
        };

        let mut spt = SupplementalPageTable::new();
        spt.register_file_backed(page(5), file, 0, 100, PAGE_SIZE - 100, true)
            .unwrap();
        let err = spt
            .demand_load(page(5), root, &services.context())
            .unwrap_err();

        assert_eq!(
            err,
            KernelError::DiskReadFailed {
                requested: 100,
                got: 10
            }
        );
        assert_eq!(services.mmu.translate(root, page(5)), None);
        assert_eq!(services.frame_stats.live(), 0);
    }

    #[test]
    fn test_eviction_round_trips_through_swap() {
        let services = Services::new(1);
        let root = services.mmu.create_root().unwrap();
        let mut spt = SupplementalPageTable::new();
        spt.register_zero(page(1), true).unwrap();
        spt.register_zero(page(2), true).unwrap();
        let ctx = services.context();

        spt.demand_load(page(1), root, &ctx).unwrap();
        let frame = services.mmu.translate(root, page(1)).unwrap();
        services
            .frames
            .with_frame_mut(frame, |buf| buf[0] = 0x5A);

        // One frame total: loading the second page evicts the first.
        spt.demand_load(page(2), root, &ctx).unwrap();
        assert!(matches!(
            spt.lookup(page(1)).unwrap().state,
            PageState::Swapped { .. }
        ));
        assert_eq!(services.mem_swap.live_slots(), 1);
        assert_eq!(services.mmu.translate(root, page(1)), None);

        // Faulting the first page back evicts the second and restores
        // the written byte.
        spt.demand_load(page(1), root, &ctx).unwrap();
        let restored = services.mmu.translate(root, page(1)).unwrap();
        services.frames.with_frame(restored, |buf| {
            assert_eq!(buf[0], 0x5A);
            assert!(buf[1..].iter().all(|&b| b == 0));
        });
        // Swap-origin content lives only in the frame.
        assert_eq!(
            spt.lookup(page(1)).unwrap().state,
            PageState::Resident {
                frame: restored,
                dirty: true
            }
        );
        assert!(matches!(
            spt.lookup(page(2)).unwrap().state,
            PageState::Swapped { .. }
        ));
    }

    #[test]
    fn test_second_chance_prefers_unaccessed_victim() {
        let services = Services::new(2);
        let root = services.mmu.create_root().unwrap();
        let mut spt = SupplementalPageTable::new();
        spt.register_zero(page(1), true).unwrap();
        spt.register_zero(page(2), true).unwrap();
        spt.register_zero(page(3), true).unwrap();
        let ctx = services.context();

        spt.demand_load(page(1), root, &ctx).unwrap();
        spt.demand_load(page(2), root, &ctx).unwrap();
        services.mem_mmu.set_accessed(root, page(1));

        // Page 1 is accessed and gets a second chance; page 2 is the
        // victim.
        spt.demand_load(page(3), root, &ctx).unwrap();
        assert!(matches!(
            spt.lookup(page(1)).unwrap().state,
            PageState::Resident { .. }
        ));
        assert!(matches!(
            spt.lookup(page(2)).unwrap().state,
            PageState::Swapped { .. }
        ));
    }

    #[test]
    fn test_fault_with_nothing_to_evict_is_fatal() {
        let services = Services::new(0);
        let root = services.mmu.create_root().unwrap();
        let mut spt = SupplementalPageTable::new();
        spt.register_zero(page(1), true).unwrap();

        let err = spt
            .demand_load(page(1), root, &services.context())
            .unwrap_err();
        assert_eq!(err, KernelError::OutOfMemory { requested_pages: 1 });
    }

    #[test]
    fn test_teardown_discards_swap_slots_only() {
        let services = Services::new(1);
        let root = services.mmu.create_root().unwrap();
        let mut spt = SupplementalPageTable::new();
        spt.register_zero(page(1), true).unwrap();
        spt.register_zero(page(2), true).unwrap();
        let ctx = services.context();

        spt.demand_load(page(1), root, &ctx).unwrap();
        spt.demand_load(page(2), root, &ctx).unwrap(); // evicts page 1
        assert_eq!(services.mem_swap.live_slots(), 1);

        spt.teardown(&services.swap);
        assert!(spt.is_empty());
        assert_eq!(services.mem_swap.live_slots(), 0);
        // The resident frame stays with the root until it is destroyed.
        assert_eq!(services.frame_stats.live(), 1);
    }
}
