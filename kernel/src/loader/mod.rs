//! Executable loading
//!
//! Parses and validates an ELF64 executable from an untrusted image and
//! materializes it into a fresh address space. Every byte of the file is
//! mistrusted: the header is checked field by field, program headers are
//! counted against a hard cap, and each loadable segment must pass the
//! placement rules in [`validate_segment`] before a single page maps.
//!
//! Segments materialize in one of two ways. Eager mode allocates and
//! fills every page during the load. Demand mode only registers each
//! page in the process's supplemental table and lets the first fault
//! pull the content in. The stack page and the argv block on it are
//! always built eagerly.

pub mod stack;

use core::mem;

use bitflags::bitflags;

use crate::{
    error::LoadError,
    fs::{FileHandle, FsGuard},
    mm::{round_up_to_page, PageContext, RootId, VirtualAddress, PAGE_SIZE, USER_SPACE_END,
        USER_STACK_TOP},
    process::{LoadMode, Process},
    raii::FrameGuard,
    sched::InitialRegisters,
};

/// `\x7fELF`
const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
const CLASS_ELF64: u8 = 2;
const DATA_LITTLE_ENDIAN: u8 = 1;
const TYPE_EXECUTABLE: u16 = 2;
const MACHINE_X86_64: u16 = 62;

/// Loadable segment (`p_type`).
const PT_LOAD: u32 = 1;
/// Dynamic-linking metadata; never supported.
const PT_DYNAMIC: u32 = 2;
/// Interpreter request; never supported.
const PT_INTERP: u32 = 3;
/// Reserved legacy kind; rejected alongside the dynamic ones.
const PT_SHLIB: u32 = 5;

/// Hard cap on program-header count, so a hostile header cannot demand
/// unbounded iteration.
pub const PHDR_MAX: u16 = 1024;

bitflags! {
    /// Segment permission bits (`p_flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u32 {
        const EXEC = 1 << 0;
        const WRITE = 1 << 1;
        const READ = 1 << 2;
    }
}

/// ELF64 file header, as it sits at offset 0.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct ElfHeader {
    magic: [u8; 4],
    class: u8,
    data: u8,
    ident_version: u8,
    os_abi: u8,
    abi_version: u8,
    padding: [u8; 7],
    elf_type: u16,
    machine: u16,
    version: u32,
    entry: u64,
    phoff: u64,
    shoff: u64,
    flags: u32,
    ehsize: u16,
    phentsize: u16,
    phnum: u16,
    shentsize: u16,
    shnum: u16,
    shstrndx: u16,
}

/// ELF64 program header.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct ProgramHeader {
    p_type: u32,
    p_flags: u32,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
}

fn parse_header(buf: &[u8; mem::size_of::<ElfHeader>()]) -> ElfHeader {
    // SAFETY: ElfHeader is plain-old-data with repr(C), the buffer is
    // exactly its size, and read_unaligned has no alignment requirement.
    unsafe { core::ptr::read_unaligned(buf.as_ptr().cast::<ElfHeader>()) }
}

fn parse_program_header(buf: &[u8; mem::size_of::<ProgramHeader>()]) -> ProgramHeader {
    // SAFETY: same as parse_header; ProgramHeader is repr(C) POD of the
    // buffer's exact size.
    unsafe { core::ptr::read_unaligned(buf.as_ptr().cast::<ProgramHeader>()) }
}

/// Load `name` into `process`'s fresh address space and return the
/// register state user code starts from.
///
/// Runs in the child's context. The translation root is created and
/// activated first and stored on the process immediately, so the exit
/// path can tear it down even when loading fails halfway. The
/// filesystem stays locked for the whole load; the handle opened here is
/// closed on every path before the guard drops.
pub(crate) fn load(
    ctx: &PageContext<'_>,
    process: &Process,
    mode: LoadMode,
    name: &str,
    raw_args: &str,
) -> Result<InitialRegisters, LoadError> {
    let root = ctx.mmu.create_root().ok_or(LoadError::OutOfMemory)?;
    *process.root.lock() = Some(root);
    ctx.mmu.activate(Some(root));

    let mut loader = Loader {
        ctx,
        fs: ctx.fs.lock(),
        process,
        root,
        mode,
    };
    let file = match loader.fs.open(name) {
        Some(file) => file,
        None => {
            log::warn!(target: "loader", "{}: open failed", name);
            return Err(LoadError::OpenFailed);
        }
    };
    let result = loader.run(file, name, raw_args);
    loader.fs.close(file);
    result
}

/// One in-flight load: the collaborators plus the filesystem guard held
/// across the whole operation.
struct Loader<'a> {
    ctx: &'a PageContext<'a>,
    fs: FsGuard<'a>,
    process: &'a Process,
    root: RootId,
    mode: LoadMode,
}

impl Loader<'_> {
    fn run(
        &mut self,
        file: FileHandle,
        name: &str,
        raw_args: &str,
    ) -> Result<InitialRegisters, LoadError> {
        let file_len = self.fs.length(file);

        let mut buf = [0u8; mem::size_of::<ElfHeader>()];
        if self.fs.read_at(file, &mut buf, 0) != buf.len() {
            return Err(LoadError::InvalidFormat);
        }
        let ehdr = parse_header(&buf);
        validate_header(&ehdr)?;

        for i in 0..u64::from(ehdr.phnum) {
            let offset = ehdr
                .phoff
                .checked_add(i * mem::size_of::<ProgramHeader>() as u64)
                .ok_or(LoadError::InvalidFormat)?;
            if offset > file_len {
                return Err(LoadError::InvalidFormat);
            }
            let mut buf = [0u8; mem::size_of::<ProgramHeader>()];
            if self.fs.read_at(file, &mut buf, offset) != buf.len() {
                return Err(LoadError::InvalidFormat);
            }
            let phdr = parse_program_header(&buf);

            match phdr.p_type {
                PT_DYNAMIC | PT_INTERP | PT_SHLIB => {
                    return Err(LoadError::UnsupportedSegment { kind: phdr.p_type });
                }
                PT_LOAD => {
                    validate_segment(&phdr, file_len)?;
                    self.map_segment(file, &phdr)?;
                }
                // Metadata kinds (null, note, phdr table, TLS notes,
                // vendor extensions) carry nothing to map.
                _ => {}
            }
        }

        let stack_pointer = self.setup_stack(name, raw_args)?;
        log::debug!(target: "loader", "{}: entry {:#x}", name, ehdr.entry);
        Ok(InitialRegisters {
            entry: VirtualAddress::new(ehdr.entry),
            stack_pointer,
        })
    }

    /// Map one validated loadable segment, page by page.
    fn map_segment(&mut self, file: FileHandle, phdr: &ProgramHeader) -> Result<(), LoadError> {
        let page = PAGE_SIZE as u64;
        let writable = SegmentFlags::from_bits_truncate(phdr.p_flags).contains(SegmentFlags::WRITE);
        let page_offset = phdr.p_vaddr % page;
        let mut upage = VirtualAddress::new(phdr.p_vaddr - page_offset);
        let mut offset = phdr.p_offset - page_offset;

        // Split the occupied span into bytes that come from the file and
        // bytes that are zero fill. The file read starts at the segment's
        // page boundary, so the lead-in shares the page exactly as it
        // does on disk.
        let (mut read_bytes, mut zero_bytes) = if phdr.p_filesz > 0 {
            let read = page_offset + phdr.p_filesz;
            (read, round_up_to_page(page_offset + phdr.p_memsz) - read)
        } else {
            (0, round_up_to_page(page_offset + phdr.p_memsz))
        };
        debug_assert_eq!((read_bytes + zero_bytes) % page, 0);
        log::debug!(
            target: "loader",
            "segment at {} ({} file bytes, {} zero, {})",
            upage,
            read_bytes,
            zero_bytes,
            if writable { "rw" } else { "ro" }
        );

        while read_bytes > 0 || zero_bytes > 0 {
            let page_read = read_bytes.min(page) as usize;
            let page_zero = PAGE_SIZE - page_read;

            self.map_page(file, upage, offset, page_read, page_zero, writable)?;

            read_bytes -= page_read as u64;
            zero_bytes -= page_zero as u64;
            upage = upage.add(page);
            offset += page;
        }
        Ok(())
    }

    /// Materialize (eager) or register (demand) one segment page.
    fn map_page(
        &mut self,
        file: FileHandle,
        upage: VirtualAddress,
        offset: u64,
        page_read: usize,
        page_zero: usize,
        writable: bool,
    ) -> Result<(), LoadError> {
        // Overlapping segments are a rejected format, not a silent reuse
        // of whatever frame got there first.
        if self.ctx.mmu.translate(self.root, upage).is_some()
            || self.process.pages.lock().lookup(upage).is_some()
        {
            return Err(LoadError::AlreadyMapped {
                addr: upage.as_u64(),
            });
        }

        match self.mode {
            LoadMode::Eager => {
                let guard =
                    FrameGuard::allocate(self.ctx.frames, true).ok_or(LoadError::OutOfMemory)?;
                self.ctx
                    .mmu
                    .map(self.root, upage, guard.frame(), writable)
                    .map_err(|_| LoadError::InstallConflict {
                        addr: upage.as_u64(),
                    })?;
                let frame = guard.leak();

                if page_read > 0 {
                    let got = self.ctx.frames.with_frame_mut(frame, |buf| {
                        self.fs.read_at(file, &mut buf[..page_read], offset)
                    });
                    if got != page_read {
                        if let Some(frame) = self.ctx.mmu.unmap(self.root, upage) {
                            self.ctx.frames.free(frame);
                        }
                        return Err(LoadError::ShortRead {
                            requested: page_read,
                            got,
                        });
                    }
                }
                // The zero tail is the allocation's own fill.
            }
            LoadMode::Demand => {
                // Demand entries outlive this load, so they are backed by
                // the long-lived write-denied executable handle, not the
                // handle this load opened and is about to close.
                let backing = (*self.process.executable.lock()).unwrap_or(file);
                let mut pages = self.process.pages.lock();
                let registered = if page_read == 0 {
                    pages.register_zero(upage, writable)
                } else {
                    pages.register_file_backed(
                        upage,
                        backing,
                        offset,
                        page_read,
                        page_zero,
                        writable,
                    )
                };
                registered.map_err(|_| LoadError::AlreadyMapped {
                    addr: upage.as_u64(),
                })?;
            }
        }
        Ok(())
    }

    /// Map the single stack page and commit the argv block onto it.
    ///
    /// The block is built, and both argument budgets are checked, before
    /// any frame is touched; an oversized command line leaves no partial
    /// stack. The page maps eagerly in both modes.
    fn setup_stack(&mut self, name: &str, raw_args: &str) -> Result<VirtualAddress, LoadError> {
        let stack_top = VirtualAddress::new(USER_STACK_TOP);
        let stack_page = stack_top.sub(PAGE_SIZE as u64);

        let image = stack::build(stack_top, name, raw_args)?;

        let guard = FrameGuard::allocate(self.ctx.frames, true).ok_or(LoadError::OutOfMemory)?;
        self.ctx
            .mmu
            .map(self.root, stack_page, guard.frame(), true)
            .map_err(|_| LoadError::InstallConflict {
                addr: stack_page.as_u64(),
            })?;
        let frame = guard.leak();

        let start = (image.initial_sp().as_u64() - stack_page.as_u64()) as usize;
        self.ctx.frames.with_frame_mut(frame, |buf| {
            buf[start..].copy_from_slice(image.bytes());
        });

        Ok(image.initial_sp())
    }
}

fn validate_header(ehdr: &ElfHeader) -> Result<(), LoadError> {
    let ok = ehdr.magic == ELF_MAGIC
        && ehdr.class == CLASS_ELF64
        && ehdr.data == DATA_LITTLE_ENDIAN
        && ehdr.ident_version == 1
        && ehdr.elf_type == TYPE_EXECUTABLE
        && ehdr.machine == MACHINE_X86_64
        && ehdr.version == 1
        && ehdr.phentsize as usize == mem::size_of::<ProgramHeader>()
        && ehdr.phnum <= PHDR_MAX;
    if ok {
        Ok(())
    } else {
        Err(LoadError::InvalidFormat)
    }
}

/// Placement rules every loadable segment must pass.
fn validate_segment(phdr: &ProgramHeader, file_len: u64) -> Result<(), LoadError> {
    let page = PAGE_SIZE as u64;

    // File offset and virtual address must agree on their in-page offset.
    if phdr.p_offset % page != phdr.p_vaddr % page {
        return Err(LoadError::InvalidSegment);
    }
    // The segment must start inside the file.
    if phdr.p_offset > file_len {
        return Err(LoadError::InvalidSegment);
    }
    // The memory image may extend the file image, never truncate it.
    if phdr.p_memsz < phdr.p_filesz {
        return Err(LoadError::InvalidSegment);
    }
    // Empty segments have nothing to map.
    if phdr.p_memsz == 0 {
        return Err(LoadError::InvalidSegment);
    }
    // The whole span must sit in user space, without wrapping.
    let end = phdr
        .p_vaddr
        .checked_add(phdr.p_memsz)
        .ok_or(LoadError::InvalidSegment)?;
    if phdr.p_vaddr >= USER_SPACE_END || end > USER_SPACE_END {
        return Err(LoadError::InvalidSegment);
    }
    // The first page stays unmapped so null dereferences keep faulting.
    if phdr.p_vaddr < page {
        return Err(LoadError::InvalidSegment);
    }
    Ok(())
}
