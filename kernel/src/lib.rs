//! CeruleanOS Kernel Library
//!
//! Process address-space construction and demand paging for CeruleanOS:
//! executable loading and validation, argument stack marshalling, the
//! parent/child process lifecycle protocol, and the per-process
//! supplemental page table that makes lazy loading possible.
//!
//! The hardware and platform layers are consumed through collaborator
//! traits ([`fs::FileSystem`], [`mm::FrameAllocator`], [`mm::Mmu`],
//! [`mm::SwapDevice`], [`sched::Scheduler`], [`sched::UserMode`]), so the
//! crate builds both freestanding and hosted; the test suite drives it on
//! the host with the in-memory collaborators from [`testing`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod error;
pub mod fs;
pub mod loader;
pub mod mm;
pub mod process;
pub mod raii;
pub mod sched;
pub mod testing;

// Re-export the items nearly every embedder needs
pub use error::{KernelError, KernelResult};
pub use mm::{FrameNumber, RootId, VirtualAddress, PAGE_SIZE};
pub use process::{LoadMode, Pid, Platform, ProcessManager};
pub use sched::InitialRegisters;
