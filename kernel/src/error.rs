//! Error types for the CeruleanOS process and memory core
//!
//! One kernel-wide error enum with context-carrying variants, plus the
//! loader- and stack-specific sub-enums it wraps. Everything implements
//! `Display` so failures read well in logs and panics.

use core::fmt;

/// Main kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Memory-related errors
    OutOfMemory {
        requested_pages: usize,
    },
    InvalidAddress {
        addr: u64,
    },
    /// No supplemental entry covers the faulting page.
    UnmappedPage {
        addr: u64,
    },
    /// A supplemental entry already exists at this page.
    AlreadyMapped {
        addr: u64,
    },
    /// The hardware table refused the mapping (slot occupied).
    InstallConflict {
        addr: u64,
    },

    /// Process-related errors
    ProcessNotFound {
        pid: u64,
    },
    /// The child reported a failed load back to `create`.
    LoadFailed {
        pid: u64,
    },
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
    SpawnFailed {
        pid: u64,
    },

    /// Backing-store I/O errors
    DiskReadFailed {
        requested: usize,
        got: usize,
    },
    SwapExhausted,

    /// Executable loading errors
    LoadError(LoadError),
    /// Argument marshalling errors
    StackError(StackError),
}

/// Loader-specific errors, one variant per rejection class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The named executable does not exist.
    OpenFailed,
    /// Header validation failed (magic, class, type, machine, version,
    /// header sizes, or program-header count).
    InvalidFormat,
    /// Dynamic-linking segment kinds are rejected, never supported.
    UnsupportedSegment { kind: u32 },
    /// A loadable segment violated a `validate_segment` rule.
    InvalidSegment,
    /// A segment page collides with an existing mapping.
    AlreadyMapped { addr: u64 },
    /// Frame allocation failed while materializing a page.
    OutOfMemory,
    /// The hardware table refused a segment or stack page.
    InstallConflict { addr: u64 },
    /// The file ended before a segment's recorded bytes.
    ShortRead { requested: usize, got: usize },
    /// Argument marshalling failed.
    Arguments(StackError),
}

/// Stack-builder errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    /// The strings exceed the byte budget or the token count exceeds the
    /// count budget. Nothing was written.
    ArgumentsTooLarge,
}

/// Result type alias for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory { requested_pages } => {
                write!(f, "Out of memory: requested {} page(s)", requested_pages)
            }
            Self::InvalidAddress { addr } => write!(f, "Invalid address: {:#x}", addr),
            Self::UnmappedPage { addr } => write!(f, "No entry for page at {:#x}", addr),
            Self::AlreadyMapped { addr } => write!(f, "Page at {:#x} is already mapped", addr),
            Self::InstallConflict { addr } => {
                write!(f, "Hardware mapping at {:#x} already present", addr)
            }
            Self::ProcessNotFound { pid } => write!(f, "Process {} not found", pid),
            Self::LoadFailed { pid } => write!(f, "Process {} failed to load", pid),
            Self::InvalidState { expected, actual } => {
                write!(f, "Invalid state: expected {}, got {}", expected, actual)
            }
            Self::SpawnFailed { pid } => write!(f, "Could not spawn context for process {}", pid),
            Self::DiskReadFailed { requested, got } => {
                write!(f, "Disk read returned {} of {} bytes", got, requested)
            }
            Self::SwapExhausted => write!(f, "No free swap slots"),
            Self::LoadError(e) => write!(f, "Load error: {}", e),
            Self::StackError(e) => write!(f, "Stack error: {}", e),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "open failed"),
            Self::InvalidFormat => write!(f, "error loading executable"),
            Self::UnsupportedSegment { kind } => {
                write!(f, "unsupported segment type {:#x}", kind)
            }
            Self::InvalidSegment => write!(f, "invalid loadable segment"),
            Self::AlreadyMapped { addr } => {
                write!(f, "segment page {:#x} already mapped", addr)
            }
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InstallConflict { addr } => {
                write!(f, "mapping conflict at {:#x}", addr)
            }
            Self::ShortRead { requested, got } => {
                write!(f, "short read: {} of {} bytes", got, requested)
            }
            Self::Arguments(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ArgumentsTooLarge => write!(f, "arguments exceed stack budgets"),
        }
    }
}

// Conversion implementations
impl From<LoadError> for KernelError {
    fn from(err: LoadError) -> Self {
        Self::LoadError(err)
    }
}

impl From<StackError> for KernelError {
    fn from(err: StackError) -> Self {
        Self::StackError(err)
    }
}

impl From<StackError> for LoadError {
    fn from(err: StackError) -> Self {
        Self::Arguments(err)
    }
}
