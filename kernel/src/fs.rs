//! Filesystem collaborator seam
//!
//! The loader and lifecycle paths touch files only through [`FsService`],
//! one shared mutex around the platform's [`FileSystem`] implementation.
//! A load holds the guard for its entire duration; dropping the guard is
//! what releases the lock, so every exit path releases it.

use alloc::boxed::Box;
use core::fmt;

use spin::{Mutex, MutexGuard};

/// Opaque handle to an open file, issued by the [`FileSystem`] impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FileHandle(pub u64);

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

/// Operations the process core needs from the filesystem layer.
///
/// `read_at` subsumes the seek-then-read pair. `deny_write` marks an open
/// file as an executable in use: writers are rejected until the matching
/// `allow_write`. Implementations keep their own handle table; handles
/// are only meaningful to the implementation that issued them.
pub trait FileSystem: Send {
    /// Open `name` for reading. `None` if it does not exist.
    fn open(&mut self, name: &str) -> Option<FileHandle>;

    /// Close `handle`. Closing also drops any write denial it still holds.
    fn close(&mut self, handle: FileHandle);

    /// Read up to `buf.len()` bytes at `offset`, returning the count read.
    fn read_at(&mut self, handle: FileHandle, buf: &mut [u8], offset: u64) -> usize;

    /// Length of the file in bytes.
    fn length(&mut self, handle: FileHandle) -> u64;

    /// Reject writers to this file until `allow_write`.
    fn deny_write(&mut self, handle: FileHandle);

    /// Re-admit writers previously rejected by `deny_write`.
    fn allow_write(&mut self, handle: FileHandle);
}

/// Guard type for scoped filesystem access.
pub type FsGuard<'a> = MutexGuard<'a, Box<dyn FileSystem>>;

/// The single shared filesystem lock, as an owned service object.
pub struct FsService {
    inner: Mutex<Box<dyn FileSystem>>,
}

impl FsService {
    pub fn new(fs: Box<dyn FileSystem>) -> Self {
        Self {
            inner: Mutex::new(fs),
        }
    }

    /// Acquire exclusive filesystem access for the guard's lifetime.
    pub fn lock(&self) -> FsGuard<'_> {
        self.inner.lock()
    }
}
