//! Backend abstraction the SQL engine talks to.
//!
//! The engine performs every file-system operation through a `Vfs` and the
//! per-file handles it returns. One backend may wrap another to interpose
//! behavior; that is exactly what [`shim::ZnsVfs`] does on top of
//! [`host::HostVfs`].

pub mod host;
pub mod shim;

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bitflags::bitflags;

use crate::error::{Error, Result};

bitflags! {
    /// Flags for opening files. Values match the engine's C constants so a
    /// thin FFI layer can pass them straight through.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const READONLY        = 0x0000_0001;
        const READWRITE       = 0x0000_0002;
        const CREATE          = 0x0000_0004;
        const DELETE_ON_CLOSE = 0x0000_0008;
        const EXCLUSIVE       = 0x0000_0010;
        const MAIN_DB         = 0x0000_0100;
        const TEMP_DB         = 0x0000_0200;
        const TRANSIENT_DB    = 0x0000_0400;
        const MAIN_JOURNAL    = 0x0000_0800;
        const TEMP_JOURNAL    = 0x0000_1000;
        const SUBJOURNAL      = 0x0000_2000;
        const SUPER_JOURNAL   = 0x0000_4000;
        const WAL             = 0x0008_0000;
    }
}

bitflags! {
    /// Flags passed to `sync`. FULL shares NORMAL's bit, as in the engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SyncFlags: u32 {
        const NORMAL   = 0x0000_0002;
        const FULL     = 0x0000_0003;
        const DATAONLY = 0x0000_0010;
    }
}

bitflags! {
    /// Capabilities a backend may advertise for the device under a file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceCharacteristics: u32 {
        const ATOMIC              = 0x0000_0001;
        const ATOMIC512           = 0x0000_0002;
        const ATOMIC1K            = 0x0000_0004;
        const ATOMIC4K            = 0x0000_0010;
        const SAFE_APPEND         = 0x0000_0200;
        const SEQUENTIAL          = 0x0000_0400;
        const UNDELETABLE_WHEN_OPEN = 0x0000_0800;
        const POWERSAFE_OVERWRITE = 0x0000_1000;
        const IMMUTABLE           = 0x0000_2000;
        const BATCH_ATOMIC        = 0x0000_4000;
    }
}

bitflags! {
    /// Flags for shared-memory lock operations.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShmLockFlags: u32 {
        const UNLOCK    = 1;
        const LOCK      = 2;
        const SHARED    = 4;
        const EXCLUSIVE = 8;
    }
}

/// The engine's five-level file lock ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LockLevel {
    #[default]
    None,
    Shared,
    Reserved,
    Pending,
    Exclusive,
}

/// What `Vfs::access` should check for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessCheck {
    /// Does the file exist?
    Exists,
    /// Is the file readable and writable?
    ReadWrite,
    /// Is the file readable?
    Read,
}

/// The file-control opcodes the shim cares to model. Everything it does
/// not recognize travels as `Other` so pass-through stays lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileControl {
    /// Hint about the final size of the file.
    SizeHint(u64),
    /// Keep the WAL file on disk after the last connection closes.
    PersistWal(bool),
    /// Toggle the powersafe-overwrite assumption.
    PowersafeOverwrite(bool),
    /// An opcode this crate does not interpret.
    Other(i32),
}

/// Per-file method table returned by [`Vfs::open`].
///
/// Methods take `&mut self`: the engine serializes operations on a single
/// handle, and the borrow checker holds it to that contract.
pub trait VfsFile {
    /// Read into `buf` at `offset`. Returns the byte count; a short read
    /// means end of file and the caller zero-fills the tail.
    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Write all of `buf` at `offset`.
    fn write(&mut self, buf: &[u8], offset: u64) -> Result<()>;

    /// Truncate the file to `size` bytes.
    fn truncate(&mut self, size: u64) -> Result<()>;

    /// Persist written data to the device.
    fn sync(&mut self, flags: SyncFlags) -> Result<()>;

    /// Current size of the file in bytes.
    fn file_size(&mut self) -> Result<u64>;

    /// Move up the lock ladder to `level`. `Ok(false)` means busy.
    fn lock(&mut self, level: LockLevel) -> Result<bool>;

    /// Move down the lock ladder to `level`.
    fn unlock(&mut self, level: LockLevel) -> Result<bool>;

    /// Is a reserved (or stronger) lock held on this file?
    fn check_reserved_lock(&mut self) -> Result<bool>;

    /// Backend-specific control operations. `Ok(false)` means the opcode
    /// was not handled.
    fn file_control(&mut self, op: FileControl) -> Result<bool>;

    /// Sector size of the device under this file.
    fn sector_size(&self) -> usize {
        4096
    }

    /// Capabilities of the device under this file.
    fn device_characteristics(&self) -> DeviceCharacteristics {
        DeviceCharacteristics::empty()
    }

    /// Map region `region` of the shared-memory index file.
    fn shm_map(&mut self, _region: usize, _size: usize, _extend: bool) -> Result<*mut u8> {
        Err(Error::unsupported("shared memory is not supported"))
    }

    /// Lock a range of shared-memory slots.
    fn shm_lock(&mut self, _offset: usize, _n: usize, _flags: ShmLockFlags) -> Result<()> {
        Err(Error::unsupported("shared memory is not supported"))
    }

    /// Memory barrier for shared-memory writers.
    fn shm_barrier(&mut self) {}

    /// Unmap the shared-memory file, deleting it if `delete` is set.
    fn shm_unmap(&mut self, _delete: bool) -> Result<()> {
        Ok(())
    }

    /// Fetch a memory-mapped view of `amount` bytes at `offset`, if the
    /// backend supports mmap. `None` falls back to `read`.
    fn fetch(&mut self, _offset: u64, _amount: usize) -> Result<Option<*const u8>> {
        Ok(None)
    }

    /// Release a view returned by `fetch`.
    fn unfetch(&mut self, _offset: u64, _ptr: *const u8) -> Result<()> {
        Ok(())
    }

    /// Flush backend state and release resources. Dropping a handle that
    /// was never closed must release the same resources.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A file-system backend.
pub trait Vfs {
    type File: VfsFile;

    /// Open `path`, honoring `flags`.
    fn open(&self, path: &Path, flags: OpenFlags) -> Result<Self::File>;

    /// Delete `path`. With `sync_dir`, also sync the containing directory
    /// so the unlink survives a crash.
    fn delete(&self, path: &Path, sync_dir: bool) -> Result<()>;

    /// Check whether `path` satisfies `check`.
    fn access(&self, path: &Path, check: AccessCheck) -> Result<bool>;

    /// Expand `path` to an absolute path.
    fn full_pathname(&self, path: &Path) -> Result<PathBuf>;

    /// Fill `buf` with random bytes.
    fn randomness(&self, buf: &mut [u8]);

    /// Sleep for at least `duration`; returns the time actually slept.
    fn sleep(&self, duration: Duration) -> Duration;

    /// Current time as a Julian day number.
    fn current_time(&self) -> f64;

    /// Current time in milliseconds since the Julian epoch.
    fn current_time_millis(&self) -> i64;

    /// Last OS error code and message.
    fn last_error(&self) -> (i32, String) {
        (0, String::new())
    }

    /// Load a dynamic library.
    fn dlopen(&self, _path: &Path) -> Result<*mut c_void> {
        Err(Error::unsupported("dynamic loading is not supported"))
    }

    /// Message for the most recent dynamic-loader failure.
    fn dlerror(&self) -> String {
        String::new()
    }

    /// Resolve `symbol` in a library returned by `dlopen`.
    fn dlsym(&self, _handle: *mut c_void, _symbol: &str) -> Option<*const c_void> {
        None
    }

    /// Unload a library returned by `dlopen`.
    fn dlclose(&self, _handle: *mut c_void) {}
}
