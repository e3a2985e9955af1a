//! # ZNS write-ahead-log backend shim
//!
//! A pluggable storage backend that redirects an embedded SQL engine's
//! write-ahead log onto a Zoned Namespace SSD exposed through a
//! zone-per-file pseudo-filesystem.
//!
//! ## Core idea
//! A zone only accepts writes at its write pointer, but the engine keeps
//! rewriting WAL header bytes and checksums at earlier offsets. The shim
//! absorbs that mismatch: WAL writes land in a per-handle memory buffer,
//! and sync points flush the buffered suffix to the zone in strictly
//! sequential order. Truncate-to-zero and delete become hardware zone
//! resets. The engine never learns anything changed underneath it.
//!
//! ## Layout
//! [`ZnsVfs`] wraps any [`Vfs`] backend (usually [`HostVfs`]) and
//! classifies each operation: WAL-suffixed paths route through the zone
//! machinery in [`zns`], everything else passes through untouched.

pub mod error;
pub mod vfs;
pub mod zns;

// Public re-exports for the top-level API
pub use error::{Error, Result};
pub use vfs::host::HostVfs;
pub use vfs::shim::{ShimFile, ZnsVfs};
pub use vfs::{
    AccessCheck, DeviceCharacteristics, FileControl, LockLevel, OpenFlags, ShmLockFlags,
    SyncFlags, Vfs, VfsFile,
};
pub use zns::{BlkZoneReset, TruncateReset, ZnsGate, ZnsWalFile, ZoneReset};
