//! Per-handle state for a WAL redirected onto a zone file.
//!
//! The engine keeps issuing its usual random-offset WAL traffic; this
//! handle absorbs it into a [`WriteBuffer`] and emits the pending suffix
//! sequentially at sync points. Truncate-to-zero becomes a zone reset,
//! truncate to anything else is tolerated and ignored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::vfs::{DeviceCharacteristics, FileControl, LockLevel, ShmLockFlags, SyncFlags, VfsFile};
use crate::zns::buffer::WriteBuffer;
use crate::zns::gate::ZnsGate;

/// An open WAL handle backed by a zone file.
#[derive(Debug)]
pub struct ZnsWalFile<F: VfsFile> {
    /// Host handle on the zone file itself (not the WAL path the engine
    /// asked for).
    inner: F,
    zone_path: PathBuf,
    gate: Arc<ZnsGate>,
    buf: WriteBuffer,
    released: bool,
}

impl<F: VfsFile> ZnsWalFile<F> {
    pub(crate) fn new(inner: F, zone_path: PathBuf, gate: Arc<ZnsGate>, physical_size: u64) -> Self {
        ZnsWalFile {
            inner,
            zone_path,
            gate,
            buf: WriteBuffer::new(physical_size),
            released: false,
        }
    }

    /// The zone file this WAL is mapped onto.
    pub fn zone_path(&self) -> &Path {
        &self.zone_path
    }

    /// Emit the pending buffer suffix at the zone's write pointer. On
    /// failure the buffer keeps the suffix so the next sync retries it.
    fn flush_buffer(&mut self) -> Result<()> {
        let Some((bytes, offset)) = self.buf.pending() else {
            return Ok(());
        };
        self.inner.write(bytes, offset)?;
        self.buf.mark_flushed();
        Ok(())
    }

    fn release_zone(&mut self) {
        if !self.released {
            self.released = true;
            self.gate.release(&self.zone_path);
        }
    }
}

impl<F: VfsFile> VfsFile for ZnsWalFile<F> {
    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        // The WAL protocol never reads bytes it has not synced, so reads
        // go straight to the zone file.
        self.inner.read(buf, offset)
    }

    fn write(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        self.buf.write(buf, offset)
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        if size == 0 {
            self.buf.clear();
            return self
                .gate
                .reset_zone(&self.zone_path)
                .map_err(|source| Error::ZoneReset {
                    zone: self.zone_path.clone(),
                    source,
                });
        }
        // A zone only truncates to zero. The engine re-establishes any
        // other size through its normal append traffic.
        tracing::warn!(
            zone = %self.zone_path.display(),
            size,
            "ignoring truncate of zns wal to nonzero size"
        );
        Ok(())
    }

    fn sync(&mut self, flags: SyncFlags) -> Result<()> {
        self.flush_buffer()?;
        self.inner.sync(flags)
    }

    fn file_size(&mut self) -> Result<u64> {
        // The buffered logical size, not the physical zone size: in-flight
        // buffer content must look like a normal file extension.
        Ok(self.buf.logical_size())
    }

    fn lock(&mut self, level: LockLevel) -> Result<bool> {
        self.inner.lock(level)
    }

    fn unlock(&mut self, level: LockLevel) -> Result<bool> {
        self.inner.unlock(level)
    }

    fn check_reserved_lock(&mut self) -> Result<bool> {
        self.inner.check_reserved_lock()
    }

    fn file_control(&mut self, op: FileControl) -> Result<bool> {
        self.inner.file_control(op)
    }

    fn sector_size(&self) -> usize {
        self.inner.sector_size()
    }

    fn device_characteristics(&self) -> DeviceCharacteristics {
        // Never advertise sequential-only or powersafe-overwrite here:
        // the buffer hides the sequentiality constraint, and the engine
        // must keep doing its checksum rewrites as if this were an
        // ordinary file.
        self.inner.device_characteristics()
            - (DeviceCharacteristics::SEQUENTIAL | DeviceCharacteristics::POWERSAFE_OVERWRITE)
    }

    fn shm_map(&mut self, region: usize, size: usize, extend: bool) -> Result<*mut u8> {
        self.inner.shm_map(region, size, extend)
    }

    fn shm_lock(&mut self, offset: usize, n: usize, flags: ShmLockFlags) -> Result<()> {
        self.inner.shm_lock(offset, n, flags)
    }

    fn shm_barrier(&mut self) {
        self.inner.shm_barrier()
    }

    fn shm_unmap(&mut self, delete: bool) -> Result<()> {
        self.inner.shm_unmap(delete)
    }

    fn fetch(&mut self, offset: u64, amount: usize) -> Result<Option<*const u8>> {
        self.inner.fetch(offset, amount)
    }

    fn unfetch(&mut self, offset: u64, ptr: *const u8) -> Result<()> {
        self.inner.unfetch(offset, ptr)
    }

    fn close(&mut self) -> Result<()> {
        self.buf.clear();
        self.release_zone();
        self.inner.close()
    }
}

impl<F: VfsFile> Drop for ZnsWalFile<F> {
    fn drop(&mut self) {
        self.release_zone();
    }
}
