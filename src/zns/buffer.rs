//! In-memory write buffer that turns random-offset WAL writes into a
//! sequential zone-append pattern.
//!
//! The buffer is addressed by absolute file offset. `flushed` always
//! equals the physical size of the zone file; flushing only ever emits
//! bytes at offsets at or past it, so the zone's write pointer advances
//! monotonically and the device's sequential-write rule holds.
//!
//! Writes below `flushed` are accepted into the buffer but never emitted
//! again. The engine only rewrites already-written WAL bytes (header
//! fields and running checksums) before the next sync, while they are
//! still above the flush point, and routes full resets through
//! truncate-to-zero. A caller that rewrote an already-synced prefix
//! would see those bytes change in memory and silently never reach the
//! zone.

use crate::error::{Error, Result};

/// Smallest buffer allocation, in bytes.
pub const MIN_CAPACITY: usize = 4096;

/// Capacity is rounded up to this boundary when growing.
const CAPACITY_ALIGN: usize = 1024;

/// Coalescing buffer for one open zone file.
#[derive(Debug)]
pub struct WriteBuffer {
    /// Byte `i` holds file offset `i`. Offsets below `flushed` that were
    /// never rewritten may be stale zeros; they are never read back or
    /// re-emitted.
    data: Vec<u8>,
    /// Length of the valid logical prefix, as reported to the engine.
    logical: u64,
    /// Prefix already written to the zone file. Equals its physical size.
    flushed: u64,
}

impl WriteBuffer {
    /// A buffer for a zone whose file currently holds `physical_size`
    /// bytes. No memory is allocated until the first write needs it.
    pub fn new(physical_size: u64) -> Self {
        WriteBuffer {
            data: Vec::new(),
            logical: physical_size,
            flushed: physical_size,
        }
    }

    /// Logical file size: the value `file_size` reports to the engine.
    pub fn logical_size(&self) -> u64 {
        self.logical
    }

    /// Bytes already on the zone file.
    pub fn flushed(&self) -> u64 {
        self.flushed
    }

    /// Copy `bytes` into the buffer at `offset`.
    ///
    /// Offsets past the logical size are rejected: a zone cannot hold a
    /// hole, and the shim refuses to invent the gap bytes.
    pub fn write(&mut self, bytes: &[u8], offset: u64) -> Result<()> {
        if offset > self.logical {
            return Err(Error::NonSequentialWrite {
                offset,
                len: bytes.len(),
                logical_size: self.logical,
            });
        }
        if bytes.is_empty() {
            return Ok(());
        }
        let end = offset + bytes.len() as u64;
        self.ensure_len(end as usize);
        self.data[offset as usize..end as usize].copy_from_slice(bytes);
        if end > self.logical {
            self.logical = end;
        }
        Ok(())
    }

    /// The not-yet-flushed suffix and the offset it belongs at, or `None`
    /// when the buffer is clean.
    pub fn pending(&self) -> Option<(&[u8], u64)> {
        if self.logical == self.flushed {
            return None;
        }
        Some((
            &self.data[self.flushed as usize..self.logical as usize],
            self.flushed,
        ))
    }

    /// Record that the pending suffix reached the zone file. Only called
    /// after the write succeeded; on failure the state stays put so the
    /// next sync retries the same range.
    pub fn mark_flushed(&mut self) {
        self.flushed = self.logical;
    }

    /// Forget everything: both counters to zero, storage released.
    /// Pairs with a zone reset.
    pub fn clear(&mut self) {
        self.data = Vec::new();
        self.logical = 0;
        self.flushed = 0;
    }

    /// Grow storage to cover `end` bytes. Capacity doubles from a 4 KiB
    /// floor and is rounded up to a 1 KiB boundary; the new tail is
    /// zero-filled.
    fn ensure_len(&mut self, end: usize) {
        if self.data.len() >= end {
            return;
        }
        if self.data.capacity() < end {
            let mut cap = self.data.capacity().max(MIN_CAPACITY);
            while cap < end {
                cap = cap.saturating_mul(2);
            }
            let cap = cap.div_ceil(CAPACITY_ALIGN) * CAPACITY_ALIGN;
            self.data.reserve_exact(cap - self.data.len());
        }
        self.data.resize(end, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_overwrite_merge() {
        let mut buf = WriteBuffer::new(0);
        buf.write(&[0xaa; 32], 0).unwrap();
        buf.write(&[0xbb; 8], 24).unwrap();

        assert_eq!(buf.logical_size(), 32);
        let (bytes, offset) = buf.pending().unwrap();
        assert_eq!(offset, 0);
        assert_eq!(&bytes[..24], &[0xaa; 24]);
        assert_eq!(&bytes[24..], &[0xbb; 8]);
    }

    #[test]
    fn gap_write_is_rejected() {
        let mut buf = WriteBuffer::new(0);
        buf.write(b"abcd", 0).unwrap();

        // Append exactly at the logical size is fine.
        buf.write(b"efgh", 4).unwrap();

        // One byte past it is a hole.
        let err = buf.write(b"x", 9).unwrap_err();
        assert!(matches!(
            err,
            Error::NonSequentialWrite {
                offset: 9,
                logical_size: 8,
                ..
            }
        ));
    }

    #[test]
    fn overwrite_at_zero_with_data_present() {
        let mut buf = WriteBuffer::new(0);
        buf.write(&[1; 16], 0).unwrap();
        buf.write(&[2; 4], 0).unwrap();

        let (bytes, _) = buf.pending().unwrap();
        assert_eq!(&bytes[..4], &[2; 4]);
        assert_eq!(&bytes[4..], &[1; 12]);
        assert_eq!(buf.logical_size(), 16);
    }

    #[test]
    fn pending_tracks_flush_point() {
        let mut buf = WriteBuffer::new(0);
        buf.write(&[7; 100], 0).unwrap();
        buf.mark_flushed();
        assert!(buf.pending().is_none());
        assert_eq!(buf.flushed(), 100);

        buf.write(&[8; 20], 100).unwrap();
        let (bytes, offset) = buf.pending().unwrap();
        assert_eq!(offset, 100);
        assert_eq!(bytes, &[8; 20]);
    }

    #[test]
    fn rewrite_below_flush_point_is_buffered_not_pending() {
        let mut buf = WriteBuffer::new(0);
        buf.write(&[1; 64], 0).unwrap();
        buf.mark_flushed();

        // Header rewrite below the flush point: accepted, nothing pending.
        buf.write(&[9; 8], 0).unwrap();
        assert!(buf.pending().is_none());
        assert_eq!(buf.logical_size(), 64);
    }

    #[test]
    fn preexisting_physical_size_allows_append() {
        let mut buf = WriteBuffer::new(128);
        assert_eq!(buf.logical_size(), 128);
        assert!(buf.pending().is_none());

        buf.write(&[3; 16], 128).unwrap();
        let (bytes, offset) = buf.pending().unwrap();
        assert_eq!(offset, 128);
        assert_eq!(bytes, &[3; 16]);
    }

    #[test]
    fn capacity_floor_and_alignment() {
        let mut buf = WriteBuffer::new(0);
        buf.write(&[0; 10], 0).unwrap();
        assert!(buf.data.capacity() >= MIN_CAPACITY);

        buf.write(&[0; 9000], 0).unwrap();
        assert_eq!(buf.data.capacity() % CAPACITY_ALIGN, 0);
        assert!(buf.data.capacity() >= 9000);
    }

    #[test]
    fn clear_resets_both_counters() {
        let mut buf = WriteBuffer::new(0);
        buf.write(&[5; 50], 0).unwrap();
        buf.mark_flushed();
        buf.clear();

        assert_eq!(buf.logical_size(), 0);
        assert_eq!(buf.flushed(), 0);
        assert!(buf.pending().is_none());

        // Idempotent.
        buf.clear();
        assert_eq!(buf.logical_size(), 0);
        assert_eq!(buf.flushed(), 0);
    }
}
