// Replays the engine's real WAL write pattern against the shim: frame
// appends interleaved with in-place header and checksum rewrites below
// the flush point, all of it pre-sync.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use zonewal::zns::{TruncateReset, ZnsGate};
use zonewal::{HostVfs, OpenFlags, SyncFlags, Vfs, VfsFile, ZnsVfs};

const WAL_HEADER_SIZE: usize = 32;
const FRAME_HEADER_SIZE: usize = 24;
const PAGE_SIZE: usize = 512;
const FRAME_SIZE: usize = FRAME_HEADER_SIZE + PAGE_SIZE;

/// A WAL image builder that mirrors what the engine writes: a file
/// header carrying a running checksum, then frames whose headers chain
/// that checksum over their page contents.
struct WalImage {
    bytes: Vec<u8>,
    checksum: u32,
}

impl WalImage {
    fn new(salt: u32) -> Self {
        let mut bytes = vec![0u8; WAL_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&0x3777_62u32.to_be_bytes());
        bytes[4..8].copy_from_slice(&salt.to_be_bytes());
        let checksum = crc32fast::hash(&bytes[0..8]);
        bytes[8..12].copy_from_slice(&checksum.to_be_bytes());
        WalImage { bytes, checksum }
    }

    /// Append one frame for `page_no` filled with `fill`, updating the
    /// chained checksum in both the frame header and the file header.
    fn push_frame(&mut self, page_no: u32, fill: u8) {
        let mut frame = vec![0u8; FRAME_SIZE];
        frame[0..4].copy_from_slice(&page_no.to_be_bytes());
        frame[FRAME_HEADER_SIZE..].fill(fill);

        let mut hasher = crc32fast::Hasher::new_with_initial(self.checksum);
        hasher.update(&frame[FRAME_HEADER_SIZE..]);
        self.checksum = hasher.finalize();
        frame[4..8].copy_from_slice(&self.checksum.to_be_bytes());

        self.bytes.extend_from_slice(&frame);
        // The running checksum lives in the file header too; the engine
        // rewrites it in place on every commit.
        self.bytes[8..12].copy_from_slice(&self.checksum.to_be_bytes());
    }

    fn frame_offset(&self, index: usize) -> u64 {
        (WAL_HEADER_SIZE + index * FRAME_SIZE) as u64
    }

    fn frame(&self, index: usize) -> &[u8] {
        let start = WAL_HEADER_SIZE + index * FRAME_SIZE;
        &self.bytes[start..start + FRAME_SIZE]
    }

    fn header(&self) -> &[u8] {
        &self.bytes[..WAL_HEADER_SIZE]
    }
}

fn shim(zones: usize) -> (tempfile::TempDir, ZnsVfs<HostVfs>) {
    let root = tempfile::tempdir().unwrap();
    for i in 0..zones {
        fs::write(root.path().join(format!("{i:04x}")), b"").unwrap();
    }
    let vfs = ZnsVfs::with_gate(HostVfs::new(), ZnsGate::with_reset(Arc::new(TruncateReset)));
    vfs.enable_zns_wal(Some(root.path())).unwrap();
    (root, vfs)
}

// =============================================================================
// Test 1: Commit with header rewrite lands intact on the zone
// =============================================================================
#[test]
fn commit_with_header_rewrite() {
    let (root, vfs) = shim(1);
    let path = PathBuf::from("/data/orders.db-wal");
    let mut wal = vfs
        .open(&path, OpenFlags::READWRITE | OpenFlags::CREATE | OpenFlags::WAL)
        .unwrap();

    let mut image = WalImage::new(0xdead_beef);
    wal.write(image.header(), 0).unwrap();

    image.push_frame(1, 0x11);
    wal.write(image.frame(0), image.frame_offset(0)).unwrap();
    // Commit: the header checksum changed, rewrite it at offset 0.
    wal.write(image.header(), 0).unwrap();

    image.push_frame(2, 0x22);
    wal.write(image.frame(1), image.frame_offset(1)).unwrap();
    wal.write(image.header(), 0).unwrap();

    wal.sync(SyncFlags::NORMAL | SyncFlags::DATAONLY).unwrap();

    // The zone holds exactly the image the engine believes it wrote.
    let on_disk = fs::read(root.path().join("0000")).unwrap();
    assert_eq!(on_disk, image.bytes);
}

// =============================================================================
// Test 2: A second commit keeps the already-synced prefix immutable
// =============================================================================
#[test]
fn second_commit_appends_only() {
    let (root, vfs) = shim(1);
    let path = PathBuf::from("/data/orders.db-wal");
    let mut wal = vfs
        .open(&path, OpenFlags::READWRITE | OpenFlags::CREATE | OpenFlags::WAL)
        .unwrap();

    let mut image = WalImage::new(1);
    wal.write(image.header(), 0).unwrap();
    image.push_frame(1, 0xab);
    wal.write(image.frame(0), image.frame_offset(0)).unwrap();
    wal.write(image.header(), 0).unwrap();
    wal.sync(SyncFlags::NORMAL).unwrap();

    let after_first = fs::read(root.path().join("0000")).unwrap();

    // Second commit appends frames; the synced prefix on the zone must
    // not move even though the buffer still remembers it.
    image.push_frame(2, 0xcd);
    wal.write(image.frame(1), image.frame_offset(1)).unwrap();
    image.push_frame(3, 0xef);
    wal.write(image.frame(2), image.frame_offset(2)).unwrap();
    wal.sync(SyncFlags::NORMAL).unwrap();

    let after_second = fs::read(root.path().join("0000")).unwrap();
    assert_eq!(&after_second[..after_first.len()], &after_first[..]);
    assert_eq!(after_second.len(), WAL_HEADER_SIZE + 3 * FRAME_SIZE);

    // The frame checksum chain verifies from the file as the recovery
    // path would read it.
    let mut checksum = crc32fast::hash(&after_second[0..8]);
    for i in 0..3 {
        let start = WAL_HEADER_SIZE + i * FRAME_SIZE;
        let frame = &after_second[start..start + FRAME_SIZE];
        let mut hasher = crc32fast::Hasher::new_with_initial(checksum);
        hasher.update(&frame[FRAME_HEADER_SIZE..]);
        checksum = hasher.finalize();
        let stored = u32::from_be_bytes(frame[4..8].try_into().unwrap());
        assert_eq!(stored, checksum);
    }
}

// =============================================================================
// Test 3: WAL reset starts a new checksum chain on a reset zone
// =============================================================================
#[test]
fn wal_reset_restarts_chain() {
    let (root, vfs) = shim(1);
    let path = PathBuf::from("/data/orders.db-wal");
    let mut wal = vfs
        .open(&path, OpenFlags::READWRITE | OpenFlags::CREATE | OpenFlags::WAL)
        .unwrap();

    let mut image = WalImage::new(7);
    wal.write(image.header(), 0).unwrap();
    image.push_frame(1, 0x01);
    wal.write(image.frame(0), image.frame_offset(0)).unwrap();
    wal.write(image.header(), 0).unwrap();
    wal.sync(SyncFlags::NORMAL).unwrap();

    // Checkpoint: the engine resets the WAL through truncate(0).
    wal.truncate(0).unwrap();
    assert_eq!(wal.file_size().unwrap(), 0);

    // A new salt, a new chain, written from offset zero again.
    let mut image = WalImage::new(8);
    wal.write(image.header(), 0).unwrap();
    image.push_frame(5, 0x55);
    wal.write(image.frame(0), image.frame_offset(0)).unwrap();
    wal.write(image.header(), 0).unwrap();
    wal.sync(SyncFlags::NORMAL).unwrap();

    let on_disk = fs::read(root.path().join("0000")).unwrap();
    assert_eq!(on_disk, image.bytes);
    assert_eq!(on_disk.len(), WAL_HEADER_SIZE + FRAME_SIZE);
}
