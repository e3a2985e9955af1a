//! Zone reset: move a zone's write pointer back to zero, discarding its
//! contents.
//!
//! Drivers never touch registry state; callers clear mappings themselves.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Strategy for resetting one zone, addressed by its zone-file path.
pub trait ZoneReset: Send + Sync {
    fn reset(&self, zone: &Path) -> io::Result<()>;
}

/// Range argument for the block layer's reset-zone ioctl.
#[repr(C)]
struct BlkZoneRange {
    sector: u64,
    nr_sectors: u64,
}

/// `BLKRESETZONE` = `_IOW(0x12, 131, struct blk_zone_range)`. Not exported
/// by the `libc` crate; whether this value matches a given kernel is a
/// porting concern.
const BLKRESETZONE: libc::c_ulong = 0x4010_1283;

/// Resets through the block layer's reset-zone ioctl, issued against the
/// zone file with a zeroed range descriptor (sector 0, count 0).
#[derive(Debug, Default)]
pub struct BlkZoneReset;

impl ZoneReset for BlkZoneReset {
    fn reset(&self, zone: &Path) -> io::Result<()> {
        let file = OpenOptions::new().read(true).write(true).open(zone)?;
        let range = BlkZoneRange {
            sector: 0,
            nr_sectors: 0,
        };
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), BLKRESETZONE as _, &range) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Resets by truncating the zone file to zero length. zonefs translates a
/// truncate-to-zero on a sequential zone file into a zone reset, and the
/// test suite uses this driver against plain directories.
#[derive(Debug, Default)]
pub struct TruncateReset;

impl ZoneReset for TruncateReset {
    fn reset(&self, zone: &Path) -> io::Result<()> {
        OpenOptions::new().write(true).open(zone)?.set_len(0)
    }
}
