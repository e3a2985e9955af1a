//! Configuration gate and zone registry.
//!
//! One structure, one mutex: whether ZNS mode is enabled, which root it
//! points at, and the WAL-name-to-zone mapping all live behind the same
//! lock, so enable/disable can never race a half-updated registry.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::zns::reset::{BlkZoneReset, ZoneReset};

/// One zone file under the configured root.
///
/// `mapped_wal` doubles as the allocation state: `None` is a free zone,
/// `Some(name)` is allocated to that WAL.
#[derive(Debug)]
struct Zone {
    path: PathBuf,
    mapped_wal: Option<String>,
}

#[derive(Debug)]
struct GateState {
    root: PathBuf,
    zones: Vec<Zone>,
}

/// Process state for ZNS WAL redirection.
///
/// Created disabled; [`enable`](ZnsGate::enable) discovers the zone set
/// under a root directory, [`disable`](ZnsGate::disable) tears it down.
/// The interceptor holds the gate in an `Arc` and every ZNS WAL handle
/// keeps a clone so it can release its zone on close.
pub struct ZnsGate {
    state: Mutex<Option<GateState>>,
    reset: Arc<dyn ZoneReset>,
}

impl std::fmt::Debug for ZnsGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZnsGate")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for ZnsGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ZnsGate {
    /// A disabled gate that resets zones through the block-layer ioctl.
    pub fn new() -> Self {
        Self::with_reset(Arc::new(BlkZoneReset))
    }

    /// A disabled gate with a custom reset driver.
    pub fn with_reset(reset: Arc<dyn ZoneReset>) -> Self {
        ZnsGate {
            state: Mutex::new(None),
            reset,
        }
    }

    fn locked(&self) -> MutexGuard<'_, Option<GateState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enable ZNS mode against `root` and discover its zones.
    ///
    /// `root` must be an existing directory. Enabling with the already
    /// active root is a no-op; a different root tears the registry down
    /// and rediscovers, dropping all current mappings. On failure the
    /// gate is left disabled.
    pub fn enable(&self, root: &Path) -> Result<()> {
        let meta =
            fs::metadata(root).map_err(|_| Error::NotADirectory(root.to_path_buf()))?;
        if !meta.is_dir() {
            return Err(Error::NotADirectory(root.to_path_buf()));
        }

        let mut state = self.locked();
        if let Some(current) = state.as_ref() {
            if current.root == root {
                return Ok(());
            }
        }
        *state = None;

        let zones = discover(root)?;
        tracing::debug!(root = %root.display(), zones = zones.len(), "zns wal enabled");
        *state = Some(GateState {
            root: root.to_path_buf(),
            zones,
        });
        Ok(())
    }

    /// Disable ZNS mode and drop the registry. All mappings are forgotten.
    pub fn disable(&self) {
        let mut state = self.locked();
        if state.take().is_some() {
            tracing::debug!("zns wal disabled");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.locked().is_some()
    }

    /// The active root directory, if enabled.
    pub fn root(&self) -> Option<PathBuf> {
        self.locked().as_ref().map(|s| s.root.clone())
    }

    /// Number of discovered zones (0 when disabled).
    pub fn zone_count(&self) -> usize {
        self.locked().as_ref().map_or(0, |s| s.zones.len())
    }

    /// Number of zones not currently mapped to a WAL.
    pub fn free_zones(&self) -> usize {
        self.locked()
            .as_ref()
            .map_or(0, |s| s.zones.iter().filter(|z| z.mapped_wal.is_none()).count())
    }

    /// Map `wal` to a zone and return the zone file's path.
    ///
    /// An existing mapping for the same WAL name is returned as-is, so
    /// reopening a WAL lands on the same zone. Otherwise the lowest
    /// numbered free zone is taken. `None` means exhaustion (or a gate
    /// disabled underneath the caller).
    pub fn acquire(&self, wal: &str) -> Option<PathBuf> {
        let mut state = self.locked();
        let state = state.as_mut()?;

        if let Some(zone) = state
            .zones
            .iter()
            .find(|z| z.mapped_wal.as_deref() == Some(wal))
        {
            return Some(zone.path.clone());
        }

        let zone = state.zones.iter_mut().find(|z| z.mapped_wal.is_none())?;
        zone.mapped_wal = Some(wal.to_owned());
        tracing::debug!(wal, zone = %zone.path.display(), "zone acquired");
        Some(zone.path.clone())
    }

    /// Return `zone` to the free pool. Releasing a zone that is already
    /// free, or a path outside the registry, is a logged no-op.
    pub fn release(&self, zone: &Path) {
        let mut state = self.locked();
        let Some(state) = state.as_mut() else {
            return;
        };
        match state.zones.iter_mut().find(|z| z.path == zone) {
            Some(record) if record.mapped_wal.is_some() => {
                let wal = record.mapped_wal.take();
                tracing::debug!(wal = wal.as_deref(), zone = %zone.display(), "zone released");
            }
            _ => {
                tracing::warn!(zone = %zone.display(), "release of unmapped zone ignored");
            }
        }
    }

    /// The zone currently mapped to `wal`, if any.
    pub fn lookup(&self, wal: &str) -> Option<PathBuf> {
        self.locked().as_ref().and_then(|s| {
            s.zones
                .iter()
                .find(|z| z.mapped_wal.as_deref() == Some(wal))
                .map(|z| z.path.clone())
        })
    }

    /// Reset `zone` through this gate's reset driver.
    pub fn reset_zone(&self, zone: &Path) -> io::Result<()> {
        self.reset.reset(zone)
    }
}

/// Enumerate zone files under `root`: regular (or unknown-type) entries
/// named with exactly four lowercase hex digits, sorted by name so
/// allocation order is deterministic.
fn discover(root: &Path) -> Result<Vec<Zone>> {
    let mut zones = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let regular = match entry.file_type() {
            Ok(kind) => kind.is_file(),
            // Treat an unreadable type like readdir's DT_UNKNOWN: accept.
            Err(_) => true,
        };
        if !regular {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !is_zone_name(name) {
            continue;
        }
        zones.push(Zone {
            path: root.join(name),
            mapped_wal: None,
        });
    }
    zones.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(zones)
}

/// Zone files are named `%04x`: four lowercase hexadecimal digits.
fn is_zone_name(name: &str) -> bool {
    name.len() == 4
        && name
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
