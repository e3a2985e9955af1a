//! Host operating-system backend over `std::fs`.
//!
//! This is the backend the shim wraps: non-WAL traffic passes through it
//! untouched, and zone files themselves are opened, read, written and
//! synced through it.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::RngCore;

use crate::error::Result;
use crate::vfs::{AccessCheck, FileControl, LockLevel, OpenFlags, SyncFlags, Vfs, VfsFile};

/// Milliseconds between the Julian epoch (4714 BC) and the Unix epoch.
const JULIAN_UNIX_OFFSET_MS: i64 = 210_866_760_000_000;

/// File backend over the host file system.
#[derive(Debug, Default)]
pub struct HostVfs;

impl HostVfs {
    pub fn new() -> Self {
        HostVfs
    }
}

/// An open file on the host file system.
///
/// Locking maps the engine's five-level ladder onto `flock(2)`: a shared
/// lock takes `LOCK_SH`, reserved and above take `LOCK_EX`, all
/// non-blocking. Contention is reported as busy (`Ok(false)`), not as an
/// error.
#[derive(Debug)]
pub struct HostFile {
    file: File,
    path: PathBuf,
    lock: LockLevel,
    delete_on_close: bool,
}

impl HostFile {
    fn flock(&self, op: libc::c_int) -> io::Result<bool> {
        let rc = unsafe { libc::flock(self.file.as_raw_fd(), op) };
        if rc == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            Ok(false)
        } else {
            Err(err)
        }
    }
}

impl VfsFile for HostFile {
    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read_at(&mut buf[filled..], offset + filled as u64)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn write(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    fn truncate(&mut self, size: u64) -> Result<()> {
        self.file.set_len(size)?;
        Ok(())
    }

    fn sync(&mut self, flags: SyncFlags) -> Result<()> {
        if flags.contains(SyncFlags::DATAONLY) {
            self.file.sync_data()?;
        } else {
            self.file.sync_all()?;
        }
        Ok(())
    }

    fn file_size(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn lock(&mut self, level: LockLevel) -> Result<bool> {
        if level <= self.lock {
            return Ok(true);
        }
        let granted = if level >= LockLevel::Reserved {
            self.flock(libc::LOCK_EX | libc::LOCK_NB)?
        } else {
            self.flock(libc::LOCK_SH | libc::LOCK_NB)?
        };
        if granted {
            self.lock = level;
        }
        Ok(granted)
    }

    fn unlock(&mut self, level: LockLevel) -> Result<bool> {
        if level >= self.lock {
            return Ok(true);
        }
        match level {
            LockLevel::None => {
                self.flock(libc::LOCK_UN)?;
            }
            _ => {
                // Downgrading an exclusive flock to shared never blocks.
                self.flock(libc::LOCK_SH | libc::LOCK_NB)?;
            }
        }
        self.lock = level;
        Ok(true)
    }

    fn check_reserved_lock(&mut self) -> Result<bool> {
        // Only this handle's state is consulted. Cross-process reserved
        // detection would need byte-range locks; flock cannot distinguish
        // a foreign shared lock from a foreign reserved one.
        Ok(self.lock >= LockLevel::Reserved)
    }

    fn file_control(&mut self, op: FileControl) -> Result<bool> {
        match op {
            FileControl::SizeHint(_) => Ok(true),
            _ => Ok(false),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.delete_on_close {
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            self.delete_on_close = false;
        }
        Ok(())
    }
}

impl Drop for HostFile {
    fn drop(&mut self) {
        let _ = VfsFile::close(self);
    }
}

impl Vfs for HostVfs {
    type File = HostFile;

    fn open(&self, path: &Path, flags: OpenFlags) -> Result<Self::File> {
        let mut options = OpenOptions::new();
        options.read(true);
        if flags.contains(OpenFlags::READWRITE) {
            options.write(true);
        }
        if flags.contains(OpenFlags::CREATE) {
            if flags.contains(OpenFlags::EXCLUSIVE) {
                options.create_new(true);
            } else {
                options.create(true);
            }
        }
        let file = options.open(path)?;
        Ok(HostFile {
            file,
            path: path.to_path_buf(),
            lock: LockLevel::None,
            delete_on_close: flags.contains(OpenFlags::DELETE_ON_CLOSE),
        })
    }

    fn delete(&self, path: &Path, sync_dir: bool) -> Result<()> {
        fs::remove_file(path)?;
        if sync_dir {
            if let Some(parent) = path.parent() {
                File::open(parent)?.sync_all()?;
            }
        }
        Ok(())
    }

    fn access(&self, path: &Path, check: AccessCheck) -> Result<bool> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let mode = meta.permissions().mode();
        Ok(match check {
            AccessCheck::Exists => true,
            AccessCheck::Read => mode & 0o400 != 0,
            AccessCheck::ReadWrite => mode & 0o600 == 0o600,
        })
    }

    fn full_pathname(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(env::current_dir()?.join(path))
        }
    }

    fn randomness(&self, buf: &mut [u8]) {
        rand::thread_rng().fill_bytes(buf);
    }

    fn sleep(&self, duration: Duration) -> Duration {
        std::thread::sleep(duration);
        duration
    }

    fn current_time(&self) -> f64 {
        self.current_time_millis() as f64 / 86_400_000.0
    }

    fn current_time_millis(&self) -> i64 {
        let unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        unix_ms + JULIAN_UNIX_OFFSET_MS
    }

    fn last_error(&self) -> (i32, String) {
        let err = io::Error::last_os_error();
        (err.raw_os_error().unwrap_or(0), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_read_reports_byte_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short");
        fs::write(&path, b"hello").unwrap();

        let vfs = HostVfs::new();
        let mut file = vfs.open(&path, OpenFlags::READONLY).unwrap();
        let mut buf = [0u8; 16];
        let n = file.read(&mut buf, 0).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf[..5], b"hello");
    }

    #[test]
    fn delete_on_close_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transient");

        let vfs = HostVfs::new();
        let flags = OpenFlags::READWRITE | OpenFlags::CREATE | OpenFlags::DELETE_ON_CLOSE;
        let file = vfs.open(&path, flags).unwrap();
        assert!(path.exists());
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn lock_ladder_tracks_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked");

        let vfs = HostVfs::new();
        let flags = OpenFlags::READWRITE | OpenFlags::CREATE;
        let mut file = vfs.open(&path, flags).unwrap();

        assert!(file.lock(LockLevel::Shared).unwrap());
        assert!(!file.check_reserved_lock().unwrap());
        assert!(file.lock(LockLevel::Exclusive).unwrap());
        assert!(file.check_reserved_lock().unwrap());
        assert!(file.unlock(LockLevel::None).unwrap());
        assert!(!file.check_reserved_lock().unwrap());
    }
}
