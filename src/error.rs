use std::fmt;
use std::io;
use std::path::PathBuf;

/// Unified error type for the ZNS WAL backend.
#[derive(Debug)]
pub enum Error {
    /// Every zone is already mapped to a WAL; a new WAL cannot be opened.
    ZonesExhausted,
    /// A buffered write would leave a hole past the current logical size.
    /// Zones are append-structured, so the shim refuses to invent gap bytes.
    NonSequentialWrite {
        offset: u64,
        len: usize,
        logical_size: u64,
    },
    /// The zone reset command failed for the named zone file.
    ZoneReset { zone: PathBuf, source: io::Error },
    /// The configured zone root does not exist or is not a directory.
    NotADirectory(PathBuf),
    /// IO error from the underlying OS backend, surfaced unchanged.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ZonesExhausted => write!(f, "no free zone available"),
            Error::NonSequentialWrite {
                offset,
                len,
                logical_size,
            } => write!(
                f,
                "write of {len} bytes at offset {offset} leaves a gap past logical size {logical_size}"
            ),
            Error::ZoneReset { zone, source } => {
                write!(f, "zone reset failed for {}: {source}", zone.display())
            }
            Error::NotADirectory(path) => {
                write!(f, "{} is not a directory", path.display())
            }
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::ZoneReset { source, .. } => Some(source),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl Error {
    /// An operation the backend does not implement (shared memory, mmap
    /// fetch, dynamic loading). Reported as an IO error so callers treat
    /// it like any other backend refusal.
    pub(crate) fn unsupported(what: &str) -> Self {
        Error::Io(io::Error::new(io::ErrorKind::Unsupported, what.to_string()))
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
