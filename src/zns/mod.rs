//! Zone-aware core: registry, write buffer, zone-file handle, reset.

pub mod buffer;
pub mod file;
pub mod gate;
pub mod reset;

pub use buffer::WriteBuffer;
pub use file::ZnsWalFile;
pub use gate::ZnsGate;
pub use reset::{BlkZoneReset, TruncateReset, ZoneReset};
