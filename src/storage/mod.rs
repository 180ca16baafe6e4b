// Physical storage of page frames.
//
// A resource's pages live in one append-only file; every frame is written
// behind the byte-handler pipeline and addressed by a `PageReference`
// (offset, length, CRC32). The uber file is managed by the page layer, not
// here.

pub mod file;

pub use file::FileStorage;

use crate::error::Result;
use crate::page::PageReference;

/// Positioned frame I/O. Implementations must be safe for concurrent use
/// by one writer and many readers.
pub trait Storage: Send + Sync {
    /// Appends a frame and returns its reference (offset, length, CRC).
    fn append(&self, frame: &[u8]) -> Result<PageReference>;

    /// Reads the frame behind `reference`, verifying its checksum.
    fn read(&self, reference: &PageReference) -> Result<Vec<u8>>;

    /// Flushes appended frames to durable storage.
    fn sync(&self) -> Result<()>;
}
