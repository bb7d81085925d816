// SPDX-License-Identifier: MIT

// Core modules
pub mod device;
pub mod errors;
pub mod stats;

// Backend modules
#[cfg(feature = "mem")]
mod mem;

#[cfg(feature = "std")]
mod std;

// Prelude re-exports (central entrypoint)
pub mod prelude {
    pub use super::BlkIO;
    pub use super::BlkIOExt;
    pub use super::BlkIOSetLen;
    pub use super::device::*;
    pub use super::errors::*;
    pub use super::stats::*;

    #[cfg(feature = "mem")]
    pub use super::mem::MemBlkIO;

    #[cfg(feature = "std")]
    pub use super::std::StdBlkIO;
}

// Internal use
use errors::*;

// Constants

/// Size of the zero buffer used by [`BlkIOExt::zero_fill`].
/// 4 KiB = typical page size and the default block size of the store.
pub const BLOCK_BUF_SIZE: usize = 4096;

// Traits

/// Byte-addressed IO abstraction.
///
/// Allows read/write/flush at arbitrary absolute offsets.
/// Implementations may target RAM, regular files or raw devices.
pub trait BlkIO {
    /// Writes `data` at `offset` (absolute).
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlkIOResult;

    /// Reads `buf.len()` bytes into `buf` from `offset` (absolute).
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlkIOResult;

    /// Flushes any buffered data (may be a no-op).
    fn flush(&mut self) -> BlkIOResult;
}

/// Extension helpers for BlkIO.
pub trait BlkIOExt: BlkIO {
    /// Fills a region with zeroes.
    ///
    /// Used to clear the reserved block before a metadata write.
    #[inline(always)]
    fn zero_fill(&mut self, offset: u64, len: usize) -> BlkIOResult {
        const ZERO_BUF: [u8; BLOCK_BUF_SIZE] = [0u8; BLOCK_BUF_SIZE];
        let mut remaining = len;
        let mut off = offset;
        while remaining > 0 {
            let chunk = remaining.min(ZERO_BUF.len());
            self.write_at(off, &ZERO_BUF[..chunk])?;
            off += chunk as u64;
            remaining -= chunk;
        }
        Ok(())
    }
}

impl<T: BlkIO + ?Sized> BlkIOExt for T {}

/// Trait for setting the length of a BlkIO object.
///
/// Allows resizing the underlying storage (if supported by the backend).
pub trait BlkIOSetLen: BlkIO {
    /// Sets the length of the storage.
    fn set_len(&mut self, len: u64) -> BlkIOResult;

    /// Current length of the storage in bytes.
    fn len(&mut self) -> BlkIOResult<u64>;

    fn is_empty(&mut self) -> BlkIOResult<bool> {
        Ok(self.len()? == 0)
    }
}
