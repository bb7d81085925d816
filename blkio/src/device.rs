// SPDX-License-Identifier: MIT

//! Fixed-geometry block store.
//!
//! A [`BlockStore`] carves a [`BlkIO`] backend into `block_count` blocks of
//! `block_size` bytes. It only moves whole blocks: no caching, no partial-block
//! access and no arbitration between callers (callers serialize their own access).

#[cfg(feature = "std")]
use std::{fs::OpenOptions, path::Path};

use crate::{BlkIO, BlkIOExt, BlkIOSetLen, errors::*};

#[cfg(feature = "std")]
use crate::std::StdBlkIO;

/// Block size and block count, fixed when the store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    pub block_size: usize,
    pub block_count: u64,
}

impl BlockGeometry {
    /// Derives the geometry of a device of `total_size` bytes.
    pub fn new(block_size: usize, total_size: u64) -> BlkIOResult<Self> {
        if block_size == 0 {
            return Err(BlkIOError::Geometry("block size must be non-zero"));
        }
        if !total_size.is_multiple_of(block_size as u64) {
            return Err(BlkIOError::Geometry(
                "device size must be a multiple of the block size",
            ));
        }
        Ok(Self {
            block_size,
            block_count: total_size / block_size as u64,
        })
    }

    #[inline]
    pub fn total_size(&self) -> u64 {
        self.block_size as u64 * self.block_count
    }

    #[inline]
    pub fn block_offset(&self, index: u64) -> BlkIOResult<u64> {
        if index >= self.block_count {
            return Err(BlkIOError::BlockOutOfRange {
                index,
                count: self.block_count,
            });
        }
        Ok(index * self.block_size as u64)
    }
}

/// Raw fixed-size-block storage over a backing `BlkIO`.
#[derive(Debug)]
pub struct BlockStore<IO: BlkIO> {
    io: IO,
    geometry: BlockGeometry,
    created: bool,
}

#[cfg(feature = "std")]
impl BlockStore<StdBlkIO<std::fs::File>> {
    /// Opens (creating if absent) a backing file of exactly `total_size` bytes.
    pub fn open(path: impl AsRef<Path>, total_size: u64, block_size: usize) -> BlkIOResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        tracing::debug!(path = %path.display(), total_size, block_size, "opening backing store");
        Self::new(StdBlkIO::new(file), total_size, block_size)
    }
}

impl<IO: BlkIOSetLen> BlockStore<IO> {
    /// Wraps `io`, resizing it to `total_size` bytes if needed.
    ///
    /// A backend that was empty beforehand is reported by [`Self::was_created`].
    pub fn new(mut io: IO, total_size: u64, block_size: usize) -> BlkIOResult<Self> {
        let geometry = BlockGeometry::new(block_size, total_size)?;
        let current = io.len()?;
        let created = current == 0;
        if current != total_size {
            tracing::debug!(from = current, to = total_size, "resizing backing store");
            io.set_len(total_size)?;
        }
        Ok(Self {
            io,
            geometry,
            created,
        })
    }
}

impl<IO: BlkIO> BlockStore<IO> {
    #[inline]
    pub fn geometry(&self) -> BlockGeometry {
        self.geometry
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.geometry.block_size
    }

    #[inline]
    pub fn block_count(&self) -> u64 {
        self.geometry.block_count
    }

    /// True if the backing storage held no bytes before this store opened it.
    #[inline]
    pub fn was_created(&self) -> bool {
        self.created
    }

    /// Returns exactly one block's worth of bytes.
    pub fn read_block(&mut self, index: u64) -> BlkIOResult<Vec<u8>> {
        let mut buf = vec![0u8; self.geometry.block_size];
        self.read_block_into(index, &mut buf)?;
        Ok(buf)
    }

    pub fn read_block_into(&mut self, index: u64, buf: &mut [u8]) -> BlkIOResult {
        self.check_len(buf.len())?;
        let offset = self.geometry.block_offset(index)?;
        self.io.read_at(offset, buf)
    }

    /// Writes exactly one block. `data` must be `block_size` bytes long.
    pub fn write_block(&mut self, index: u64, data: &[u8]) -> BlkIOResult {
        self.check_len(data.len())?;
        let offset = self.geometry.block_offset(index)?;
        self.io.write_at(offset, data)
    }

    pub fn zero_block(&mut self, index: u64) -> BlkIOResult {
        let offset = self.geometry.block_offset(index)?;
        self.io.zero_fill(offset, self.geometry.block_size)
    }

    #[inline]
    pub fn flush(&mut self) -> BlkIOResult {
        self.io.flush()
    }

    #[inline]
    pub fn io(&self) -> &IO {
        &self.io
    }

    #[inline]
    pub fn into_inner(self) -> IO {
        self.io
    }

    #[inline]
    fn check_len(&self, len: usize) -> BlkIOResult {
        if len != self.geometry.block_size {
            return Err(BlkIOError::BadBufferLength {
                expected: self.geometry.block_size,
                got: len,
            });
        }
        Ok(())
    }
}
