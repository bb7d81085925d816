// SPDX-License-Identifier: MIT

use crate::{BlkIO, BlkIOResult, BlkIOSetLen};

/// Simple per-call counters.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct IoStats {
    pub reads: u64,
    pub read_bytes: u64,
    pub writes: u64,
    pub write_bytes: u64,
    pub flushes: u64,

    /// Offset of the most recent write, if any.
    pub last_write_offset: Option<u64>,
}

impl IoStats {
    #[inline]
    pub fn reset(&mut self) {
        *self = IoStats::default();
    }
}

/// Transparent instrumentation wrapper.
///
/// Owns the inner backend so it can sit underneath a `BlockStore`.
#[derive(Debug)]
pub struct IOCounter<IO: BlkIO> {
    inner: IO,
    pub stats: IoStats,
}

impl<IO: BlkIO> IOCounter<IO> {
    #[inline]
    pub fn new(inner: IO) -> Self {
        Self {
            inner,
            stats: IoStats::default(),
        }
    }

    #[inline]
    pub fn snapshot(&self) -> IoStats {
        self.stats
    }

    #[inline]
    pub fn get_ref(&self) -> &IO {
        &self.inner
    }

    #[inline]
    pub fn into_inner(self) -> IO {
        self.inner
    }
}

impl<IO: BlkIO> BlkIO for IOCounter<IO> {
    #[inline]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlkIOResult {
        self.stats.writes += 1;
        self.stats.write_bytes += data.len() as u64;
        self.stats.last_write_offset = Some(offset);
        self.inner.write_at(offset, data)
    }

    #[inline]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlkIOResult {
        self.stats.reads += 1;
        self.stats.read_bytes += buf.len() as u64;
        self.inner.read_at(offset, buf)
    }

    #[inline]
    fn flush(&mut self) -> BlkIOResult {
        self.stats.flushes += 1;
        self.inner.flush()
    }
}

impl<IO: BlkIOSetLen> BlkIOSetLen for IOCounter<IO> {
    #[inline]
    fn set_len(&mut self, len: u64) -> BlkIOResult {
        self.inner.set_len(len)
    }

    #[inline]
    fn len(&mut self) -> BlkIOResult<u64> {
        self.inner.len()
    }
}
