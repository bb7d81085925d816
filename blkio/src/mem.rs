// SPDX-License-Identifier: MIT

use crate::{BlkIO, BlkIOError, BlkIOResult, BlkIOSetLen};

/// In-memory implementation of `BlkIO`.
///
/// Useful for tests and RAM-backed devices.
#[derive(Debug, Clone, Default)]
pub struct MemBlkIO {
    buffer: Vec<u8>,
}

impl MemBlkIO {
    /// Zero-filled device of `len` bytes.
    #[inline]
    pub fn new(len: usize) -> Self {
        Self {
            buffer: vec![0u8; len],
        }
    }

    #[inline]
    pub fn from_vec(buffer: Vec<u8>) -> Self {
        Self { buffer }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    #[inline]
    fn check_bounds(&self, off: u64, len: usize) -> BlkIOResult<usize> {
        let end = off
            .checked_add(len as u64)
            .ok_or(BlkIOError::OutOfBounds)?;
        if end > self.buffer.len() as u64 {
            return Err(BlkIOError::OutOfBounds);
        }
        Ok(off as usize)
    }
}

impl BlkIO for MemBlkIO {
    #[inline(always)]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlkIOResult {
        let start = self.check_bounds(offset, data.len())?;
        self.buffer[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    #[inline(always)]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlkIOResult {
        let start = self.check_bounds(offset, buf.len())?;
        buf.copy_from_slice(&self.buffer[start..start + buf.len()]);
        Ok(())
    }

    #[inline]
    fn flush(&mut self) -> BlkIOResult {
        Ok(())
    }
}

impl BlkIOSetLen for MemBlkIO {
    fn set_len(&mut self, new_len: u64) -> BlkIOResult {
        let new_len = usize::try_from(new_len).map_err(|_| BlkIOError::OutOfBounds)?;
        self.buffer.resize(new_len, 0);
        Ok(())
    }

    fn len(&mut self) -> BlkIOResult<u64> {
        Ok(self.buffer.len() as u64)
    }
}
