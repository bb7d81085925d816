// SPDX-License-Identifier: MIT

use std::io::{Read, Seek, SeekFrom, Write};

use crate::{BlkIO, BlkIOResult, BlkIOSetLen};

/// `BlkIO` over any seekable byte stream (typically a `std::fs::File`).
#[derive(Debug)]
pub struct StdBlkIO<T: Read + Write + Seek> {
    io: T,
}

impl<T: Read + Write + Seek> StdBlkIO<T> {
    #[inline]
    pub fn new(io: T) -> Self {
        Self { io }
    }

    #[inline]
    pub fn get_ref(&self) -> &T {
        &self.io
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T: Read + Write + Seek> BlkIO for StdBlkIO<T> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlkIOResult {
        self.io.seek(SeekFrom::Start(offset))?;
        self.io.write_all(data)?;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlkIOResult {
        self.io.seek(SeekFrom::Start(offset))?;
        self.io.read_exact(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> BlkIOResult {
        self.io.flush()?;
        Ok(())
    }
}

impl BlkIOSetLen for StdBlkIO<std::fs::File> {
    fn set_len(&mut self, len: u64) -> BlkIOResult {
        self.io.set_len(len)?;
        self.io.sync_all()?;
        self.io.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn len(&mut self) -> BlkIOResult<u64> {
        Ok(self.io.metadata()?.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{BLOCK_BUF_SIZE, prelude::*};
    use tempfile::tempfile;

    #[test]
    fn test_rw() {
        let mut io = StdBlkIO::new(tempfile().unwrap());
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
    }

    #[test]
    fn test_short_read_is_error() {
        let mut io = StdBlkIO::new(tempfile().unwrap());
        io.set_len(8).unwrap();

        let mut output = [0u8; 16];
        let err = io.read_at(0, &mut output).unwrap_err();
        assert!(err.is_io());
    }

    #[test]
    fn test_set_len() {
        let mut io = StdBlkIO::new(tempfile().unwrap());
        assert!(io.is_empty().unwrap());

        io.set_len(512).unwrap();
        assert_eq!(io.len().unwrap(), 512);
        assert!(io.set_len(u64::MAX).is_err());
    }

    #[test]
    fn test_zero_fill_spans_buffers() {
        let len = BLOCK_BUF_SIZE * 2 + 100;
        let mut io = StdBlkIO::new(tempfile().unwrap());
        io.write_at(0, &vec![0x77; len + 1]).unwrap();
        io.zero_fill(0, len).unwrap();

        let mut buf = vec![0xAA; len + 1];
        io.read_at(0, &mut buf).unwrap();
        assert!(buf[..len].iter().all(|&b| b == 0));
        assert_eq!(buf[len], 0x77);
    }

    #[test]
    fn test_zero_fill() {
        let mut io = StdBlkIO::new(tempfile().unwrap());

        io.write_at(42, &[0xFF; 8]).unwrap();
        io.zero_fill(42, 8).unwrap();

        let mut buf = [0xAA; 8];
        io.read_at(42, &mut buf).unwrap();

        assert_eq!(buf, [0u8; 8]);
    }
}
