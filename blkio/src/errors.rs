// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Result type for BlkIO operations.
pub type BlkIOResult<T = ()> = core::result::Result<T, BlkIOError>;

/// Error type for BlkIO operations (the device error of the store).
#[derive(Debug, Error)]
pub enum BlkIOError {
    /// Underlying file or device error (short read/write included).
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Attempted to read or write past the end of the backing storage.
    #[error("out of bounds")]
    OutOfBounds,

    #[error("block {index} out of range (device has {count} blocks)")]
    BlockOutOfRange { index: u64, count: u64 },

    #[error("buffer of {got} bytes does not match block size {expected}")]
    BadBufferLength { expected: usize, got: usize },

    /// Invalid block size / device size combination.
    #[error("invalid geometry: {0}")]
    Geometry(&'static str),
}

impl BlkIOError {
    /// True when the error comes from the host rather than from a caller mistake.
    pub fn is_io(&self) -> bool {
        matches!(self, BlkIOError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = BlkIOError::BlockOutOfRange { index: 9, count: 4 };
        assert_eq!(e.to_string(), "block 9 out of range (device has 4 blocks)");
        assert!(!e.is_io());

        let io = BlkIOError::from(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        assert!(io.is_io());
    }
}
