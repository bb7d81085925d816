// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::core::errors::*;
use crate::ensure;

/// Block zeroed before every metadata write.
pub const RESERVED_BLOCK: u64 = 0;
/// Block holding the encoded tree.
pub const METADATA_BLOCK: u64 = 1;

pub const DEFAULT_BACKING_PATH: &str = "blkfs.img";
pub const DEFAULT_BLOCK_SIZE: usize = 4096;
pub const DEFAULT_DISK_SIZE: u64 = 1024 * 1024;
pub const MIN_BLOCK_SIZE: usize = 512;

/// Backing device parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub backing_path: PathBuf,
    pub block_size: usize,
    pub disk_size: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backing_path: PathBuf::from(DEFAULT_BACKING_PATH),
            block_size: DEFAULT_BLOCK_SIZE,
            disk_size: DEFAULT_DISK_SIZE,
        }
    }
}

impl DeviceConfig {
    pub fn from_toml_str(content: &str) -> FsResult<Self> {
        let cfg: DeviceConfig = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> FsResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> FsResult {
        ensure!(
            self.block_size.is_power_of_two() && self.block_size >= MIN_BLOCK_SIZE,
            FsError::Config("block size must be a power of two of at least 512 bytes")
        );
        ensure!(
            self.disk_size.is_multiple_of(self.block_size as u64),
            FsError::Config("disk size must be a multiple of the block size")
        );
        ensure!(
            self.block_count() > METADATA_BLOCK,
            FsError::Config("device needs a reserved block and a metadata block")
        );
        Ok(())
    }

    #[inline]
    pub fn block_count(&self) -> u64 {
        self.disk_size / self.block_size as u64
    }
}
