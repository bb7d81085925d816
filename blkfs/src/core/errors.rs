// SPDX-License-Identifier: MIT

use thiserror::Error;

pub use blkio::errors::*;

use crate::core::node::{Ino, ROOT_INO};

/// The in-memory tree no longer fits the metadata block, or could not be serialized.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("metadata serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("encoded tree is {size} bytes, metadata block holds {capacity}")]
    TooLarge { size: usize, capacity: usize },
}

/// The persisted metadata block is malformed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed metadata: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("root directory has inode {0}, expected {ROOT_INO}")]
    RootInode(Ino),

    #[error("entry '{name}' has inode 0")]
    ZeroInode { name: String },

    #[error("inode {0} appears more than once")]
    DuplicateInode(Ino),

    #[error("directory {parent} holds '{name}' more than once")]
    DuplicateName { parent: Ino, name: String },

    #[error("invalid entry name '{0}'")]
    InvalidName(String),

    #[error("inode {0} leaves no room to allocate new inodes")]
    InodeSpaceExhausted(Ino),
}

/// Negative results and refused mutations of the inode tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsTreeError {
    #[error("'{name}' not found in directory {parent}")]
    NotFound { parent: Ino, name: String },

    #[error("no such inode {0}")]
    NoSuchInode(Ino),

    #[error("inode {0} is not a directory")]
    NotADirectory(Ino),

    #[error("inode {0} is a directory")]
    IsADirectory(Ino),

    #[error("'{name}' already exists in directory {parent}")]
    AlreadyExists { parent: Ino, name: String },

    #[error("directory {0} is not empty")]
    NotEmpty(Ino),

    #[error("invalid entry name '{0}'")]
    InvalidName(String),

    #[error("inode {0} would exceed the maximum file size")]
    FileTooLarge(Ino),

    #[error("no inode numbers left")]
    InodesExhausted,

    #[error("filesystem is read-only")]
    ReadOnly,
}

impl FsTreeError {
    /// True for the ordinary "no such entry" outcome of a lookup.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            FsTreeError::NotFound { .. } | FsTreeError::NoSuchInode(_)
        )
    }

    /// errno reported to the kernel bridge.
    #[cfg(feature = "fuse")]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            FsTreeError::NotFound { .. } | FsTreeError::NoSuchInode(_) => libc::ENOENT,
            FsTreeError::NotADirectory(_) => libc::ENOTDIR,
            FsTreeError::IsADirectory(_) => libc::EISDIR,
            FsTreeError::AlreadyExists { .. } => libc::EEXIST,
            FsTreeError::NotEmpty(_) => libc::ENOTEMPTY,
            FsTreeError::InvalidName(_) => libc::EINVAL,
            FsTreeError::FileTooLarge(_) => libc::EFBIG,
            FsTreeError::InodesExhausted => libc::ENOSPC,
            FsTreeError::ReadOnly => libc::EROFS,
        }
    }
}

/// Top-level error
#[derive(Debug, Error)]
pub enum FsError {
    #[error(transparent)]
    Device(#[from] BlkIOError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Tree(#[from] FsTreeError),

    #[error("filesystem bridge error: {0}")]
    Bridge(std::io::Error),

    #[error("invalid lifecycle transition: {0}")]
    Lifecycle(&'static str),

    #[error("cannot install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("invalid configuration: {0}")]
    Config(&'static str),

    #[error("cannot read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("cannot parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

// === type Fs*Result ===

pub type FsResult<T = ()> = Result<T, FsError>;
pub type FsTreeResult<T = ()> = Result<T, FsTreeError>;
pub type EncodeResult<T = ()> = Result<T, EncodeError>;
pub type DecodeResult<T = ()> = Result<T, DecodeError>;
