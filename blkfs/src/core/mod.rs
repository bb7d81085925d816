// SPDX-License-Identifier: MIT

// === Sub-modules ===
pub mod codec;
pub mod config;
pub mod errors;
pub mod macros;
pub mod node;
pub mod tree;

// === Core types ===
pub use config::{DeviceConfig, METADATA_BLOCK, RESERVED_BLOCK};
pub use node::{Dir, File, FsCounts, FsTree, Ino, ROOT_INO};
pub use tree::{DirEntry, Inode, InodeTree, NodeBody, NodeKind};

// === Error types ===
pub use errors::*;
