// SPDX-License-Identifier: MIT

//! Single-block metadata filesystem served from user space.
//!
//! The whole directory tree lives in memory and is persisted as one encoded
//! payload in block 1 of a fixed-size backing device. See
//! [`mount::LifecycleController`] for the mount, serve and flush sequence.

// Core Modules
pub mod core;
pub mod mount;

// Reusable types and traits
pub use crate::core::*;

pub mod prelude {
    pub use crate::core::*;
    pub use crate::mount::*;
    pub use blkio::prelude::*;
}
