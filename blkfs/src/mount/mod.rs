// SPDX-License-Identifier: MIT

pub mod adapter;
pub mod bridge;
#[cfg(feature = "fuse")]
pub mod fuse;
pub mod lifecycle;
pub mod shutdown;

pub use adapter::{FsAdapter, NodeAttr, SharedTree};
pub use bridge::{Bridge, BridgeSession};
#[cfg(feature = "fuse")]
pub use fuse::{FuseBridge, FuseMounter};
pub use lifecycle::{LifecycleController, LifecycleState};
pub use shutdown::ShutdownSignal;
