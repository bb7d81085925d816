// SPDX-License-Identifier: MIT

use std::path::Path;

use crate::core::errors::*;
use crate::mount::adapter::FsAdapter;

/// Attaches an [`FsAdapter`] to a mount point and serves it until unmounted.
pub trait Bridge {
    fn mount(&self, adapter: FsAdapter, mountpoint: &Path) -> FsResult<Box<dyn BridgeSession>>;
}

/// A live mount. Serving continues in the background until [`BridgeSession::unmount`].
pub trait BridgeSession {
    fn unmount(self: Box<Self>) -> FsResult;
}
