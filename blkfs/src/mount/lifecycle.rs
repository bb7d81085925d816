// SPDX-License-Identifier: MIT

//! Mount, serve, flush and unmount sequencing.
//!
//! ```text
//! Unmounted -> Mounting -> Serving -> Flushing -> Terminated
//! ```
//!
//! Mounting loads the tree from the metadata block, falling back to an empty
//! tree when the block is blank or corrupt. Serving lasts until the shutdown
//! signal fires. Flushing writes the tree back under the exclusive lock and
//! then releases the bridge, even when the write failed.

use core::fmt;
use parking_lot::RwLock;
use std::{path::Path, sync::Arc};
use tracing::{debug, error, info, warn};

use blkio::{BlkIO, device::BlockStore};

use crate::core::{codec, config::*, errors::*, tree::InodeTree};
use crate::ensure;
use crate::mount::{
    adapter::{FsAdapter, SharedTree},
    bridge::{Bridge, BridgeSession},
    shutdown::ShutdownSignal,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unmounted,
    Mounting,
    Serving,
    Flushing,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Unmounted => "unmounted",
            LifecycleState::Mounting => "mounting",
            LifecycleState::Serving => "serving",
            LifecycleState::Flushing => "flushing",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Owns the block store and the tree for the lifetime of one mount.
pub struct LifecycleController<IO: BlkIO> {
    store: Option<BlockStore<IO>>,
    tree: SharedTree,
    session: Option<Box<dyn BridgeSession>>,
    state: LifecycleState,
}

impl<IO: BlkIO> Default for LifecycleController<IO> {
    fn default() -> Self {
        Self::new()
    }
}

impl<IO: BlkIO> LifecycleController<IO> {
    pub fn new() -> Self {
        Self {
            store: None,
            tree: Arc::new(RwLock::new(InodeTree::new())),
            session: None,
            state: LifecycleState::Unmounted,
        }
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[inline]
    pub fn tree(&self) -> &SharedTree {
        &self.tree
    }

    /// A request handler sharing this controller's tree.
    pub fn adapter(&self) -> FsAdapter {
        FsAdapter::new(Arc::clone(&self.tree))
    }

    #[inline]
    pub fn store(&self) -> Option<&BlockStore<IO>> {
        self.store.as_ref()
    }

    /// Gives the backing store back once the controller is done with it.
    pub fn into_store(self) -> Option<BlockStore<IO>> {
        self.store
    }

    /// Loads the tree from `store`. Device errors are fatal; metadata errors are not.
    pub fn mount(&mut self, store: BlockStore<IO>) -> FsResult {
        ensure!(
            self.state == LifecycleState::Unmounted,
            FsError::Lifecycle("mount requires an unmounted controller")
        );
        self.state = LifecycleState::Mounting;

        match Self::load(store) {
            Ok((store, tree)) => {
                let tree = tree.with_max_file_size(store.block_size());
                info!(counts = %tree.counts(), "tree ready");
                debug!("loaded tree:\n{}", tree.to_tree());
                *self.tree.write() = tree;
                self.store = Some(store);
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Unmounted;
                Err(e)
            }
        }
    }

    fn load(mut store: BlockStore<IO>) -> FsResult<(BlockStore<IO>, InodeTree)> {
        ensure!(
            store.block_count() > METADATA_BLOCK,
            FsError::Config("device needs a reserved block and a metadata block")
        );

        if store.was_created() {
            info!("no backing store found, starting with an empty tree");
            return Ok((store, InodeTree::new()));
        }

        let block = store.read_block(METADATA_BLOCK)?;
        if codec::is_blank(&block) {
            info!("metadata block is blank, starting with an empty tree");
            return Ok((store, InodeTree::new()));
        }

        let tree = match codec::decode(&block).and_then(InodeTree::from_tree) {
            Ok(tree) => tree,
            Err(e) => {
                warn!(error = %e, "metadata block is corrupt, starting with an empty tree");
                InodeTree::new()
            }
        };
        Ok((store, tree))
    }

    /// Attaches the tree to `bridge` at `mountpoint`.
    pub fn start<B: Bridge + ?Sized>(&mut self, bridge: &B, mountpoint: &Path) -> FsResult {
        ensure!(
            self.state == LifecycleState::Mounting,
            FsError::Lifecycle("serving requires a mounted tree")
        );
        let session = bridge.mount(self.adapter(), mountpoint)?;
        self.session = Some(session);
        self.state = LifecycleState::Serving;
        info!(mountpoint = %mountpoint.display(), "serving");
        Ok(())
    }

    /// Serves until `shutdown` fires, then flushes and unmounts.
    pub fn serve<B: Bridge + ?Sized>(
        &mut self,
        bridge: &B,
        mountpoint: &Path,
        shutdown: &ShutdownSignal,
    ) -> FsResult {
        self.start(bridge, mountpoint)?;
        shutdown.wait();
        self.stop();
        Ok(())
    }

    /// Best-effort shutdown: flush errors are logged and the bridge is released anyway.
    pub fn stop(&mut self) {
        match self.flush() {
            Ok(true) => {}
            Ok(false) => debug!(state = %self.state, "nothing to flush"),
            Err(e) => error!(error = %e, "flush failed, metadata block left unchanged"),
        }

        if let Some(session) = self.session.take()
            && let Err(e) = session.unmount()
        {
            error!(error = %e, "unmount failed");
        }
        self.state = LifecycleState::Terminated;
    }

    /// Writes the tree to the metadata block.
    ///
    /// Returns `Ok(false)` when not serving, so only the first call writes.
    /// The exclusive lock is held from encoding until the device flush; the
    /// tree is read-only afterwards.
    pub fn flush(&mut self) -> FsResult<bool> {
        if self.state != LifecycleState::Serving {
            return Ok(false);
        }
        self.state = LifecycleState::Flushing;

        let store = self
            .store
            .as_mut()
            .ok_or(FsError::Lifecycle("flush without a backing store"))?;

        let mut tree = self.tree.write();
        tree.seal();

        let snapshot = tree.to_tree();
        let block = codec::encode_block(&snapshot, store.block_size())?;

        store.zero_block(RESERVED_BLOCK)?;
        store.write_block(METADATA_BLOCK, &block)?;
        store.flush()?;

        info!(counts = %snapshot.counts(), "tree flushed");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{node::*, tree::NodeKind};
    use blkio::prelude::*;
    use std::{
        path::PathBuf,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    const BS: usize = 512;
    const DISK: u64 = 8 * BS as u64;

    type Io = IOCounter<MemBlkIO>;

    #[derive(Default)]
    struct FakeBridge {
        mounts: Arc<AtomicUsize>,
        unmounts: Arc<AtomicUsize>,
        at: Mutex<Option<PathBuf>>,
        fail: bool,
    }

    struct FakeSession {
        unmounts: Arc<AtomicUsize>,
    }

    impl Bridge for FakeBridge {
        fn mount(&self, _adapter: FsAdapter, mountpoint: &Path) -> FsResult<Box<dyn BridgeSession>> {
            if self.fail {
                return Err(FsError::Bridge(std::io::Error::other("no fuse device")));
            }
            self.mounts.fetch_add(1, Ordering::SeqCst);
            *self.at.lock().unwrap() = Some(mountpoint.to_path_buf());
            Ok(Box::new(FakeSession {
                unmounts: Arc::clone(&self.unmounts),
            }))
        }
    }

    impl BridgeSession for FakeSession {
        fn unmount(self: Box<Self>) -> FsResult {
            self.unmounts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fresh_store() -> BlockStore<Io> {
        BlockStore::new(IOCounter::new(MemBlkIO::new(0)), DISK, BS).unwrap()
    }

    fn reopen(store: BlockStore<Io>) -> BlockStore<Io> {
        BlockStore::new(IOCounter::new(store.into_inner().into_inner()), DISK, BS).unwrap()
    }

    fn mounted(store: BlockStore<Io>) -> LifecycleController<Io> {
        let mut ctl = LifecycleController::new();
        ctl.mount(store).unwrap();
        assert_eq!(ctl.state(), LifecycleState::Mounting);
        ctl
    }

    fn stats(ctl: &LifecycleController<Io>) -> IoStats {
        ctl.store().unwrap().io().snapshot()
    }

    #[test]
    fn test_fresh_mount_round_trip() {
        let ctl = mounted(fresh_store());
        assert!(ctl.store().unwrap().was_created());
        assert_eq!(ctl.tree().read().to_tree(), FsTree::empty());

        let bridge = FakeBridge::default();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let mut ctl = ctl;
        ctl.serve(&bridge, Path::new("/mnt/blk"), &shutdown).unwrap();
        assert_eq!(ctl.state(), LifecycleState::Terminated);
        assert_eq!(bridge.unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(
            bridge.at.lock().unwrap().as_deref(),
            Some(Path::new("/mnt/blk"))
        );

        let mut store = reopen(ctl.into_store().unwrap());
        assert!(!store.was_created());
        assert_eq!(store.read_block(RESERVED_BLOCK).unwrap(), vec![0u8; BS]);

        let ctl = mounted(store);
        assert_eq!(ctl.tree().read().to_tree(), FsTree::empty());
    }

    #[test]
    fn test_flush_mount_cycle_keeps_content() {
        let mut ctl = mounted(fresh_store());
        let bridge = FakeBridge::default();
        ctl.start(&bridge, Path::new("/mnt")).unwrap();
        assert_eq!(ctl.state(), LifecycleState::Serving);

        let fs = ctl.adapter();
        let docs = fs.mkdir(ROOT_INO, "docs").unwrap();
        let readme = fs.create(ROOT_INO, "readme").unwrap();
        fs.write(readme.ino, 0, b"hi").unwrap();
        let before = ctl.tree().read().to_tree().normalized();

        ctl.stop();
        assert_eq!(
            fs.mkdir(ROOT_INO, "late").unwrap_err(),
            FsTreeError::ReadOnly
        );

        let ctl = mounted(reopen(ctl.into_store().unwrap()));
        assert_eq!(ctl.tree().read().to_tree().normalized(), before);

        let fs = ctl.adapter();
        assert_eq!(fs.resolve(&["docs"]).unwrap().ino, docs.ino);
        assert_eq!(fs.read_file(readme.ino, 0, 64).unwrap(), b"hi");
        assert!(fs.resolve(&["missing"]).unwrap_err().is_not_found());

        // New inodes stay clear of the persisted ones.
        let next = fs.create(ROOT_INO, "new").unwrap();
        assert!(next.ino > readme.ino.max(docs.ino));
    }

    #[test]
    fn test_corrupt_metadata_falls_back_to_empty() {
        let mut store = fresh_store();
        let mut garbage = br#"{"RootDir":{"Inode":1,"Name":"","Files":[{"Inode":"x"}]}}"#.to_vec();
        garbage.resize(BS, 0);
        store.write_block(METADATA_BLOCK, &garbage).unwrap();

        let ctl = mounted(reopen(store));
        assert_eq!(ctl.tree().read().to_tree(), FsTree::empty());
    }

    #[test]
    fn test_duplicate_inodes_fall_back_to_empty() {
        let tree = FsTree::new(
            Dir::new(ROOT_INO, "")
                .with_file(File::new(2, "a", ""))
                .with_file(File::new(2, "b", "")),
        );
        let mut store = fresh_store();
        store
            .write_block(METADATA_BLOCK, &codec::encode_block(&tree, BS).unwrap())
            .unwrap();

        let ctl = mounted(reopen(store));
        assert!(ctl.tree().read().is_empty());
    }

    #[test]
    fn test_unaddressable_metadata_falls_back_to_empty() {
        let payloads: [&[u8]; 2] = [
            br#"{"RootDir":{"Inode":7,"Name":"","Files":[{"Inode":1,"Name":"f","Data":"aGk="}]}}"#,
            br#"{"RootDir":{"Inode":1,"Name":"","Files":[{"Inode":18446744073709551615,"Name":"f","Data":""}]}}"#,
        ];
        for payload in payloads {
            let mut block = payload.to_vec();
            block.resize(BS, 0);
            let mut store = fresh_store();
            store.write_block(METADATA_BLOCK, &block).unwrap();

            let ctl = mounted(reopen(store));
            assert!(ctl.tree().read().is_empty());
            assert_eq!(ctl.adapter().attributes_of(ROOT_INO).unwrap().kind, NodeKind::Directory);
        }
    }

    #[test]
    fn test_blank_existing_store_is_empty_tree() {
        let store = BlockStore::new(IOCounter::new(MemBlkIO::new(DISK as usize)), DISK, BS).unwrap();
        let ctl = mounted(store);
        assert!(!ctl.store().unwrap().was_created());
        assert_eq!(ctl.tree().read().to_tree(), FsTree::empty());
    }

    #[test]
    fn test_oversized_tree_writes_nothing_but_unmounts() {
        let mut ctl = mounted(fresh_store());
        let bridge = FakeBridge::default();
        ctl.start(&bridge, Path::new("/mnt")).unwrap();

        let fs = ctl.adapter();
        let big = fs.create(ROOT_INO, "big").unwrap();
        fs.write(big.ino, 0, &[0xAB; BS]).unwrap();

        assert!(matches!(
            ctl.flush(),
            Err(FsError::Encode(EncodeError::TooLarge { .. }))
        ));
        assert_eq!(stats(&ctl).writes, 0);
        assert!(!ctl.flush().unwrap());

        ctl.stop();
        assert_eq!(stats(&ctl).writes, 0);
        assert_eq!(bridge.unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(ctl.state(), LifecycleState::Terminated);
    }

    #[test]
    fn test_file_growth_bounded_by_block_size() {
        let ctl = mounted(fresh_store());
        assert_eq!(ctl.tree().read().max_file_size(), BS);

        let fs = ctl.adapter();
        let f = fs.create(ROOT_INO, "f").unwrap();
        assert_eq!(fs.truncate(f.ino, 1 << 62).unwrap_err(), FsTreeError::FileTooLarge(f.ino));
        assert_eq!(
            fs.write(f.ino, BS as u64, b"x").unwrap_err(),
            FsTreeError::FileTooLarge(f.ino)
        );
        assert_eq!(fs.attributes_of(f.ino).unwrap().size, 0);
    }

    #[test]
    fn test_repeated_signals_flush_once() {
        let mut ctl = mounted(fresh_store());
        let bridge = FakeBridge::default();
        let shutdown = ShutdownSignal::new();
        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());

        ctl.serve(&bridge, Path::new("/mnt"), &shutdown).unwrap();
        let s = stats(&ctl);
        assert_eq!(s.flushes, 1);
        assert_eq!(s.write_bytes, 2 * BS as u64);
        assert_eq!(s.last_write_offset, Some(BS as u64));

        assert!(!ctl.flush().unwrap());
        ctl.stop();
        assert_eq!(stats(&ctl).flushes, 1);
        assert_eq!(bridge.unmounts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_flush_outside_serving_is_noop() {
        let mut ctl: LifecycleController<Io> = LifecycleController::new();
        assert!(!ctl.flush().unwrap());

        ctl.mount(fresh_store()).unwrap();
        assert!(!ctl.flush().unwrap());
        assert_eq!(stats(&ctl).writes, 0);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut ctl: LifecycleController<Io> = LifecycleController::new();
        assert!(matches!(
            ctl.start(&FakeBridge::default(), Path::new("/mnt")),
            Err(FsError::Lifecycle(_))
        ));

        ctl.mount(fresh_store()).unwrap();
        assert!(matches!(ctl.mount(fresh_store()), Err(FsError::Lifecycle(_))));
    }

    #[test]
    fn test_bridge_failure_is_fatal() {
        let mut ctl = mounted(fresh_store());
        let bridge = FakeBridge {
            fail: true,
            ..Default::default()
        };
        assert!(matches!(
            ctl.serve(&bridge, Path::new("/mnt"), &ShutdownSignal::new()),
            Err(FsError::Bridge(_))
        ));
        assert_eq!(ctl.state(), LifecycleState::Mounting);
    }

    #[test]
    fn test_device_too_small() {
        let store = BlockStore::new(IOCounter::new(MemBlkIO::new(0)), BS as u64, BS).unwrap();
        let mut ctl = LifecycleController::new();
        assert!(matches!(ctl.mount(store), Err(FsError::Config(_))));
        assert_eq!(ctl.state(), LifecycleState::Unmounted);
    }

    #[test]
    fn test_reads_during_serving() {
        let mut ctl = mounted(fresh_store());
        let bridge = FakeBridge::default();
        ctl.start(&bridge, Path::new("/mnt")).unwrap();
        let fs = ctl.adapter();
        let f = fs.create(ROOT_INO, "f").unwrap();
        fs.write(f.ino, 0, b"stable").unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let fs = fs.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let attr = fs.resolve(&["f"]).unwrap();
                        assert_eq!(fs.read_file(attr.ino, 0, 64).unwrap(), b"stable");
                    }
                })
            })
            .collect();
        ctl.stop();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(stats(&ctl).flushes, 1);
    }
}
