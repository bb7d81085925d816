// SPDX-License-Identifier: MIT

//! Kernel bridge over `fuser`.
//!
//! Each FUSE request is forwarded to the [`FsAdapter`]; tree errors map to
//! errno values through [`FsTreeError::to_errno`].

use fuser::{
    BackgroundSession, FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr,
    ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite,
    Request, TimeOrNow,
};
use libc::c_int;
use std::{
    ffi::OsStr,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tracing::{debug, info, trace, warn};

use crate::core::{errors::*, node::Ino, tree::NodeKind};
use crate::mount::{
    adapter::{FsAdapter, NodeAttr},
    bridge::{Bridge, BridgeSession},
    shutdown::ShutdownSignal,
};

const TTL: Duration = Duration::from_secs(1);
const FILE_PERM: u16 = 0o644;
const DIR_PERM: u16 = 0o755;
const ATTR_BLKSIZE: u32 = 512;

fn mount_options() -> Vec<MountOption> {
    vec![
        MountOption::FSName("blkfs".to_owned()),
        MountOption::DefaultPermissions,
        MountOption::NoAtime,
    ]
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::File => FileType::RegularFile,
        NodeKind::Directory => FileType::Directory,
    }
}

fn log_errno(op: &'static str, ino: Ino, err: &FsTreeError) -> c_int {
    let errno = err.to_errno();
    if err.is_not_found() {
        trace!(op, ino, errno, error = %err, "fuse op returned ENOENT");
    } else {
        warn!(op, ino, errno, error = %err, "fuse op failed");
    }
    errno
}

fn utf8_name(name: &OsStr) -> Result<&str, c_int> {
    name.to_str().ok_or(libc::EINVAL)
}

/// `fuser` filesystem serving one adapter.
pub struct FuseBridge {
    adapter: FsAdapter,
    shutdown: ShutdownSignal,
    uid: u32,
    gid: u32,
    mounted_at: SystemTime,
}

impl FuseBridge {
    pub fn new(adapter: FsAdapter, mountpoint: &Path, shutdown: ShutdownSignal) -> Self {
        let (uid, gid) = match std::fs::metadata(mountpoint) {
            Ok(meta) => (meta.uid(), meta.gid()),
            Err(e) => {
                warn!(mountpoint = %mountpoint.display(), error = %e, "cannot stat mount point, owning files as root");
                (0, 0)
            }
        };
        Self {
            adapter,
            shutdown,
            uid,
            gid,
            mounted_at: SystemTime::now(),
        }
    }

    fn file_attr(&self, attr: &NodeAttr) -> FileAttr {
        let (perm, nlink) = match attr.kind {
            NodeKind::Directory => (DIR_PERM, 2),
            NodeKind::File => (FILE_PERM, 1),
        };
        // Directory size is its child count, files report their byte length.
        FileAttr {
            ino: attr.ino,
            size: attr.size,
            blocks: attr.size.div_ceil(ATTR_BLKSIZE as u64),
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind: file_type(attr.kind),
            perm,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: ATTR_BLKSIZE,
            flags: 0,
        }
    }
}

impl Filesystem for FuseBridge {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        debug!(uid = self.uid, gid = self.gid, "fuse session initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        if self.shutdown.trigger() {
            info!("filesystem unmounted externally, requesting shutdown");
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = match utf8_name(name) {
            Ok(n) => n,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.lookup(parent, name) {
            Ok(attr) => reply.entry(&TTL, &self.file_attr(&attr), 0),
            Err(e) => reply.error(log_errno("lookup", parent, &e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.adapter.attributes_of(ino) {
            Ok(attr) => reply.attr(&TTL, &self.file_attr(&attr)),
            Err(e) => reply.error(log_errno("getattr", ino, &e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.adapter.attributes_of(ino) {
            Ok(attr) if attr.is_dir() => reply.error(libc::EISDIR),
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(log_errno("open", ino, &e)),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.adapter.attributes_of(ino) {
            Ok(attr) if attr.is_dir() => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(log_errno("opendir", ino, &e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let offset = u64::try_from(offset).unwrap_or(0);
        match self.adapter.read_file(ino, offset, size as usize) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(log_errno("read", ino, &e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let (attr, children) = match self
            .adapter
            .attributes_of(ino)
            .and_then(|a| Ok((a, self.adapter.read_dir(ino)?)))
        {
            Ok(v) => v,
            Err(e) => return reply.error(log_errno("readdir", ino, &e)),
        };

        let entries = [
            (attr.ino, FileType::Directory, ".".to_owned()),
            (attr.parent, FileType::Directory, "..".to_owned()),
        ]
        .into_iter()
        .chain(
            children
                .into_iter()
                .map(|e| (e.ino, file_type(e.kind), e.name)),
        );

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, (child, kind, name)) in entries.enumerate().skip(skip) {
            if reply.add(child, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let name = match utf8_name(name) {
            Ok(n) => n,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.mkdir(parent, name) {
            Ok(attr) => reply.entry(&TTL, &self.file_attr(&attr), 0),
            Err(e) => reply.error(log_errno("mkdir", parent, &e)),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let name = match utf8_name(name) {
            Ok(n) => n,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.create(parent, name) {
            Ok(attr) => reply.created(&TTL, &self.file_attr(&attr), 0, 0, 0),
            Err(e) => reply.error(log_errno("create", parent, &e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Ok(offset) = u64::try_from(offset) else {
            return reply.error(libc::EINVAL);
        };
        match self.adapter.write(ino, offset, data) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(log_errno("write", ino, &e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        // Only size changes are stored; other attributes are fixed.
        let result = match size {
            Some(len) => self.adapter.truncate(ino, len),
            None => self.adapter.attributes_of(ino),
        };
        match result {
            Ok(attr) => reply.attr(&TTL, &self.file_attr(&attr)),
            Err(e) => reply.error(log_errno("setattr", ino, &e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = match utf8_name(name) {
            Ok(n) => n,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.unlink(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(log_errno("unlink", parent, &e)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = match utf8_name(name) {
            Ok(n) => n,
            Err(errno) => return reply.error(errno),
        };
        match self.adapter.rmdir(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(log_errno("rmdir", parent, &e)),
        }
    }
}

/// [`Bridge`] that mounts through the kernel FUSE driver.
#[derive(Debug, Clone)]
pub struct FuseMounter {
    shutdown: ShutdownSignal,
}

impl FuseMounter {
    /// `shutdown` is fired if the kernel tears the mount down on its own.
    pub fn new(shutdown: ShutdownSignal) -> Self {
        Self { shutdown }
    }
}

impl Bridge for FuseMounter {
    fn mount(&self, adapter: FsAdapter, mountpoint: &Path) -> FsResult<Box<dyn BridgeSession>> {
        let fs = FuseBridge::new(adapter, mountpoint, self.shutdown.clone());
        let session =
            fuser::spawn_mount2(fs, mountpoint, &mount_options()).map_err(FsError::Bridge)?;
        info!(mountpoint = %mountpoint.display(), "filesystem mounted");
        Ok(Box::new(FuseSession {
            session,
            mountpoint: mountpoint.to_path_buf(),
        }))
    }
}

struct FuseSession {
    session: BackgroundSession,
    mountpoint: PathBuf,
}

impl BridgeSession for FuseSession {
    fn unmount(self: Box<Self>) -> FsResult {
        info!(mountpoint = %self.mountpoint.display(), "unmounting");
        // Dropping the background session unmounts and joins the session thread.
        drop(self.session);
        Ok(())
    }
}
