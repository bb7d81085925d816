// SPDX-License-Identifier: MIT

//! In-memory inode tree.
//!
//! Nodes live in a flat table keyed by inode number; directories map child
//! names to inodes. Every inode in the table is unique, the root always
//! exists, and [`InodeTree::allocate_inode`] never hands out a number that is
//! already present. Writes never grow a file past [`InodeTree::max_file_size`],
//! which defaults to one metadata block.

use std::collections::{BTreeMap, HashMap};

use crate::core::{codec, config::DEFAULT_BLOCK_SIZE, errors::*, node::*};
use crate::{bail, ensure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeBody {
    Dir { children: BTreeMap<String, Ino> },
    File { data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub ino: Ino,
    pub name: String,
    /// Parent directory; the root is its own parent.
    pub parent: Ino,
    pub body: NodeBody,
}

impl Inode {
    #[inline]
    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Dir { .. } => NodeKind::Directory,
            NodeBody::File { .. } => NodeKind::File,
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == NodeKind::Directory
    }

    /// Child count for a directory, content length for a file.
    #[inline]
    pub fn size(&self) -> u64 {
        match &self.body {
            NodeBody::Dir { children } => children.len() as u64,
            NodeBody::File { data } => data.len() as u64,
        }
    }

    #[inline]
    pub fn data(&self) -> Option<&[u8]> {
        match &self.body {
            NodeBody::File { data } => Some(data),
            NodeBody::Dir { .. } => None,
        }
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: Ino,
    pub name: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone)]
pub struct InodeTree {
    nodes: HashMap<Ino, Inode>,
    root: Ino,
    /// `None` once `u64::MAX` has been handed out.
    next_ino: Option<Ino>,
    max_file_size: usize,
    sealed: bool,
}

impl Default for InodeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTree {
    /// A tree holding only an empty root directory.
    pub fn new() -> Self {
        let root = Inode {
            ino: ROOT_INO,
            name: String::new(),
            parent: ROOT_INO,
            body: NodeBody::Dir {
                children: BTreeMap::new(),
            },
        };
        Self {
            nodes: HashMap::from([(ROOT_INO, root)]),
            root: ROOT_INO,
            next_ino: Some(ROOT_INO + 1),
            max_file_size: DEFAULT_BLOCK_SIZE,
            sealed: false,
        }
    }

    /// Builds the table from a persisted tree after validating it.
    pub fn from_tree(tree: FsTree) -> DecodeResult<Self> {
        codec::validate(&tree)?;

        let root = tree.root.inode;
        let mut nodes = HashMap::new();
        let mut max_ino = root;
        let mut stack: Vec<(Dir, Ino)> = vec![(tree.root, root)];

        while let Some((dir, parent)) = stack.pop() {
            let mut children = BTreeMap::new();

            for f in dir.files {
                max_ino = max_ino.max(f.inode);
                children.insert(f.name.clone(), f.inode);
                nodes.insert(
                    f.inode,
                    Inode {
                        ino: f.inode,
                        name: f.name,
                        parent: dir.inode,
                        body: NodeBody::File { data: f.data },
                    },
                );
            }
            for d in dir.directories {
                max_ino = max_ino.max(d.inode);
                children.insert(d.name.clone(), d.inode);
                stack.push((d, dir.inode));
            }

            nodes.insert(
                dir.inode,
                Inode {
                    ino: dir.inode,
                    name: dir.name,
                    parent,
                    body: NodeBody::Dir { children },
                },
            );
        }

        let next_ino = max_ino
            .checked_add(1)
            .ok_or(DecodeError::InodeSpaceExhausted(max_ino))?;

        Ok(Self {
            nodes,
            root,
            next_ino: Some(next_ino),
            max_file_size: DEFAULT_BLOCK_SIZE,
            sealed: false,
        })
    }

    /// Caps file growth at `limit` bytes.
    pub fn with_max_file_size(mut self, limit: usize) -> Self {
        self.max_file_size = limit;
        self
    }

    #[inline]
    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Rebuilds the persisted shape of the tree.
    pub fn to_tree(&self) -> FsTree {
        FsTree::new(self.export_dir(self.root))
    }

    fn export_dir(&self, ino: Ino) -> Dir {
        let node = &self.nodes[&ino];
        let mut dir = Dir::new(node.ino, node.name.clone());
        if let NodeBody::Dir { children } = &node.body {
            for &child in children.values() {
                let c = &self.nodes[&child];
                match &c.body {
                    NodeBody::File { data } => {
                        dir.files.push(File::new(c.ino, c.name.clone(), data.clone()))
                    }
                    NodeBody::Dir { .. } => dir.directories.push(self.export_dir(child)),
                }
            }
        }
        dir
    }

    #[inline]
    pub fn root(&self) -> &Inode {
        &self.nodes[&self.root]
    }

    #[inline]
    pub fn root_ino(&self) -> Ino {
        self.root
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the root has no children.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    pub fn get(&self, ino: Ino) -> FsTreeResult<&Inode> {
        self.nodes.get(&ino).ok_or(FsTreeError::NoSuchInode(ino))
    }

    fn children(&self, dir: Ino) -> FsTreeResult<&BTreeMap<String, Ino>> {
        match &self.get(dir)?.body {
            NodeBody::Dir { children } => Ok(children),
            NodeBody::File { .. } => Err(FsTreeError::NotADirectory(dir)),
        }
    }

    /// Resolves one path segment against a directory.
    pub fn lookup(&self, dir: Ino, name: &str) -> FsTreeResult<&Inode> {
        let ino = self
            .children(dir)?
            .get(name)
            .copied()
            .ok_or_else(|| FsTreeError::NotFound {
                parent: dir,
                name: name.to_string(),
            })?;
        self.get(ino)
    }

    /// Enumerates a directory. Order is stable for the lifetime of the borrow.
    pub fn list(&self, dir: Ino) -> FsTreeResult<impl Iterator<Item = DirEntry> + '_> {
        let children = self.children(dir)?;
        Ok(children.iter().filter_map(|(name, ino)| {
            self.nodes.get(ino).map(|n| DirEntry {
                ino: *ino,
                name: name.clone(),
                kind: n.kind(),
            })
        }))
    }

    /// Walks `segments` from the root, failing at the first missing one.
    pub fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> FsTreeResult<&Inode> {
        let mut node = self.root();
        for seg in segments {
            node = self.lookup(node.ino, seg.as_ref())?;
        }
        Ok(node)
    }

    /// Returns a fresh inode number, strictly greater than any in the tree.
    pub fn allocate_inode(&mut self) -> FsTreeResult<Ino> {
        let ino = self.next_ino.ok_or(FsTreeError::InodesExhausted)?;
        self.next_ino = ino.checked_add(1);
        Ok(ino)
    }

    // === Mutations ===

    /// Rejects every later mutation with [`FsTreeError::ReadOnly`].
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    #[inline]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn create_dir(&mut self, parent: Ino, name: &str) -> FsTreeResult<Ino> {
        self.insert(
            parent,
            name,
            NodeBody::Dir {
                children: BTreeMap::new(),
            },
        )
    }

    pub fn create_file(&mut self, parent: Ino, name: &str, data: Vec<u8>) -> FsTreeResult<Ino> {
        self.insert(parent, name, NodeBody::File { data })
    }

    fn insert(&mut self, parent: Ino, name: &str, body: NodeBody) -> FsTreeResult<Ino> {
        ensure!(!self.sealed, FsTreeError::ReadOnly);
        ensure!(
            codec::is_valid_name(name),
            FsTreeError::InvalidName(name.to_string())
        );
        if self.children(parent)?.contains_key(name) {
            bail!(FsTreeError::AlreadyExists {
                parent,
                name: name.to_string(),
            });
        }

        let ino = self.allocate_inode()?;
        self.nodes.insert(
            ino,
            Inode {
                ino,
                name: name.to_string(),
                parent,
                body,
            },
        );
        self.children_mut(parent)?.insert(name.to_string(), ino);
        Ok(ino)
    }

    fn children_mut(&mut self, dir: Ino) -> FsTreeResult<&mut BTreeMap<String, Ino>> {
        match &mut self.nodes.get_mut(&dir).ok_or(FsTreeError::NoSuchInode(dir))?.body {
            NodeBody::Dir { children } => Ok(children),
            NodeBody::File { .. } => Err(FsTreeError::NotADirectory(dir)),
        }
    }

    fn data_mut(&mut self, ino: Ino) -> FsTreeResult<&mut Vec<u8>> {
        ensure!(!self.sealed, FsTreeError::ReadOnly);
        match &mut self.nodes.get_mut(&ino).ok_or(FsTreeError::NoSuchInode(ino))?.body {
            NodeBody::File { data } => Ok(data),
            NodeBody::Dir { .. } => Err(FsTreeError::IsADirectory(ino)),
        }
    }

    /// Writes `bytes` at `offset`, zero-extending any gap. Returns bytes written.
    pub fn write_file(&mut self, ino: Ino, offset: u64, bytes: &[u8]) -> FsTreeResult<usize> {
        let limit = self.max_file_size;
        let data = self.data_mut(ino)?;
        let end = usize::try_from(offset)
            .ok()
            .and_then(|start| start.checked_add(bytes.len()))
            .filter(|&end| end <= limit)
            .ok_or(FsTreeError::FileTooLarge(ino))?;
        let start = end - bytes.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Truncates or zero-extends file content to `len` bytes.
    pub fn set_len(&mut self, ino: Ino, len: u64) -> FsTreeResult {
        let limit = self.max_file_size;
        let data = self.data_mut(ino)?;
        let len = usize::try_from(len)
            .ok()
            .filter(|&len| len <= limit)
            .ok_or(FsTreeError::FileTooLarge(ino))?;
        data.resize(len, 0);
        Ok(())
    }

    pub fn remove_file(&mut self, parent: Ino, name: &str) -> FsTreeResult<Ino> {
        self.remove(parent, name, NodeKind::File)
    }

    /// Removes an empty directory.
    pub fn remove_dir(&mut self, parent: Ino, name: &str) -> FsTreeResult<Ino> {
        self.remove(parent, name, NodeKind::Directory)
    }

    fn remove(&mut self, parent: Ino, name: &str, kind: NodeKind) -> FsTreeResult<Ino> {
        ensure!(!self.sealed, FsTreeError::ReadOnly);
        let node = self.lookup(parent, name)?;
        let ino = node.ino;
        match (kind, node.kind()) {
            (NodeKind::File, NodeKind::Directory) => bail!(FsTreeError::IsADirectory(ino)),
            (NodeKind::Directory, NodeKind::File) => bail!(FsTreeError::NotADirectory(ino)),
            (NodeKind::Directory, NodeKind::Directory) if node.size() > 0 => {
                bail!(FsTreeError::NotEmpty(ino))
            }
            _ => {}
        }
        self.children_mut(parent)?.remove(name);
        self.nodes.remove(&ino);
        Ok(ino)
    }

    pub fn counts(&self) -> FsCounts {
        let mut out = FsCounts::default();
        for n in self.nodes.values() {
            match &n.body {
                NodeBody::Dir { .. } => out.dirs += 1,
                NodeBody::File { data } => {
                    out.files += 1;
                    out.bytes = out.bytes.saturating_add(data.len() as u64);
                }
            }
        }
        out
    }
}
