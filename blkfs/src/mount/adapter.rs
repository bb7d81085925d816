// SPDX-License-Identifier: MIT

//! Filesystem-call surface over the shared inode tree.
//!
//! Reads take the shared lock, mutations take the exclusive one. Every call
//! holds the lock for its whole duration, so no caller observes a tree in the
//! middle of a mutation or a flush.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::core::{errors::*, node::Ino, tree::*};

/// The one tree instance of a mount, shared by the bridge and the controller.
pub type SharedTree = Arc<RwLock<InodeTree>>;

/// What the bridge needs to describe a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub ino: Ino,
    pub parent: Ino,
    pub kind: NodeKind,
    /// Child count for a directory, byte length for a file.
    pub size: u64,
}

impl NodeAttr {
    fn of(node: &Inode) -> Self {
        Self {
            ino: node.ino,
            parent: node.parent,
            kind: node.kind(),
            size: node.size(),
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

#[derive(Debug, Clone)]
pub struct FsAdapter {
    tree: SharedTree,
}

impl FsAdapter {
    pub fn new(tree: SharedTree) -> Self {
        Self { tree }
    }

    #[inline]
    pub fn tree(&self) -> &SharedTree {
        &self.tree
    }

    #[inline]
    pub fn root_ino(&self) -> Ino {
        self.tree.read().root_ino()
    }

    pub fn attributes_of(&self, ino: Ino) -> FsTreeResult<NodeAttr> {
        Ok(NodeAttr::of(self.tree.read().get(ino)?))
    }

    pub fn lookup(&self, parent: Ino, name: &str) -> FsTreeResult<NodeAttr> {
        Ok(NodeAttr::of(self.tree.read().lookup(parent, name)?))
    }

    pub fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> FsTreeResult<NodeAttr> {
        Ok(NodeAttr::of(self.tree.read().resolve(segments)?))
    }

    /// Snapshot of one directory listing.
    pub fn read_dir(&self, ino: Ino) -> FsTreeResult<Vec<DirEntry>> {
        Ok(self.tree.read().list(ino)?.collect())
    }

    /// Returns at most `len` bytes from `offset`. Past the end yields nothing.
    pub fn read_file(&self, ino: Ino, offset: u64, len: usize) -> FsTreeResult<Vec<u8>> {
        let tree = self.tree.read();
        let data = tree.get(ino)?.data().ok_or(FsTreeError::IsADirectory(ino))?;
        let start = usize::try_from(offset).map_or(data.len(), |o| o.min(data.len()));
        let end = start.saturating_add(len).min(data.len());
        Ok(data[start..end].to_vec())
    }

    // === Mutations ===

    pub fn mkdir(&self, parent: Ino, name: &str) -> FsTreeResult<NodeAttr> {
        let mut tree = self.tree.write();
        let ino = tree.create_dir(parent, name)?;
        tracing::debug!(parent, name, ino, "mkdir");
        Ok(NodeAttr::of(tree.get(ino)?))
    }

    pub fn create(&self, parent: Ino, name: &str) -> FsTreeResult<NodeAttr> {
        let mut tree = self.tree.write();
        let ino = tree.create_file(parent, name, Vec::new())?;
        tracing::debug!(parent, name, ino, "create");
        Ok(NodeAttr::of(tree.get(ino)?))
    }

    pub fn write(&self, ino: Ino, offset: u64, data: &[u8]) -> FsTreeResult<usize> {
        self.tree.write().write_file(ino, offset, data)
    }

    pub fn truncate(&self, ino: Ino, len: u64) -> FsTreeResult<NodeAttr> {
        let mut tree = self.tree.write();
        tree.set_len(ino, len)?;
        Ok(NodeAttr::of(tree.get(ino)?))
    }

    pub fn unlink(&self, parent: Ino, name: &str) -> FsTreeResult {
        let ino = self.tree.write().remove_file(parent, name)?;
        tracing::debug!(parent, name, ino, "unlink");
        Ok(())
    }

    pub fn rmdir(&self, parent: Ino, name: &str) -> FsTreeResult {
        let ino = self.tree.write().remove_dir(parent, name)?;
        tracing::debug!(parent, name, ino, "rmdir");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::*;
    use std::thread;

    fn example() -> FsAdapter {
        let tree = InodeTree::from_tree(FsTree::new(
            Dir::new(ROOT_INO, "")
                .with_dir(Dir::new(2, "docs"))
                .with_file(File::new(3, "readme", "hi")),
        ))
        .unwrap();
        FsAdapter::new(Arc::new(RwLock::new(tree)))
    }

    #[test]
    fn test_attributes() {
        let fs = example();
        assert_eq!(
            fs.attributes_of(ROOT_INO).unwrap(),
            NodeAttr {
                ino: ROOT_INO,
                parent: ROOT_INO,
                kind: NodeKind::Directory,
                size: 2
            }
        );
        let readme = fs.attributes_of(3).unwrap();
        assert_eq!(readme.kind, NodeKind::File);
        assert_eq!(readme.size, 2);
        assert_eq!(fs.attributes_of(2).unwrap().size, 0);
        assert_eq!(fs.attributes_of(99).unwrap_err(), FsTreeError::NoSuchInode(99));
    }

    #[test]
    fn test_example_resolution() {
        let fs = example();
        let docs = fs.resolve(&["docs"]).unwrap();
        assert!(docs.is_dir());
        assert!(fs.read_dir(docs.ino).unwrap().is_empty());

        let readme = fs.resolve(&["readme"]).unwrap();
        assert_eq!(fs.read_file(readme.ino, 0, 4096).unwrap(), b"hi");

        assert!(fs.resolve(&["missing"]).unwrap_err().is_not_found());
        assert!(fs.lookup(ROOT_INO, "missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_read_file_clipping() {
        let fs = example();
        assert_eq!(fs.read_file(3, 1, 10).unwrap(), b"i");
        assert_eq!(fs.read_file(3, 0, 1).unwrap(), b"h");
        assert!(fs.read_file(3, 2, 10).unwrap().is_empty());
        assert!(fs.read_file(3, u64::MAX, 10).unwrap().is_empty());
        assert_eq!(fs.read_file(2, 0, 1).unwrap_err(), FsTreeError::IsADirectory(2));
    }

    #[test]
    fn test_read_dir_projects_list() {
        let fs = example();
        let mut names: Vec<_> = fs
            .read_dir(ROOT_INO)
            .unwrap()
            .into_iter()
            .map(|e| (e.name, e.kind))
            .collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            names,
            vec![
                ("docs".to_string(), NodeKind::Directory),
                ("readme".to_string(), NodeKind::File)
            ]
        );
    }

    #[test]
    fn test_mutations() {
        let fs = example();
        let notes = fs.mkdir(2, "notes").unwrap();
        assert!(notes.is_dir());
        assert_eq!(notes.parent, 2);

        let todo = fs.create(notes.ino, "todo").unwrap();
        assert_eq!(todo.size, 0);
        assert_eq!(fs.write(todo.ino, 0, b"buy milk").unwrap(), 8);
        assert_eq!(fs.truncate(todo.ino, 3).unwrap().size, 3);
        assert_eq!(fs.resolve(&["docs", "notes", "todo"]).unwrap().ino, todo.ino);
        assert_eq!(fs.read_file(todo.ino, 0, 100).unwrap(), b"buy");

        assert_eq!(fs.rmdir(2, "notes").unwrap_err(), FsTreeError::NotEmpty(notes.ino));
        fs.unlink(notes.ino, "todo").unwrap();
        fs.rmdir(2, "notes").unwrap();
        assert!(fs.resolve(&["docs", "notes"]).is_err());
    }

    #[test]
    fn test_concurrent_reads_agree() {
        let fs = example();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let fs = fs.clone();
                thread::spawn(move || {
                    (0..200)
                        .map(|_| {
                            let readme = fs.resolve(&["readme"]).unwrap();
                            let data = fs.read_file(readme.ino, 0, 16).unwrap();
                            let docs = fs.resolve(&["docs"]).unwrap();
                            (readme.ino, data, docs.ino, fs.read_dir(ROOT_INO).unwrap().len())
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for h in handles {
            for (readme, data, docs, entries) in h.join().unwrap() {
                assert_eq!(readme, 3);
                assert_eq!(data, b"hi");
                assert_eq!(docs, 2);
                assert_eq!(entries, 2);
            }
        }
    }
}
