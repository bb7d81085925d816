// SPDX-License-Identifier: MIT

//! Metadata codec: [`FsTree`] <-> self-describing JSON payload.
//!
//! The payload must fit one block. Oversized trees are an [`EncodeError`],
//! never truncated. Decoding is schema-checked: unknown fields are ignored,
//! missing child lists are empty, any other shape mismatch is a
//! [`DecodeError`], and the decoded tree is validated (root at [`ROOT_INO`],
//! non-zero unique inodes, unique well-formed names per directory).

use std::collections::HashSet;

use crate::core::{errors::*, node::*};
use crate::{bail, ensure};

/// Serializes `tree`, failing if the payload exceeds `capacity` bytes.
pub fn encode(tree: &FsTree, capacity: usize) -> EncodeResult<Vec<u8>> {
    let payload = serde_json::to_vec(tree)?;
    ensure!(
        payload.len() <= capacity,
        EncodeError::TooLarge {
            size: payload.len(),
            capacity,
        }
    );
    Ok(payload)
}

/// Like [`encode`], zero-padded to exactly `block_size` bytes.
pub fn encode_block(tree: &FsTree, block_size: usize) -> EncodeResult<Vec<u8>> {
    let mut block = encode(tree, block_size)?;
    block.resize(block_size, 0);
    Ok(block)
}

/// True if the block never received a payload.
#[inline]
pub fn is_blank(block: &[u8]) -> bool {
    block.iter().all(|&b| b == 0)
}

/// Parses a payload produced by [`encode`] (trailing zero padding allowed).
pub fn decode(bytes: &[u8]) -> DecodeResult<FsTree> {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    let tree: FsTree = serde_json::from_slice(&bytes[..end])?;
    validate(&tree)?;
    Ok(tree)
}

/// Checks the numbering and naming invariants of a tree.
pub fn validate(tree: &FsTree) -> DecodeResult {
    let mut seen: HashSet<Ino> = HashSet::new();
    let mut stack: Vec<&Dir> = vec![&tree.root];

    ensure!(
        tree.root.inode == ROOT_INO,
        DecodeError::RootInode(tree.root.inode)
    );
    claim(&mut seen, tree.root.inode, &tree.root.name)?;

    while let Some(dir) = stack.pop() {
        let mut names: HashSet<&str> = HashSet::with_capacity(dir.child_count());

        let children = dir
            .files
            .iter()
            .map(|f| (f.inode, f.name.as_str()))
            .chain(dir.directories.iter().map(|d| (d.inode, d.name.as_str())));

        for (inode, name) in children {
            ensure!(is_valid_name(name), DecodeError::InvalidName(name.to_string()));
            if !names.insert(name) {
                bail!(DecodeError::DuplicateName {
                    parent: dir.inode,
                    name: name.to_string(),
                });
            }
            claim(&mut seen, inode, name)?;
        }

        stack.extend(dir.directories.iter());
    }

    Ok(())
}

fn claim(seen: &mut HashSet<Ino>, inode: Ino, name: &str) -> DecodeResult {
    ensure!(
        inode != 0,
        DecodeError::ZeroInode {
            name: name.to_string()
        }
    );
    ensure!(seen.insert(inode), DecodeError::DuplicateInode(inode));
    Ok(())
}

/// A single path segment: non-empty, no separator, no NUL, not `.` or `..`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\0'])
}
