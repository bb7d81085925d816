// SPDX-License-Identifier: MIT

//! Persisted shape of the directory tree.
//!
//! These types are what the metadata block holds: a single root [`Dir`]
//! owning its files and subdirectories. Field names follow the on-disk
//! JSON layout (`RootDir`, `Inode`, `Name`, `Files`, `Directories`, `Data`).

use core::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Inode number. Files and directories share one numbering space.
pub type Ino = u64;

/// Inode of the root directory of a freshly created tree.
pub const ROOT_INO: Ino = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct File {
    pub inode: Ino,
    pub name: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl File {
    pub fn new(inode: Ino, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            inode,
            name: name.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dir {
    pub inode: Ino,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub files: Vec<File>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub directories: Vec<Dir>,
}

impl Dir {
    pub fn new(inode: Ino, name: impl Into<String>) -> Self {
        Self {
            inode,
            name: name.into(),
            files: Vec::new(),
            directories: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: File) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_dir(mut self, dir: Dir) -> Self {
        self.directories.push(dir);
        self
    }

    #[inline]
    pub fn child_count(&self) -> usize {
        self.files.len() + self.directories.len()
    }

    pub fn sort_children_recursively(&mut self) {
        self.files.sort_by(|a, b| a.name.cmp(&b.name));
        self.directories.sort_by(|a, b| a.name.cmp(&b.name));
        for d in &mut self.directories {
            d.sort_children_recursively();
        }
    }
}

/// The unit persisted in the metadata block: exactly one root directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsTree {
    #[serde(rename = "RootDir")]
    pub root: Dir,
}

impl FsTree {
    pub fn new(root: Dir) -> Self {
        Self { root }
    }

    /// A tree holding only an empty root directory.
    pub fn empty() -> Self {
        Self::new(Dir::new(ROOT_INO, ""))
    }

    /// Returns a copy with every child list sorted by name.
    ///
    /// Child order carries no meaning, so structural comparisons go through this.
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        out.root.sort_children_recursively();
        out
    }

    pub fn counts(&self) -> FsCounts {
        fn walk(d: &Dir, acc: &mut FsCounts) {
            acc.dirs += 1;
            for f in &d.files {
                acc.files += 1;
                acc.bytes = acc.bytes.saturating_add(f.data.len() as u64);
            }
            for c in &d.directories {
                walk(c, acc);
            }
        }
        let mut out = FsCounts::default();
        walk(&self.root, &mut out);
        out
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FsCounts {
    pub dirs: usize,
    pub files: usize,
    pub bytes: u64,
}

impl fmt::Display for FsCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.dirs;
        let fi = self.files;
        let d_lbl = if d == 1 { "Dir" } else { "Dirs" };
        let f_lbl = if fi == 1 { "File" } else { "Files" };
        write!(f, "{d} {d_lbl} • {fi} {f_lbl} • {} bytes", self.bytes)
    }
}

impl fmt::Display for FsTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        enum Item<'a> {
            Dir(&'a Dir),
            File(&'a File),
        }

        writeln!(f, "/ (ino {})", self.root.inode)?;

        let mut stack: Vec<(Item<'_>, String, bool)> = Vec::new();
        push_children(&mut stack, &self.root, String::new());

        while let Some((item, prefix, last)) = stack.pop() {
            write!(f, "{}{}", prefix, if last { "└── " } else { "├── " })?;
            match item {
                Item::File(file) => {
                    writeln!(
                        f,
                        "{} (ino {}, {} bytes)",
                        file.name,
                        file.inode,
                        file.data.len()
                    )?;
                }
                Item::Dir(dir) => {
                    writeln!(f, "{}/ (ino {})", dir.name, dir.inode)?;
                    let new_prefix = if last {
                        format!("{prefix}    ")
                    } else {
                        format!("{prefix}│   ")
                    };
                    push_children(&mut stack, dir, new_prefix);
                }
            }
        }

        // Push children in reverse order to print first in order
        fn push_children<'a>(
            stack: &mut Vec<(Item<'a>, String, bool)>,
            dir: &'a Dir,
            prefix: String,
        ) {
            let total = dir.child_count();
            let items = dir
                .directories
                .iter()
                .map(Item::Dir)
                .chain(dir.files.iter().map(Item::File));
            let mut pending: Vec<_> = items.collect();
            let mut i = total;
            while let Some(item) = pending.pop() {
                i -= 1;
                stack.push((item, prefix.clone(), i == total - 1));
            }
        }

        Ok(())
    }
}

/// Absent and `null` child lists both decode as empty.
fn null_as_empty<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

/// File content is stored as standard base64 text.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(text) => STANDARD.decode(text.as_bytes()).map_err(D::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}
