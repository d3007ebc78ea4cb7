use std::cmp::Ordering;
use std::collections::BTreeMap;

use bstr::{BStr, BString, ByteSlice};
use git_hash::ObjectId;

use crate::ObjectError;

/// Mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// 100644
    Regular,
    /// 100755
    Executable,
    /// 120000
    Symlink,
    /// 040000
    Tree,
    /// Anything else, preserved so foreign trees round-trip.
    Unknown(u32),
}

impl FileMode {
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        parse_octal(s)
            .map(Self::from_raw)
            .ok_or_else(|| ObjectError::InvalidFileMode(String::from_utf8_lossy(s).into()))
    }

    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0o100644 => Self::Regular,
            0o100755 => Self::Executable,
            0o120000 => Self::Symlink,
            0o040000 => Self::Tree,
            other => Self::Unknown(other),
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Tree => 0o040000,
            Self::Unknown(v) => *v,
        }
    }

    /// Octal form without leading zeros, as written inside tree objects.
    pub fn to_octal(&self) -> String {
        format!("{:o}", self.raw())
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree)
    }

    pub fn is_executable(&self) -> bool {
        matches!(self, Self::Executable)
    }
}

fn parse_octal(s: &[u8]) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    s.iter().try_fold(0u32, |acc, &b| match b {
        b'0'..=b'7' => acc.checked_mul(8)?.checked_add(u32::from(b - b'0')),
        _ => None,
    })
}

/// One named entry of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: BString,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn new(name: impl Into<BString>, oid: ObjectId, mode: FileMode) -> Self {
        Self {
            mode,
            name: name.into(),
            oid,
        }
    }

    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }

    /// Canonical order: a directory compares as if its name ended in `/`,
    /// so `foo.c` < `foo/` < `foo0`.
    pub fn cmp_entries(a: &TreeEntry, b: &TreeEntry) -> Ordering {
        tree_name_cmp(&a.name, a.is_tree(), &b.name, b.is_tree())
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::cmp_entries(self, other)
    }
}

fn tree_name_cmp(a: &[u8], a_dir: bool, b: &[u8], b_dir: bool) -> Ordering {
    let common = a.len().min(b.len());
    match a[..common].cmp(&b[..common]) {
        Ordering::Equal => {}
        other => return other,
    }
    let next = |name: &[u8], dir: bool| match name.get(common) {
        Some(&c) => c,
        None if dir => b'/',
        None => 0,
    };
    next(a, a_dir).cmp(&next(b, b_dir))
}

/// A directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    /// Parse binary tree content: repeated `<octal-mode> <name>\0<20-byte oid>`.
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < content.len() {
            let bad = |offset, reason: &str| ObjectError::InvalidTreeEntry {
                offset,
                reason: reason.into(),
            };

            let space = content[pos..]
                .find_byte(b' ')
                .ok_or_else(|| bad(pos, "missing space after mode"))?
                + pos;
            let mode = FileMode::from_bytes(&content[pos..space])
                .map_err(|_| bad(pos, "invalid mode"))?;

            let name_start = space + 1;
            let nul = content[name_start..]
                .find_byte(0)
                .ok_or_else(|| bad(name_start, "missing null after name"))?
                + name_start;

            let oid_start = nul + 1;
            let oid_end = oid_start + ObjectId::LEN;
            if oid_end > content.len() {
                return Err(bad(oid_start, "truncated object id"));
            }

            entries.push(TreeEntry {
                mode,
                name: BString::from(&content[name_start..nul]),
                oid: ObjectId::from_bytes(&content[oid_start..oid_end])?,
            });
            pos = oid_end;
        }

        Ok(Self { entries })
    }

    /// Serialize in canonical order regardless of insertion order.
    pub fn serialize_content(&self) -> Vec<u8> {
        let mut sorted: Vec<&TreeEntry> = self.entries.iter().collect();
        sorted.sort();

        let mut out = Vec::with_capacity(sorted.len() * 40);
        for entry in sorted {
            out.extend_from_slice(entry.mode.to_octal().as_bytes());
            out.push(b' ');
            out.extend_from_slice(&entry.name);
            out.push(0);
            out.extend_from_slice(entry.oid.as_bytes());
        }
        out
    }

    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bstr() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

enum Node {
    Leaf { oid: ObjectId, mode: FileMode },
    Dir(TreeBuilder),
}

/// Builds a tree hierarchy from flat `path -> (oid, mode)` triples, such as
/// index entries, by grouping on path components.
#[derive(Default)]
pub struct TreeBuilder {
    children: BTreeMap<BString, Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect an iterator of `(path, oid, mode)` into a builder.
    pub fn build<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, ObjectId, FileMode)>,
        P: AsRef<[u8]>,
    {
        let mut root = Self::new();
        for (path, oid, mode) in entries {
            root.add(path.as_ref(), oid, mode);
        }
        root
    }

    /// Add a file at a `/`-separated path, creating parent directories.
    pub fn add(&mut self, path: &[u8], oid: ObjectId, mode: FileMode) {
        match path.find_byte(b'/') {
            None => {
                self.children
                    .insert(BString::from(path), Node::Leaf { oid, mode });
            }
            Some(slash) => {
                let name = BString::from(&path[..slash]);
                let node = self
                    .children
                    .entry(name)
                    .or_insert_with(|| Node::Dir(TreeBuilder::new()));
                if let Node::Leaf { .. } = node {
                    *node = Node::Dir(TreeBuilder::new());
                }
                if let Node::Dir(dir) = node {
                    dir.add(&path[slash + 1..], oid, mode);
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Store every subtree before its parent, returning the root tree's id.
    /// `store` receives each finished tree and returns its object id.
    pub fn write<E>(
        &self,
        store: &mut impl FnMut(&Tree) -> Result<ObjectId, E>,
    ) -> Result<ObjectId, E> {
        let mut entries = Vec::with_capacity(self.children.len());
        for (name, node) in &self.children {
            let entry = match node {
                Node::Leaf { oid, mode } => TreeEntry::new(name.clone(), *oid, *mode),
                Node::Dir(dir) => TreeEntry::new(name.clone(), dir.write(store)?, FileMode::Tree),
            };
            entries.push(entry);
        }
        store(&Tree::new(entries))
    }
}
