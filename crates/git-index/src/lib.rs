//! The index (staging area).
//!
//! Entries are keyed by `(path, stage)`. Stage 0 holds a resolved file;
//! stages 1, 2 and 3 hold the base, ours and theirs versions of a conflict.
//! A path never has both. A file and a directory of the same name never
//! coexist either: adding one evicts the other.

pub mod entry;
mod read;
mod write;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::Metadata;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use bstr::{BStr, BString};
use git_hash::ObjectId;
use git_odb::Database;
use git_utils::lockfile::LockFile;

pub use entry::{IndexEntry, StatData};

const SIGNATURE: &[u8; 4] = b"DIRC";
const VERSION: u32 = 2;
const HEADER_SIZE: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("invalid index header: {0}")]
    InvalidHeader(String),

    #[error("unsupported index version: {0}")]
    UnsupportedVersion(u32),

    #[error("Checksum does not match value stored on disk")]
    ChecksumMismatch,

    #[error("invalid index entry at offset {offset}: {reason}")]
    InvalidEntry { offset: usize, reason: String },

    #[error("index is not locked for update")]
    NotLocked,

    #[error(transparent)]
    Util(#[from] git_utils::UtilError),

    #[error(transparent)]
    Hash(#[from] git_hash::HashError),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Merge stage of an index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Resolved (stage 0).
    Normal,
    /// Common ancestor's version (stage 1).
    Base,
    /// Our version (stage 2).
    Ours,
    /// Their version (stage 3).
    Theirs,
}

impl Stage {
    pub const CONFLICTS: [Stage; 3] = [Stage::Base, Stage::Ours, Stage::Theirs];

    pub fn as_u8(&self) -> u8 {
        match self {
            Stage::Normal => 0,
            Stage::Base => 1,
            Stage::Ours => 2,
            Stage::Theirs => 3,
        }
    }

    pub fn from_u8(n: u8) -> Result<Self, IndexError> {
        match n {
            0 => Ok(Stage::Normal),
            1 => Ok(Stage::Base),
            2 => Ok(Stage::Ours),
            3 => Ok(Stage::Theirs),
            _ => Err(IndexError::InvalidEntry {
                offset: 0,
                reason: format!("invalid stage: {n}"),
            }),
        }
    }
}

pub struct Index {
    path: PathBuf,
    entries: BTreeMap<(BString, Stage), IndexEntry>,
    /// Directory → every entry path beneath it.
    parents: HashMap<BString, BTreeSet<BString>>,
    changed: bool,
    lock: Option<LockFile>,
}

impl Index {
    /// An empty, unloaded index backed by the file at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            entries: BTreeMap::new(),
            parents: HashMap::new(),
            changed: false,
            lock: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory state with the file's. A missing file is an
    /// empty index.
    pub fn load(&mut self) -> Result<(), IndexError> {
        self.clear();
        self.changed = false;

        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if file.metadata()?.len() == 0 {
            return Ok(());
        }
        // SAFETY: the index is replaced by rename, never rewritten in place.
        let data = unsafe { memmap2::Mmap::map(&file)? };
        for entry in read::parse_index(&data)? {
            self.store_entry(entry);
        }
        tracing::debug!(entries = self.entries.len(), "loaded index");
        Ok(())
    }

    /// Take the index lock, then load.
    pub fn load_for_update(&mut self) -> Result<(), IndexError> {
        self.lock = Some(LockFile::acquire(&self.path)?);
        self.load()
    }

    /// Write the entries through the lock if anything changed, releasing it
    /// either way.
    pub fn write_updates(&mut self) -> Result<(), IndexError> {
        let mut lock = self.lock.take().ok_or(IndexError::NotLocked)?;
        if !self.changed {
            lock.rollback()?;
            return Ok(());
        }
        lock.write_all(&write::serialize_index(self.entries.values())?)?;
        lock.commit()?;
        self.changed = false;
        Ok(())
    }

    pub fn release_lock(&mut self) -> Result<(), IndexError> {
        if let Some(lock) = self.lock.take() {
            lock.rollback()?;
        }
        Ok(())
    }

    /// Drop every entry, marking the index changed.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.parents.clear();
        self.changed = true;
    }

    /// Stage a workspace file, resolving any conflict on its path and
    /// evicting files or directories it collides with.
    pub fn add(&mut self, path: &BStr, oid: ObjectId, meta: &Metadata) {
        self.add_entry(IndexEntry::from_metadata(path, oid, meta));
    }

    pub fn add_entry(&mut self, entry: IndexEntry) {
        for stage in Stage::CONFLICTS {
            self.remove_entry_with_stage(entry.path.as_ref(), stage);
        }
        self.discard_conflicts(&entry);
        self.store_entry(entry);
        self.changed = true;
    }

    /// Stage a tree entry at stage 0.
    pub fn add_from_db(&mut self, path: &BStr, item: &git_odb::Entry) {
        self.add_entry(IndexEntry::from_db(path, item, Stage::Normal));
    }

    /// Record a conflict: `items` are the base, ours and theirs versions,
    /// any of which may be absent.
    pub fn add_conflict_set(&mut self, path: &BStr, items: [Option<git_odb::Entry>; 3]) {
        self.remove_entry_with_stage(path, Stage::Normal);
        for (stage, item) in Stage::CONFLICTS.into_iter().zip(items) {
            if let Some(item) = item {
                self.store_entry(IndexEntry::from_db(path, &item, stage));
            }
        }
        self.changed = true;
    }

    /// Remove `path` and, if it is a directory, everything under it.
    pub fn remove(&mut self, path: &BStr) {
        self.remove_children(path);
        self.remove_entry(path);
        self.changed = true;
    }

    /// Refresh the cached stat of a stage-0 entry after it was found clean.
    pub fn update_entry_stat(&mut self, path: &BStr, meta: &Metadata) {
        if let Some(entry) = self.entries.get_mut(&(BString::from(path), Stage::Normal)) {
            entry.update_stat(meta);
            self.changed = true;
        }
    }

    pub fn is_conflicted(&self) -> bool {
        self.entries.values().any(|entry| entry.stage != Stage::Normal)
    }

    /// Every path with conflict stages, sorted.
    pub fn conflict_paths(&self) -> Vec<BString> {
        let paths: BTreeSet<&BString> = self
            .entries
            .values()
            .filter(|entry| entry.stage != Stage::Normal)
            .map(|entry| &entry.path)
            .collect();
        paths.into_iter().cloned().collect()
    }

    pub fn entry_for_path(&self, path: &BStr, stage: Stage) -> Option<&IndexEntry> {
        self.entries.get(&(BString::from(path), stage))
    }

    /// `path` is a file in the index, at any stage.
    pub fn is_tracked_file(&self, path: &BStr) -> bool {
        let path = BString::from(path);
        [Stage::Normal, Stage::Base, Stage::Ours, Stage::Theirs]
            .into_iter()
            .any(|stage| self.entries.contains_key(&(path.clone(), stage)))
    }

    /// `path` is a tracked file or a directory containing one.
    pub fn is_tracked(&self, path: &BStr) -> bool {
        self.is_tracked_file(path) || self.parents.contains_key(path)
    }

    /// Every entry in `(path, stage)` order.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Store trees for the stage-0 entries; returns the root tree id.
    pub fn write_tree(&self, db: &Database) -> Result<ObjectId, IndexError> {
        write::write_tree(self.entries.values(), db)
    }

    fn store_entry(&mut self, entry: IndexEntry) {
        for dir in entry.parent_directories() {
            self.parents
                .entry(dir.to_owned())
                .or_default()
                .insert(entry.path.clone());
        }
        self.entries.insert(entry.key(), entry);
    }

    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for dir in entry.parent_directories() {
            self.remove_entry(dir);
        }
        self.remove_children(entry.path.as_ref());
    }

    fn remove_children(&mut self, path: &BStr) {
        let Some(children) = self.parents.get(path).cloned() else {
            return;
        };
        for child in children {
            self.remove_entry(child.as_ref());
        }
    }

    fn remove_entry(&mut self, path: &BStr) {
        for stage in [Stage::Normal, Stage::Base, Stage::Ours, Stage::Theirs] {
            self.remove_entry_with_stage(path, stage);
        }
    }

    fn remove_entry_with_stage(&mut self, path: &BStr, stage: Stage) {
        let Some(entry) = self.entries.remove(&(BString::from(path), stage)) else {
            return;
        };
        for dir in entry.parent_directories() {
            if let Some(children) = self.parents.get_mut(dir) {
                children.remove(&entry.path);
                if children.is_empty() {
                    self.parents.remove(dir);
                }
            }
        }
    }
}
