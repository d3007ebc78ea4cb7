//! Comparisons between the workspace, the index and a tree.

use std::fs::Metadata;

use bstr::{BStr, ByteSlice};
use git_index::IndexEntry;
use git_object::{Blob, Object};
use git_odb::Entry;

use crate::{RepoError, Repository};

/// How one side differs from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Change {
    Added,
    Deleted,
    Modified,
    Untracked,
}

pub struct Inspector<'r> {
    repo: &'r Repository,
}

impl<'r> Inspector<'r> {
    pub fn new(repo: &'r Repository) -> Self {
        Self { repo }
    }

    /// `path` is an untracked file, or a directory holding one somewhere
    /// below it.
    pub fn is_trackable_file(&self, path: &BStr, stat: Option<&Metadata>) -> Result<bool, RepoError> {
        let Some(stat) = stat else {
            return Ok(false);
        };
        if stat.is_file() {
            return Ok(!self.repo.index().is_tracked_file(path));
        }
        if !stat.is_dir() {
            return Ok(false);
        }

        let items = self.repo.workspace().list_dir(Some(path))?;
        let files = items.iter().filter(|(_, s)| s.is_file());
        let dirs = items.iter().filter(|(_, s)| s.is_dir());
        for (item_path, item_stat) in files.chain(dirs) {
            if self.is_trackable_file(item_path.as_bstr(), Some(item_stat))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Compare a stage-0 entry with the file on disk. Stat data decides when
    /// it can; otherwise the file is hashed.
    pub fn compare_index_to_workspace(
        &self,
        entry: Option<&IndexEntry>,
        stat: Option<&Metadata>,
    ) -> Result<Option<Change>, RepoError> {
        let Some(entry) = entry else {
            return Ok(Some(Change::Untracked));
        };
        let Some(stat) = stat else {
            return Ok(Some(Change::Deleted));
        };
        if !entry.stat_matches(stat) {
            return Ok(Some(Change::Modified));
        }
        if entry.times_match(stat) {
            return Ok(None);
        }

        let data = self.repo.workspace().read_file(entry.path.as_bstr())?;
        let oid = self.repo.database().hash_object(&Object::Blob(Blob::new(data)))?;
        Ok((oid != entry.oid).then_some(Change::Modified))
    }

    pub fn compare_tree_to_index(item: Option<&Entry>, entry: Option<&IndexEntry>) -> Option<Change> {
        match (item, entry) {
            (None, None) => None,
            (None, Some(_)) => Some(Change::Added),
            (Some(_), None) => Some(Change::Deleted),
            (Some(item), Some(entry)) => {
                (item.oid != entry.oid || item.mode != entry.mode).then_some(Change::Modified)
            }
        }
    }
}
