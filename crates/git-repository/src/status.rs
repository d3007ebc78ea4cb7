//! Working tree status against a commit, and hard reset built on it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::Metadata;

use bstr::{BStr, BString, ByteSlice};
use git_hash::ObjectId;
use git_index::Stage;
use git_odb::Entry;

use crate::inspector::{Change, Inspector};
use crate::{RepoError, Repository};

/// What differs between a commit's tree, the index and the workspace.
#[derive(Debug, Default)]
pub struct Status {
    /// Every path with any kind of change, sorted.
    pub changed: BTreeSet<BString>,
    pub index_changes: BTreeMap<BString, Change>,
    pub workspace_changes: BTreeMap<BString, Change>,
    /// Conflicted paths with the stages present.
    pub conflicts: BTreeMap<BString, Vec<Stage>>,
    /// Untracked files, and directories (with a trailing `/`) holding them.
    pub untracked: BTreeSet<BString>,
    pub head_tree: BTreeMap<BString, Entry>,
    stats: BTreeMap<BString, Metadata>,
}

impl Status {
    /// Compare against `commit`, or against `HEAD` when `None`. Entries
    /// found clean by content get their stat data refreshed in the index.
    pub fn new(repo: &mut Repository, commit: Option<&ObjectId>) -> Result<Self, RepoError> {
        let commit = match commit {
            Some(oid) => Some(*oid),
            None => repo.refs.read_head()?,
        };
        let mut status = Status {
            head_tree: repo.database.load_tree_list(commit.as_ref(), None)?,
            ..Status::default()
        };

        status.scan_workspace(repo, None)?;
        let fresh = status.check_index_entries(repo)?;
        for (path, stat) in fresh {
            repo.index.update_entry_stat(path.as_bstr(), &stat);
        }
        status.collect_deleted_head_files(repo);
        Ok(status)
    }

    fn record_change(&mut self, path: &BStr, to_workspace: bool, change: Change) {
        self.changed.insert(path.to_owned());
        let set = if to_workspace {
            &mut self.workspace_changes
        } else {
            &mut self.index_changes
        };
        set.insert(path.to_owned(), change);
    }

    fn scan_workspace(&mut self, repo: &Repository, prefix: Option<&BStr>) -> Result<(), RepoError> {
        let inspector = Inspector::new(repo);
        for (path, stat) in repo.workspace.list_dir(prefix)? {
            if repo.index.is_tracked(path.as_bstr()) {
                if stat.is_dir() {
                    self.scan_workspace(repo, Some(path.as_bstr()))?;
                } else if stat.is_file() {
                    self.stats.insert(path, stat);
                }
            } else if inspector.is_trackable_file(path.as_bstr(), Some(&stat))? {
                let mut path = path;
                if stat.is_dir() {
                    path.push(b'/');
                }
                self.untracked.insert(path);
            }
        }
        Ok(())
    }

    /// Returns the entries whose stat data should be refreshed.
    fn check_index_entries(&mut self, repo: &Repository) -> Result<Vec<(BString, Metadata)>, RepoError> {
        let inspector = Inspector::new(repo);
        let mut fresh = Vec::new();
        for entry in repo.index.entries() {
            if entry.stage != Stage::Normal {
                self.changed.insert(entry.path.clone());
                self.conflicts.entry(entry.path.clone()).or_default().push(entry.stage);
                continue;
            }

            let stat = self.stats.get(&entry.path);
            match inspector.compare_index_to_workspace(Some(entry), stat)? {
                Some(change) => self.record_change(entry.path.as_bstr(), true, change),
                None => {
                    if let Some(stat) = stat {
                        fresh.push((entry.path.clone(), stat.clone()));
                    }
                }
            }

            let item = self.head_tree.get(&entry.path);
            if let Some(change) = Inspector::compare_tree_to_index(item, Some(entry)) {
                self.record_change(entry.path.as_bstr(), false, change);
            }
        }
        Ok(fresh)
    }

    fn collect_deleted_head_files(&mut self, repo: &Repository) {
        let deleted: Vec<BString> = self
            .head_tree
            .keys()
            .filter(|path| !repo.index.is_tracked_file(path.as_bstr()))
            .cloned()
            .collect();
        for path in deleted {
            self.record_change(path.as_bstr(), false, Change::Deleted);
        }
    }
}

/// Make the index and workspace match `oid` exactly, for every path that
/// differs. Untracked files are left alone. The index must be loaded for
/// update by the caller.
pub(crate) fn hard_reset(repo: &mut Repository, oid: &ObjectId) -> Result<(), RepoError> {
    let status = Status::new(repo, Some(oid))?;
    for path in &status.changed {
        let path = path.as_bstr();
        repo.index.remove(path);
        repo.workspace.remove(path)?;

        let Some(entry) = status.head_tree.get(path) else {
            continue;
        };
        let data = match repo.database.load(&entry.oid)?.as_blob() {
            Some(blob) => blob.data.clone(),
            None => continue,
        };
        repo.workspace.write_file(path, &data, Some(entry.mode))?;
        if let Some(stat) = repo.workspace.stat_file(path)? {
            repo.index.add(path, entry.oid, &stat);
        }
    }
    tracing::debug!(%oid, paths = status.changed.len(), "hard reset");
    Ok(())
}
