use std::collections::BTreeMap;

use bstr::BString;
use git_hash::ObjectId;
use git_object::{FileMode, TreeEntry};

use crate::path_filter::PathFilter;
use crate::{Database, OdbError};

/// An object reference with its mode, as found in a tree, an index or a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entry {
    pub oid: ObjectId,
    pub mode: FileMode,
}

impl Entry {
    pub fn new(oid: ObjectId, mode: FileMode) -> Self {
        Self { oid, mode }
    }

    pub fn tree(oid: ObjectId) -> Self {
        Self::new(oid, FileMode::Tree)
    }

    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }
}

impl From<&TreeEntry> for Entry {
    fn from(entry: &TreeEntry) -> Self {
        Self::new(entry.oid, entry.mode)
    }
}

/// Path → `(old, new)` for every changed non-tree path.
pub type Changes = BTreeMap<BString, (Option<Entry>, Option<Entry>)>;

/// Compares two trees (or commits' trees) in lockstep.
pub(crate) struct TreeDiff<'a> {
    db: &'a Database,
    changes: Changes,
}

impl<'a> TreeDiff<'a> {
    pub(crate) fn new(db: &'a Database) -> Self {
        Self {
            db,
            changes: Changes::new(),
        }
    }

    pub(crate) fn into_changes(self) -> Changes {
        self.changes
    }

    pub(crate) fn compare_oids(
        &mut self,
        a: Option<&ObjectId>,
        b: Option<&ObjectId>,
        filter: &PathFilter,
    ) -> Result<(), OdbError> {
        if a == b {
            return Ok(());
        }
        let a_entries = self.entries(a)?;
        let b_entries = self.entries(b)?;

        self.detect_deletions(&a_entries, &b_entries, filter)?;
        self.detect_additions(&a_entries, &b_entries, filter)
    }

    fn entries(&self, oid: Option<&ObjectId>) -> Result<BTreeMap<BString, Entry>, OdbError> {
        let Some(oid) = oid else {
            return Ok(BTreeMap::new());
        };
        let tree = self.db.load_tree(oid)?;
        Ok(tree.iter().map(|e| (e.name.clone(), Entry::from(e))).collect())
    }

    /// Paths in `a` that are gone or different in `b`. A tree on either
    /// side is descended into; a blob on either side is reported.
    fn detect_deletions(
        &mut self,
        a: &BTreeMap<BString, Entry>,
        b: &BTreeMap<BString, Entry>,
        filter: &PathFilter,
    ) -> Result<(), OdbError> {
        for (name, entry) in a.iter().filter(|(name, _)| filter.matches(name)) {
            let other = b.get(name);
            if other == Some(entry) {
                continue;
            }
            let sub_filter = filter.join(name);

            let tree_oid = |e: Option<&Entry>| e.filter(|e| e.is_tree()).map(|e| e.oid);
            let (tree_a, tree_b) = (tree_oid(Some(entry)), tree_oid(other));
            self.compare_oids(tree_a.as_ref(), tree_b.as_ref(), &sub_filter)?;

            let blob = |e: Option<&Entry>| e.filter(|e| !e.is_tree()).copied();
            let blobs = (blob(Some(entry)), blob(other));
            if blobs.0.is_some() || blobs.1.is_some() {
                self.changes.insert(sub_filter.path().to_owned(), blobs);
            }
        }
        Ok(())
    }

    fn detect_additions(
        &mut self,
        a: &BTreeMap<BString, Entry>,
        b: &BTreeMap<BString, Entry>,
        filter: &PathFilter,
    ) -> Result<(), OdbError> {
        for (name, entry) in b.iter().filter(|(name, _)| filter.matches(name)) {
            if a.contains_key(name) {
                continue;
            }
            let sub_filter = filter.join(name);
            if entry.is_tree() {
                self.compare_oids(None, Some(&entry.oid), &sub_filter)?;
            } else {
                self.changes
                    .insert(sub_filter.path().to_owned(), (None, Some(*entry)));
            }
        }
        Ok(())
    }
}
