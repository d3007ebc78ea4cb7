//! Moving the workspace and index from one tree to another.
//!
//! A migration is planned in full before anything is touched: every change
//! is checked against the index and the files on disk, and any local
//! modification or untracked file in the way aborts the whole migration.

use std::collections::{BTreeMap, BTreeSet};

use bstr::{BStr, BString, ByteSlice};
use git_hash::ObjectId;
use git_index::Stage;
use git_object::Object;
use git_odb::{Changes, Entry};

use crate::inspector::Inspector;
use crate::workspace::parent_dirs;
use crate::{RepoError, Repository};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ConflictKind {
    StaleFile,
    StaleDirectory,
    UntrackedOverwritten,
    UntrackedRemoved,
}

impl ConflictKind {
    fn messages(self) -> (&'static str, &'static str) {
        match self {
            ConflictKind::StaleFile => (
                "Your local changes to the following files would be overwritten by checkout:",
                "Please commit your changes or stash them before you switch branches.",
            ),
            ConflictKind::StaleDirectory => (
                "Updating the following directories would lose untracked files in them:",
                "\n",
            ),
            ConflictKind::UntrackedOverwritten => (
                "The following untracked working tree files would be overwritten by checkout:",
                "Please move or remove them before you switch branches.",
            ),
            ConflictKind::UntrackedRemoved => (
                "The following untracked working tree files would be removed by checkout:",
                "Please move or remove them before you switch branches.",
            ),
        }
    }
}

type ChangeList = Vec<(BString, Option<Entry>)>;

pub struct Migration<'r> {
    repo: &'r mut Repository,
    diff: &'r Changes,
    create: ChangeList,
    update: ChangeList,
    delete: ChangeList,
    mkdirs: BTreeSet<BString>,
    rmdirs: BTreeSet<BString>,
    conflicts: BTreeMap<ConflictKind, BTreeSet<BString>>,
    errors: Vec<String>,
}

impl<'r> Migration<'r> {
    pub(crate) fn new(repo: &'r mut Repository, diff: &'r Changes) -> Self {
        Self {
            repo,
            diff,
            create: Vec::new(),
            update: Vec::new(),
            delete: Vec::new(),
            mkdirs: BTreeSet::new(),
            rmdirs: BTreeSet::new(),
            conflicts: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Plan, then update the workspace and the index. The index must be
    /// loaded for update by the caller.
    pub fn apply_changes(&mut self) -> Result<(), RepoError> {
        self.plan_changes()?;
        let migration: &Migration<'_> = self;
        migration.repo.workspace.apply_migration(migration)?;
        self.update_index()?;
        tracing::debug!(
            created = self.create.len(),
            updated = self.update.len(),
            deleted = self.delete.len(),
            "applied migration"
        );
        Ok(())
    }

    pub fn changes(&self, action: Action) -> &[(BString, Option<Entry>)] {
        match action {
            Action::Create => &self.create,
            Action::Update => &self.update,
            Action::Delete => &self.delete,
        }
    }

    pub fn mkdirs(&self) -> &BTreeSet<BString> {
        &self.mkdirs
    }

    pub fn rmdirs(&self) -> &BTreeSet<BString> {
        &self.rmdirs
    }

    /// Conflict reports from the last planning pass.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn blob_data(&self, oid: &ObjectId) -> Result<Vec<u8>, RepoError> {
        match self.repo.database.load(oid)?.as_ref() {
            Object::Blob(blob) => Ok(blob.data.clone()),
            other => Err(git_odb::OdbError::WrongType {
                oid: *oid,
                expected: git_object::ObjectType::Blob,
                actual: other.object_type(),
            }
            .into()),
        }
    }

    fn plan_changes(&mut self) -> Result<(), RepoError> {
        let diff = self.diff;
        for (path, (old_item, new_item)) in diff {
            self.check_for_conflict(path.as_bstr(), old_item.as_ref(), new_item.as_ref())?;
            self.record_change(path.as_bstr(), old_item.is_none(), *new_item);
        }
        self.collect_errors()
    }

    fn update_index(&mut self) -> Result<(), RepoError> {
        for (path, _) in &self.delete {
            self.repo.index.remove(path.as_bstr());
        }
        for (path, entry) in self.create.iter().chain(&self.update) {
            let Some(entry) = entry else {
                continue;
            };
            let stat = self.repo.workspace.stat_file(path.as_bstr())?.ok_or_else(|| {
                RepoError::MissingFile(format!("pathspec '{path}' did not match any files"))
            })?;
            self.repo.index.add(path.as_bstr(), entry.oid, &stat);
        }
        Ok(())
    }

    fn record_change(&mut self, path: &BStr, is_new: bool, new_item: Option<Entry>) {
        let dirs = parent_dirs(path).map(BStr::to_owned);
        let list = if is_new {
            self.mkdirs.extend(dirs);
            &mut self.create
        } else if new_item.is_none() {
            self.rmdirs.extend(dirs);
            &mut self.delete
        } else {
            self.mkdirs.extend(dirs);
            &mut self.update
        };
        list.push((path.to_owned(), new_item));
    }

    fn check_for_conflict(
        &mut self,
        path: &BStr,
        old_item: Option<&Entry>,
        new_item: Option<&Entry>,
    ) -> Result<(), RepoError> {
        let repo: &Repository = &*self.repo;
        let entry = repo.index.entry_for_path(path, Stage::Normal);

        let differs_from_old = Inspector::compare_tree_to_index(old_item, entry).is_some();
        let differs_from_new = Inspector::compare_tree_to_index(new_item, entry).is_some();
        if differs_from_old && differs_from_new {
            self.add_conflict(ConflictKind::StaleFile, path.to_owned());
            return Ok(());
        }

        let inspector = Inspector::new(repo);
        let stat = repo.workspace.stat_file(path)?;
        let kind = match (&stat, entry) {
            (_, Some(_)) => ConflictKind::StaleFile,
            (Some(stat), None) if stat.is_dir() => ConflictKind::StaleDirectory,
            _ if new_item.is_some() => ConflictKind::UntrackedOverwritten,
            _ => ConflictKind::UntrackedRemoved,
        };

        let conflict = match &stat {
            None => match untracked_parent(repo, &inspector, path)? {
                Some(_) if entry.is_some() => Some(path.to_owned()),
                Some(parent) => Some(parent),
                None => None,
            },
            Some(stat) if stat.is_file() => inspector
                .compare_index_to_workspace(entry, Some(stat))?
                .map(|_| path.to_owned()),
            Some(stat) if stat.is_dir() => inspector
                .is_trackable_file(path, Some(stat))?
                .then(|| path.to_owned()),
            Some(_) => None,
        };
        if let Some(conflict) = conflict {
            self.add_conflict(kind, conflict);
        }
        Ok(())
    }

    fn add_conflict(&mut self, kind: ConflictKind, path: BString) {
        self.conflicts.entry(kind).or_default().insert(path);
    }

    fn collect_errors(&mut self) -> Result<(), RepoError> {
        self.errors = self
            .conflicts
            .iter()
            .filter(|(_, paths)| !paths.is_empty())
            .map(|(kind, paths)| {
                let (header, footer) = kind.messages();
                let mut lines = vec![header.to_string()];
                lines.extend(paths.iter().map(|path| format!("\t{path}")));
                lines.push(footer.to_string());
                lines.join("\n")
            })
            .collect();

        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(RepoError::Conflict(self.errors.clone()))
        }
    }
}

/// The nearest ancestor of `path` that is an untracked file.
fn untracked_parent(
    repo: &Repository,
    inspector: &Inspector<'_>,
    path: &BStr,
) -> Result<Option<BString>, RepoError> {
    for parent in parent_dirs(path).rev() {
        let stat = repo.workspace.stat_file(parent)?;
        if !stat.as_ref().is_some_and(|s| s.is_file()) {
            continue;
        }
        if inspector.is_trackable_file(parent, stat.as_ref())? {
            return Ok(Some(parent.to_owned()));
        }
    }
    Ok(None)
}
