//! Tree-level three-way merge.
//!
//! Both sides are diffed against the base. A path changed on one side only
//! is taken as is; a path changed on both sides has its content and mode
//! merged separately, falling back to a textual merge with conflict
//! markers. A file on one side where the other side has a directory is
//! renamed aside to `<path>~<branch>`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use bstr::{BStr, BString, ByteSlice};
use git_diff::diff3;
use git_hash::ObjectId;
use git_object::{Blob, FileMode, Object, TreeBuilder};
use git_odb::{Changes, Database, Entry, PathFilter};
use git_repository::Repository;

use crate::{Inputs, MergeError};

/// Base, left and right versions of a conflicted path, in index stage
/// order.
pub type ConflictSet = [Option<Entry>; 3];

/// The outcome of planning a merge, not yet applied anywhere.
#[derive(Debug, Default)]
pub struct Plan {
    /// Changes taking the left tree to the merged tree. A conflicted
    /// content merge carries the blob with conflict markers.
    pub clean_diff: Changes,
    pub conflicts: BTreeMap<BString, ConflictSet>,
    /// Files moved aside by file/directory conflicts. These go to the
    /// workspace only.
    pub untracked: BTreeMap<BString, Entry>,
}

impl Plan {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Bring the workspace and index to the merge result, with conflicts
    /// recorded as stages 1 to 3. The index must be loaded for update.
    pub fn apply(&self, repo: &mut Repository) -> Result<(), MergeError> {
        repo.migration(&self.clean_diff).apply_changes()?;

        for (path, items) in &self.conflicts {
            repo.index_mut().add_conflict_set(path.as_bstr(), *items);
        }
        for (path, entry) in &self.untracked {
            let object = repo.database().load(&entry.oid)?;
            if let Some(blob) = object.as_blob() {
                repo.workspace()
                    .write_file(path.as_bstr(), &blob.data, Some(entry.mode))?;
            }
        }
        Ok(())
    }

    /// Store the merged tree built on `left`'s tree and return its id.
    pub fn write_tree(&self, db: &Database, left: &ObjectId) -> Result<ObjectId, MergeError> {
        let mut list = db.load_tree_list(Some(left), None)?;
        for (path, (_, new)) in &self.clean_diff {
            match new {
                Some(entry) => list.insert(path.clone(), *entry),
                None => list.remove(path),
            };
        }
        let root = TreeBuilder::build(list.iter().map(|(path, entry)| (path, entry.oid, entry.mode)));
        Ok(root.write(&mut |tree| db.store(&Object::Tree(tree.clone())))?)
    }
}

/// Merges the trees of an [`Inputs`] pair.
pub struct Resolve<'a> {
    inputs: &'a Inputs,
    on_progress: Option<Box<dyn FnMut(&str) + 'a>>,
}

impl<'a> Resolve<'a> {
    pub fn new(inputs: &'a Inputs) -> Self {
        Self {
            inputs,
            on_progress: None,
        }
    }

    /// Receive each `Auto-merging` and `CONFLICT` line as it is produced.
    pub fn on_progress(mut self, callback: impl FnMut(&str) + 'a) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Work out the merge without touching the workspace or index. Merged
    /// blobs are stored in `db`.
    pub fn plan(&mut self, db: &Database) -> Result<Plan, MergeError> {
        let inputs = self.inputs;
        let base = inputs.base_oid.as_ref();
        let filter = PathFilter::default();

        let mut silent = |_: &str| {};
        let progress: &mut dyn FnMut(&str) = match self.on_progress.as_mut() {
            Some(callback) => callback,
            None => &mut silent,
        };

        let mut planner = Planner {
            db,
            inputs,
            left_diff: db.tree_diff(base, Some(&inputs.left_oid), &filter)?,
            right_diff: db.tree_diff(base, Some(&inputs.right_oid), &filter)?,
            plan: Plan::default(),
            progress,
        };
        planner.run()?;
        Ok(planner.plan)
    }

    /// Plan the merge and apply it to `repo`. The index must be loaded for
    /// update.
    pub fn execute(mut self, repo: &mut Repository) -> Result<Plan, MergeError> {
        let plan = self.plan(repo.database())?;
        plan.apply(repo)?;
        tracing::info!(
            left = %self.inputs.left_name,
            right = %self.inputs.right_name,
            changed = plan.clean_diff.len(),
            conflicts = plan.conflicts.len(),
            "resolved merge"
        );
        Ok(plan)
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

struct Planner<'p> {
    db: &'p Database,
    inputs: &'p Inputs,
    left_diff: Changes,
    right_diff: Changes,
    plan: Plan,
    progress: &'p mut dyn FnMut(&str),
}

impl Planner<'_> {
    fn run(&mut self) -> Result<(), MergeError> {
        for path in post_order(&self.right_diff) {
            let (old, new) = self.right_diff[&path];
            if new.is_some() {
                self.file_dir_conflict(path.as_bstr(), Side::Left);
            }
            self.same_path_conflict(path.as_bstr(), old, new)?;
        }
        for path in post_order(&self.left_diff) {
            if self.left_diff[&path].1.is_some() {
                self.file_dir_conflict(path.as_bstr(), Side::Right);
            }
        }
        Ok(())
    }

    fn diff(&self, side: Side) -> &Changes {
        match side {
            Side::Left => &self.left_diff,
            Side::Right => &self.right_diff,
        }
    }

    fn name(&self, side: Side) -> &'_ str {
        match side {
            Side::Left => &self.inputs.left_name,
            Side::Right => &self.inputs.right_name,
        }
    }

    /// `path` was added or changed on one side; any of its parent
    /// directories that is a file on `side` clashes with it.
    fn file_dir_conflict(&mut self, path: &BStr, side: Side) {
        for parent in parent_dirs(path) {
            let Some(&(old, Some(new))) = self.diff(side).get(&parent) else {
                continue;
            };
            let items = match side {
                Side::Left => [old, Some(new), None],
                Side::Right => [old, None, Some(new)],
            };
            self.plan.conflicts.insert(parent.clone(), items);
            self.plan.clean_diff.remove(&parent);

            let rename = format!("{parent}~{}", self.name(side));
            self.plan.untracked.insert(BString::from(rename.as_str()), new);

            if !self.diff(side).contains_key(path) {
                self.log(format!("Adding {path}"));
            }
            self.log_conflict(parent.as_bstr(), Some(&rename));
        }
    }

    fn same_path_conflict(
        &mut self,
        path: &BStr,
        base: Option<Entry>,
        right: Option<Entry>,
    ) -> Result<(), MergeError> {
        if self.plan.conflicts.contains_key(path) {
            return Ok(());
        }
        let Some(&(_, left)) = self.left_diff.get(path) else {
            self.plan.clean_diff.insert(path.to_owned(), (base, right));
            return Ok(());
        };
        if left == right {
            return Ok(());
        }
        if left.is_some() && right.is_some() {
            self.log(format!("Auto-merging {path}"));
        }

        let oid = |entry: Option<Entry>| entry.map(|e| e.oid);
        let mode = |entry: Option<Entry>| entry.map(|e| e.mode);
        let (oid_ok, merged_oid) = self.merge_blobs(oid(base), oid(left), oid(right))?;
        let (mode_ok, merged_mode) = merge_modes(mode(base), mode(left), mode(right));

        if let (Some(oid), Some(mode)) = (merged_oid, merged_mode) {
            self.plan
                .clean_diff
                .insert(path.to_owned(), (left, Some(Entry::new(oid, mode))));
        }
        if oid_ok && mode_ok {
            return Ok(());
        }
        self.plan.conflicts.insert(path.to_owned(), [base, left, right]);
        self.log_conflict(path, None);
        Ok(())
    }

    fn merge_blobs(
        &self,
        base: Option<ObjectId>,
        left: Option<ObjectId>,
        right: Option<ObjectId>,
    ) -> Result<(bool, Option<ObjectId>), MergeError> {
        if let Some(result) = merge3(base, left, right) {
            return Ok(result);
        }
        let db = self.db;
        let load = |oid: Option<ObjectId>| -> Result<Vec<u8>, MergeError> {
            let Some(oid) = oid else {
                return Ok(Vec::new());
            };
            Ok(db.load(&oid)?.as_blob().map(|blob| blob.data.clone()).unwrap_or_default())
        };
        let (base, left, right) = (load(base)?, load(left)?, load(right)?);

        let merge = diff3::merge(&base, &left, &right);
        let data = merge.to_bytes(Some(&self.inputs.left_name), Some(&self.inputs.right_name));
        let oid = db.store(&Object::Blob(Blob::new(data)))?;
        Ok((merge.is_clean(), Some(oid)))
    }

    fn log(&mut self, message: String) {
        (self.progress)(&message);
    }

    fn log_conflict(&mut self, path: &BStr, rename: Option<&str>) {
        let Some([base, left, right]) = self.plan.conflicts.get(path).copied() else {
            return;
        };
        let inputs = self.inputs;
        let (left_name, right_name) = (&inputs.left_name, &inputs.right_name);

        let message = if left.is_some() && right.is_some() {
            let kind = if base.is_some() { "content" } else { "add/add" };
            format!("CONFLICT ({kind}): Merge conflict in {path}")
        } else if base.is_some() && (left.is_some() || right.is_some()) {
            let (deleted, modified) = if left.is_some() {
                (right_name, left_name)
            } else {
                (left_name, right_name)
            };
            let at = rename.map(|rename| format!(" at {rename}")).unwrap_or_default();
            format!(
                "CONFLICT (modify/delete): {path} deleted in {deleted} and modified in {modified}. \
                 Version {modified} of {path} left in tree{at}."
            )
        } else {
            let (kind, branch) = if left.is_some() {
                ("file/directory", right_name)
            } else {
                ("directory/file", left_name)
            };
            format!(
                "CONFLICT ({kind}): There is a directory with name {path} in {branch}. \
                 Adding {path} as {}",
                rename.unwrap_or_default()
            )
        };
        self.log(message);
    }
}

fn merge_modes(
    base: Option<FileMode>,
    left: Option<FileMode>,
    right: Option<FileMode>,
) -> (bool, Option<FileMode>) {
    merge3(base, left, right).unwrap_or((false, left))
}

/// The trivial three-way merge: a value changed on one side only wins.
/// A side that is absent makes the result unclean. `None` means both sides
/// changed the value differently.
fn merge3<T: PartialEq + Copy>(
    base: Option<T>,
    left: Option<T>,
    right: Option<T>,
) -> Option<(bool, Option<T>)> {
    match (left, right) {
        (None, _) => Some((false, right)),
        (_, None) => Some((false, left)),
        _ if left == base || left == right => Some((true, right)),
        _ if right == base => Some((true, left)),
        _ => None,
    }
}

/// Every proper ancestor directory of `path`, innermost first.
fn parent_dirs(path: &[u8]) -> Vec<BString> {
    let mut dirs = Vec::new();
    let mut end = path.len();
    while let Some(slash) = path[..end].rfind_byte(b'/') {
        dirs.push(BString::from(&path[..slash]));
        end = slash;
    }
    dirs
}

/// The diff's paths with everything inside a directory ordered before the
/// directory's own path, the order a tree walk reports them in.
fn post_order(diff: &Changes) -> Vec<BString> {
    let mut paths: Vec<BString> = diff.keys().cloned().collect();
    paths.sort_by(|a, b| {
        let mut a = a.split_str("/");
        let mut b = b.split_str("/");
        loop {
            match (a.next(), b.next()) {
                (Some(x), Some(y)) if x == y => continue,
                (Some(x), Some(y)) => return x.cmp(y),
                (None, Some(_)) => return Ordering::Greater,
                (Some(_), None) => return Ordering::Less,
                (None, None) => return Ordering::Equal,
            }
        }
    });
    paths
}
