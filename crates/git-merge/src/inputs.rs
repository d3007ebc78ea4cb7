//! The two commits being merged and the base they are merged against.

use git_hash::ObjectId;
use git_object::{Author, Commit, Object};
use git_odb::Database;
use git_repository::Repository;
use git_revwalk::{Bases, Revision};

use crate::{MergeError, Resolve};

const VIRTUAL_LEFT: &str = "Temporary merge branch 1";
const VIRTUAL_RIGHT: &str = "Temporary merge branch 2";

#[derive(Debug, Clone)]
pub struct Inputs {
    pub left_name: String,
    pub right_name: String,
    pub left_oid: ObjectId,
    pub right_oid: ObjectId,
    /// The best common ancestors; empty for unrelated histories.
    pub base_oids: Vec<ObjectId>,
    /// What the trees are merged against: the single best common ancestor,
    /// or a commit merging all of them when there are several.
    pub base_oid: Option<ObjectId>,
}

impl Inputs {
    /// Resolve both revisions to commits and find their merge base.
    pub fn new(repo: &Repository, left_name: &str, right_name: &str) -> Result<Self, MergeError> {
        let left_oid = Revision::new(repo, left_name)?.resolve_commit()?;
        let right_oid = Revision::new(repo, right_name)?.resolve_commit()?;

        let db = repo.database();
        let base_oids = Bases::new(db, &left_oid, &right_oid).find()?;
        let base_oid = merge_bases(db, &base_oids)?;

        Ok(Self {
            left_name: left_name.to_owned(),
            right_name: right_name.to_owned(),
            left_oid,
            right_oid,
            base_oids,
            base_oid,
        })
    }

    /// Inputs with a base chosen by the caller, as cherry-pick and revert
    /// do.
    pub fn pick(
        left_name: impl Into<String>,
        right_name: impl Into<String>,
        left_oid: ObjectId,
        right_oid: ObjectId,
        base_oid: Option<ObjectId>,
    ) -> Self {
        Self {
            left_name: left_name.into(),
            right_name: right_name.into(),
            left_oid,
            right_oid,
            base_oids: base_oid.into_iter().collect(),
            base_oid,
        }
    }

    /// The right commit is already in the left's history.
    pub fn already_merged(&self) -> bool {
        self.base_oids == [self.right_oid]
    }

    /// The left commit is in the right's history, so the left side can just
    /// move forward.
    pub fn fast_forward(&self) -> bool {
        self.base_oids == [self.left_oid]
    }
}

/// Collapse several best common ancestors into one by merging them pairwise
/// into synthetic commits, each against its own merge base. The merged
/// trees keep any conflict markers.
fn merge_bases(db: &Database, bases: &[ObjectId]) -> Result<Option<ObjectId>, MergeError> {
    let Some((first, rest)) = bases.split_first() else {
        return Ok(None);
    };
    let mut merged = *first;
    for next in rest {
        let inner = Bases::new(db, &merged, next).find()?;
        let inputs = Inputs {
            left_name: VIRTUAL_LEFT.to_owned(),
            right_name: VIRTUAL_RIGHT.to_owned(),
            left_oid: merged,
            right_oid: *next,
            base_oid: merge_bases(db, &inner)?,
            base_oids: inner,
        };
        let plan = Resolve::new(&inputs).plan(db)?;
        let tree = plan.write_tree(db, &merged)?;

        let left = db.load_commit(&merged)?;
        let right = db.load_commit(next)?;
        let time = if left.committer.time.timestamp >= right.committer.time.timestamp {
            left.committer.time
        } else {
            right.committer.time
        };
        let author = Author::new("Virtual Merge Base", "", time);
        let commit = Commit::new(vec![merged, *next], tree, author, "merged common ancestors\n");
        merged = db.store(&Object::Commit(commit))?;

        tracing::info!(
            left = %inputs.left_oid,
            right = %inputs.right_oid,
            conflicts = plan.conflicts.len(),
            "merged common ancestors into a virtual base"
        );
    }
    Ok(Some(merged))
}
