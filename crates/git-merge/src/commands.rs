//! `merge`, and resuming or abandoning a merge stopped by conflicts.

use bstr::BString;
use git_hash::ObjectId;
use git_odb::PathFilter;
use git_ref::ORIG_HEAD;
use git_repository::{MergeKind, Repository};
use git_revwalk::HEAD;

use crate::{commit, with_index_update, Inputs, MergeError, Resolve};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The other commit is already part of HEAD's history.
    AlreadyUpToDate,
    /// HEAD moved forward without a merge commit.
    FastForward { from: ObjectId, to: ObjectId },
    Merged(ObjectId),
    /// Conflicts were left in the index and workspace; `MERGE_HEAD` and
    /// `MERGE_MSG` record the merge for [`merge_continue`].
    Conflicted { paths: Vec<BString> },
}

/// Merge `revision` into HEAD. `message` defaults to
/// `Merge commit '<revision>'`; `progress` receives the resolution lines.
pub fn merge(
    repo: &mut Repository,
    revision: &str,
    message: Option<&str>,
    mut progress: impl FnMut(&str),
) -> Result<MergeOutcome, MergeError> {
    let pending = repo.pending_commit();
    if pending.in_progress() {
        return Err(MergeError::InProgress);
    }

    let inputs = Inputs::new(repo, HEAD, revision)?;
    repo.refs().update_ref(ORIG_HEAD, Some(&inputs.left_oid))?;

    if inputs.already_merged() {
        return Ok(MergeOutcome::AlreadyUpToDate);
    }
    if inputs.fast_forward() {
        return fast_forward(repo, inputs.left_oid, inputs.right_oid);
    }

    pending.start(&inputs.right_oid, MergeKind::Merge)?;
    let message = match message {
        Some(message) => message.to_owned(),
        None => format!("Merge commit '{revision}'"),
    };
    pending.write_message(&format!("{}\n", message.trim_end()))?;

    let resolved = with_index_update(repo, |repo| {
        Resolve::new(&inputs).on_progress(&mut progress).execute(repo)
    });
    let plan = match resolved {
        Ok(plan) => plan,
        Err(e) => {
            pending.clear(MergeKind::Merge)?;
            return Err(e);
        }
    };

    if !plan.is_clean() {
        let paths = repo.index().conflict_paths();
        tracing::info!(conflicts = paths.len(), "merge stopped on conflicts");
        return Ok(MergeOutcome::Conflicted { paths });
    }
    let oid = commit::resume_merge(repo, MergeKind::Merge)?;
    Ok(MergeOutcome::Merged(oid))
}

fn fast_forward(repo: &mut Repository, from: ObjectId, to: ObjectId) -> Result<MergeOutcome, MergeError> {
    let diff = repo
        .database()
        .tree_diff(Some(&from), Some(&to), &PathFilter::default())?;
    with_index_update(repo, |repo| Ok(repo.migration(&diff).apply_changes()?))?;
    repo.refs().update_head(&to)?;
    tracing::info!(%from, %to, "fast-forward");
    Ok(MergeOutcome::FastForward { from, to })
}

/// Write the merge commit once every conflict is resolved in the index.
pub fn merge_continue(repo: &mut Repository) -> Result<ObjectId, MergeError> {
    commit::resume_merge(repo, MergeKind::Merge)
}

/// Forget the stopped merge and reset the index and workspace to HEAD.
pub fn merge_abort(repo: &mut Repository) -> Result<(), MergeError> {
    repo.pending_commit().clear(MergeKind::Merge)?;
    let head = repo.refs().read_head()?.ok_or(MergeError::UnbornHead)?;
    with_index_update(repo, |repo| Ok(repo.hard_reset(&head)?))?;
    tracing::info!(%head, "merge aborted");
    Ok(())
}
