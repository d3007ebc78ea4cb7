//! Merge engine: tree-level three-way resolution with conflict recording,
//! and the merge, cherry-pick and revert flows built on it.
//!
//! [`Resolve`] plans a merge of two commits against their base and applies
//! the plan to a repository. [`commands`] and [`sequencing`] drive whole
//! operations, stopping on conflicts and resuming from the marker files
//! kept by [`git_repository::PendingCommit`] and
//! [`git_repository::Sequencer`].

pub mod commands;
pub mod commit;
pub mod inputs;
pub mod resolve;
pub mod sequencing;

pub use commands::{merge, merge_abort, merge_continue, MergeOutcome};
pub use inputs::Inputs;
pub use resolve::{ConflictSet, Plan, Resolve};
pub use sequencing::{
    cherry_pick, revert, sequence_abort, sequence_continue, sequence_quit, SequenceOptions,
    SequenceOutcome,
};

/// Errors from merge operations. Conflicts are not errors; they are
/// reported through [`MergeOutcome`] and [`SequenceOutcome`].
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Committing is not possible because you have unmerged files.")]
    Unmerged,

    #[error("Merging is not possible because you have unmerged files.")]
    InProgress,

    /// A merge commit picked without a mainline, or a mainline given for an
    /// ordinary commit.
    #[error("{0}")]
    Mainline(String),

    #[error("Aborting commit due to empty commit message.")]
    EmptyMessage,

    #[error("HEAD does not point to a commit")]
    UnbornHead,

    #[error("no cherry-pick or revert in progress")]
    NoSequence,

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Index(#[from] git_index::IndexError),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    Config(#[from] git_config::ConfigError),

    #[error(transparent)]
    Repo(#[from] git_repository::RepoError),

    #[error(transparent)]
    RevWalk(#[from] git_revwalk::RevWalkError),

    #[error(transparent)]
    Util(#[from] git_utils::UtilError),
}

/// Run `update` with the index loaded for update, writing it back on
/// success and releasing the lock on failure.
pub(crate) fn with_index_update<T>(
    repo: &mut git_repository::Repository,
    update: impl FnOnce(&mut git_repository::Repository) -> Result<T, MergeError>,
) -> Result<T, MergeError> {
    repo.index_mut().load_for_update()?;
    match update(repo) {
        Ok(value) => {
            repo.index_mut().write_updates()?;
            Ok(value)
        }
        Err(e) => {
            repo.index_mut().release_lock()?;
            Err(e)
        }
    }
}
