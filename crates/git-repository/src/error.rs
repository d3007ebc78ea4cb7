use std::path::PathBuf;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("not a git repository: {0}")]
    NotFound(PathBuf),

    /// A pathspec that names nothing in the workspace.
    #[error("{0}")]
    MissingFile(String),

    #[error("{0}")]
    NoPermission(String),

    /// Checking out would clobber local changes or untracked files. Each
    /// message lists the offending paths under its heading.
    #[error("{}", .0.join("\n"))]
    Conflict(Vec<String>),

    /// No pending merge, cherry-pick or revert where one was required.
    #[error("{0}")]
    Pending(String),

    #[error("a cherry-pick or revert is already in progress")]
    SequencerRunning,

    #[error("corrupt sequencer state: {0}")]
    Sequencer(String),

    #[error(transparent)]
    Config(#[from] git_config::ConfigError),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    Index(#[from] git_index::IndexError),

    #[error(transparent)]
    Hash(#[from] git_hash::HashError),

    #[error(transparent)]
    Util(#[from] git_utils::UtilError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
