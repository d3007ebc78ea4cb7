use std::path::PathBuf;

/// Error types for reference operations.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    #[error("'{0}' is not a valid branch name.")]
    InvalidName(String),

    #[error("A branch named '{0}' already exists.")]
    BranchExists(String),

    #[error("branch '{0}' not found.")]
    BranchNotFound(String),

    #[error("the requested branch '{0}' does not exist")]
    UnknownBranch(String),

    #[error("value of {0} changed since last read")]
    StaleValue(String),

    #[error("symbolic ref loop detected: {0}")]
    SymrefLoop(String),

    #[error("invalid ref contents in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error(transparent)]
    Util(#[from] git_utils::UtilError),

    #[error("I/O error on {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
