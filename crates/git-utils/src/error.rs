use std::path::PathBuf;

/// Base error type for git-utils operations.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("invalid date: {0}")]
    DateParse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Lock file errors. `AlreadyLocked` is the contention case: another
/// process holds `<target>.lock` and the caller must not retry.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Unable to create '{path}': File exists.")]
    AlreadyLocked { path: PathBuf },

    #[error("unable to create lock file '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to commit lock file '{path}': {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not holding lock on file: {path}")]
    Stale { path: PathBuf },
}

impl UtilError {
    /// True when the error is lock contention rather than an I/O failure.
    pub fn is_lock_denied(&self) -> bool {
        matches!(self, UtilError::Lock(LockError::AlreadyLocked { .. }))
    }
}
