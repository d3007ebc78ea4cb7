/// Errors that can occur during config operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("bad config line {line} in file {file}")]
    Parse { file: String, line: usize },

    /// An edit that would silently drop values.
    #[error("{0}")]
    Conflict(String),

    #[error("config file is not open for update")]
    NotLocked,

    #[error(transparent)]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("lock error: {0}")]
    Lock(#[from] git_utils::UtilError),
}
