//! Revision walking: resolving revision expressions, listing the commits
//! (and optionally the trees and blobs) reachable from a set of starting
//! points, and finding the merge bases of two commits.

pub mod merge_base;
pub mod rev_list;
pub mod revision;

pub use merge_base::{Bases, CommonAncestors};
pub use rev_list::{RevItem, RevList, RevListOptions};
pub use revision::{Rev, Revision, HEAD};

/// Errors produced while resolving revisions or walking history.
#[derive(Debug, thiserror::Error)]
pub enum RevWalkError {
    /// The expression names nothing of the wanted type. `hints` carry the
    /// reasons found along the way, such as a type mismatch.
    #[error("Not a valid object name: '{expr}'.")]
    InvalidObject { expr: String, hints: Vec<String> },

    #[error("short SHA1 {name} is ambiguous")]
    AmbiguousOid { name: String, candidates: Vec<String> },

    #[error("'{0}' is not a valid revision name")]
    InvalidName(String),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    Config(#[from] git_config::ConfigError),

    #[error(transparent)]
    Repo(#[from] git_repository::RepoError),

    #[error(transparent)]
    Regex(#[from] regex::Error),
}
