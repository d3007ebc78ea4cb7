//! Git's smart protocol over a pair of byte channels.
//!
//! Both ends speak pkt-line framing. The serving side runs
//! [`upload_pack`] or [`receive_pack`]; the requesting side runs
//! [`fetch`] or [`push`]. How the channels are opened (a pipe to a
//! spawned process, a socket) is up to the caller.

pub mod fetch;
pub mod pktline;
pub mod push;
pub mod receive_pack;
pub mod ref_update;
pub mod remote;
pub mod upload_pack;

mod agent;
mod transfer;

pub use fetch::{fetch, FetchOptions};
pub use pktline::{Connection, Packet, Role};
pub use push::{push, PushOptions, PushReport};
pub use receive_pack::receive_pack;
pub use ref_update::{fast_forward_error, RefUpdate};
pub use remote::{Remote, Remotes};
pub use upload_pack::upload_pack;

/// Errors that can occur during protocol operations.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("No such remote: {0}")]
    NoSuchRemote(String),

    #[error("remote {0} already exists.")]
    RemoteExists(String),

    #[error("Cannot setup tracking information; starting point '{0}' is not a branch")]
    InvalidUpstream(String),

    #[error(transparent)]
    Pack(#[from] git_pack::PackError),

    #[error(transparent)]
    Odb(#[from] git_odb::OdbError),

    #[error(transparent)]
    Ref(#[from] git_ref::RefError),

    #[error(transparent)]
    Config(#[from] git_config::ConfigError),

    #[error(transparent)]
    Repo(#[from] git_repository::RepoError),

    #[error(transparent)]
    RevWalk(#[from] git_revwalk::RevWalkError),

    #[error(transparent)]
    Hash(#[from] git_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
