//! Packfile reading, writing, indexing and delta compression.
//!
//! A pack is a `PACK` header, a run of records and a SHA-1 trailer. Each
//! record is a whole object or a delta against a base named either by its
//! offset earlier in the same pack or by its object id. Packs are both the
//! compact on-disk storage format and the wire format for fetch and push.

pub mod compressor;
pub mod delta;
pub mod entry;
pub mod index;
pub mod indexer;
pub mod numbers;
pub mod packed;
pub mod reader;
pub mod stream;
pub mod unpacker;
pub mod writer;

pub use delta::DeltaError;
pub use index::PackIndex;
pub use indexer::Indexer;
pub use packed::PackedStore;
pub use reader::{Reader, Record};
pub use stream::Stream;
pub use unpacker::Unpacker;
pub use writer::{Writer, WriterOptions};

use git_hash::ObjectId;
use git_object::{ObjectInfo, ObjectType, RawObject};

/// Errors that can occur during pack operations.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("bad pack signature: {0:?}")]
    BadSignature([u8; 4]),

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("invalid pack index: {0}")]
    InvalidIndex(String),

    #[error("invalid pack record type {type_code} at offset {offset}")]
    InvalidType { type_code: u8, offset: u64 },

    #[error("Checksum does not match value read from pack")]
    ChecksumMismatch { expected: ObjectId, actual: ObjectId },

    #[error("unexpected end of pack data")]
    UnexpectedEof,

    #[error("corrupt zlib stream at offset {0}")]
    Corrupt(u64),

    #[error("delta base not found: {0}")]
    MissingBase(ObjectId),

    #[error("no object at pack offset {0}")]
    MissingOffset(u64),

    #[error("{0} deltas could not be resolved against a base")]
    UnresolvedDeltas(usize),

    #[error(transparent)]
    Delta(#[from] DeltaError),

    #[error("object store: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Util(#[from] git_utils::UtilError),

    #[error(transparent)]
    Object(#[from] git_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] git_hash::HashError),
}

impl PackError {
    /// Wrap an error raised by an [`ObjectSource`] or [`ObjectSink`].
    pub fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Store(Box::new(err))
    }
}

pub const SIGNATURE: &[u8; 4] = b"PACK";
pub const VERSION: u32 = 2;
pub const HEADER_SIZE: usize = 12;

pub const COMMIT: u8 = 1;
pub const TREE: u8 = 2;
pub const BLOB: u8 = 3;
pub const OFS_DELTA: u8 = 6;
pub const REF_DELTA: u8 = 7;

pub const IDX_SIGNATURE: u32 = 0xff74_4f63;
pub const IDX_VERSION: u32 = 2;
pub const IDX_MAX_OFFSET: u64 = 0x8000_0000;

/// Pack type code of a whole object.
pub fn type_code(kind: ObjectType) -> u8 {
    match kind {
        ObjectType::Commit => COMMIT,
        ObjectType::Tree => TREE,
        ObjectType::Blob => BLOB,
    }
}

/// Object type of a non-delta type code. Tags (4) are not supported.
pub fn object_type(code: u8) -> Option<ObjectType> {
    match code {
        COMMIT => Some(ObjectType::Commit),
        TREE => Some(ObjectType::Tree),
        BLOB => Some(ObjectType::Blob),
        _ => None,
    }
}

/// Where pack writers read objects from.
pub trait ObjectSource {
    fn load_info(&self, oid: &ObjectId) -> Result<ObjectInfo, PackError>;
    fn load_raw(&self, oid: &ObjectId) -> Result<RawObject, PackError>;
}

/// Where the unpacker stores expanded objects.
pub trait ObjectSink {
    /// Store an object, returning its id. Storing an existing object is a no-op.
    fn store_raw(&self, raw: &RawObject) -> Result<ObjectId, PackError>;

    /// Load a previously stored object, for resolving `REF_DELTA` bases.
    fn load_raw(&self, oid: &ObjectId) -> Result<RawObject, PackError>;
}
