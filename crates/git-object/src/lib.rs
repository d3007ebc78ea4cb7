//! The git object model: blobs, trees and commits.
//!
//! Objects are a closed set; an unrecognised type tag is rejected at the
//! parse boundary rather than passed through. Each variant parses from and
//! serializes to its canonical content bytes, and [`header`] handles the
//! `"<type> <size>\0"` envelope shared by loose objects and hashing.

mod author;
mod blob;
mod commit;
pub mod header;
mod tree;

pub use author::Author;
pub use blob::Blob;
pub use commit::Commit;
pub use tree::{FileMode, Tree, TreeBuilder, TreeEntry};

use bstr::BString;
use git_hash::hasher::Hasher;
use git_hash::{HashError, ObjectId};

/// Errors produced by object parsing.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid object type: {0}")]
    InvalidType(BString),

    #[error("invalid object header: {0}")]
    InvalidHeader(String),

    #[error("truncated object: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid tree entry at offset {offset}: {reason}")]
    InvalidTreeEntry { offset: usize, reason: String },

    #[error("invalid commit: missing '{field}' header")]
    MissingCommitField { field: &'static str },

    #[error("invalid file mode: {0}")]
    InvalidFileMode(String),

    #[error("invalid author line: {0}")]
    InvalidAuthor(BString),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// The three object kinds the engine stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Blob,
    Tree,
    Commit,
}

impl ObjectType {
    /// Parse the type word of an object header.
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"blob" => Ok(Self::Blob),
            b"tree" => Ok(Self::Tree),
            b"commit" => Ok(Self::Commit),
            _ => Err(ObjectError::InvalidType(BString::from(s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectType {
    type Err = ObjectError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}

/// A parsed object. Immutable once loaded; shared read-only between walkers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
}

impl Object {
    /// Parse a full `"<type> <size>\0<content>"` buffer.
    pub fn parse(data: &[u8]) -> Result<Self, ObjectError> {
        let (kind, size, header_len) = header::parse_header(data)?;
        let content = &data[header_len..];
        if content.len() < size {
            return Err(ObjectError::Truncated {
                expected: size,
                actual: content.len(),
            });
        }
        Self::parse_content(kind, &content[..size])
    }

    /// Dispatch content bytes to the parser for `kind`.
    pub fn parse_content(kind: ObjectType, content: &[u8]) -> Result<Self, ObjectError> {
        match kind {
            ObjectType::Blob => Ok(Self::Blob(Blob::new(content.to_vec()))),
            ObjectType::Tree => Ok(Self::Tree(Tree::parse(content)?)),
            ObjectType::Commit => Ok(Self::Commit(Commit::parse(content)?)),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Blob(_) => ObjectType::Blob,
            Self::Tree(_) => ObjectType::Tree,
            Self::Commit(_) => ObjectType::Commit,
        }
    }

    /// Content bytes without the header.
    pub fn serialize_content(&self) -> Vec<u8> {
        match self {
            Self::Blob(b) => b.data.clone(),
            Self::Tree(t) => t.serialize_content(),
            Self::Commit(c) => c.serialize_content(),
        }
    }

    /// Header plus content: the bytes that are hashed and stored.
    pub fn serialize(&self) -> Vec<u8> {
        let content = self.serialize_content();
        let mut out = header::write_header(self.object_type(), content.len());
        out.extend_from_slice(&content);
        out
    }

    /// The object's name, computed from its serialization.
    pub fn compute_oid(&self) -> Result<ObjectId, HashError> {
        Hasher::hash_object(self.object_type().as_str(), &self.serialize_content())
    }

    pub fn as_commit(&self) -> Option<&Commit> {
        match self {
            Self::Commit(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Self::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl From<Blob> for Object {
    fn from(b: Blob) -> Self {
        Self::Blob(b)
    }
}

impl From<Tree> for Object {
    fn from(t: Tree) -> Self {
        Self::Tree(t)
    }
}

impl From<Commit> for Object {
    fn from(c: Commit) -> Self {
        Self::Commit(c)
    }
}

/// Type and size of a stored object, read without its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub kind: ObjectType,
    pub size: usize,
}

/// The undecoded content of a stored object: what pack writers copy and
/// what delta resolution produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawObject {
    pub kind: ObjectType,
    pub data: Vec<u8>,
}

impl RawObject {
    pub fn new(kind: ObjectType, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    pub fn info(&self) -> ObjectInfo {
        ObjectInfo {
            kind: self.kind,
            size: self.data.len(),
        }
    }

    pub fn parse(&self) -> Result<Object, ObjectError> {
        Object::parse_content(self.kind, &self.data)
    }

    pub fn compute_oid(&self) -> Result<ObjectId, HashError> {
        Hasher::hash_object(self.kind.as_str(), &self.data)
    }
}
