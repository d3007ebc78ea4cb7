//! Loose object storage.
//!
//! Each object lives at `objects/XX/YYYY...`, where `XX` is the first byte
//! of its name in hex, and holds zlib-compressed `"<type> <size>\0<content>"`.
//! Files are written once through a temp file in the bucket directory and
//! never rewritten, so concurrent writers of the same object converge.

mod enumerate;
mod read;
mod write;

use std::path::{Path, PathBuf};

use git_hash::ObjectId;

/// The mutable object store under `.git/objects/`.
#[derive(Debug, Clone)]
pub struct LooseObjectStore {
    objects_dir: PathBuf,
    compression: flate2::Compression,
}

impl LooseObjectStore {
    pub fn open(objects_dir: impl AsRef<Path>) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
            compression: flate2::Compression::default(),
        }
    }

    /// zlib level (0-9) for newly written objects.
    pub fn set_compression_level(&mut self, level: u32) {
        self.compression = flate2::Compression::new(level.min(9));
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn object_path(&self, oid: &ObjectId) -> PathBuf {
        let (dir, file) = oid.loose_path_parts();
        self.objects_dir.join(dir).join(file)
    }
}

/// Errors from loose object operations.
#[derive(Debug, thiserror::Error)]
pub enum LooseError {
    #[error("corrupt loose object {oid}: {reason}")]
    Corrupt { oid: ObjectId, reason: String },

    #[error("failed to inflate {oid}: {source}")]
    Decompress {
        oid: ObjectId,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Util(#[from] git_utils::UtilError),

    #[error(transparent)]
    Object(#[from] git_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] git_hash::HashError),
}
