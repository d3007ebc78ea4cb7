//! Pluggable object storage backends.

use git_hash::ObjectId;
use git_loose::{LooseError, LooseObjectStore};
use git_object::{ObjectInfo, RawObject};
use git_pack::PackedStore;

use crate::OdbError;

/// Read access to one object store.
///
/// The database asks each backend in turn and takes the first answer, so
/// `Ok(None)` means "not here", never an error.
pub trait Backend: Send + Sync {
    fn has(&self, oid: &ObjectId) -> bool;

    fn load_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError>;

    fn load_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, OdbError>;

    /// Every stored id whose hex form starts with `prefix`.
    fn prefix_match(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError>;
}

impl Backend for LooseObjectStore {
    fn has(&self, oid: &ObjectId) -> bool {
        self.contains(oid)
    }

    fn load_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        self.read_info(oid).map_err(loose_error)
    }

    fn load_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, OdbError> {
        self.read_raw(oid).map_err(loose_error)
    }

    fn prefix_match(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError> {
        Ok(LooseObjectStore::prefix_match(self, prefix)?)
    }
}

impl Backend for PackedStore {
    fn has(&self, oid: &ObjectId) -> bool {
        PackedStore::has(self, oid)
    }

    fn load_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, OdbError> {
        Ok(PackedStore::load_info(self, oid)?)
    }

    fn load_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, OdbError> {
        Ok(PackedStore::load_raw(self, oid)?)
    }

    fn prefix_match(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError> {
        Ok(PackedStore::prefix_match(self, prefix))
    }
}

fn loose_error(err: LooseError) -> OdbError {
    match err {
        LooseError::Corrupt { oid, reason } => OdbError::CorruptObject { oid, reason },
        other => OdbError::Loose(other),
    }
}
