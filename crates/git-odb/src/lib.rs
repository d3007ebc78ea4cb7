//! The object database.
//!
//! Writes always go to the loose store. Reads ask the loose store first,
//! then each pack in `objects/pack`, newest first. Parsed objects are
//! memoized per [`Database`] instance in a bounded LRU.

pub mod backend;
mod path_filter;
mod tree_diff;

pub use backend::Backend;
pub use path_filter::{join_path, PathFilter};
pub use tree_diff::{Changes, Entry};

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use bstr::{BStr, BString, ByteSlice};
use git_hash::ObjectId;
use git_loose::LooseObjectStore;
use git_object::{Commit, Object, ObjectInfo, ObjectType, RawObject, Tree};
use git_pack::PackedStore;
use lru::LruCache;

const CACHE_SIZE: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("corrupt object {oid}: {reason}")]
    CorruptObject { oid: ObjectId, reason: String },

    #[error("object {oid} is a {actual}, not a {expected}")]
    WrongType {
        oid: ObjectId,
        expected: ObjectType,
        actual: ObjectType,
    },

    #[error(transparent)]
    Loose(#[from] git_loose::LooseError),

    #[error(transparent)]
    Pack(#[from] git_pack::PackError),

    #[error(transparent)]
    Hash(#[from] git_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct Database {
    objects_dir: PathBuf,
    loose: LooseObjectStore,
    packs: RwLock<Vec<PackedStore>>,
    cache: Mutex<LruCache<ObjectId, Arc<Object>>>,
}

impl Database {
    pub fn open(objects_dir: impl AsRef<Path>) -> Self {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        let packs = discover_packs(&objects_dir.join("pack"));
        Self {
            loose: LooseObjectStore::open(&objects_dir),
            packs: RwLock::new(packs),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            )),
            objects_dir,
        }
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn pack_path(&self) -> PathBuf {
        self.objects_dir.join("pack")
    }

    /// Re-scan `objects/pack`, picking up packs written since opening.
    pub fn reload(&self) {
        let packs = discover_packs(&self.pack_path());
        tracing::debug!(count = packs.len(), "reloaded packs");
        *self.packs.write().unwrap_or_else(PoisonError::into_inner) = packs;
    }

    /// Serialize, hash and write `object`. Writing an existing object is a no-op.
    pub fn store(&self, object: &Object) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write(object)?)
    }

    pub fn store_raw(&self, raw: &RawObject) -> Result<ObjectId, OdbError> {
        Ok(self.loose.write_raw(raw.kind, &raw.data)?)
    }

    /// The id `object` would be stored under.
    pub fn hash_object(&self, object: &Object) -> Result<ObjectId, OdbError> {
        Ok(object.compute_oid()?)
    }

    /// First seven hex digits.
    pub fn short_oid(&self, oid: &ObjectId) -> String {
        oid.short()
    }

    pub fn has(&self, oid: &ObjectId) -> bool {
        self.loose.contains(oid) || self.read_packs().iter().any(|pack| pack.has(oid))
    }

    pub fn load_info(&self, oid: &ObjectId) -> Result<ObjectInfo, OdbError> {
        if let Some(info) = Backend::load_info(&self.loose, oid)? {
            return Ok(info);
        }
        for pack in self.read_packs().iter() {
            if let Some(info) = Backend::load_info(pack, oid)? {
                return Ok(info);
            }
        }
        Err(OdbError::ObjectNotFound(*oid))
    }

    pub fn load_raw(&self, oid: &ObjectId) -> Result<RawObject, OdbError> {
        if let Some(raw) = Backend::load_raw(&self.loose, oid)? {
            return Ok(raw);
        }
        for pack in self.read_packs().iter() {
            if let Some(raw) = Backend::load_raw(pack, oid)? {
                return Ok(raw);
            }
        }
        Err(OdbError::ObjectNotFound(*oid))
    }

    /// Load and parse an object, memoized.
    pub fn load(&self, oid: &ObjectId) -> Result<Arc<Object>, OdbError> {
        if let Some(object) = self.lock_cache().get(oid) {
            return Ok(Arc::clone(object));
        }
        let raw = self.load_raw(oid)?;
        let object = Arc::new(raw.parse().map_err(|e| OdbError::CorruptObject {
            oid: *oid,
            reason: e.to_string(),
        })?);
        self.lock_cache().put(*oid, Arc::clone(&object));
        Ok(object)
    }

    pub fn load_commit(&self, oid: &ObjectId) -> Result<Commit, OdbError> {
        match self.load(oid)?.as_ref() {
            Object::Commit(commit) => Ok(commit.clone()),
            other => Err(wrong_type(oid, ObjectType::Commit, other)),
        }
    }

    /// Load a tree, peeling a commit to its tree.
    pub fn load_tree(&self, oid: &ObjectId) -> Result<Tree, OdbError> {
        match self.load(oid)?.as_ref() {
            Object::Tree(tree) => Ok(tree.clone()),
            Object::Commit(commit) => self.load_tree(&commit.tree),
            other => Err(wrong_type(oid, ObjectType::Tree, other)),
        }
    }

    /// Union of every backend's matches, deduplicated.
    pub fn prefix_match(&self, prefix: &str) -> Result<Vec<ObjectId>, OdbError> {
        let mut oids = Backend::prefix_match(&self.loose, prefix)?;
        for pack in self.read_packs().iter() {
            oids.extend(Backend::prefix_match(pack, prefix)?);
        }
        oids.sort();
        oids.dedup();
        Ok(oids)
    }

    /// Every changed path between two trees or commits.
    pub fn tree_diff(
        &self,
        a: Option<&ObjectId>,
        b: Option<&ObjectId>,
        filter: &PathFilter,
    ) -> Result<Changes, OdbError> {
        let mut diff = tree_diff::TreeDiff::new(self);
        diff.compare_oids(a, b, filter)?;
        Ok(diff.into_changes())
    }

    /// The entry at `path` inside a commit or tree; the root tree itself
    /// when `path` is `None`.
    pub fn load_tree_entry(
        &self,
        oid: &ObjectId,
        path: Option<&BStr>,
    ) -> Result<Option<Entry>, OdbError> {
        let root = match self.load(oid)?.as_ref() {
            Object::Commit(commit) => Entry::tree(commit.tree),
            Object::Tree(_) => Entry::tree(*oid),
            other => return Err(wrong_type(oid, ObjectType::Tree, other)),
        };
        let Some(path) = path else {
            return Ok(Some(root));
        };

        let mut entry = root;
        for name in path.split_str("/").filter(|name| !name.is_empty()) {
            if !entry.is_tree() {
                return Ok(None);
            }
            let tree = self.load_tree(&entry.oid)?;
            match tree.find(name.as_bstr()) {
                Some(found) => entry = Entry::from(found),
                None => return Ok(None),
            }
        }
        Ok(Some(entry))
    }

    /// Every blob under `path` (or the whole tree) as a flat path map.
    pub fn load_tree_list(
        &self,
        oid: Option<&ObjectId>,
        path: Option<&BStr>,
    ) -> Result<BTreeMap<BString, Entry>, OdbError> {
        let mut list = BTreeMap::new();
        let Some(oid) = oid else {
            return Ok(list);
        };
        if let Some(entry) = self.load_tree_entry(oid, path)? {
            let prefix = path.map(BString::from).unwrap_or_default();
            self.build_list(&mut list, entry, prefix)?;
        }
        Ok(list)
    }

    fn build_list(
        &self,
        list: &mut BTreeMap<BString, Entry>,
        entry: Entry,
        prefix: BString,
    ) -> Result<(), OdbError> {
        if !entry.is_tree() {
            list.insert(prefix, entry);
            return Ok(());
        }
        for item in self.load_tree(&entry.oid)?.iter() {
            self.build_list(list, Entry::from(item), join_path(&prefix, &item.name))?;
        }
        Ok(())
    }

    fn read_packs(&self) -> std::sync::RwLockReadGuard<'_, Vec<PackedStore>> {
        self.packs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, LruCache<ObjectId, Arc<Object>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn wrong_type(oid: &ObjectId, expected: ObjectType, actual: &Object) -> OdbError {
    OdbError::WrongType {
        oid: *oid,
        expected,
        actual: actual.object_type(),
    }
}

/// Packs in `pack_dir`, newest first. A missing directory has none, and
/// packs that fail to open are skipped.
fn discover_packs(pack_dir: &Path) -> Vec<PackedStore> {
    let Ok(dir) = std::fs::read_dir(pack_dir) else {
        return Vec::new();
    };
    let mut paths: Vec<_> = dir
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "pack"))
        .map(|p| {
            let mtime = std::fs::metadata(&p).and_then(|m| m.modified()).ok();
            (mtime, p)
        })
        .collect();
    paths.sort_by(|a, b| b.0.cmp(&a.0));

    paths
        .into_iter()
        .filter_map(|(_, path)| match PackedStore::open(&path) {
            Ok(pack) => Some(pack),
            Err(err) => {
                tracing::warn!(pack = %path.display(), %err, "skipping unreadable pack");
                None
            }
        })
        .collect()
}

impl git_pack::ObjectSource for Database {
    fn load_info(&self, oid: &ObjectId) -> Result<ObjectInfo, git_pack::PackError> {
        Database::load_info(self, oid).map_err(git_pack::PackError::store)
    }

    fn load_raw(&self, oid: &ObjectId) -> Result<RawObject, git_pack::PackError> {
        Database::load_raw(self, oid).map_err(git_pack::PackError::store)
    }
}

impl git_pack::ObjectSink for Database {
    fn store_raw(&self, raw: &RawObject) -> Result<ObjectId, git_pack::PackError> {
        Database::store_raw(self, raw).map_err(git_pack::PackError::store)
    }

    fn load_raw(&self, oid: &ObjectId) -> Result<RawObject, git_pack::PackError> {
        Database::load_raw(self, oid).map_err(git_pack::PackError::store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git_object::Blob;

    #[test]
    fn load_is_memoized_per_instance() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path());
        let oid = db.store(&Object::Blob(Blob::new(b"cached".to_vec()))).unwrap();

        let first = db.load(&oid).unwrap();
        let second = db.load(&oid).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let other = Database::open(dir.path());
        assert!(!Arc::ptr_eq(&first, &other.load(&oid).unwrap()));
    }

    #[test]
    fn missing_pack_dir_has_no_packs() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("objects"));
        assert!(db.read_packs().is_empty());
        let oid = ObjectId::from_raw([3; 20]);
        assert!(!db.has(&oid));
        assert!(matches!(db.load_raw(&oid), Err(OdbError::ObjectNotFound(_))));
    }
}
