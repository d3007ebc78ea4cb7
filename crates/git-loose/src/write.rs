use std::io::Write;

use flate2::write::ZlibEncoder;
use git_hash::hasher::Hasher;
use git_hash::ObjectId;
use git_object::{header, Object, ObjectType};
use git_utils::tempfile::TempFile;

use crate::{LooseError, LooseObjectStore};

impl LooseObjectStore {
    /// Serialize, hash and store `obj`.
    pub fn write(&self, obj: &Object) -> Result<ObjectId, LooseError> {
        self.write_raw(obj.object_type(), &obj.serialize_content())
    }

    /// Store content of the given type and return its name. A no-op when the
    /// object file already exists.
    pub fn write_raw(&self, kind: ObjectType, content: &[u8]) -> Result<ObjectId, LooseError> {
        let hdr = header::write_header(kind, content.len());
        let mut hasher = Hasher::new();
        hasher.update(&hdr);
        hasher.update(content);
        let oid = hasher.finalize()?;

        let path = self.object_path(&oid);
        if path.exists() {
            return Ok(oid);
        }
        let bucket = path
            .parent()
            .unwrap_or_else(|| self.objects_dir());

        let tmp = TempFile::new_in(bucket, "tmp_obj_")?;
        let mut encoder = ZlibEncoder::new(tmp, self.compression);
        encoder.write_all(&hdr)?;
        encoder.write_all(content)?;
        let tmp = encoder.finish()?;

        if tmp.persist_noclobber(&path)? {
            tracing::debug!(%oid, kind = %kind, size = content.len(), "wrote loose object");
        }
        Ok(oid)
    }
}
