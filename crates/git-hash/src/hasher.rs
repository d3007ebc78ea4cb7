use digest::Digest;

use crate::{HashError, ObjectId};

/// Streaming SHA-1 with collision detection.
///
/// Used for object names as well as the trailing checksums of pack,
/// index and `.idx` files. Data can be fed with [`update`](Hasher::update)
/// or through the [`std::io::Write`] impl.
pub struct Hasher {
    inner: Box<sha1_checked::Sha1>,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    pub fn new() -> Self {
        Self {
            inner: Box::new(sha1_checked::Sha1::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Fails only when the collision detector fires.
    pub fn finalize(self) -> Result<ObjectId, HashError> {
        let result = self.inner.try_finalize();
        if result.has_collision() {
            return Err(HashError::Sha1Collision);
        }
        ObjectId::from_bytes(result.hash().as_slice())
    }

    /// Hash `data` in one call.
    pub fn digest(data: &[u8]) -> Result<ObjectId, HashError> {
        let mut h = Self::new();
        h.update(data);
        h.finalize()
    }

    /// Object name of `data` stored as `kind`: SHA-1 over
    /// `"<kind> <len>\0<data>"`.
    pub fn hash_object(kind: &str, data: &[u8]) -> Result<ObjectId, HashError> {
        let mut h = Self::new();
        h.update(format!("{} {}\0", kind, data.len()).as_bytes());
        h.update(data);
        h.finalize()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
