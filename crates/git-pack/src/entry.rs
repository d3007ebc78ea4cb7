//! Writer-side bookkeeping for one object headed into a pack.

use bstr::{BStr, BString, ByteSlice};
use git_hash::ObjectId;
use git_object::{ObjectInfo, ObjectType};

use crate::delta::{self, XDelta};
use crate::numbers::VarIntBE;
use crate::{type_code, OFS_DELTA, REF_DELTA};

/// A chosen delta: the index of the base entry plus the encoded delta bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub base: usize,
    pub data: Vec<u8>,
}

impl Delta {
    /// Encode `target` against the source indexed by `index`.
    pub fn new(base: usize, index: &XDelta, target: &[u8]) -> Self {
        let ops = index.compress(target);
        Self {
            base,
            data: delta::encode(index.source().len(), target.len(), &ops),
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub oid: ObjectId,
    pub info: ObjectInfo,
    /// Path the object was reached by, used to cluster similar files.
    pub path: Option<BString>,
    pub delta: Option<Delta>,
    pub depth: usize,
    /// Set once the entry has been written.
    pub offset: Option<u64>,
    ofs: bool,
}

impl Entry {
    pub fn new(oid: ObjectId, info: ObjectInfo, path: Option<BString>, allow_ofs: bool) -> Self {
        Self {
            oid,
            info,
            path,
            delta: None,
            depth: 0,
            offset: None,
            ofs: allow_ofs,
        }
    }

    pub fn kind(&self) -> ObjectType {
        self.info.kind
    }

    pub fn size(&self) -> usize {
        self.info.size
    }

    pub fn packed_type(&self) -> u8 {
        match (&self.delta, self.ofs) {
            (Some(_), true) => OFS_DELTA,
            (Some(_), false) => REF_DELTA,
            (None, _) => type_code(self.info.kind),
        }
    }

    pub fn packed_size(&self) -> usize {
        self.delta.as_ref().map_or(self.info.size, Delta::size)
    }

    /// Ordering for delta search: by type, then file name, then directory,
    /// then size, so likely bases end up next to each other.
    pub fn sort_key(&self) -> (u8, Option<&BStr>, Option<&BStr>, usize) {
        let (dir, base) = match &self.path {
            Some(path) => match path.rfind_byte(b'/') {
                Some(slash) => (Some(path[..slash].as_bstr()), Some(path[slash + 1..].as_bstr())),
                None => (Some(b".".as_bstr()), Some(path.as_bstr())),
            },
            None => (None, None),
        };
        (self.packed_type(), base, dir, self.info.size)
    }

    pub fn assign_delta(&mut self, delta: Delta, base_depth: usize) {
        self.delta = Some(delta);
        self.depth = base_depth + 1;
    }

    /// Bytes between the record header and the zlib body. `base_offset` is
    /// the offset the base was written at.
    pub fn delta_prefix(&self, base: Option<(&ObjectId, u64)>) -> Vec<u8> {
        match (&self.delta, base) {
            (Some(_), Some((_, base_offset))) if self.ofs => {
                VarIntBE::write(self.offset.unwrap_or(0).saturating_sub(base_offset))
            }
            (Some(_), Some((base_oid, _))) => base_oid.as_bytes().to_vec(),
            _ => Vec::new(),
        }
    }
}
