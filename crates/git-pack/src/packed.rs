//! Read-only object access through a pack and its `.idx`.

use std::path::{Path, PathBuf};

use git_hash::ObjectId;
use git_object::{ObjectInfo, RawObject};
use memmap2::Mmap;

use crate::delta;
use crate::index::PackIndex;
use crate::reader::{Reader, Record, RecordInfo};
use crate::stream::Stream;
use crate::PackError;

/// Longest delta chain followed before the pack is declared corrupt.
const MAX_CHAIN_DEPTH: usize = 4096;

pub struct PackedStore {
    pack_path: PathBuf,
    data: Mmap,
    index: PackIndex,
}

impl PackedStore {
    /// Open `pack-<hex>.pack` together with its sibling `.idx`.
    pub fn open(pack_path: impl AsRef<Path>) -> Result<Self, PackError> {
        let pack_path = pack_path.as_ref().to_path_buf();
        let index = PackIndex::open(pack_path.with_extension("idx"))?;
        let file = std::fs::File::open(&pack_path)?;
        // SAFETY: packs are immutable once renamed into place.
        let data = unsafe { Mmap::map(&file)? };
        if data.len() < crate::HEADER_SIZE + ObjectId::LEN {
            return Err(PackError::UnexpectedEof);
        }
        Ok(Self {
            pack_path,
            data,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.pack_path
    }

    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    pub fn has(&self, oid: &ObjectId) -> bool {
        matches!(self.index.oid_offset(oid), Ok(Some(_)))
    }

    pub fn prefix_match(&self, prefix: &str) -> Vec<ObjectId> {
        self.index.prefix_match(prefix)
    }

    pub fn load_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, PackError> {
        match self.index.oid_offset(oid)? {
            Some(offset) => self.load_info_at(offset).map(Some),
            None => Ok(None),
        }
    }

    pub fn load_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, PackError> {
        match self.index.oid_offset(oid)? {
            Some(offset) => self.load_raw_at(offset).map(Some),
            None => Ok(None),
        }
    }

    /// The outermost delta knows the size; only the chain's base knows the type.
    fn load_info_at(&self, offset: u64) -> Result<ObjectInfo, PackError> {
        let mut size = None;
        let mut at = offset;
        for _ in 0..MAX_CHAIN_DEPTH {
            match self.reader_at(at)?.read_info()? {
                RecordInfo::Object(info) => {
                    return Ok(ObjectInfo {
                        kind: info.kind,
                        size: size.unwrap_or(info.size),
                    });
                }
                RecordInfo::OfsDelta { base_ofs, size: target } => {
                    size.get_or_insert(target);
                    at = self.base_offset(at, base_ofs)?;
                }
                RecordInfo::RefDelta { base_oid, size: target } => {
                    size.get_or_insert(target);
                    at = self.index.oid_offset(&base_oid)?.ok_or(PackError::MissingBase(base_oid))?;
                }
            }
        }
        Err(PackError::Corrupt(offset))
    }

    fn load_raw_at(&self, offset: u64) -> Result<RawObject, PackError> {
        let mut chain = Vec::new();
        let mut at = offset;
        let base = loop {
            if chain.len() > MAX_CHAIN_DEPTH {
                return Err(PackError::Corrupt(offset));
            }
            match self.reader_at(at)?.read_record()? {
                Record::Object(object) => break object,
                Record::OfsDelta { base_ofs, delta_data } => {
                    chain.push(delta_data);
                    at = self.base_offset(at, base_ofs)?;
                }
                Record::RefDelta { base_oid, delta_data } => {
                    chain.push(delta_data);
                    at = self.index.oid_offset(&base_oid)?.ok_or(PackError::MissingBase(base_oid))?;
                }
            }
        };

        chain.into_iter().rev().try_fold(base, |object, delta_data| {
            let data = delta::expand(&object.data, &delta_data)?;
            Ok(RawObject::new(object.kind, data))
        })
    }

    fn base_offset(&self, at: u64, base_ofs: u64) -> Result<u64, PackError> {
        match at.checked_sub(base_ofs) {
            Some(base) if base_ofs > 0 => Ok(base),
            _ => Err(PackError::MissingOffset(base_ofs)),
        }
    }

    fn reader_at(&self, offset: u64) -> Result<Reader<&[u8]>, PackError> {
        let start = usize::try_from(offset).map_err(|_| PackError::MissingOffset(offset))?;
        let slice = self.data.get(start..).ok_or(PackError::MissingOffset(offset))?;
        Ok(Reader::new(Stream::at(slice, offset)))
    }
}
