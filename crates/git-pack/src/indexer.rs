//! Store an incoming pack as-is and build its `.idx`.
//!
//! Records are copied verbatim into a temp pack while their offsets and
//! CRCs are noted. Deltas are set aside by base until every whole object is
//! known, then resolved breadth-first from the copied pack. Both the pack
//! and its index are renamed into place only once everything checks out;
//! any error leaves nothing behind but dropped temp files.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use git_hash::hasher::Hasher;
use git_hash::ObjectId;
use git_object::RawObject;
use git_utils::progress::Progress;
use git_utils::tempfile::TempFile;

use crate::reader::{Reader, Record};
use crate::stream::Stream;
use crate::{delta, PackError, IDX_MAX_OFFSET, IDX_SIGNATURE, IDX_VERSION, SIGNATURE, VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Base {
    Oid(ObjectId),
    Offset(u64),
}

/// A temp file plus the running digest of what has been written to it.
struct HashedFile {
    file: TempFile,
    digest: Hasher,
}

impl HashedFile {
    fn new(dir: &Path, prefix: &str) -> Result<Self, PackError> {
        Ok(Self {
            file: TempFile::new_in(dir, prefix)?,
            digest: Hasher::new(),
        })
    }

    fn write(&mut self, data: &[u8]) -> Result<(), PackError> {
        self.file.write_all(data)?;
        self.digest.update(data);
        Ok(())
    }

    /// Append the digest, returning it.
    fn finish(&mut self) -> Result<ObjectId, PackError> {
        let checksum = std::mem::take(&mut self.digest).finalize()?;
        self.file.write_all(checksum.as_bytes())?;
        self.file.flush()?;
        Ok(checksum)
    }
}

/// The result of indexing: where the pack landed and what it holds.
#[derive(Debug, Clone)]
pub struct IndexedPack {
    pub pack_path: PathBuf,
    pub index_path: PathBuf,
    pub checksum: ObjectId,
    pub objects: usize,
}

pub struct Indexer {
    pack_dir: PathBuf,
    index: BTreeMap<ObjectId, (u64, u32)>,
    pending: HashMap<Base, Vec<(u64, u32)>>,
}

impl Indexer {
    pub fn new(pack_dir: impl AsRef<Path>) -> Self {
        Self {
            pack_dir: pack_dir.as_ref().to_path_buf(),
            index: BTreeMap::new(),
            pending: HashMap::new(),
        }
    }

    /// Index the pack behind `reader`, whose header must already be read.
    pub fn process_pack<R: Read>(
        mut self,
        reader: &mut Reader<R>,
        progress: &mut Progress,
    ) -> Result<IndexedPack, PackError> {
        std::fs::create_dir_all(&self.pack_dir)?;
        let mut pack = HashedFile::new(&self.pack_dir, "tmp_pack_")?;

        self.write_header(&mut pack, reader.count())?;
        self.index_objects(&mut pack, reader, progress)?;
        reader.stream().verify_checksum()?;
        let checksum = pack.finish()?;

        self.resolve_deltas(pack.file.path(), progress)?;
        let index = self.write_index(checksum)?;

        let name = format!("pack-{checksum}");
        let pack_path = pack.file.persist(self.pack_dir.join(format!("{name}.pack")))?;
        let index_path = index.persist(self.pack_dir.join(format!("{name}.idx")))?;

        tracing::debug!(pack = %pack_path.display(), objects = self.index.len(), "indexed pack");
        Ok(IndexedPack {
            pack_path,
            index_path,
            checksum,
            objects: self.index.len(),
        })
    }

    fn write_header(&self, pack: &mut HashedFile, count: u32) -> Result<(), PackError> {
        let mut header = Vec::with_capacity(crate::HEADER_SIZE);
        header.extend_from_slice(SIGNATURE);
        header.extend_from_slice(&VERSION.to_be_bytes());
        header.extend_from_slice(&count.to_be_bytes());
        pack.write(&header)
    }

    fn index_objects<R: Read>(
        &mut self,
        pack: &mut HashedFile,
        reader: &mut Reader<R>,
        progress: &mut Progress,
    ) -> Result<(), PackError> {
        progress.start("Receiving objects", Some(u64::from(reader.count())));
        for _ in 0..reader.count() {
            let offset = reader.stream().offset();
            let (record, raw) = reader.capture_record()?;
            let crc = crc32fast::hash(&raw);
            pack.write(&raw)?;

            match record {
                Record::Object(object) => {
                    self.index.insert(object.compute_oid()?, (offset, crc));
                }
                Record::OfsDelta { base_ofs, .. } => {
                    let base = offset.checked_sub(base_ofs).ok_or(PackError::MissingOffset(base_ofs))?;
                    self.pending.entry(Base::Offset(base)).or_default().push((offset, crc));
                }
                Record::RefDelta { base_oid, .. } => {
                    self.pending.entry(Base::Oid(base_oid)).or_default().push((offset, crc));
                }
            }
            progress.tick();
        }
        progress.stop();
        Ok(())
    }

    fn resolve_deltas(&mut self, pack_path: &Path, progress: &mut Progress) -> Result<(), PackError> {
        let total: usize = self.pending.values().map(Vec::len).sum();
        if total == 0 {
            return Ok(());
        }
        progress.start("Resolving deltas", Some(total as u64));

        let mut file = File::open(pack_path)?;
        let mut queue = Vec::with_capacity(self.index.len());
        for (&oid, &(offset, _)) in &self.index {
            queue.push((oid, offset));
        }

        while let Some((oid, offset)) = queue.pop() {
            let mut waiting = self.pending.remove(&Base::Oid(oid)).unwrap_or_default();
            waiting.extend(self.pending.remove(&Base::Offset(offset)).unwrap_or_default());
            if waiting.is_empty() {
                continue;
            }

            let base = match read_record_at(&mut file, offset)? {
                Record::Object(object) => object,
                Record::OfsDelta { .. } | Record::RefDelta { .. } => {
                    self.expand_at(&mut file, offset)?
                }
            };
            for (delta_offset, crc) in waiting {
                let object = match read_record_at(&mut file, delta_offset)? {
                    Record::OfsDelta { delta_data, .. } | Record::RefDelta { delta_data, .. } => {
                        RawObject::new(base.kind, delta::expand(&base.data, &delta_data)?)
                    }
                    Record::Object(object) => object,
                };
                let oid = object.compute_oid()?;
                self.index.insert(oid, (delta_offset, crc));
                queue.push((oid, delta_offset));
                progress.tick();
            }
        }
        progress.stop();

        let unresolved: usize = self.pending.values().map(Vec::len).sum();
        if unresolved > 0 {
            return Err(PackError::UnresolvedDeltas(unresolved));
        }
        Ok(())
    }

    /// Rebuild a delta record that is itself a base, walking its chain.
    fn expand_at(&self, file: &mut File, offset: u64) -> Result<RawObject, PackError> {
        let mut chain = Vec::new();
        let mut at = offset;
        let base = loop {
            match read_record_at(file, at)? {
                Record::Object(object) => break object,
                Record::OfsDelta { base_ofs, delta_data } => {
                    chain.push(delta_data);
                    at = at.checked_sub(base_ofs).ok_or(PackError::MissingOffset(base_ofs))?;
                }
                Record::RefDelta { base_oid, delta_data } => {
                    chain.push(delta_data);
                    at = self.index.get(&base_oid).ok_or(PackError::MissingBase(base_oid))?.0;
                }
            }
        };
        chain.into_iter().rev().try_fold(base, |object, delta_data| {
            Ok(RawObject::new(object.kind, delta::expand(&object.data, &delta_data)?))
        })
    }

    fn write_index(&self, pack_checksum: ObjectId) -> Result<TempFile, PackError> {
        let mut idx = HashedFile::new(&self.pack_dir, "tmp_idx_")?;

        idx.write(&IDX_SIGNATURE.to_be_bytes())?;
        idx.write(&IDX_VERSION.to_be_bytes())?;

        let mut counts = [0u32; 256];
        for oid in self.index.keys() {
            counts[usize::from(oid.first_byte())] += 1;
        }
        let mut total = 0u32;
        for count in counts {
            total += count;
            idx.write(&total.to_be_bytes())?;
        }

        for oid in self.index.keys() {
            idx.write(oid.as_bytes())?;
        }
        for (_, crc) in self.index.values() {
            idx.write(&crc.to_be_bytes())?;
        }

        let mut large_offsets = Vec::new();
        for &(offset, _) in self.index.values() {
            let word = if offset < IDX_MAX_OFFSET {
                offset as u32
            } else {
                large_offsets.push(offset);
                IDX_MAX_OFFSET as u32 | (large_offsets.len() - 1) as u32
            };
            idx.write(&word.to_be_bytes())?;
        }
        for offset in large_offsets {
            idx.write(&offset.to_be_bytes())?;
        }

        idx.write(pack_checksum.as_bytes())?;
        idx.finish()?;
        Ok(idx.file)
    }
}

fn read_record_at(file: &mut File, offset: u64) -> Result<Record, PackError> {
    file.seek(SeekFrom::Start(offset))?;
    Reader::new(Stream::at(&*file, offset)).read_record()
}
