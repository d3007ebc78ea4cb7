use std::collections::HashMap;
use std::io::Read;

use git_hash::ObjectId;
use git_object::RawObject;
use git_utils::progress::Progress;

use crate::reader::{Reader, Record};
use crate::{delta, ObjectSink, PackError};

/// Explodes a pack into individual objects.
///
/// Suited to small packs: every record is expanded and stored through the
/// sink, and bases are loaded back from it to resolve later deltas.
pub struct Unpacker<'a, S> {
    sink: &'a S,
    offsets: HashMap<u64, ObjectId>,
}

impl<'a, S: ObjectSink> Unpacker<'a, S> {
    pub fn new(sink: &'a S) -> Self {
        Self {
            sink,
            offsets: HashMap::new(),
        }
    }

    /// Store every record of `reader`, whose header must already be read.
    /// Returns the ids in pack order.
    pub fn process_pack<R: Read>(
        mut self,
        reader: &mut Reader<R>,
        progress: &mut Progress,
    ) -> Result<Vec<ObjectId>, PackError> {
        progress.start("Unpacking objects", Some(u64::from(reader.count())));
        let mut stored = Vec::with_capacity(reader.count() as usize);

        for _ in 0..reader.count() {
            let offset = reader.stream().offset();
            let record = reader.read_record()?;
            let object = self.resolve(record, offset)?;
            let oid = self.sink.store_raw(&object)?;
            self.offsets.insert(offset, oid);
            stored.push(oid);
            progress.tick();
        }
        reader.stream().verify_checksum()?;
        progress.stop();

        tracing::debug!(objects = stored.len(), "unpacked pack");
        Ok(stored)
    }

    fn resolve(&self, record: Record, offset: u64) -> Result<RawObject, PackError> {
        match record {
            Record::Object(object) => Ok(object),
            Record::OfsDelta { base_ofs, delta_data } => {
                let base = offset
                    .checked_sub(base_ofs)
                    .and_then(|base| self.offsets.get(&base))
                    .ok_or(PackError::MissingOffset(base_ofs))?;
                self.resolve_delta(base, &delta_data)
            }
            Record::RefDelta { base_oid, delta_data } => self.resolve_delta(&base_oid, &delta_data),
        }
    }

    fn resolve_delta(&self, base: &ObjectId, delta_data: &[u8]) -> Result<RawObject, PackError> {
        let base = self.sink.load_raw(base)?;
        let data = delta::expand(&base.data, delta_data)?;
        Ok(RawObject::new(base.kind, data))
    }
}
