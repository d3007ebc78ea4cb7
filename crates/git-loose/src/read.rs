use std::fs;
use std::io::{self, Read};

use flate2::read::ZlibDecoder;
use git_hash::ObjectId;
use git_object::{header, ObjectInfo, RawObject};

use crate::{LooseError, LooseObjectStore};

/// Inflated bytes needed to see a complete header; the longest is
/// `"commit <20 digits>\0"`.
const HEADER_PEEK: usize = 64;

impl LooseObjectStore {
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.object_path(oid).is_file()
    }

    /// Read and inflate a whole object. `Ok(None)` if it is not stored here.
    pub fn read_raw(&self, oid: &ObjectId) -> Result<Option<RawObject>, LooseError> {
        let Some(compressed) = self.read_file(oid)? else {
            return Ok(None);
        };

        let mut data = Vec::new();
        ZlibDecoder::new(&compressed[..])
            .read_to_end(&mut data)
            .map_err(|source| LooseError::Decompress { oid: *oid, source })?;

        let (kind, size, header_len) =
            header::parse_header(&data).map_err(|e| corrupt(oid, e.to_string()))?;
        if data.len() - header_len != size {
            return Err(corrupt(
                oid,
                format!("size {} does not match content length {}", size, data.len() - header_len),
            ));
        }
        data.drain(..header_len);

        Ok(Some(RawObject::new(kind, data)))
    }

    /// Type and size only: inflates just enough bytes to reach the header's
    /// NUL terminator.
    pub fn read_info(&self, oid: &ObjectId) -> Result<Option<ObjectInfo>, LooseError> {
        let Some(compressed) = self.read_file(oid)? else {
            return Ok(None);
        };

        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut buf = [0u8; HEADER_PEEK];
        let mut filled = 0;
        while !buf[..filled].contains(&0) {
            if filled == buf.len() {
                return Err(corrupt(oid, "header too long".into()));
            }
            let n = decoder
                .read(&mut buf[filled..])
                .map_err(|source| LooseError::Decompress { oid: *oid, source })?;
            if n == 0 {
                return Err(corrupt(oid, "truncated header".into()));
            }
            filled += n;
        }

        let (kind, size, _) =
            header::parse_header(&buf[..filled]).map_err(|e| corrupt(oid, e.to_string()))?;
        Ok(Some(ObjectInfo { kind, size }))
    }

    fn read_file(&self, oid: &ObjectId) -> Result<Option<Vec<u8>>, LooseError> {
        match fs::read(self.object_path(oid)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn corrupt(oid: &ObjectId, reason: String) -> LooseError {
    LooseError::Corrupt { oid: *oid, reason }
}
