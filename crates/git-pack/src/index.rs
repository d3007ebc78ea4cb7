//! Pack index (v2) reading and lookup.
//!
//! ```text
//! Header:  \xff tOc | version = 2
//! Fanout:  256 × u32 cumulative counts by first oid byte
//! OIDs:    N × 20 bytes, sorted
//! CRC32:   N × u32
//! Offsets: N × u32 (high bit set → index into the 64-bit table)
//! 64-bit:  M × u64
//! Trailer: pack checksum | index checksum
//! ```

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use git_hash::{hex, ObjectId};
use memmap2::Mmap;

use crate::{PackError, IDX_MAX_OFFSET, IDX_SIGNATURE, IDX_VERSION};

const HEADER_SIZE: usize = 8;
const FANOUT_SIZE: usize = 256 * 4;

pub struct PackIndex {
    data: Mmap,
    count: usize,
    oid_offset: usize,
    crc_offset: usize,
    offset32_offset: usize,
    offset64_offset: usize,
    path: PathBuf,
}

impl PackIndex {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path)?;
        // SAFETY: pack indexes are written once and renamed into place,
        // never modified afterwards.
        let data = unsafe { Mmap::map(&file)? };

        if data.len() < HEADER_SIZE + FANOUT_SIZE + 2 * ObjectId::LEN {
            return Err(PackError::InvalidIndex("file too small".into()));
        }
        if read_u32(&data, 0) != IDX_SIGNATURE {
            return Err(PackError::InvalidIndex("bad signature".into()));
        }
        let version = read_u32(&data, 4);
        if version != IDX_VERSION {
            return Err(PackError::InvalidIndex(format!("unsupported version {version}")));
        }

        let count = read_u32(&data, HEADER_SIZE + 255 * 4) as usize;
        let oid_offset = HEADER_SIZE + FANOUT_SIZE;
        let crc_offset = oid_offset + count * ObjectId::LEN;
        let offset32_offset = crc_offset + count * 4;
        let offset64_offset = offset32_offset + count * 4;

        let min_size = offset64_offset + 2 * ObjectId::LEN;
        if data.len() < min_size {
            return Err(PackError::InvalidIndex(format!(
                "file too small: {} < {min_size}",
                data.len()
            )));
        }
        let large_count = (0..count)
            .map(|pos| read_u32(&data, offset32_offset + pos * 4))
            .filter(|word| u64::from(*word) & IDX_MAX_OFFSET != 0)
            .map(|word| (u64::from(word) & !IDX_MAX_OFFSET) as usize + 1)
            .max()
            .unwrap_or(0);
        let min_size = min_size + large_count * 8;
        if data.len() < min_size {
            return Err(PackError::InvalidIndex(format!(
                "64-bit offset table truncated: {} < {min_size}",
                data.len()
            )));
        }

        Ok(Self {
            data,
            count,
            oid_offset,
            crc_offset,
            offset32_offset,
            offset64_offset,
            path,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of `oid` in the pack, if present.
    pub fn oid_offset(&self, oid: &ObjectId) -> Result<Option<u64>, PackError> {
        match self.search(oid.as_bytes()) {
            Some(pos) => self.offset_at(pos).map(Some),
            None => Ok(None),
        }
    }

    /// All objects whose hex name starts with `prefix`.
    pub fn prefix_match(&self, prefix: &str) -> Vec<ObjectId> {
        if prefix.len() < 2 || !hex::is_hex(prefix) {
            return Vec::new();
        }
        let Ok(first) = u8::from_str_radix(&prefix[..2], 16) else {
            return Vec::new();
        };
        let (start, end) = self.fanout_range(first);

        // Pad the prefix with zeros to find the first candidate.
        let mut padded = prefix.to_string();
        padded.extend(std::iter::repeat('0').take(ObjectId::HEX_LEN.saturating_sub(prefix.len())));
        let Ok(lowest) = ObjectId::from_hex(&padded[..ObjectId::HEX_LEN]) else {
            return Vec::new();
        };
        let from = start + self.oids(start, end).partition_point(|oid| *oid < lowest.as_bytes());

        (from..end)
            .map(|pos| self.oid_at(pos))
            .take_while(|oid| oid.starts_with_hex(prefix))
            .collect()
    }

    pub fn oid_at(&self, pos: usize) -> ObjectId {
        let start = self.oid_offset + pos * ObjectId::LEN;
        let mut raw = [0u8; ObjectId::LEN];
        raw.copy_from_slice(&self.data[start..start + ObjectId::LEN]);
        ObjectId::from_raw(raw)
    }

    pub fn crc32_at(&self, pos: usize) -> u32 {
        read_u32(&self.data, self.crc_offset + pos * 4)
    }

    pub fn offset_at(&self, pos: usize) -> Result<u64, PackError> {
        let word = read_u32(&self.data, self.offset32_offset + pos * 4);
        if u64::from(word) & IDX_MAX_OFFSET == 0 {
            return Ok(u64::from(word));
        }
        let large = (u64::from(word) & !IDX_MAX_OFFSET) as usize;
        let at = self.offset64_offset + large * 8;
        let table = &self.data[..self.data.len() - 2 * ObjectId::LEN];
        let raw = table
            .get(at..at + 8)
            .ok_or_else(|| PackError::InvalidIndex(format!("64-bit offset {large} out of range")))?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(raw);
        Ok(u64::from_be_bytes(bytes))
    }

    /// The checksum of the pack this index describes.
    pub fn pack_checksum(&self) -> ObjectId {
        let start = self.data.len() - 2 * ObjectId::LEN;
        let mut raw = [0u8; ObjectId::LEN];
        raw.copy_from_slice(&self.data[start..start + ObjectId::LEN]);
        ObjectId::from_raw(raw)
    }

    /// Every `(oid, offset)` in oid order.
    pub fn iter(&self) -> impl Iterator<Item = Result<(ObjectId, u64), PackError>> + '_ {
        (0..self.count).map(move |pos| Ok((self.oid_at(pos), self.offset_at(pos)?)))
    }

    fn search(&self, target: &[u8]) -> Option<usize> {
        let (start, end) = self.fanout_range(target[0]);
        let oids = self.oids(start, end);
        let (mut low, mut high) = (0, oids.len());
        while low < high {
            let mid = low + (high - low) / 2;
            match oids[mid].cmp(target) {
                Ordering::Less => low = mid + 1,
                Ordering::Greater => high = mid,
                Ordering::Equal => return Some(start + mid),
            }
        }
        None
    }

    fn oids(&self, start: usize, end: usize) -> Vec<&[u8]> {
        (start..end)
            .map(|pos| {
                let at = self.oid_offset + pos * ObjectId::LEN;
                &self.data[at..at + ObjectId::LEN]
            })
            .collect()
    }

    fn fanout_range(&self, first_byte: u8) -> (usize, usize) {
        let end = read_u32(&self.data, HEADER_SIZE + usize::from(first_byte) * 4) as usize;
        let start = match first_byte {
            0 => 0,
            n => read_u32(&self.data, HEADER_SIZE + usize::from(n - 1) * 4) as usize,
        };
        (start, end.min(self.count))
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}
