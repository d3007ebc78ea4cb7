//! Index file parsing (DIRC version 2).

use bstr::BString;
use git_hash::hasher::Hasher;
use git_hash::ObjectId;
use git_object::FileMode;

use crate::entry::{IndexEntry, StatData};
use crate::{IndexError, Stage, HEADER_SIZE, SIGNATURE, VERSION};

/// Stat fields (40) + oid (20) + flags (2).
const ENTRY_MIN_SIZE: usize = 62;
const ENTRY_BLOCK: usize = 8;

/// Parse an index file, verifying its trailing checksum first.
pub fn parse_index(data: &[u8]) -> Result<Vec<IndexEntry>, IndexError> {
    if data.len() < HEADER_SIZE + ObjectId::LEN {
        return Err(IndexError::InvalidHeader("index file too short".into()));
    }
    verify_checksum(data)?;

    if &data[..4] != SIGNATURE {
        return Err(IndexError::InvalidHeader(format!(
            "signature: expected 'DIRC' but found '{}'",
            String::from_utf8_lossy(&data[..4])
        )));
    }
    let version = read_u32(&data[4..]);
    if version != VERSION {
        return Err(IndexError::UnsupportedVersion(version));
    }
    let count = read_u32(&data[8..]) as usize;

    let content_end = data.len() - ObjectId::LEN;
    let mut entries = Vec::with_capacity(count);
    let mut cursor = HEADER_SIZE;
    for _ in 0..count {
        let (entry, next) = parse_entry(data, cursor, content_end)?;
        entries.push(entry);
        cursor = next;
    }
    Ok(entries)
}

fn parse_entry(data: &[u8], start: usize, content_end: usize) -> Result<(IndexEntry, usize), IndexError> {
    let invalid = |reason: &str| IndexError::InvalidEntry {
        offset: start,
        reason: reason.into(),
    };
    if start + ENTRY_MIN_SIZE > content_end {
        return Err(invalid("entry too short"));
    }
    let field = |i: usize| read_u32(&data[start + i * 4..]);

    let stat = StatData {
        ctime_secs: field(0),
        ctime_nsecs: field(1),
        mtime_secs: field(2),
        mtime_nsecs: field(3),
        dev: field(4),
        ino: field(5),
        uid: field(7),
        gid: field(8),
        size: field(9),
    };
    let mode = FileMode::from_raw(field(6));

    let oid = ObjectId::from_bytes(&data[start + 40..start + 60]).map_err(|_| invalid("invalid oid"))?;
    let flags = u16::from_be_bytes([data[start + 60], data[start + 61]]);
    let stage = Stage::from_u8(((flags >> 12) & 0x3) as u8)?;

    let name_start = start + ENTRY_MIN_SIZE;
    let name_len = data[name_start..content_end]
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| invalid("missing NUL after path"))?;
    let path = BString::from(&data[name_start..name_start + name_len]);

    // The name is NUL-terminated, then padded to a multiple of 8 bytes.
    let size = (ENTRY_MIN_SIZE + name_len + ENTRY_BLOCK) & !(ENTRY_BLOCK - 1);
    let next = start + size;
    if next > content_end {
        return Err(invalid("padding runs past the end"));
    }

    Ok((
        IndexEntry {
            path,
            oid,
            mode,
            stage,
            stat,
        },
        next,
    ))
}

fn verify_checksum(data: &[u8]) -> Result<(), IndexError> {
    let (content, stored) = data.split_at(data.len() - ObjectId::LEN);
    let computed = Hasher::digest(content)?;
    if computed.as_bytes() != stored {
        return Err(IndexError::ChecksumMismatch);
    }
    Ok(())
}

fn read_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}
