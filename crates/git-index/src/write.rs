//! Index serialization and tree building.

use git_hash::hasher::Hasher;
use git_hash::ObjectId;
use git_object::{Object, TreeBuilder};
use git_odb::Database;

use crate::entry::IndexEntry;
use crate::{IndexError, Stage, SIGNATURE, VERSION};

/// Header, entries in key order, then the SHA-1 of everything before it.
pub fn serialize_index<'a>(
    entries: impl ExactSizeIterator<Item = &'a IndexEntry>,
) -> Result<Vec<u8>, IndexError> {
    let mut buf = Vec::new();
    buf.extend_from_slice(SIGNATURE);
    buf.extend_from_slice(&VERSION.to_be_bytes());
    buf.extend_from_slice(&(entries.len() as u32).to_be_bytes());

    for entry in entries {
        write_entry(&mut buf, entry);
    }

    let checksum = Hasher::digest(&buf)?;
    buf.extend_from_slice(checksum.as_bytes());
    Ok(buf)
}

fn write_entry(buf: &mut Vec<u8>, entry: &IndexEntry) {
    let start = buf.len();
    let stat = &entry.stat;
    for field in [
        stat.ctime_secs,
        stat.ctime_nsecs,
        stat.mtime_secs,
        stat.mtime_nsecs,
        stat.dev,
        stat.ino,
        entry.mode.raw(),
        stat.uid,
        stat.gid,
        stat.size,
    ] {
        buf.extend_from_slice(&field.to_be_bytes());
    }
    buf.extend_from_slice(entry.oid.as_bytes());
    buf.extend_from_slice(&entry.flags().to_be_bytes());
    buf.extend_from_slice(&entry.path);

    // At least one NUL, then pad to an 8-byte boundary.
    buf.push(0);
    while (buf.len() - start) % 8 != 0 {
        buf.push(0);
    }
}

/// Store a tree for every directory of the stage-0 entries, returning the
/// root tree's id.
pub fn write_tree<'a>(
    entries: impl Iterator<Item = &'a IndexEntry>,
    db: &Database,
) -> Result<ObjectId, IndexError> {
    let builder = TreeBuilder::build(
        entries
            .filter(|entry| entry.stage == Stage::Normal)
            .map(|entry| (entry.path.as_slice(), entry.oid, entry.mode)),
    );
    let root = builder.write(&mut |tree| db.store(&Object::Tree(tree.clone())))?;
    Ok(root)
}
