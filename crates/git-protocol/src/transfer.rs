//! Moving packs across a connection, shared by both directions.

use std::io::{Read, Write};

use git_hash::ObjectId;
use git_pack::{Indexer, Reader, Stream, Unpacker, Writer, WriterOptions};
use git_repository::Repository;
use git_revwalk::{RevItem, RevList, RevListOptions};
use git_utils::progress::Progress;

use crate::{Connection, ProtocolError};

/// Packs of more objects than this are kept as packs rather than unpacked
/// into loose objects.
pub const DEFAULT_UNPACK_LIMIT: u32 = 100;

/// Write the objects reachable from `revs` (and not from the excluded
/// `^oid` entries) as a pack on the connection's output.
pub(crate) fn send_packed_objects<R: Read, W: Write>(
    repo: &mut Repository,
    conn: &mut Connection<R, W>,
    revs: &[String],
) -> Result<ObjectId, ProtocolError> {
    let options = WriterOptions {
        compression: pack_compression(repo)?,
        allow_ofs: conn.capable("ofs-delta"),
        window: pack_window(repo)?,
        ..WriterOptions::default()
    };

    let list_options = RevListOptions {
        objects: true,
        missing: true,
        ..RevListOptions::default()
    };
    let mut objects = Vec::new();
    for item in RevList::new(repo, revs, list_options)? {
        objects.push(match item? {
            RevItem::Commit { oid, .. } => (oid, None),
            RevItem::Object { entry, path } => (entry.oid, Some(path)),
        });
    }

    let count = objects.len();
    let writer = Writer::new(conn.output(), options);
    let checksum = writer.write_objects(repo.database(), objects, &mut Progress::silent())?;
    tracing::info!(objects = count, %checksum, "sent pack");
    Ok(checksum)
}

/// Read a pack off `input` into the database. A pack of more than
/// `unpack_limit` objects is indexed and kept whole; smaller ones are
/// exploded into loose objects.
pub(crate) fn recv_packed_objects<R: Read>(
    repo: &Repository,
    input: R,
    prefix: &[u8],
    unpack_limit: u32,
) -> Result<(), ProtocolError> {
    let mut reader = Reader::new(Stream::with_prefix(input, prefix.to_vec()));
    reader.read_header()?;
    let mut progress = Progress::silent();
    let db = repo.database();

    if reader.count() > unpack_limit {
        let indexed = Indexer::new(db.pack_path()).process_pack(&mut reader, &mut progress)?;
        tracing::info!(pack = %indexed.pack_path.display(), objects = indexed.objects, "received pack");
    } else {
        let stored = Unpacker::new(db).process_pack(&mut reader, &mut progress)?;
        tracing::info!(objects = stored.len(), "unpacked objects");
    }
    db.reload();
    Ok(())
}

/// The first of `keys` that is set to a non-negative integer.
pub(crate) fn unpack_limit(repo: &mut Repository, keys: &[&str]) -> Result<u32, ProtocolError> {
    for key in keys {
        if let Some(limit) = repo.config().get_int(key)? {
            if let Ok(limit) = u32::try_from(limit) {
                return Ok(limit);
            }
        }
    }
    Ok(DEFAULT_UNPACK_LIMIT)
}

/// `pack.compression`, then `core.compression`, when set to a zlib level.
fn pack_compression(repo: &mut Repository) -> Result<u32, ProtocolError> {
    for key in ["pack.compression", "core.compression"] {
        if let Some(level) = repo.config().get_int(key)? {
            if let Ok(level @ 0..=9) = u32::try_from(level) {
                return Ok(level);
            }
        }
    }
    Ok(WriterOptions::default().compression)
}

/// `pack.window`, when set to a non-negative size.
fn pack_window(repo: &mut Repository) -> Result<usize, ProtocolError> {
    match repo.config().get_int("pack.window")? {
        Some(size) => Ok(usize::try_from(size).unwrap_or(WriterOptions::default().window)),
        None => Ok(WriterOptions::default().window),
    }
}
