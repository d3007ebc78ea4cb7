//! The serving side's ref advertisement.

use std::io::{Read, Write};

use git_hash::ObjectId;
use git_repository::Repository;

use crate::{Connection, ProtocolError};

/// Advertise every ref with its value, sorted by name, then flush. A
/// repository without refs still sends one line so the capabilities get
/// across.
pub(crate) fn send_references<R: Read, W: Write>(
    repo: &Repository,
    conn: &mut Connection<R, W>,
) -> Result<(), ProtocolError> {
    let mut refs = repo.refs().list_all_refs()?;
    refs.sort();

    let mut sent = false;
    for symref in refs {
        if let Some(oid) = symref.read_oid(repo.refs())? {
            conn.send_packet(Some(&format!("{oid} {}", symref.path)))?;
            sent = true;
        }
    }
    if !sent {
        conn.send_packet(Some(&format!("{} capabilities^{{}}", ObjectId::NULL)))?;
    }
    conn.send_packet(None)
}

/// Read a ref advertisement into `(name, oid)` pairs, skipping the
/// placeholder line of an empty repository.
pub(crate) fn recv_references<R: Read, W: Write>(
    conn: &mut Connection<R, W>,
) -> Result<Vec<(String, ObjectId)>, ProtocolError> {
    let mut refs = Vec::new();
    for line in conn.recv_until(None)? {
        let (oid, name) = line
            .split_once(' ')
            .ok_or_else(|| ProtocolError::Protocol(format!("bad ref advertisement: {line}")))?;
        let oid = ObjectId::from_hex(oid)?;
        if !oid.is_null() {
            refs.push((name.to_owned(), oid));
        }
    }
    Ok(refs)
}

/// `None` for the all-zero id the wire uses for "no object".
pub(crate) fn zero_to_none(oid: ObjectId) -> Option<ObjectId> {
    (!oid.is_null()).then_some(oid)
}

pub(crate) fn none_to_zero(oid: Option<&ObjectId>) -> ObjectId {
    oid.copied().unwrap_or(ObjectId::NULL)
}
