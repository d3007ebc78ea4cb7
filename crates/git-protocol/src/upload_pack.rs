//! The serving side of fetch.

use std::collections::BTreeSet;
use std::io::{Read, Write};

use git_hash::ObjectId;
use git_repository::Repository;

use crate::agent::send_references;
use crate::transfer::send_packed_objects;
use crate::{Connection, ProtocolError, Role};

pub const CAPABILITIES: &[&str] = &["ofs-delta"];

/// Serve one fetch: advertise refs, take the client's `want` and `have`
/// lines, and send a pack of what it wants minus what it has. A client
/// that wants nothing ends the exchange after the advertisement.
pub fn upload_pack<R: Read, W: Write>(
    repo: &mut Repository,
    input: R,
    output: W,
) -> Result<(), ProtocolError> {
    let mut conn = Connection::new(Role::UploadPack, input, output, CAPABILITIES);
    send_references(repo, &mut conn)?;

    let wanted = recv_oids(&mut conn, "want", None)?;
    if wanted.is_empty() {
        tracing::debug!("client wants nothing");
        return Ok(());
    }
    let remote_has = recv_oids(&mut conn, "have", Some("done"))?;
    conn.send_packet(Some("NAK"))?;

    tracing::debug!(wants = wanted.len(), haves = remote_has.len(), "negotiated");
    let revs: Vec<String> = wanted
        .iter()
        .map(ObjectId::to_hex)
        .chain(remote_has.iter().map(|oid| format!("^{oid}")))
        .collect();
    send_packed_objects(repo, &mut conn, &revs)?;
    Ok(())
}

fn recv_oids<R: Read, W: Write>(
    conn: &mut Connection<R, W>,
    prefix: &str,
    terminator: Option<&str>,
) -> Result<BTreeSet<ObjectId>, ProtocolError> {
    let mut oids = BTreeSet::new();
    for line in conn.recv_until(terminator)? {
        let hex = line
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(' '))
            .ok_or_else(|| ProtocolError::Protocol(format!("expected '{prefix}', got '{line}'")))?;
        oids.insert(ObjectId::from_hex(hex)?);
    }
    Ok(oids)
}
