//! The serving side of push.

use std::io::{Read, Write};

use git_hash::ObjectId;
use git_ref::{is_valid_name, HEAD};
use git_repository::Repository;

use crate::agent::{send_references, zero_to_none};
use crate::transfer::{recv_packed_objects, unpack_limit};
use crate::{fast_forward_error, Connection, ProtocolError, Role};

pub const CAPABILITIES: &[&str] = &["no-thin", "report-status", "delete-refs", "ofs-delta"];

/// A requested change to one ref: `old new ref` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Request {
    name: String,
    old: Option<ObjectId>,
    new: Option<ObjectId>,
}

/// Serve one push: advertise refs, take the update requests and the pack
/// that goes with them, then apply each update and report how it went.
///
/// Each ref is moved with compare-and-swap, so an update whose old value
/// no longer matches fails on its own without affecting the others.
pub fn receive_pack<R: Read, W: Write>(
    repo: &mut Repository,
    input: R,
    output: W,
) -> Result<(), ProtocolError> {
    let mut conn = Connection::new(Role::ReceivePack, input, output, CAPABILITIES);
    send_references(repo, &mut conn)?;

    let requests = recv_update_requests(&mut conn)?;
    if requests.is_empty() {
        return Ok(());
    }

    let unpack_error = match recv_objects(repo, &mut conn, &requests) {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!(error = %e, "could not unpack pushed objects");
            Some(e.to_string())
        }
    };
    let status = match &unpack_error {
        None => "unpack ok".to_owned(),
        Some(error) => format!("unpack {error}"),
    };
    report_status(&mut conn, &status)?;

    for request in &requests {
        let status = match &unpack_error {
            Some(_) => format!("ng {} unpacker error", request.name),
            None => match update_ref(repo, request) {
                Ok(()) => format!("ok {}", request.name),
                Err(reason) => format!("ng {} {reason}", request.name),
            },
        };
        report_status(&mut conn, &status)?;
    }
    if conn.capable("report-status") {
        conn.send_packet(None)?;
    }
    Ok(())
}

fn recv_update_requests<R: Read, W: Write>(
    conn: &mut Connection<R, W>,
) -> Result<Vec<Request>, ProtocolError> {
    let mut requests = Vec::new();
    for line in conn.recv_until(None)? {
        let fields: Vec<&str> = line.split(' ').filter(|f| !f.is_empty()).collect();
        let [old, new, name] = fields[..] else {
            return Err(ProtocolError::Protocol(format!("bad update request: {line}")));
        };
        requests.push(Request {
            name: name.to_owned(),
            old: zero_to_none(ObjectId::from_hex(old)?),
            new: zero_to_none(ObjectId::from_hex(new)?),
        });
    }
    tracing::debug!(requests = requests.len(), "received update requests");
    Ok(requests)
}

/// Take the pack, unless every request is a deletion and none is sent.
fn recv_objects<R: Read, W: Write>(
    repo: &mut Repository,
    conn: &mut Connection<R, W>,
    requests: &[Request],
) -> Result<(), ProtocolError> {
    if requests.iter().all(|request| request.new.is_none()) {
        return Ok(());
    }
    let limit = unpack_limit(repo, &["receive.unpackLimit", "transfer.unpackLimit"])?;
    recv_packed_objects(repo, conn.input(), &[], limit)
}

/// Apply one request, or say why not.
fn update_ref(repo: &mut Repository, request: &Request) -> Result<(), String> {
    validate_update(repo, request)?;
    repo.refs()
        .compare_and_swap(&request.name, request.old.as_ref(), request.new.as_ref())
        .map_err(|e| e.to_string())?;
    tracing::info!(name = %request.name, new = ?request.new.map(|oid| oid.to_hex()), "updated ref");
    Ok(())
}

fn validate_update(repo: &mut Repository, request: &Request) -> Result<(), String> {
    let fail = |reason: &str| -> Result<(), String> { Err(reason.to_owned()) };
    let config = |repo: &mut Repository, key: &str| repo.config().get_bool(key).map_err(|e| e.to_string());
    let (old, new) = (request.old.as_ref(), request.new.as_ref());

    if !request.name.starts_with("refs/") || !is_valid_name(request.name.as_bytes()) {
        return fail("funny refname");
    }
    if let Some(new) = new {
        if !repo.database().has(new) {
            return fail("missing necessary objects");
        }
    }
    if new.is_none() && config(repo, "receive.denyDeletes")? == Some(true) {
        return fail("deletion prohibited");
    }
    if config(repo, "receive.denyNonFastForwards")? == Some(true)
        && fast_forward_error(repo.database(), old, new)
            .map_err(|e| e.to_string())?
            .is_some()
    {
        return fail("non-fast-forward");
    }

    if config(repo, "core.bare")? != Some(false) {
        return Ok(());
    }
    let current = repo.refs().current_ref(HEAD).map_err(|e| e.to_string())?;
    if current.path != request.name {
        return Ok(());
    }
    if new.is_some() && config(repo, "receive.denyCurrentBranch")? != Some(false) {
        return fail("branch is currently checked out");
    }
    if new.is_none() && config(repo, "receive.denyDeleteCurrent")? != Some(false) {
        return fail("deletion of the current branch prohibited");
    }
    Ok(())
}

fn report_status<R: Read, W: Write>(conn: &mut Connection<R, W>, line: &str) -> Result<(), ProtocolError> {
    if conn.capable("report-status") {
        conn.send_packet(Some(line))?;
    }
    Ok(())
}
