//! The requesting side of fetch.
//!
//! The client reads the remote's refs and maps them through the fetch
//! refspecs onto local refs. It asks for every remote value that differs
//! from the local one, lists the commits it already has, and stores the
//! pack it gets back. Each local ref then moves if the update is a
//! fast-forward or the refspec forces it.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

use git_hash::ObjectId;
use git_pack::SIGNATURE;
use git_ref::{RefMappings, Refspec};
use git_repository::Repository;
use git_revwalk::{RevList, RevListOptions};

use crate::agent::recv_references;
use crate::transfer::{recv_packed_objects, unpack_limit};
use crate::{fast_forward_error, Connection, ProtocolError, RefUpdate, Role};

pub const CAPABILITIES: &[&str] = &["ofs-delta"];

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Refspecs mapping remote refs to local ones, usually the remote's
    /// `remote.<name>.fetch` values.
    pub specs: Vec<String>,
    /// Update refs even when that is not a fast-forward.
    pub force: bool,
}

/// Fetch over a connection to upload-pack, returning one entry per local
/// ref the remote had a different value for.
pub fn fetch<R: Read, W: Write>(
    repo: &mut Repository,
    input: R,
    output: W,
    options: &FetchOptions,
) -> Result<Vec<RefUpdate>, ProtocolError> {
    let mut conn = Connection::new(Role::Fetch, input, output, CAPABILITIES);
    let remote_refs: BTreeMap<String, ObjectId> = recv_references(&mut conn)?.into_iter().collect();

    let specs: Vec<String> = options
        .specs
        .iter()
        .map(|spec| force_spec(spec, options.force))
        .collect();
    let names: Vec<&String> = remote_refs.keys().collect();
    let targets = Refspec::expand(&specs, &names);

    let local_refs = select_wanted(repo, &remote_refs, &targets)?;
    let wanted: BTreeSet<ObjectId> = local_refs.iter().map(|(_, (_, new))| *new).collect();
    for oid in &wanted {
        conn.send_packet(Some(&format!("want {oid}")))?;
    }
    conn.send_packet(None)?;
    if wanted.is_empty() {
        tracing::debug!("already up to date");
        return Ok(Vec::new());
    }

    send_have_list(repo, &mut conn)?;
    let limit = unpack_limit(repo, &["fetch.unpackLimit", "transfer.unpackLimit"])?;
    recv_packed_objects(repo, conn.input(), SIGNATURE, limit)?;

    let mut updates = Vec::new();
    for (target, (old, new)) in local_refs {
        let (source, forced) = &targets[&target];
        updates.push(attempt_ref_update(repo, source, target, *forced, old, new)?);
    }
    Ok(updates)
}

/// `+spec` when forcing.
pub(crate) fn force_spec(spec: &str, force: bool) -> String {
    if force && !spec.starts_with('+') {
        format!("+{spec}")
    } else {
        spec.to_owned()
    }
}

/// Local target → (local value, remote value), for targets the remote has
/// a different value for.
fn select_wanted(
    repo: &Repository,
    remote_refs: &BTreeMap<String, ObjectId>,
    targets: &RefMappings,
) -> Result<BTreeMap<String, (Option<ObjectId>, ObjectId)>, ProtocolError> {
    let mut selected = BTreeMap::new();
    for (target, (source, _)) in targets {
        let Some(remote_oid) = remote_refs.get(source) else {
            continue;
        };
        let local_oid = repo.refs().read_ref(target)?;
        if local_oid.as_ref() != Some(remote_oid) {
            selected.insert(target.clone(), (local_oid, *remote_oid));
        }
    }
    Ok(selected)
}

/// Every commit reachable from a local ref, then `done`, then wait for
/// the pack.
fn send_have_list<R: Read, W: Write>(
    repo: &Repository,
    conn: &mut Connection<R, W>,
) -> Result<(), ProtocolError> {
    let options = RevListOptions {
        all: true,
        missing: true,
        ..RevListOptions::default()
    };
    let none: &[&str] = &[];
    for item in RevList::new(repo, none, options)? {
        conn.send_packet(Some(&format!("have {}", item?.oid())))?;
    }
    conn.send_packet(Some("done"))?;

    conn.recv_until(Some("PACK"))?;
    Ok(())
}

fn attempt_ref_update(
    repo: &Repository,
    source: &str,
    target: String,
    forced: bool,
    old: Option<ObjectId>,
    new: ObjectId,
) -> Result<RefUpdate, ProtocolError> {
    let ff_error = fast_forward_error(repo.database(), old.as_ref(), Some(&new))?;
    let error = if forced || ff_error.is_none() {
        repo.refs().update_ref(&target, Some(&new))?;
        tracing::info!(%target, %new, "updated ref");
        None
    } else {
        ff_error.clone()
    };
    Ok(RefUpdate {
        source: Some(source.to_owned()),
        target,
        old,
        new: Some(new),
        fast_forward: ff_error.is_none(),
        error,
    })
}
