//! The requesting side of push.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use git_hash::ObjectId;
use git_ref::Refspec;
use git_repository::Repository;
use git_revwalk::Revision;

use crate::agent::{none_to_zero, recv_references};
use crate::fetch::force_spec;
use crate::transfer::send_packed_objects;
use crate::{fast_forward_error, Connection, Packet, ProtocolError, RefUpdate, Role};

pub const CAPABILITIES: &[&str] = &["report-status"];

#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// Refspecs mapping local refs to remote ones. A spec with an empty
    /// source (`:refs/heads/x`) deletes the target.
    pub specs: Vec<String>,
    /// The remote's fetch refspecs, used to move the remote-tracking refs
    /// of every ref the remote accepted.
    pub fetch_specs: Vec<String>,
    /// Push even when that is not a fast-forward.
    pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Every ref the push tried to change, in name order, refused ones
    /// included.
    pub updates: Vec<RefUpdate>,
    /// The remote's reason for failing to store the pack.
    pub unpack_error: Option<String>,
}

impl PushReport {
    pub fn is_ok(&self) -> bool {
        self.unpack_error.is_none() && self.updates.iter().all(|update| !update.is_rejected())
    }
}

/// Push over a connection to receive-pack.
///
/// Updates the remote would refuse as non-fast-forward are dropped before
/// anything is sent, unless forced. When the remote reports status, its
/// verdict on each ref lands in the report; otherwise every sent update
/// is assumed to have succeeded.
pub fn push<R: Read, W: Write>(
    repo: &mut Repository,
    input: R,
    output: W,
    options: &PushOptions,
) -> Result<PushReport, ProtocolError> {
    let mut conn = Connection::new(Role::Push, input, output, CAPABILITIES);
    let remote_refs: BTreeMap<String, ObjectId> = recv_references(&mut conn)?.into_iter().collect();

    let mut refused = Vec::new();
    let mut updates = BTreeMap::new();
    for update in select_updates(repo, &conn, &remote_refs, options)? {
        if update.is_rejected() {
            refused.push(update);
        } else {
            updates.insert(update.target.clone(), update);
        }
    }

    for update in updates.values() {
        let (old, new) = (none_to_zero(update.old.as_ref()), none_to_zero(update.new.as_ref()));
        conn.send_packet(Some(&format!("{old} {new} {}", update.target)))?;
    }
    conn.send_packet(None)?;

    let mut revs: Vec<String> = updates
        .values()
        .filter_map(|update| update.new.map(|oid| oid.to_hex()))
        .collect();
    if !revs.is_empty() {
        revs.extend(remote_refs.values().map(|oid| format!("^{oid}")));
        send_packed_objects(repo, &mut conn, &revs)?;
    }

    let mut report = PushReport::default();
    if conn.capable("report-status") && !updates.is_empty() {
        report.unpack_error = recv_report_status(&mut conn, &mut updates)?;
    }
    for update in updates.values().filter(|update| !update.is_rejected()) {
        update_remote_ref(repo, update, &options.fetch_specs)?;
    }

    report.updates = refused;
    report.updates.extend(updates.into_values());
    report.updates.sort_by(|a, b| a.target.cmp(&b.target));
    Ok(report)
}

/// Expand the push refspecs over the local refs and work out each update.
/// Updates that need not or must not be sent come back rejected or are
/// left out.
fn select_updates<R: Read, W: Write>(
    repo: &Repository,
    conn: &Connection<R, W>,
    remote_refs: &BTreeMap<String, ObjectId>,
    options: &PushOptions,
) -> Result<Vec<RefUpdate>, ProtocolError> {
    let mut local_refs: Vec<String> = repo
        .refs()
        .list_all_refs()?
        .into_iter()
        .map(|symref| symref.path)
        .collect();
    local_refs.sort();
    let specs: Vec<String> = options
        .specs
        .iter()
        .map(|spec| force_spec(spec, options.force))
        .collect();

    let mut updates = Vec::new();
    for (target, (source, forced)) in Refspec::expand(&specs, &local_refs) {
        let old = remote_refs.get(&target).copied();
        let mut update = RefUpdate {
            source: None,
            target,
            old,
            new: None,
            fast_forward: true,
            error: None,
        };

        if source.is_empty() {
            if !conn.capable("delete-refs") {
                update.error = Some("remote does not support deleting refs".into());
            }
            updates.push(update);
            continue;
        }

        let new = Revision::new(repo, &source)?.resolve(None)?;
        update.source = Some(source);
        update.new = Some(new);
        if old == Some(new) {
            continue;
        }
        let ff_error = fast_forward_error(repo.database(), old.as_ref(), Some(&new))?;
        update.fast_forward = ff_error.is_none();
        if !forced {
            update.error = ff_error;
        }
        updates.push(update);
    }
    Ok(updates)
}

/// Read `unpack <result>` and the per-ref status lines, marking refused
/// updates. Returns the unpack error, if any.
fn recv_report_status<R: Read, W: Write>(
    conn: &mut Connection<R, W>,
    updates: &mut BTreeMap<String, RefUpdate>,
) -> Result<Option<String>, ProtocolError> {
    let unpack = match conn.recv_packet()? {
        Packet::Line(line) => line,
        other => return Err(ProtocolError::Protocol(format!("expected unpack status, got {other:?}"))),
    };
    let result = unpack.strip_prefix("unpack ").unwrap_or(&unpack).to_owned();
    let unpack_error = (result != "ok").then_some(result);

    for line in conn.recv_until(None)? {
        let Some((status, rest)) = line.split_once(' ') else {
            continue;
        };
        let (name, reason) = rest.split_once(' ').unwrap_or((rest, ""));
        let Some(update) = updates.get_mut(name) else {
            continue;
        };
        match status {
            "ok" => {}
            "ng" => update.error = Some(reason.to_owned()),
            _ => continue,
        }
    }

    if let Some(error) = &unpack_error {
        tracing::warn!(%error, "remote failed to unpack");
        for update in updates.values_mut() {
            update.error.get_or_insert_with(|| "unpacker error".to_owned());
        }
    }
    Ok(unpack_error)
}

/// Point the remote-tracking ref for an accepted update at its new value.
fn update_remote_ref(repo: &Repository, update: &RefUpdate, fetch_specs: &[String]) -> Result<(), ProtocolError> {
    let mappings = Refspec::expand(fetch_specs, &[&update.target]);
    for (tracking, _) in mappings.into_iter().filter(|(_, (source, _))| *source == update.target) {
        repo.refs().update_ref(&tracking, update.new.as_ref())?;
        tracing::debug!(%tracking, "updated remote-tracking ref");
    }
    Ok(())
}
