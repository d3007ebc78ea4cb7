//! Cherry-pick and revert over a list of commits.
//!
//! Each commit becomes a `pick` or `revert` command in the sequencer. The
//! commands run one at a time; a conflict stops the run with the remaining
//! commands saved, and [`sequence_continue`], [`sequence_abort`] or
//! [`sequence_quit`] take it from there.

use bstr::BString;
use git_config::Value;
use git_hash::ObjectId;
use git_object::{Commit, Object, Tree};
use git_repository::sequencer::Command;
use git_repository::{MergeKind, Repository, Sequencer};
use git_revwalk::{RevItem, RevList, RevListOptions, HEAD};

use crate::commit::{self, comment};
use crate::{with_index_update, Inputs, MergeError, Resolve};

const MAINLINE: &str = "mainline";

#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceOptions {
    /// Which parent of a merge commit to diff against, counting from 1.
    pub mainline: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Every command ran; the commits created, oldest first.
    Completed { commits: Vec<ObjectId> },
    /// Stopped on the commit described by `name`, with `paths` conflicted.
    Conflicted { name: String, paths: Vec<BString> },
}

/// Apply the changes introduced by each commit on top of HEAD. A range is
/// applied oldest first.
pub fn cherry_pick<S: AsRef<str>>(
    repo: &mut Repository,
    revs: &[S],
    options: SequenceOptions,
) -> Result<SequenceOutcome, MergeError> {
    let reversed: Vec<&str> = revs.iter().rev().map(AsRef::as_ref).collect();
    let mut commits = list_commits(repo, &reversed)?;
    commits.reverse();
    run(repo, Command::Pick, commits, options)
}

/// Commit the inverse of each commit on top of HEAD, in the order given.
pub fn revert<S: AsRef<str>>(
    repo: &mut Repository,
    revs: &[S],
    options: SequenceOptions,
) -> Result<SequenceOutcome, MergeError> {
    let commits = list_commits(repo, revs)?;
    run(repo, Command::Revert, commits, options)
}

/// Commit the resolved conflict, if not already committed, and run the
/// remaining commands.
pub fn sequence_continue(repo: &mut Repository) -> Result<SequenceOutcome, MergeError> {
    let mut sequencer = repo.sequencer();
    if !sequencer.in_progress() {
        return Err(MergeError::NoSequence);
    }

    let mut done = Vec::new();
    match repo.pending_commit().merge_type() {
        Some(kind @ (MergeKind::CherryPick | MergeKind::Revert)) => {
            done.push(commit::resume_merge(repo, kind)?);
        }
        _ => {}
    }

    sequencer.load(repo.database())?;
    sequencer.drop_command(repo)?;
    resume(repo, &mut sequencer, done)
}

/// Return to where the run began. When HEAD has moved since the last
/// completed command nothing is reset, and a warning is returned instead.
pub fn sequence_abort(repo: &mut Repository) -> Result<Vec<String>, MergeError> {
    let mut sequencer = repo.sequencer();
    if !sequencer.in_progress() {
        return Err(MergeError::NoSequence);
    }
    clear_pending(repo)?;
    with_index_update(repo, |repo| Ok(sequencer.abort(repo)?))
}

/// Forget the run, leaving HEAD, the index and the workspace as they are.
pub fn sequence_quit(repo: &mut Repository) -> Result<(), MergeError> {
    clear_pending(repo)?;
    repo.sequencer().quit()?;
    Ok(())
}

fn clear_pending(repo: &Repository) -> Result<(), MergeError> {
    let pending = repo.pending_commit();
    if let Some(kind) = pending.merge_type() {
        pending.clear(kind)?;
    }
    Ok(())
}

/// The commits `revs` name, without walking their history unless a range
/// asks for it.
fn list_commits<S: AsRef<str>>(repo: &Repository, revs: &[S]) -> Result<Vec<ObjectId>, MergeError> {
    let options = RevListOptions {
        walk: false,
        ..RevListOptions::default()
    };
    let mut commits = Vec::new();
    for item in RevList::new(repo, revs, options)? {
        if let RevItem::Commit { oid, .. } = item? {
            commits.push(oid);
        }
    }
    Ok(commits)
}

fn run(
    repo: &mut Repository,
    command: Command,
    commits: Vec<ObjectId>,
    options: SequenceOptions,
) -> Result<SequenceOutcome, MergeError> {
    for oid in &commits {
        let commit = repo.database().load_commit(oid)?;
        select_parent(oid, &commit, options.mainline)?;
    }

    let mut sequencer = repo.sequencer();
    let mut saved = Vec::new();
    if let Some(mainline) = options.mainline {
        saved.push((MAINLINE, Value::from(mainline as i64)));
    }
    sequencer.start(repo, &saved)?;
    for oid in commits {
        match command {
            Command::Pick => sequencer.pick(oid),
            Command::Revert => sequencer.revert(oid),
        }
    }
    resume(repo, &mut sequencer, Vec::new())
}

fn resume(
    repo: &mut Repository,
    sequencer: &mut Sequencer,
    mut done: Vec<ObjectId>,
) -> Result<SequenceOutcome, MergeError> {
    let mainline = sequencer
        .get_option(MAINLINE)?
        .and_then(|value| value.as_int())
        .map(|n| n as usize);

    while let Some((command, oid)) = sequencer.next_command() {
        let commit = repo.database().load_commit(&oid)?;
        let (inputs, message) = match command {
            Command::Pick => (pick_inputs(repo, &oid, &commit, mainline)?, commit.message.to_string()),
            Command::Revert => (revert_inputs(repo, &oid, &commit, mainline)?, revert_message(&oid, &commit)),
        };

        let plan = with_index_update(repo, |repo| Resolve::new(&inputs).execute(repo))?;
        if !plan.is_clean() {
            return fail_on_conflict(repo, sequencer, command, &oid, &inputs, &message);
        }

        let created = match command {
            Command::Pick => commit::store_commit(repo, vec![inputs.left_oid], commit.author.clone(), &message)?,
            Command::Revert => commit::write_commit(repo, vec![inputs.left_oid], &message)?,
        };
        tracing::info!(%command, %oid, %created, "applied");
        done.push(created);
        sequencer.drop_command(repo)?;
    }

    sequencer.quit()?;
    Ok(SequenceOutcome::Completed { commits: done })
}

/// Save the remaining commands and the message to finish with, and report
/// the conflict.
fn fail_on_conflict(
    repo: &Repository,
    sequencer: &mut Sequencer,
    command: Command,
    oid: &ObjectId,
    inputs: &Inputs,
    message: &str,
) -> Result<SequenceOutcome, MergeError> {
    sequencer.dump(repo.database())?;

    let kind = match command {
        Command::Pick => MergeKind::CherryPick,
        Command::Revert => MergeKind::Revert,
    };
    let paths = repo.index().conflict_paths();
    let mut text = format!("{}\n\n", message.trim_end());
    text.push_str(&comment("Conflicts:"));
    for path in &paths {
        text.push_str(&comment(&format!("\t{path}")));
    }

    let pending = repo.pending_commit();
    pending.start(oid, kind)?;
    pending.write_message(&text)?;

    tracing::warn!(name = %inputs.right_name, conflicts = paths.len(), "could not apply");
    Ok(SequenceOutcome::Conflicted {
        name: inputs.right_name.clone(),
        paths,
    })
}

fn pick_inputs(
    repo: &Repository,
    oid: &ObjectId,
    commit: &Commit,
    mainline: Option<usize>,
) -> Result<Inputs, MergeError> {
    let head = repo.refs().read_head()?.ok_or(MergeError::UnbornHead)?;
    let short = repo.database().short_oid(oid);
    let right_name = format!("{short}... {}", commit.title_line());
    let base = select_parent(oid, commit, mainline)?;
    Ok(Inputs::pick(HEAD, right_name, head, *oid, base))
}

/// Merge the parent into HEAD against the commit itself, which undoes the
/// commit's changes. A root commit's parent is the empty tree.
fn revert_inputs(
    repo: &Repository,
    oid: &ObjectId,
    commit: &Commit,
    mainline: Option<usize>,
) -> Result<Inputs, MergeError> {
    let head = repo.refs().read_head()?.ok_or(MergeError::UnbornHead)?;
    let short = repo.database().short_oid(oid);
    let right_name = format!("parent of {short}... {}", commit.title_line());
    let parent = match select_parent(oid, commit, mainline)? {
        Some(parent) => parent,
        None => repo.database().store(&Object::Tree(Tree::default()))?,
    };
    Ok(Inputs::pick(HEAD, right_name, head, parent, Some(*oid)))
}

fn revert_message(oid: &ObjectId, commit: &Commit) -> String {
    format!("Revert \"{}\"\n\nThis reverts commit {oid}.\n", commit.title_line())
}

fn select_parent(
    oid: &ObjectId,
    commit: &Commit,
    mainline: Option<usize>,
) -> Result<Option<ObjectId>, MergeError> {
    match (commit.is_merge(), mainline) {
        (true, None) => Err(MergeError::Mainline(format!(
            "commit {oid} is a merge but no -m option was given"
        ))),
        (true, Some(n)) => n
            .checked_sub(1)
            .and_then(|i| commit.parents.get(i))
            .map(|parent| Some(*parent))
            .ok_or_else(|| MergeError::Mainline(format!("commit {oid} does not have parent {n}"))),
        (false, Some(_)) => Err(MergeError::Mainline(format!(
            "mainline was specified but commit {oid} is not a merge"
        ))),
        (false, None) => Ok(commit.parent()),
    }
}
