//! Commits that conclude a merge, cherry-pick or revert, including ones
//! resumed after conflicts were resolved by hand.

use std::env;

use git_hash::ObjectId;
use git_object::{Author, Commit, Object};
use git_repository::{MergeKind, Repository};
use git_utils::date::GitDate;

use crate::MergeError;

pub const MERGE_NOTES: &str = "\
It looks like you may be committing a merge.
If this is not correct, please remove the file
\t.git/MERGE_HEAD
and try again.
";

pub const CHERRY_PICK_NOTES: &str = "\
It looks like you may be committing a cherry-pick.
If this is not correct, please remove the file
\t.git/CHERRY_PICK_HEAD
and try again.
";

/// Who is committing: `GIT_AUTHOR_NAME`, `GIT_AUTHOR_EMAIL` and
/// `GIT_AUTHOR_DATE` when set, otherwise `user.name` and `user.email` from
/// config at the current time.
pub fn current_author(repo: &mut Repository) -> Result<Author, MergeError> {
    let config = repo.config();
    let name = match env::var("GIT_AUTHOR_NAME") {
        Ok(name) => name,
        Err(_) => config
            .get_string("user.name")?
            .unwrap_or_else(|| "Unknown".to_owned()),
    };
    let email = match env::var("GIT_AUTHOR_EMAIL") {
        Ok(email) => email,
        Err(_) => config
            .get_string("user.email")?
            .unwrap_or_else(|| "unknown@unknown".to_owned()),
    };
    let time = match env::var("GIT_AUTHOR_DATE") {
        Ok(raw) => GitDate::parse_raw(&raw)?,
        Err(_) => GitDate::now(),
    };
    Ok(Author::new(name, email, time))
}

/// Store the index as a tree.
pub fn write_tree(repo: &Repository) -> Result<ObjectId, MergeError> {
    Ok(repo.index().write_tree(repo.database())?)
}

/// Commit the index on `parents` as the current author and move HEAD to it.
pub fn write_commit(
    repo: &mut Repository,
    parents: Vec<ObjectId>,
    message: &str,
) -> Result<ObjectId, MergeError> {
    let author = current_author(repo)?;
    store_commit(repo, parents, author, message)
}

/// Commit the index with `author` kept and the current author as
/// committer, then move HEAD to it.
pub(crate) fn store_commit(
    repo: &mut Repository,
    parents: Vec<ObjectId>,
    author: Author,
    message: &str,
) -> Result<ObjectId, MergeError> {
    if message.trim().is_empty() {
        return Err(MergeError::EmptyMessage);
    }
    let committer = current_author(repo)?;
    let tree = write_tree(repo)?;
    let commit = Commit::new(parents, tree, author, message).with_committer(committer);
    let oid = repo.database().store(&Object::Commit(commit))?;
    repo.refs().update_head(&oid)?;
    tracing::debug!(%oid, "wrote commit");
    Ok(oid)
}

/// Strip `#` comment lines and surrounding blank lines from an edited
/// message. Empty when nothing is left.
pub fn clean_message(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(str::trim_end)
        .collect();
    let body = lines.join("\n");
    let body = body.trim_matches('\n');
    if body.is_empty() {
        String::new()
    } else {
        format!("{body}\n")
    }
}

/// The text an editor would be opened on to finish a stopped operation:
/// the saved message followed by commented notes.
pub fn message_template(repo: &Repository, kind: MergeKind) -> Result<String, MergeError> {
    let mut template = repo.pending_commit().merge_message()?;
    let notes = match kind {
        MergeKind::Merge => Some(MERGE_NOTES),
        MergeKind::CherryPick => Some(CHERRY_PICK_NOTES),
        MergeKind::Revert => None,
    };
    if let Some(notes) = notes {
        template.push_str("#\n");
        template.push_str(&comment(notes));
    }
    Ok(template)
}

/// Prefix every line with `#`.
pub(crate) fn comment(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                "#\n".to_owned()
            } else {
                format!("# {line}\n")
            }
        })
        .collect()
}

/// Finish the stopped operation of `kind` from the saved message, once the
/// index is free of conflicts.
pub fn resume_merge(repo: &mut Repository, kind: MergeKind) -> Result<ObjectId, MergeError> {
    repo.index_mut().load()?;
    if repo.index().is_conflicted() {
        return Err(MergeError::Unmerged);
    }

    let pending = repo.pending_commit();
    let head = repo.refs().read_head()?.ok_or(MergeError::UnbornHead)?;
    let picked = pending.merge_oid(kind)?;
    let message = clean_message(&pending.merge_message()?);

    let oid = match kind {
        MergeKind::Merge => write_commit(repo, vec![head, picked], &message)?,
        MergeKind::CherryPick => {
            let author = repo.database().load_commit(&picked)?.author;
            store_commit(repo, vec![head], author, &message)?
        }
        MergeKind::Revert => write_commit(repo, vec![head], &message)?,
    };
    pending.clear(kind)?;
    tracing::info!(%oid, ?kind, "concluded stopped operation");
    Ok(oid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blank_edges_are_stripped() {
        let text = "\nMerge topic\n\n# Conflicts:\n# \tf.txt\n\n";
        assert_eq!(clean_message(text), "Merge topic\n");
        assert_eq!(clean_message("title  \n\nbody\n"), "title\n\nbody\n");
        assert_eq!(clean_message("# only a comment\n"), "");
    }

    #[test]
    fn notes_become_comments() {
        assert_eq!(comment("one\n\ttwo\n\nthree"), "# one\n# \ttwo\n#\n# three\n");
    }
}
