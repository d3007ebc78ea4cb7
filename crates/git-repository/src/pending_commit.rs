//! Marker files for a merge, cherry-pick or revert stopped by conflicts.

use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use git_hash::ObjectId;

use crate::RepoError;

const MESSAGE_FILE: &str = "MERGE_MSG";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    Merge,
    CherryPick,
    Revert,
}

impl MergeKind {
    pub const ALL: [MergeKind; 3] = [MergeKind::Merge, MergeKind::CherryPick, MergeKind::Revert];

    /// The marker file holding the commit being merged in.
    pub fn head_file(&self) -> &'static str {
        match self {
            MergeKind::Merge => "MERGE_HEAD",
            MergeKind::CherryPick => "CHERRY_PICK_HEAD",
            MergeKind::Revert => "REVERT_HEAD",
        }
    }
}

pub struct PendingCommit {
    git_dir: PathBuf,
    message_path: PathBuf,
}

impl PendingCommit {
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        let git_dir = git_dir.as_ref().to_path_buf();
        Self {
            message_path: git_dir.join(MESSAGE_FILE),
            git_dir,
        }
    }

    pub fn message_path(&self) -> &Path {
        &self.message_path
    }

    fn head_path(&self, kind: MergeKind) -> PathBuf {
        self.git_dir.join(kind.head_file())
    }

    /// Record `oid` as the commit being merged in. Fails if a marker of
    /// the same kind already exists.
    pub fn start(&self, oid: &ObjectId, kind: MergeKind) -> Result<(), RepoError> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.head_path(kind))?;
        writeln!(file, "{oid}")?;
        Ok(())
    }

    pub fn write_message(&self, message: &str) -> Result<(), RepoError> {
        fs::write(&self.message_path, message)?;
        Ok(())
    }

    /// Remove the marker and the saved message.
    pub fn clear(&self, kind: MergeKind) -> Result<(), RepoError> {
        let missing = || {
            RepoError::Pending(format!(
                "There is no merge to abort ({} missing).",
                kind.head_file()
            ))
        };
        fs::remove_file(self.head_path(kind)).map_err(|e| not_found_or(e, missing))?;
        fs::remove_file(&self.message_path).map_err(|e| not_found_or(e, missing))?;
        Ok(())
    }

    pub fn in_progress(&self) -> bool {
        self.merge_type().is_some()
    }

    /// Which kind of operation is stopped, if any.
    pub fn merge_type(&self) -> Option<MergeKind> {
        MergeKind::ALL
            .into_iter()
            .find(|kind| self.head_path(*kind).is_file())
    }

    pub fn merge_oid(&self, kind: MergeKind) -> Result<ObjectId, RepoError> {
        let content = fs::read_to_string(self.head_path(kind)).map_err(|e| {
            not_found_or(e, || {
                RepoError::Pending(format!(
                    "There is no merge in progress ({} missing).",
                    kind.head_file()
                ))
            })
        })?;
        Ok(ObjectId::from_hex(content.trim())?)
    }

    pub fn merge_message(&self) -> Result<String, RepoError> {
        Ok(fs::read_to_string(&self.message_path)?)
    }
}

fn not_found_or(e: std::io::Error, missing: impl FnOnce() -> RepoError) -> RepoError {
    if e.kind() == ErrorKind::NotFound {
        missing()
    } else {
        e.into()
    }
}
