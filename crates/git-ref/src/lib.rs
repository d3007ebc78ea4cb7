//! References: `HEAD`, branches and remote-tracking refs stored as files.
//!
//! Every ref is a file under the git directory holding either a hex oid or
//! `ref: <name>` pointing at another ref. Writes go through a lock file and
//! land atomically by rename.

mod error;
mod loose;
mod name;
mod refspec;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use git_hash::ObjectId;

pub use error::RefError;
pub use loose::RefValue;
pub use name::{check_branch_name, is_valid_name};
pub use refspec::{RefMappings, Refspec};

pub const HEAD: &str = "HEAD";
pub const ORIG_HEAD: &str = "ORIG_HEAD";

const REFS_DIR: &str = "refs";
const HEADS_DIR: &str = "refs/heads";
const REMOTES_DIR: &str = "refs/remotes";

/// Longest chain of symbolic refs followed before giving up.
const MAX_SYMREF_DEPTH: usize = 10;

/// A named ref, by its path relative to the git directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymRef {
    pub path: String,
}

impl SymRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn is_head(&self) -> bool {
        self.path == HEAD
    }

    pub fn is_branch(&self) -> bool {
        self.path.starts_with("refs/heads/")
    }

    pub fn is_remote(&self) -> bool {
        self.path.starts_with("refs/remotes/")
    }

    /// The oid this ref resolves to, following symbolic refs.
    pub fn read_oid(&self, refs: &Refs) -> Result<Option<ObjectId>, RefError> {
        refs.read_ref(&self.path)
    }

    pub fn short_name(&self) -> &str {
        Refs::short_name(&self.path)
    }
}

/// The files-backed ref store of one repository.
pub struct Refs {
    git_dir: PathBuf,
}

impl Refs {
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self {
            git_dir: git_dir.as_ref().to_path_buf(),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn heads_path(&self) -> PathBuf {
        self.git_dir.join(HEADS_DIR)
    }

    /// Create `refs/heads/<name>` at `start`. Fails if the name is invalid
    /// or the branch exists.
    pub fn create_branch(&self, name: &str, start: &ObjectId) -> Result<(), RefError> {
        check_branch_name(name)?;
        let path = self.heads_path().join(name);
        if path.is_file() {
            return Err(RefError::BranchExists(name.to_owned()));
        }
        let lock = loose::lock(&path)?;
        loose::store(lock, Some(start))?;
        tracing::debug!(branch = name, oid = %start, "created branch");
        Ok(())
    }

    /// Delete `refs/heads/<name>`, returning the oid it pointed at.
    pub fn delete_branch(&self, name: &str) -> Result<ObjectId, RefError> {
        let heads = self.heads_path();
        let path = heads.join(name);
        let lock = loose::lock(&path)?;

        let Some(oid) = self.read_symref(&path)? else {
            lock.rollback()?;
            return Err(RefError::BranchNotFound(name.to_owned()));
        };
        std::fs::remove_file(&path)?;
        lock.rollback()?;
        loose::delete_parent_directories(&path, &heads);
        Ok(oid)
    }

    /// Move whatever `HEAD` ultimately points at to `oid`, returning the
    /// previous value of the ref that was written.
    pub fn update_head(&self, oid: &ObjectId) -> Result<Option<ObjectId>, RefError> {
        self.update_symref(&self.git_dir.join(HEAD), oid)
    }

    /// Point `HEAD` at the branch `revision` if it exists, otherwise detach
    /// it at `oid`.
    pub fn set_head(&self, revision: &str, oid: &ObjectId) -> Result<(), RefError> {
        let head = self.git_dir.join(HEAD);
        let path = self.heads_path().join(revision);
        let lock = loose::lock(&head)?;
        if path.is_file() {
            loose::commit(lock, &format!("ref: {HEADS_DIR}/{revision}"))
        } else {
            loose::store(lock, Some(oid))
        }
    }

    pub fn read_head(&self) -> Result<Option<ObjectId>, RefError> {
        self.read_symref(&self.git_dir.join(HEAD))
    }

    /// Resolve `name`, looked up in the git directory, `refs`, `refs/heads`
    /// and `refs/remotes` in that order.
    pub fn read_ref(&self, name: &str) -> Result<Option<ObjectId>, RefError> {
        match self.path_for_name(name) {
            Some(path) => self.read_symref(&path),
            None => Ok(None),
        }
    }

    /// Write the ref file `name` (relative to the git directory); `None`
    /// deletes it.
    pub fn update_ref(&self, name: &str, oid: Option<&ObjectId>) -> Result<(), RefError> {
        let lock = loose::lock(&self.git_dir.join(name))?;
        loose::store(lock, oid)?;
        tracing::debug!(name, oid = ?oid.map(ObjectId::to_hex), "updated ref");
        Ok(())
    }

    /// Update `name` only if it still holds `old`.
    pub fn compare_and_swap(
        &self,
        name: &str,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
    ) -> Result<(), RefError> {
        let path = self.git_dir.join(name);
        let lock = loose::lock(&path)?;
        if self.read_symref(&path)?.as_ref() != old {
            lock.rollback()?;
            return Err(RefError::StaleValue(name.to_owned()));
        }
        loose::store(lock, new)
    }

    /// The ref a symbolic chain starting at `source` ends on: the branch
    /// `HEAD` is on, or `HEAD` itself when detached.
    pub fn current_ref(&self, source: &str) -> Result<SymRef, RefError> {
        let mut source = source.to_owned();
        for _ in 0..MAX_SYMREF_DEPTH {
            match loose::read_value(&self.git_dir.join(&source))? {
                Some(RefValue::Symbolic(target)) => source = target,
                _ => return Ok(SymRef::new(source)),
            }
        }
        Err(RefError::SymrefLoop(source))
    }

    /// `HEAD` followed by every ref under `refs/`.
    pub fn list_all_refs(&self) -> Result<Vec<SymRef>, RefError> {
        let mut refs = vec![SymRef::new(HEAD)];
        refs.extend(self.list_refs(REFS_DIR)?);
        Ok(refs)
    }

    pub fn list_branches(&self) -> Result<Vec<SymRef>, RefError> {
        self.list_refs(HEADS_DIR)
    }

    pub fn list_remotes(&self) -> Result<Vec<SymRef>, RefError> {
        self.list_refs(REMOTES_DIR)
    }

    fn list_refs(&self, dir: &str) -> Result<Vec<SymRef>, RefError> {
        let names = loose::list_names(&self.git_dir.join(dir), &self.git_dir)?;
        Ok(names.into_iter().map(SymRef::new).collect())
    }

    /// Oid → every ref resolving to it, for decorating log output.
    pub fn reverse_refs(&self) -> Result<HashMap<ObjectId, Vec<SymRef>>, RefError> {
        let mut table: HashMap<ObjectId, Vec<SymRef>> = HashMap::new();
        for r in self.list_all_refs()? {
            if let Some(oid) = r.read_oid(self)? {
                table.entry(oid).or_default().push(r);
            }
        }
        Ok(table)
    }

    /// `refs/heads/x` → `x`, `refs/remotes/o/x` → `o/x`, anything else as is.
    pub fn short_name(path: &str) -> &str {
        path.strip_prefix("refs/remotes/")
            .or_else(|| path.strip_prefix("refs/heads/"))
            .unwrap_or(path)
    }

    /// The full name of an existing ref, found as in [`read_ref`](Self::read_ref).
    pub fn long_name(&self, name: &str) -> Result<String, RefError> {
        self.path_for_name(name)
            .and_then(|path| loose::relative_name(&path, &self.git_dir))
            .ok_or_else(|| RefError::UnknownBranch(name.to_owned()))
    }

    /// Follow symbolic refs from `path` to an oid.
    fn read_symref(&self, path: &Path) -> Result<Option<ObjectId>, RefError> {
        let mut path = path.to_path_buf();
        for _ in 0..MAX_SYMREF_DEPTH {
            match loose::read_value(&path)? {
                Some(RefValue::Symbolic(target)) => path = self.git_dir.join(target),
                Some(RefValue::Direct(oid)) => return Ok(Some(oid)),
                None => return Ok(None),
            }
        }
        Err(RefError::SymrefLoop(path.display().to_string()))
    }

    fn update_symref(&self, path: &Path, oid: &ObjectId) -> Result<Option<ObjectId>, RefError> {
        let lock = loose::lock(path)?;
        match loose::read_value(path)? {
            Some(RefValue::Symbolic(target)) => {
                let result = self.update_symref(&self.git_dir.join(target), oid);
                lock.rollback()?;
                result
            }
            previous => {
                loose::store(lock, Some(oid))?;
                Ok(match previous {
                    Some(RefValue::Direct(old)) => Some(old),
                    _ => None,
                })
            }
        }
    }

    fn path_for_name(&self, name: &str) -> Option<PathBuf> {
        let dirs = [
            self.git_dir.clone(),
            self.git_dir.join(REFS_DIR),
            self.git_dir.join(HEADS_DIR),
            self.git_dir.join(REMOTES_DIR),
        ];
        dirs.into_iter()
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    }
}
