//! Ref files on disk: one file per ref holding a hex oid or `ref: <name>`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use git_hash::ObjectId;
use git_utils::lockfile::LockFile;

use crate::error::RefError;

const SYMREF_PREFIX: &[u8] = b"ref: ";

/// The contents of a ref file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    Direct(ObjectId),
    /// Name of the target ref, relative to the git directory.
    Symbolic(String),
}

/// Read a ref file. A missing file is `None`.
pub(crate) fn read_value(path: &Path) -> Result<Option<RefValue>, RefError> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(RefError::IoPath {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let trimmed = contents.trim();
    let parse_err = |reason: &str| RefError::Parse {
        path: path.to_path_buf(),
        reason: reason.into(),
    };

    if let Some(target) = trimmed.strip_prefix(SYMREF_PREFIX) {
        let target = target
            .trim()
            .to_str()
            .map_err(|_| parse_err("symbolic target is not UTF-8"))?;
        return Ok(Some(RefValue::Symbolic(target.to_owned())));
    }
    let hex = trimmed.to_str().map_err(|_| parse_err("oid is not UTF-8"))?;
    let oid = ObjectId::from_hex(hex).map_err(|e| parse_err(&e.to_string()))?;
    Ok(Some(RefValue::Direct(oid)))
}

/// Lock `path`, creating its parent directories first.
pub(crate) fn lock(path: &Path) -> Result<LockFile, RefError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| RefError::IoPath {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(LockFile::acquire(path)?)
}

/// Commit `content` plus a newline through the held lock.
pub(crate) fn commit(mut lock: LockFile, content: &str) -> Result<(), RefError> {
    writeln!(lock, "{content}").map_err(|source| RefError::IoPath {
        path: lock.target().to_path_buf(),
        source,
    })?;
    lock.commit()?;
    Ok(())
}

/// Write `oid` through the held lock, or delete the ref when `None`.
pub(crate) fn store(lock: LockFile, oid: Option<&ObjectId>) -> Result<(), RefError> {
    match oid {
        Some(oid) => commit(lock, &oid.to_hex()),
        None => {
            match fs::remove_file(lock.target()) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(RefError::IoPath {
                        path: lock.target().to_path_buf(),
                        source,
                    })
                }
            }
            lock.rollback()?;
            Ok(())
        }
    }
}

/// Remove empty directories above `path`, stopping at `stop`.
pub(crate) fn delete_parent_directories(path: &Path, stop: &Path) {
    let mut dir = path.parent();
    while let Some(d) = dir {
        if d == stop || !d.starts_with(stop) {
            break;
        }
        if fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
}

/// Every ref file under `dir`, as names relative to `git_dir`, sorted.
pub(crate) fn list_names(dir: &Path, git_dir: &Path) -> Result<Vec<String>, RefError> {
    let mut names = Vec::new();
    collect(dir, git_dir, &mut names)?;
    names.sort();
    Ok(names)
}

fn collect(dir: &Path, git_dir: &Path, names: &mut Vec<String>) -> Result<(), RefError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let path: PathBuf = entry?.path();
        if path.is_dir() {
            collect(&path, git_dir, names)?;
        } else if let Some(name) = relative_name(&path, git_dir) {
            if !name.ends_with(".lock") {
                names.push(name);
            }
        }
    }
    Ok(())
}

/// `path` relative to `git_dir`, `/`-separated.
pub(crate) fn relative_name(path: &Path, git_dir: &Path) -> Option<String> {
    let rel = path.strip_prefix(git_dir).ok()?;
    let parts: Vec<&str> = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(parts.join("/"))
}
