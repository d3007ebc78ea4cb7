use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{LockError, UtilError};
use crate::Result;

const LOCK_SUFFIX: &str = ".lock";

/// Exclusive update guard for a single file.
///
/// Acquiring creates `<target>.lock` with `O_CREAT|O_EXCL`. Writes are
/// buffered into the lock file; `commit` renames it over the target and
/// `rollback` (or dropping the guard) deletes it, so readers never observe
/// a half-written target.
pub struct LockFile {
    target: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
}

impl LockFile {
    /// Take the lock on `target`. Fails fast with
    /// [`LockError::AlreadyLocked`] when another holder exists.
    pub fn acquire(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let mut lock_name = target.clone().into_os_string();
        lock_name.push(LOCK_SUFFIX);
        let lock_path = PathBuf::from(lock_name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|source| match source.kind() {
                io::ErrorKind::AlreadyExists => LockError::AlreadyLocked {
                    path: lock_path.clone(),
                },
                _ => LockError::Create {
                    path: lock_path.clone(),
                    source,
                },
            })?;

        Ok(Self {
            target,
            lock_path,
            file: Some(file),
        })
    }

    /// Like [`acquire`](Self::acquire) but maps contention to `Ok(None)`.
    pub fn try_acquire(target: impl AsRef<Path>) -> Result<Option<Self>> {
        match Self::acquire(target) {
            Ok(lock) => Ok(Some(lock)),
            Err(UtilError::Lock(LockError::AlreadyLocked { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Flush, sync and atomically move the lock file over the target.
    pub fn commit(mut self) -> Result<()> {
        let commit_err = |path: &Path, source| LockError::Commit {
            path: path.to_path_buf(),
            source,
        };

        let mut file = self.file.take().ok_or_else(|| LockError::Stale {
            path: self.lock_path.clone(),
        })?;
        file.flush().map_err(|e| commit_err(&self.lock_path, e))?;
        file.sync_all().map_err(|e| commit_err(&self.lock_path, e))?;
        drop(file);

        fs::rename(&self.lock_path, &self.target).map_err(|e| commit_err(&self.lock_path, e))?;
        Ok(())
    }

    /// Discard everything written and release the lock.
    pub fn rollback(mut self) -> Result<()> {
        if self.file.take().is_none() {
            return Err(LockError::Stale {
                path: self.lock_path.clone(),
            }
            .into());
        }
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn handle(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock file already released"))
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle()?.flush()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if self.file.take().is_some() {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("HEAD");
        fs::write(&target, b"old").unwrap();

        let mut lock = LockFile::acquire(&target).unwrap();
        assert!(lock.lock_path().exists());
        lock.write_all(b"new").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"old");
        lock.commit().unwrap();

        assert!(!dir.path().join("HEAD.lock").exists());
        assert_eq!(fs::read(&target).unwrap(), b"new");
    }

    #[test]
    fn rollback_keeps_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        fs::write(&target, b"original").unwrap();

        let mut lock = LockFile::acquire(&target).unwrap();
        lock.write_all(b"discarded").unwrap();
        lock.rollback().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"original");
        assert!(!dir.path().join("index.lock").exists());
    }

    #[test]
    fn drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("config");
        {
            let mut lock = LockFile::acquire(&target).unwrap();
            lock.write_all(b"x").unwrap();
        }
        assert!(!dir.path().join("config.lock").exists());
        assert!(!target.exists());
        LockFile::acquire(&target).unwrap();
    }

    #[test]
    fn second_holder_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("refs");

        let _held = LockFile::acquire(&target).unwrap();
        let err = LockFile::acquire(&target).err().unwrap();
        assert!(err.is_lock_denied());
        assert!(err.to_string().contains("refs.lock"));
        assert!(LockFile::try_acquire(&target).unwrap().is_none());
    }

    #[test]
    fn missing_parent_is_a_create_error() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("no/such/dir/file");
        match LockFile::acquire(&target) {
            Err(UtilError::Lock(LockError::Create { .. })) => {}
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
