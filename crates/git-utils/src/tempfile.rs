use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::Result;

/// A scratch file that becomes visible under its final name only through
/// [`persist`](TempFile::persist). Dropping it unpersisted deletes it.
pub struct TempFile {
    inner: ::tempfile::NamedTempFile,
}

impl TempFile {
    /// Create `<dir>/<prefix>XXXXXX`, creating `dir` if needed.
    pub fn new_in(dir: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let inner = ::tempfile::Builder::new().prefix(prefix).tempfile_in(dir)?;
        Ok(Self { inner })
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    pub fn file(&self) -> &fs::File {
        self.inner.as_file()
    }

    /// Rename onto `target`, which must live on the same filesystem.
    pub fn persist(self, target: impl AsRef<Path>) -> Result<PathBuf> {
        let target = target.as_ref().to_path_buf();
        self.inner.persist(&target).map_err(|e| e.error)?;
        Ok(target)
    }

    /// Rename onto `target` unless it already exists, in which case the
    /// scratch file is discarded. Content-addressed writers rely on this.
    pub fn persist_noclobber(self, target: impl AsRef<Path>) -> Result<bool> {
        match self.inner.persist_noclobber(target.as_ref()) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.error.into()),
        }
    }
}

impl Write for TempFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
