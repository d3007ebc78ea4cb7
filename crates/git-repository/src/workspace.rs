//! The working tree: the files a user edits, outside `.git`.

use std::collections::BTreeMap;
use std::fs::{self, Metadata};
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};
use git_object::FileMode;

use crate::migration::{Action, Migration};
use crate::RepoError;

const IGNORE: [&str; 3] = [".", "..", ".git"];

/// File access relative to the repository root. Paths are `/`-separated
/// byte strings, as stored in trees and the index.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &BStr) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path.to_path_lossy())
        }
    }

    /// Every file under `path` (the whole workspace when `None`), recursively.
    pub fn list_files(&self, path: Option<&BStr>) -> Result<Vec<BString>, RepoError> {
        let relative = path.map(BString::from).unwrap_or_default();
        let full = self.full_path(relative.as_bstr());

        if full.is_dir() {
            let mut files = Vec::new();
            for name in read_names(&full)? {
                files.extend(self.list_files(Some(join(relative.as_bstr(), name.as_bstr()).as_bstr()))?);
            }
            Ok(files)
        } else if full.exists() {
            Ok(vec![relative])
        } else {
            Err(RepoError::MissingFile(format!(
                "pathspec '{relative}' did not match any files"
            )))
        }
    }

    /// The direct children of `dirname`, keyed by workspace path.
    pub fn list_dir(&self, dirname: Option<&BStr>) -> Result<BTreeMap<BString, Metadata>, RepoError> {
        let prefix = dirname.map(BString::from).unwrap_or_default();
        let full = self.full_path(prefix.as_bstr());
        let mut stats = BTreeMap::new();
        for name in read_names(&full)? {
            let path = join(prefix.as_bstr(), name.as_bstr());
            if let Some(stat) = self.stat_file(path.as_bstr())? {
                stats.insert(path, stat);
            }
        }
        Ok(stats)
    }

    pub fn read_file(&self, path: &BStr) -> Result<Vec<u8>, RepoError> {
        fs::read(self.full_path(path)).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => {
                RepoError::NoPermission(format!("open('{path}'): Permission denied"))
            }
            _ => e.into(),
        })
    }

    /// Metadata of `path`, without following a final symlink; `None` if it
    /// does not exist.
    pub fn stat_file(&self, path: &BStr) -> Result<Option<Metadata>, RepoError> {
        match fs::symlink_metadata(self.full_path(path)) {
            Ok(stat) => Ok(Some(stat)),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => Ok(None),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(RepoError::NoPermission(
                format!("stat('{path}'): Permission denied"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Write `data` to `path`, creating parent directories. A mode sets the
    /// execute bit where the platform has one.
    pub fn write_file(&self, path: &BStr, data: &[u8], mode: Option<FileMode>) -> Result<(), RepoError> {
        let full = self.full_path(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(&full)?;
        file.write_all(data)?;
        if let Some(mode) = mode {
            set_mode(&full, mode)?;
        }
        Ok(())
    }

    /// Delete `path` (recursively for a directory), then prune any parent
    /// directories left empty.
    pub fn remove(&self, path: &BStr) -> Result<(), RepoError> {
        remove_all(&self.full_path(path))?;
        for dir in parent_dirs(path).rev() {
            self.remove_directory(dir);
        }
        Ok(())
    }

    /// Carry out a planned checkout: deletions first, then directory
    /// changes, then updated and created files.
    pub fn apply_migration(&self, migration: &Migration<'_>) -> Result<(), RepoError> {
        self.apply_change_list(migration, Action::Delete)?;
        for dir in migration.rmdirs().iter().rev() {
            self.remove_directory(dir.as_bstr());
        }
        for dir in migration.mkdirs() {
            self.make_directory(dir.as_bstr())?;
        }
        self.apply_change_list(migration, Action::Update)?;
        self.apply_change_list(migration, Action::Create)
    }

    fn apply_change_list(&self, migration: &Migration<'_>, action: Action) -> Result<(), RepoError> {
        for (path, entry) in migration.changes(action) {
            let full = self.full_path(path.as_bstr());
            remove_all(&full)?;
            let Some(entry) = entry else {
                continue;
            };
            let data = migration.blob_data(&entry.oid)?;
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&full)?;
            file.write_all(&data)?;
            set_mode(&full, entry.mode)?;
        }
        Ok(())
    }

    fn remove_directory(&self, dirname: &BStr) {
        // Only empty directories go; anything else is left in place.
        let _ = fs::remove_dir(self.full_path(dirname));
    }

    fn make_directory(&self, dirname: &BStr) -> Result<(), RepoError> {
        let full = self.full_path(dirname);
        match self.stat_file(dirname)? {
            Some(stat) if stat.is_dir() => return Ok(()),
            Some(_) => fs::remove_file(&full)?,
            None => {}
        }
        fs::create_dir(&full)?;
        Ok(())
    }
}

/// Every proper ancestor directory of `path`, outermost first.
pub(crate) fn parent_dirs(path: &BStr) -> impl DoubleEndedIterator<Item = &BStr> {
    path.find_iter("/")
        .map(move |slash| path[..slash].as_bstr())
        .collect::<Vec<_>>()
        .into_iter()
}

pub(crate) fn join(dir: &BStr, name: &BStr) -> BString {
    if dir.is_empty() {
        return name.to_owned();
    }
    let mut path = dir.to_owned();
    path.push(b'/');
    path.extend_from_slice(name);
    path
}

fn read_names(dir: &Path) -> Result<Vec<BString>, RepoError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if !IGNORE.contains(&name.as_ref()) {
            names.push(BString::from(name.as_ref()));
        }
    }
    names.sort();
    Ok(names)
}

fn remove_all(path: &Path) -> std::io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(stat) if stat.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: FileMode) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let bits = if mode.is_executable() { 0o755 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(bits))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: FileMode) -> std::io::Result<()> {
    Ok(())
}
