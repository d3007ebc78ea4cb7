//! Index entries and the stat data cached with them.

use std::fs::Metadata;

use bstr::{BStr, BString, ByteSlice};
use git_hash::ObjectId;
use git_object::FileMode;

use crate::Stage;

/// Longest name length the flags field can hold.
const MAX_PATH_SIZE: usize = 0xfff;

/// A single entry in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// File path relative to the repository root, `/`-separated.
    pub path: BString,
    pub oid: ObjectId,
    pub mode: FileMode,
    pub stage: Stage,
    pub stat: StatData,
}

impl IndexEntry {
    /// A stage-0 entry for a file just read from the workspace.
    pub fn from_metadata(path: impl Into<BString>, oid: ObjectId, meta: &Metadata) -> Self {
        Self {
            path: path.into(),
            oid,
            mode: mode_for_metadata(meta),
            stage: Stage::Normal,
            stat: StatData::from_metadata(meta),
        }
    }

    /// An entry taken from a tree, with no stat data. It will never look
    /// clean to a stat check, forcing a content comparison.
    pub fn from_db(path: impl Into<BString>, item: &git_odb::Entry, stage: Stage) -> Self {
        Self {
            path: path.into(),
            oid: item.oid,
            mode: item.mode,
            stage,
            stat: StatData::default(),
        }
    }

    pub fn key(&self) -> (BString, Stage) {
        (self.path.clone(), self.stage)
    }

    /// Every proper ancestor directory, outermost first.
    pub fn parent_directories(&self) -> Vec<&BStr> {
        self.path
            .find_iter("/")
            .map(|slash| self.path[..slash].as_bstr())
            .collect()
    }

    pub fn basename(&self) -> &BStr {
        match self.path.rfind_byte(b'/') {
            Some(slash) => self.path[slash + 1..].as_bstr(),
            None => self.path.as_bstr(),
        }
    }

    /// Mode and size agree with the file. A zero cached size means
    /// "unknown" and matches anything.
    pub fn stat_matches(&self, meta: &Metadata) -> bool {
        self.mode == mode_for_metadata(meta)
            && (self.stat.size == 0 || self.stat.size == StatData::from_metadata(meta).size)
    }

    pub fn times_match(&self, meta: &Metadata) -> bool {
        let other = StatData::from_metadata(meta);
        self.stat.ctime_secs == other.ctime_secs
            && self.stat.ctime_nsecs == other.ctime_nsecs
            && self.stat.mtime_secs == other.mtime_secs
            && self.stat.mtime_nsecs == other.mtime_nsecs
    }

    pub fn update_stat(&mut self, meta: &Metadata) {
        self.stat = StatData::from_metadata(meta);
        self.mode = mode_for_metadata(meta);
    }

    /// The 16-bit flags field: stage in bits 12-13, name length below.
    pub(crate) fn flags(&self) -> u16 {
        let len = self.path.len().min(MAX_PATH_SIZE) as u16;
        len | (u16::from(self.stage.as_u8()) << 12)
    }
}

/// Regular or executable, by the owner's execute bit.
pub fn mode_for_metadata(meta: &Metadata) -> FileMode {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 != 0 {
            return FileMode::Executable;
        }
    }
    #[cfg(not(unix))]
    let _ = meta;
    FileMode::Regular
}

/// File system stat data cached in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatData {
    pub ctime_secs: u32,
    pub ctime_nsecs: u32,
    pub mtime_secs: u32,
    pub mtime_nsecs: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
}

impl StatData {
    #[cfg(unix)]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            ctime_secs: meta.ctime() as u32,
            ctime_nsecs: meta.ctime_nsec() as u32,
            mtime_secs: meta.mtime() as u32,
            mtime_nsecs: meta.mtime_nsec() as u32,
            dev: meta.dev() as u32,
            ino: meta.ino() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.len() as u32,
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &Metadata) -> Self {
        use std::time::UNIX_EPOCH;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        Self {
            ctime_secs: mtime.as_secs() as u32,
            ctime_nsecs: mtime.subsec_nanos(),
            mtime_secs: mtime.as_secs() as u32,
            mtime_nsecs: mtime.subsec_nanos(),
            size: meta.len() as u32,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> IndexEntry {
        IndexEntry {
            path: path.into(),
            oid: ObjectId::NULL,
            mode: FileMode::Regular,
            stage: Stage::Normal,
            stat: StatData::default(),
        }
    }

    #[test]
    fn parent_directories_outermost_first() {
        let e = entry("a/b/c.txt");
        assert_eq!(e.parent_directories(), vec!["a", "a/b"]);
        assert!(entry("top.txt").parent_directories().is_empty());
    }

    #[test]
    fn basename() {
        assert_eq!(entry("a/b/c.txt").basename(), "c.txt");
        assert_eq!(entry("c.txt").basename(), "c.txt");
    }

    #[test]
    fn flags_hold_stage_and_length() {
        let mut e = entry("abc");
        e.stage = Stage::Theirs;
        assert_eq!(e.flags(), 0x3003);
        let long = entry(&"x".repeat(5000));
        assert_eq!(long.flags(), 0x0fff);
    }

    #[test]
    fn unknown_size_matches_any_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"content").unwrap();
        let meta = std::fs::metadata(&path).unwrap();

        let e = entry("f");
        assert!(e.stat_matches(&meta));
        assert!(!e.times_match(&meta));

        let fresh = IndexEntry::from_metadata("f", ObjectId::NULL, &meta);
        assert!(fresh.stat_matches(&meta));
        assert!(fresh.times_match(&meta));
    }
}
