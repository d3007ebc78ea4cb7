#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;

use bstr::{BStr, ByteSlice};
use git_config::ConfigScope;
use git_hash::ObjectId;
use git_index::Stage;
use git_object::{Blob, Commit, Object};
use git_odb::PathFilter;
use git_repository::{Repository, Status};
use git_revwalk::{RevItem, RevList, RevListOptions, Revision};

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub repo: Repository,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = Repository::init(dir.path()).unwrap();

        let config = repo.config().file(ConfigScope::Local);
        config.open_for_update().unwrap();
        config.set("user.name", "A. U. Thor").unwrap();
        config.set("user.email", "author@example.com").unwrap();
        config.save().unwrap();

        Self { dir, repo }
    }

    pub fn write(&self, path: &str, content: &str) {
        self.repo
            .workspace()
            .write_file(BStr::new(path), content.as_bytes(), None)
            .unwrap();
    }

    #[cfg(unix)]
    pub fn make_executable(&self, path: &str) {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(self.dir.path().join(path), fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub fn delete(&self, path: &str) {
        self.repo.workspace().remove(BStr::new(path)).unwrap();
    }

    pub fn read(&self, path: &str) -> String {
        fs::read_to_string(self.dir.path().join(path)).unwrap()
    }

    /// Every workspace file with its content.
    pub fn workspace(&self) -> BTreeMap<String, String> {
        let files = self.repo.workspace().list_files(None).unwrap();
        files
            .into_iter()
            .map(|path| {
                let path = path.to_string();
                let content = self.read(&path);
                (path, content)
            })
            .collect()
    }

    /// Stage one file, resolving any conflict on its path.
    pub fn add(&mut self, path: &str) {
        self.repo.index_mut().load_for_update().unwrap();
        self.stage(BStr::new(path));
        self.repo.index_mut().write_updates().unwrap();
    }

    fn stage(&mut self, path: &BStr) {
        let data = self.repo.workspace().read_file(path).unwrap();
        let oid = self
            .repo
            .database()
            .store(&Object::Blob(Blob::new(data)))
            .unwrap();
        let stat = self.repo.workspace().stat_file(path).unwrap().unwrap();
        self.repo.index_mut().add(path, oid, &stat);
    }

    /// Write `files` into the workspace, `None` deleting a path, then stage
    /// the whole workspace and commit it on HEAD.
    pub fn commit_tree(&mut self, message: &str, files: &[(&str, Option<&str>)]) -> ObjectId {
        for (path, content) in files {
            self.delete(path);
            if let Some(content) = content {
                self.write(path, content);
            }
        }
        self.repo.index_mut().load_for_update().unwrap();
        self.repo.index_mut().clear();
        let paths = self.repo.workspace().list_files(None).unwrap();
        for path in paths {
            self.stage(path.as_bstr());
        }
        self.repo.index_mut().write_updates().unwrap();
        self.commit(message)
    }

    /// Commit the index as it stands.
    pub fn commit(&mut self, message: &str) -> ObjectId {
        let parents = self.head().into_iter().collect();
        git_merge::commit::write_commit(&mut self.repo, parents, &format!("{message}\n")).unwrap()
    }

    pub fn head(&self) -> Option<ObjectId> {
        self.repo.refs().read_head().unwrap()
    }

    pub fn resolve(&self, rev: &str) -> ObjectId {
        Revision::new(&self.repo, rev).unwrap().resolve_commit().unwrap()
    }

    pub fn load_commit(&self, rev: &str) -> Commit {
        self.repo.database().load_commit(&self.resolve(rev)).unwrap()
    }

    pub fn branch(&self, name: &str, rev: &str) {
        let oid = self.resolve(rev);
        self.repo
            .refs()
            .update_ref(&format!("refs/heads/{name}"), Some(&oid))
            .unwrap();
    }

    /// Switch the workspace, index and HEAD to the branch `name`.
    pub fn checkout(&mut self, name: &str) {
        let from = self.head().unwrap();
        let to = self.resolve(name);
        let diff = self
            .repo
            .database()
            .tree_diff(Some(&from), Some(&to), &PathFilter::default())
            .unwrap();
        self.repo.index_mut().load_for_update().unwrap();
        self.repo.migration(&diff).apply_changes().unwrap();
        self.repo.index_mut().write_updates().unwrap();
        self.repo.refs().set_head(name, &to).unwrap();
    }

    /// Each index entry's path and stage, in index order.
    pub fn index_stages(&mut self) -> Vec<(String, u8)> {
        self.repo.index_mut().load().unwrap();
        self.repo
            .index()
            .entries()
            .map(|entry| (entry.path.to_string(), entry.stage.as_u8()))
            .collect()
    }

    /// Content of each stage-0 index entry.
    pub fn index_contents(&mut self) -> BTreeMap<String, String> {
        self.repo.index_mut().load().unwrap();
        let db = self.repo.database();
        self.repo
            .index()
            .entries()
            .map(|entry| {
                let object = db.load(&entry.oid).unwrap();
                let data = object.as_blob().unwrap().data.clone();
                (entry.path.to_string(), String::from_utf8(data).unwrap())
            })
            .collect()
    }

    pub fn status(&mut self) -> Status {
        self.repo.index_mut().load().unwrap();
        self.repo.status(None).unwrap()
    }

    /// Conflicted paths with the stages present, as `git status` shows them.
    pub fn conflicts(&mut self) -> BTreeMap<String, Vec<u8>> {
        self.status()
            .conflicts
            .into_iter()
            .map(|(path, stages)| (path.to_string(), stages.iter().map(Stage::as_u8).collect()))
            .collect()
    }

    pub fn assert_clean(&mut self) {
        let status = self.status();
        assert!(status.changed.is_empty(), "changed: {:?}", status.changed);
        assert!(status.untracked.is_empty(), "untracked: {:?}", status.untracked);
        assert!(status.conflicts.is_empty(), "conflicts: {:?}", status.conflicts);
    }

    /// Titles of the commits `revs` lists, newest first.
    pub fn messages(&self, revs: &[&str]) -> Vec<String> {
        RevList::new(&self.repo, revs, RevListOptions::default())
            .unwrap()
            .filter_map(|item| match item.unwrap() {
                RevItem::Commit { commit, .. } => Some(commit.title_line().to_string()),
                _ => None,
            })
            .collect()
    }
}

pub fn files(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(path, content)| (path.to_string(), content.to_string()))
        .collect()
}
