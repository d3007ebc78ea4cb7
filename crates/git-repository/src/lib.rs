//! Repository initialization and central access for all git subsystems.

mod error;
pub mod inspector;
pub mod migration;
pub mod pending_commit;
pub mod sequencer;
pub mod status;
pub mod workspace;

pub use error::RepoError;
pub use migration::Migration;
pub use pending_commit::{MergeKind, PendingCommit};
pub use sequencer::Sequencer;
pub use status::Status;
pub use workspace::Workspace;

use std::fs;
use std::path::{Path, PathBuf};

use git_config::{ConfigScope, ConfigStack};
use git_hash::ObjectId;
use git_index::Index;
use git_odb::{Changes, Database};
use git_ref::Refs;

const GIT_DIR: &str = ".git";
const DEFAULT_BRANCH: &str = "main";

/// The central repository struct tying all subsystems together.
pub struct Repository {
    /// Path to the .git directory.
    git_dir: PathBuf,
    database: Database,
    index: Index,
    refs: Refs,
    workspace: Workspace,
    config: ConfigStack,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("git_dir", &self.git_dir)
            .field("work_tree", &self.workspace.root())
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Create `.git` under `root` with an empty object store, no branches
    /// and `HEAD` on the unborn default branch. Re-running on an existing
    /// repository leaves it untouched.
    pub fn init(root: impl AsRef<Path>) -> Result<Self, RepoError> {
        let root = root.as_ref();
        let git_dir = root.join(GIT_DIR);
        if git_dir.join("HEAD").is_file() {
            return Self::open(root);
        }

        fs::create_dir_all(git_dir.join("objects"))?;
        fs::create_dir_all(git_dir.join("refs").join("heads"))?;

        let mut repo = Self::from_git_dir(git_dir);
        let config = repo.config.file(ConfigScope::Local);
        config.open_for_update()?;
        config.set("core.bare", false)?;
        config.save()?;

        fs::write(
            repo.git_dir.join(git_ref::HEAD),
            format!("ref: refs/heads/{DEFAULT_BRANCH}\n"),
        )?;
        tracing::info!(git_dir = %repo.git_dir.display(), "initialized empty repository");
        Ok(repo)
    }

    /// Open the repository whose working tree is `path`, or whose git
    /// directory is `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let path = path.as_ref();
        let git_dir = if is_git_dir(path) {
            path.to_path_buf()
        } else if is_git_dir(&path.join(GIT_DIR)) {
            path.join(GIT_DIR)
        } else {
            return Err(RepoError::NotFound(path.to_path_buf()));
        };
        Ok(Self::from_git_dir(git_dir))
    }

    fn from_git_dir(git_dir: PathBuf) -> Self {
        let root = git_dir.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            database: Database::open(git_dir.join("objects")),
            index: Index::new(git_dir.join("index")),
            refs: Refs::new(&git_dir),
            workspace: Workspace::new(root),
            config: ConfigStack::new(&git_dir),
            git_dir,
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// The index as last loaded. Call [`Index::load`] or
    /// [`Index::load_for_update`] through [`index_mut`](Self::index_mut)
    /// first.
    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut Index {
        &mut self.index
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn config(&mut self) -> &mut ConfigStack {
        &mut self.config
    }

    pub fn pending_commit(&self) -> PendingCommit {
        PendingCommit::new(&self.git_dir)
    }

    pub fn sequencer(&self) -> Sequencer {
        Sequencer::new(&self.git_dir)
    }

    /// A checkout from one tree to another, described by their diff.
    pub fn migration<'r>(&'r mut self, diff: &'r Changes) -> Migration<'r> {
        Migration::new(self, diff)
    }

    /// Status against `commit`, or against `HEAD`.
    pub fn status(&mut self, commit: Option<&ObjectId>) -> Result<Status, RepoError> {
        Status::new(self, commit)
    }

    /// Reset index and workspace to `oid`. The index must be loaded for
    /// update.
    pub fn hard_reset(&mut self, oid: &ObjectId) -> Result<(), RepoError> {
        status::hard_reset(self, oid)
    }
}

fn is_git_dir(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir()
}
