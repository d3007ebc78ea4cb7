//! Saved state of a multi-commit cherry-pick or revert.
//!
//! Everything lives in `.git/sequencer/`: `head` is where HEAD pointed when
//! the run began, `abort-safety` where it pointed after the last finished
//! step, `todo` the remaining commands and `opts` the run's options.

use std::collections::VecDeque;
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use git_config::{ConfigFile, Value};
use git_hash::ObjectId;
use git_odb::Database;
use git_utils::lockfile::LockFile;

use crate::{status, RepoError, Repository};

pub const UNSAFE_MESSAGE: &str = "You seem to have moved HEAD. Not rewinding, check your HEAD!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pick,
    Revert,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "pick" => Some(Command::Pick),
            "revert" => Some(Command::Revert),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Command::Pick => "pick",
            Command::Revert => "revert",
        })
    }
}

pub struct Sequencer {
    dir: PathBuf,
    abort_path: PathBuf,
    head_path: PathBuf,
    todo_path: PathBuf,
    opts: ConfigFile,
    todo_file: Option<LockFile>,
    commands: VecDeque<(Command, ObjectId)>,
}

impl Sequencer {
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        let dir = git_dir.as_ref().join("sequencer");
        Self {
            abort_path: dir.join("abort-safety"),
            head_path: dir.join("head"),
            todo_path: dir.join("todo"),
            opts: ConfigFile::new(dir.join("opts")),
            todo_file: None,
            commands: VecDeque::new(),
            dir,
        }
    }

    /// Begin a run from the current HEAD, saving `options` under
    /// `options.<name>`.
    pub fn start(&mut self, repo: &Repository, options: &[(&str, Value)]) -> Result<(), RepoError> {
        match fs::create_dir(&self.dir) {
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(RepoError::SequencerRunning),
            result => result?,
        }
        let head = repo.refs.read_head()?;
        write_oid(&self.head_path, head.as_ref())?;
        write_oid(&self.abort_path, head.as_ref())?;

        self.opts.open_for_update()?;
        for (name, value) in options {
            self.opts.set(&format!("options.{name}"), value.clone())?;
        }
        self.opts.save()?;

        self.open_todo_file()?;
        tracing::debug!(dir = %self.dir.display(), "sequencer started");
        Ok(())
    }

    /// Whether a run has started and not yet been finished or abandoned.
    pub fn in_progress(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn get_option(&mut self, name: &str) -> Result<Option<Value>, RepoError> {
        self.opts.open()?;
        Ok(self.opts.get(&format!("options.{name}"))?)
    }

    pub fn pick(&mut self, oid: ObjectId) {
        self.commands.push_back((Command::Pick, oid));
    }

    pub fn revert(&mut self, oid: ObjectId) {
        self.commands.push_back((Command::Revert, oid));
    }

    pub fn next_command(&self) -> Option<(Command, ObjectId)> {
        self.commands.front().copied()
    }

    /// Mark the first command done, recording HEAD as safe to abort to.
    pub fn drop_command(&mut self, repo: &Repository) -> Result<(), RepoError> {
        self.commands.pop_front();
        write_oid(&self.abort_path, repo.refs.read_head()?.as_ref())
    }

    /// Read back the saved options and remaining commands, and lock the
    /// todo list for rewriting.
    pub fn load(&mut self, db: &Database) -> Result<(), RepoError> {
        self.opts.open()?;
        self.open_todo_file()?;

        let content = match fs::read_to_string(&self.todo_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        self.commands.clear();
        for line in content.lines() {
            let corrupt = || RepoError::Sequencer(format!("bad todo line: {line}"));
            let (name, rest) = line.split_once(' ').ok_or_else(corrupt)?;
            let command = Command::parse(name).ok_or_else(corrupt)?;
            let prefix = rest.split_once(' ').map_or(rest, |(oid, _)| oid);
            let oid = *db.prefix_match(prefix)?.first().ok_or_else(corrupt)?;
            self.commands.push_back((command, oid));
        }
        Ok(())
    }

    /// Write the remaining commands to `todo`, one `<command> <short> <title>`
    /// line each.
    pub fn dump(&mut self, db: &Database) -> Result<(), RepoError> {
        let Some(mut todo) = self.todo_file.take() else {
            return Ok(());
        };
        for (command, oid) in &self.commands {
            let commit = db.load_commit(oid)?;
            writeln!(todo, "{command} {} {}", db.short_oid(oid), commit.title_line())?;
        }
        todo.commit()?;
        Ok(())
    }

    /// Restore the workspace, index and HEAD to where the run began, unless
    /// HEAD was moved by hand since the last step. That case is reported as a
    /// warning. The index must be loaded for update by the caller.
    pub fn abort(&mut self, repo: &mut Repository) -> Result<Vec<String>, RepoError> {
        let head = read_oid(&self.head_path)?;
        let expected = read_oid(&self.abort_path)?;
        let actual = repo.refs.read_head()?;
        self.quit()?;

        if actual != expected {
            tracing::warn!("{UNSAFE_MESSAGE}");
            return Ok(vec![UNSAFE_MESSAGE.to_string()]);
        }
        let Some(head) = head else {
            return Ok(Vec::new());
        };

        status::hard_reset(repo, &head)?;
        if let Some(orig_head) = repo.refs.update_head(&head)? {
            repo.refs.update_ref(git_ref::ORIG_HEAD, Some(&orig_head))?;
        }
        Ok(Vec::new())
    }

    /// Forget the run, leaving HEAD, index and workspace as they are.
    pub fn quit(&mut self) -> Result<(), RepoError> {
        if let Some(todo) = self.todo_file.take() {
            todo.rollback()?;
        }
        self.commands.clear();
        match fs::remove_dir_all(&self.dir) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn open_todo_file(&mut self) -> Result<(), RepoError> {
        if self.dir.is_dir() && self.todo_file.is_none() {
            self.todo_file = Some(LockFile::acquire(&self.todo_path)?);
        }
        Ok(())
    }
}

fn write_oid(path: &Path, oid: Option<&ObjectId>) -> Result<(), RepoError> {
    let content = oid.map(ObjectId::to_hex).unwrap_or_default();
    fs::write(path, content + "\n")?;
    Ok(())
}

fn read_oid(path: &Path) -> Result<Option<ObjectId>, RepoError> {
    let content = fs::read_to_string(path)?;
    let hex = content.trim();
    if hex.is_empty() {
        return Ok(None);
    }
    Ok(Some(ObjectId::from_hex(hex)?))
}
