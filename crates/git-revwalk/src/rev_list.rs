//! Commit listing in the manner of `git rev-list`.
//!
//! Starting points are revision expressions. `^rev` and the left side of
//! `a..b` exclude a commit and everything behind it; any expression naming
//! an existing workspace path restricts the output to commits that change
//! that path instead. Commits come out newest first, ties broken by the
//! order they were reached in.
//!
//! With [`RevListOptions::objects`] set, the trees and blobs reachable from
//! the listed commits (and not from excluded ones) follow the commits, each
//! with the path it was first found at.

use std::collections::{HashMap, VecDeque};

use bitflags::bitflags;
use bstr::{BStr, BString, ByteSlice};
use git_hash::ObjectId;
use git_object::Commit;
use git_odb::{join_path, Entry, OdbError, PathFilter};
use git_ref::SymRef;
use git_repository::Repository;

use crate::revision::{Revision, HEAD};
use crate::RevWalkError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct Mark: u8 {
        const SEEN = 1;
        const ADDED = 1 << 1;
        const UNINTERESTING = 1 << 2;
        const TREESAME = 1 << 3;
    }
}

#[derive(Debug, Clone)]
pub struct RevListOptions {
    /// Start from every ref, `HEAD` included.
    pub all: bool,
    pub branches: bool,
    pub remotes: bool,
    /// Also list reachable trees and blobs.
    pub objects: bool,
    /// Skip starting points and parents that are not in the database.
    pub missing: bool,
    /// Order by date and follow parents. When off, only the given commits
    /// are listed, in the order given. Exclusions turn it back on.
    pub walk: bool,
}

impl Default for RevListOptions {
    fn default() -> Self {
        Self {
            all: false,
            branches: false,
            remotes: false,
            objects: false,
            missing: false,
            walk: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RevItem {
    Commit { oid: ObjectId, commit: Commit },
    /// A tree or blob, with the path it was found at. The root tree of a
    /// commit has an empty path.
    Object { entry: Entry, path: BString },
}

impl RevItem {
    pub fn oid(&self) -> ObjectId {
        match self {
            RevItem::Commit { oid, .. } => *oid,
            RevItem::Object { entry, .. } => entry.oid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Commits,
    Objects,
    Done,
}

pub struct RevList<'r> {
    repo: &'r Repository,
    options: RevListOptions,
    commits: HashMap<ObjectId, Commit>,
    flags: HashMap<ObjectId, Mark>,
    queue: VecDeque<ObjectId>,
    limited: bool,
    prune: Vec<BString>,
    filter: PathFilter,
    /// Whether `(parent tree, commit tree)` differ under the filter.
    diffs: HashMap<(Option<ObjectId>, ObjectId), bool>,
    pending: Vec<ObjectId>,
    objects: VecDeque<RevItem>,
    phase: Phase,
}

impl<'r> RevList<'r> {
    pub fn new<S: AsRef<str>>(
        repo: &'r Repository,
        revs: &[S],
        options: RevListOptions,
    ) -> Result<Self, RevWalkError> {
        let mut list = Self {
            repo,
            options,
            commits: HashMap::new(),
            flags: HashMap::new(),
            queue: VecDeque::new(),
            limited: false,
            prune: Vec::new(),
            filter: PathFilter::default(),
            diffs: HashMap::new(),
            pending: Vec::new(),
            objects: VecDeque::new(),
            phase: Phase::Start,
        };

        if list.options.all {
            list.handle_revision("--all")?;
        }
        if list.options.branches {
            list.handle_revision("--branches")?;
        }
        if list.options.remotes {
            list.handle_revision("--remotes")?;
        }
        for rev in revs {
            list.handle_revision(rev.as_ref())?;
        }
        if list.queue.is_empty() {
            list.handle_revision(HEAD)?;
        }

        list.filter = PathFilter::build(&list.prune);
        Ok(list)
    }

    fn handle_revision(&mut self, rev: &str) -> Result<(), RevWalkError> {
        match rev {
            "--all" => return self.include_refs(self.repo.refs().list_all_refs()?),
            "--branches" => return self.include_refs(self.repo.refs().list_branches()?),
            "--remotes" => return self.include_refs(self.repo.refs().list_remotes()?),
            _ => {}
        }

        if !rev.is_empty() && self.repo.workspace().stat_file(BStr::new(rev))?.is_some() {
            self.prune.push(BString::from(rev));
        } else if let Some((exclude, include)) = rev.rsplit_once("..") {
            self.set_start_point(exclude, false)?;
            self.set_start_point(include, true)?;
            self.options.walk = true;
        } else if let Some(exclude) = rev.strip_prefix('^').filter(|rest| !rest.is_empty()) {
            self.set_start_point(exclude, false)?;
            self.options.walk = true;
        } else {
            self.set_start_point(rev, true)?;
        }
        Ok(())
    }

    fn include_refs(&mut self, refs: Vec<SymRef>) -> Result<(), RevWalkError> {
        for symref in refs {
            if let Some(oid) = symref.read_oid(self.repo.refs())? {
                self.start_at(oid, true)?;
            }
        }
        Ok(())
    }

    fn set_start_point(&mut self, rev: &str, interesting: bool) -> Result<(), RevWalkError> {
        let rev = if rev.is_empty() { HEAD } else { rev };
        let oid = match Revision::new(self.repo, rev)?.resolve_commit() {
            Ok(oid) => oid,
            Err(RevWalkError::InvalidObject { .. } | RevWalkError::InvalidName(_))
                if self.options.missing =>
            {
                tracing::debug!(rev, "skipping unknown revision");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        self.start_at(oid, interesting)
    }

    fn start_at(&mut self, oid: ObjectId, interesting: bool) -> Result<(), RevWalkError> {
        if !self.load_commit(&oid)? {
            return Ok(());
        }
        self.enqueue_commit(oid);

        if !interesting {
            self.limited = true;
            self.mark(&oid, Mark::UNINTERESTING);
            self.mark_parents_uninteresting(&oid);
        }
        Ok(())
    }

    /// Make sure `oid` is in the commit cache. `false` means the commit is
    /// absent and `missing` allows that.
    fn load_commit(&mut self, oid: &ObjectId) -> Result<bool, RevWalkError> {
        if self.commits.contains_key(oid) {
            return Ok(true);
        }
        match self.repo.database().load_commit(oid) {
            Ok(commit) => {
                self.commits.insert(*oid, commit);
                Ok(true)
            }
            Err(OdbError::ObjectNotFound(_)) if self.options.missing => {
                tracing::debug!(%oid, "skipping missing commit");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn date(&self, oid: &ObjectId) -> i64 {
        self.commits
            .get(oid)
            .map_or(i64::MIN, |commit| commit.date().timestamp)
    }

    fn enqueue_commit(&mut self, oid: ObjectId) {
        if !self.mark(&oid, Mark::SEEN) {
            return;
        }
        if self.options.walk {
            let date = self.date(&oid);
            let index = self
                .queue
                .iter()
                .position(|other| self.date(other) < date)
                .unwrap_or(self.queue.len());
            self.queue.insert(index, oid);
        } else {
            self.queue.push_back(oid);
        }
    }

    /// Set `flag`, returning whether it was newly set.
    fn mark(&mut self, oid: &ObjectId, flag: Mark) -> bool {
        let flags = self.flags.entry(*oid).or_default();
        let added = !flags.contains(flag);
        flags.insert(flag);
        added
    }

    fn is_marked(&self, oid: &ObjectId, flag: Mark) -> bool {
        self.flags.get(oid).is_some_and(|flags| flags.contains(flag))
    }

    /// Mark the parents of `oid`, and their ancestors as far as they are
    /// already loaded, uninteresting.
    fn mark_parents_uninteresting(&mut self, oid: &ObjectId) {
        let mut queue: VecDeque<ObjectId> = self
            .commits
            .get(oid)
            .map(|commit| commit.parents.iter().copied().collect())
            .unwrap_or_default();

        while let Some(oid) = queue.pop_front() {
            if !self.mark(&oid, Mark::UNINTERESTING) {
                continue;
            }
            if let Some(commit) = self.commits.get(&oid) {
                queue.extend(commit.parents.iter().copied());
            }
        }
    }

    /// Walk until no remaining queued commit can add to the output, then
    /// make the output the queue.
    fn limit_list(&mut self) -> Result<(), RevWalkError> {
        let mut output = VecDeque::new();
        while self.still_interesting(&output) {
            let Some(oid) = self.queue.pop_front() else {
                break;
            };
            self.add_parents(&oid)?;
            if !self.is_marked(&oid, Mark::UNINTERESTING) {
                output.push_back(oid);
            }
        }
        tracing::debug!(commits = output.len(), "limited commit list");
        self.queue = output;
        Ok(())
    }

    fn still_interesting(&self, output: &VecDeque<ObjectId>) -> bool {
        let Some(newest_in) = self.queue.front() else {
            return false;
        };
        if let Some(oldest_out) = output.back() {
            if self.date(oldest_out) <= self.date(newest_in) {
                return true;
            }
        }
        self.queue
            .iter()
            .any(|oid| !self.is_marked(oid, Mark::UNINTERESTING))
    }

    fn add_parents(&mut self, oid: &ObjectId) -> Result<(), RevWalkError> {
        if !self.options.walk || !self.mark(oid, Mark::ADDED) {
            return Ok(());
        }
        let parents = match self.commits.get(oid) {
            Some(commit) => commit.parents.clone(),
            None => return Ok(()),
        };

        let mut loaded = Vec::with_capacity(parents.len());
        for parent in parents {
            if self.load_commit(&parent)? {
                loaded.push(parent);
            }
        }

        if self.is_marked(oid, Mark::UNINTERESTING) {
            for parent in &loaded {
                self.mark_parents_uninteresting(parent);
            }
        } else {
            self.simplify_commit(oid)?;
        }

        for parent in loaded {
            self.enqueue_commit(parent);
        }
        Ok(())
    }

    /// Under a path filter, mark `oid` treesame when it changes nothing the
    /// filter matches relative to one of its parents.
    fn simplify_commit(&mut self, oid: &ObjectId) -> Result<(), RevWalkError> {
        if self.prune.is_empty() {
            return Ok(());
        }
        let mut parents: Vec<Option<ObjectId>> = match self.commits.get(oid) {
            Some(commit) => commit.parents.iter().copied().map(Some).collect(),
            None => return Ok(()),
        };
        if parents.is_empty() {
            parents.push(None);
        }

        for parent in parents {
            if !self.tree_changed(parent, *oid)? {
                self.mark(oid, Mark::TREESAME);
            }
        }
        Ok(())
    }

    fn tree_changed(&mut self, old: Option<ObjectId>, new: ObjectId) -> Result<bool, RevWalkError> {
        if let Some(changed) = self.diffs.get(&(old, new)) {
            return Ok(*changed);
        }
        let diff = self
            .repo
            .database()
            .tree_diff(old.as_ref(), Some(&new), &self.filter)?;
        let changed = !diff.is_empty();
        self.diffs.insert((old, new), changed);
        Ok(changed)
    }

    /// Everything in the trees of excluded commits on the boundary is
    /// already known to the other side, so keep it out of the object list.
    fn mark_edges_uninteresting(&mut self) -> Result<(), RevWalkError> {
        let queued: Vec<ObjectId> = self.queue.iter().copied().collect();
        for oid in queued {
            let Some(commit) = self.commits.get(&oid) else {
                continue;
            };
            let tree = commit.tree;
            let parents = commit.parents.clone();

            if self.is_marked(&oid, Mark::UNINTERESTING) {
                self.mark_tree_uninteresting(Entry::tree(tree))?;
            }
            for parent in parents {
                if !self.is_marked(&parent, Mark::UNINTERESTING) || !self.load_commit(&parent)? {
                    continue;
                }
                if let Some(tree) = self.commits.get(&parent).map(|commit| commit.tree) {
                    self.mark_tree_uninteresting(Entry::tree(tree))?;
                }
            }
        }
        Ok(())
    }

    fn mark_tree_uninteresting(&mut self, entry: Entry) -> Result<(), RevWalkError> {
        if !self.mark(&entry.oid, Mark::UNINTERESTING) || !entry.is_tree() {
            return Ok(());
        }
        let tree = self.repo.database().load_tree(&entry.oid)?;
        for item in tree.iter() {
            self.mark_tree_uninteresting(Entry::from(item))?;
        }
        Ok(())
    }

    fn collect_objects(&mut self, entry: Entry, path: BString) -> Result<(), RevWalkError> {
        if self.is_marked(&entry.oid, Mark::UNINTERESTING) || !self.mark(&entry.oid, Mark::SEEN) {
            return Ok(());
        }
        self.objects.push_back(RevItem::Object {
            entry,
            path: path.clone(),
        });
        if !entry.is_tree() {
            return Ok(());
        }
        let tree = self.repo.database().load_tree(&entry.oid)?;
        for item in tree.iter() {
            let child = join_path(path.as_bytes(), &item.name);
            self.collect_objects(Entry::from(item), child)?;
        }
        Ok(())
    }

    fn next_commit(&mut self) -> Result<Option<RevItem>, RevWalkError> {
        while let Some(oid) = self.queue.pop_front() {
            if !self.limited {
                self.add_parents(&oid)?;
            }
            if self.is_marked(&oid, Mark::UNINTERESTING) || self.is_marked(&oid, Mark::TREESAME) {
                continue;
            }
            let Some(commit) = self.commits.get(&oid).cloned() else {
                continue;
            };
            if self.options.objects {
                self.pending.push(commit.tree);
            }
            return Ok(Some(RevItem::Commit { oid, commit }));
        }
        Ok(None)
    }

    fn step(&mut self) -> Result<Option<RevItem>, RevWalkError> {
        loop {
            match self.phase {
                Phase::Start => {
                    if self.limited {
                        self.limit_list()?;
                    }
                    if self.options.objects {
                        self.mark_edges_uninteresting()?;
                    }
                    self.phase = Phase::Commits;
                }
                Phase::Commits => {
                    if let Some(item) = self.next_commit()? {
                        return Ok(Some(item));
                    }
                    if self.options.objects {
                        for tree in std::mem::take(&mut self.pending) {
                            self.collect_objects(Entry::tree(tree), BString::default())?;
                        }
                        self.phase = Phase::Objects;
                    } else {
                        self.phase = Phase::Done;
                    }
                }
                Phase::Objects => return Ok(self.objects.pop_front()),
                Phase::Done => return Ok(None),
            }
        }
    }
}

impl Iterator for RevList<'_> {
    type Item = Result<RevItem, RevWalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(item) => item.map(Ok),
            Err(err) => {
                self.phase = Phase::Done;
                Some(Err(err))
            }
        }
    }
}
