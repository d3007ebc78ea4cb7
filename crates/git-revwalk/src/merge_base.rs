//! Best common ancestors of commits.
//!
//! [`CommonAncestors`] paints history from both sides at once: commits
//! reachable from `one` get `PARENT1`, those reachable from any of `twos`
//! get `PARENT2`. A commit carrying both is a candidate, and everything
//! behind a candidate is painted `STALE`. The walk stops as soon as only
//! stale commits remain queued.
//!
//! The candidates can still include ancestors of each other in criss-cross
//! histories; [`Bases`] runs a second round per candidate to drop those.

use std::collections::{HashMap, HashSet};

use bitflags::bitflags;
use git_hash::ObjectId;
use git_odb::Database;

use crate::RevWalkError;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        const PARENT1 = 1;
        const PARENT2 = 1 << 1;
        const STALE = 1 << 2;
        const RESULT = 1 << 3;
    }
}

const BOTH_PARENTS: Flags = Flags::PARENT1.union(Flags::PARENT2);

#[derive(Debug, Clone)]
struct Queued {
    oid: ObjectId,
    time: i64,
    parents: Vec<ObjectId>,
}

pub struct CommonAncestors<'d> {
    db: &'d Database,
    flags: HashMap<ObjectId, Flags>,
    queue: Vec<Queued>,
    results: Vec<Queued>,
}

impl<'d> CommonAncestors<'d> {
    pub fn new(db: &'d Database, one: &ObjectId, twos: &[ObjectId]) -> Result<Self, RevWalkError> {
        let mut common = Self {
            db,
            flags: HashMap::new(),
            queue: Vec::new(),
            results: Vec::new(),
        };

        let commit = common.load(one)?;
        insert_by_date(&mut common.queue, commit);
        common.mark(one, Flags::PARENT1);

        for two in twos {
            let commit = common.load(two)?;
            insert_by_date(&mut common.queue, commit);
            common.mark(two, Flags::PARENT2);
        }
        Ok(common)
    }

    /// The common ancestors found, most recent first.
    pub fn find(&mut self) -> Result<Vec<ObjectId>, RevWalkError> {
        while !self.all_stale() {
            self.process_queue()?;
        }
        let found: Vec<ObjectId> = self
            .results
            .iter()
            .map(|commit| commit.oid)
            .filter(|oid| !self.is_marked(oid, Flags::STALE))
            .collect();
        tracing::debug!(candidates = found.len(), "common ancestors found");
        Ok(found)
    }

    /// Whether the walk painted `oid` with `flag`.
    pub fn is_marked(&self, oid: &ObjectId, flag: Flags) -> bool {
        self.flags.get(oid).is_some_and(|flags| flags.contains(flag))
    }

    fn mark(&mut self, oid: &ObjectId, flag: Flags) {
        *self.flags.entry(*oid).or_default() |= flag;
    }

    fn all_stale(&self) -> bool {
        self.queue
            .iter()
            .all(|commit| self.is_marked(&commit.oid, Flags::STALE))
    }

    fn process_queue(&mut self) -> Result<(), RevWalkError> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let commit = self.queue.remove(0);
        let flags = self.flags.get(&commit.oid).copied().unwrap_or_default();

        if flags == BOTH_PARENTS {
            let flags = flags | Flags::RESULT;
            self.mark(&commit.oid, Flags::RESULT);
            self.add_parents(&commit, flags | Flags::STALE)?;
            insert_by_date(&mut self.results, commit);
        } else {
            self.add_parents(&commit, flags)?;
        }
        Ok(())
    }

    fn add_parents(&mut self, commit: &Queued, flags: Flags) -> Result<(), RevWalkError> {
        for parent in &commit.parents {
            let current = self.flags.get(parent).copied().unwrap_or_default();
            if current.contains(flags) {
                continue;
            }
            self.mark(parent, flags);
            let queued = self.load(parent)?;
            insert_by_date(&mut self.queue, queued);
        }
        Ok(())
    }

    fn load(&self, oid: &ObjectId) -> Result<Queued, RevWalkError> {
        let commit = self.db.load_commit(oid)?;
        Ok(Queued {
            oid: *oid,
            time: commit.date().timestamp,
            parents: commit.parents,
        })
    }
}

/// Insert before the first strictly older commit, so equal dates keep
/// their arrival order.
fn insert_by_date(list: &mut Vec<Queued>, commit: Queued) {
    let index = list
        .iter()
        .position(|other| other.time < commit.time)
        .unwrap_or(list.len());
    list.insert(index, commit);
}

/// The merge bases of two commits: common ancestors that are not
/// themselves ancestors of another candidate.
pub struct Bases<'d> {
    db: &'d Database,
    one: ObjectId,
    two: ObjectId,
}

impl<'d> Bases<'d> {
    pub fn new(db: &'d Database, one: &ObjectId, two: &ObjectId) -> Self {
        Self {
            db,
            one: *one,
            two: *two,
        }
    }

    pub fn find(&self) -> Result<Vec<ObjectId>, RevWalkError> {
        let commits = CommonAncestors::new(self.db, &self.one, &[self.two])?.find()?;
        if commits.len() <= 1 {
            return Ok(commits);
        }

        let mut redundant = HashSet::new();
        for commit in &commits {
            self.filter_commit(commit, &commits, &mut redundant)?;
        }
        Ok(commits
            .into_iter()
            .filter(|oid| !redundant.contains(oid))
            .collect())
    }

    fn filter_commit(
        &self,
        commit: &ObjectId,
        commits: &[ObjectId],
        redundant: &mut HashSet<ObjectId>,
    ) -> Result<(), RevWalkError> {
        if redundant.contains(commit) {
            return Ok(());
        }
        let others: Vec<ObjectId> = commits
            .iter()
            .filter(|oid| *oid != commit && !redundant.contains(*oid))
            .copied()
            .collect();

        let mut common = CommonAncestors::new(self.db, commit, &others)?;
        common.find()?;

        if common.is_marked(commit, Flags::PARENT2) {
            redundant.insert(*commit);
        }
        for oid in others {
            if common.is_marked(&oid, Flags::PARENT1) {
                redundant.insert(oid);
            }
        }
        Ok(())
    }
}
