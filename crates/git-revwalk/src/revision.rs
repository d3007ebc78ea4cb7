//! Revision expressions: `main`, `HEAD^2`, `@~3`, `topic@{upstream}`, full
//! or abbreviated object ids, and combinations like `@~2^^~3`.

use git_config::ConfigStack;
use git_hash::ObjectId;
use git_object::{Object, ObjectType};
use git_ref::{Refs, Refspec};
use git_repository::Repository;
use regex::Regex;

use crate::RevWalkError;

pub const HEAD: &str = "HEAD";

const INVALID_NAME: &str = r"^\.|/\.|\.\.|^/|/$|\.lock$|@\{|[\x00-\x20*:?\[\\^~\x7f]";
const PARENT: &str = r"^(.+)\^(\d*)$";
const ANCESTOR: &str = r"^(.+)~(\d+)$";
const UPSTREAM: &str = r"(?i)^(.*)@\{u(pstream)?\}$";

/// Parsed form of a revision expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rev {
    Ref(String),
    /// The n-th parent; `^0` is the commit itself.
    Parent(Box<Rev>, usize),
    /// Follow first parents n times.
    Ancestor(Box<Rev>, usize),
    /// The remote-tracking branch a local branch merges from.
    Upstream(Box<Rev>),
}

struct Patterns {
    invalid_name: Regex,
    parent: Regex,
    ancestor: Regex,
    upstream: Regex,
}

impl Patterns {
    fn new() -> Result<Self, RevWalkError> {
        Ok(Self {
            invalid_name: Regex::new(INVALID_NAME)?,
            parent: Regex::new(PARENT)?,
            ancestor: Regex::new(ANCESTOR)?,
            upstream: Regex::new(UPSTREAM)?,
        })
    }

    fn parse(&self, expr: &str) -> Option<Rev> {
        if let Some(caps) = self.parent.captures(expr) {
            let rev = self.parse(&caps[1])?;
            let n = match &caps[2] {
                "" => 1,
                digits => digits.parse().ok()?,
            };
            Some(Rev::Parent(Box::new(rev), n))
        } else if let Some(caps) = self.ancestor.captures(expr) {
            let rev = self.parse(&caps[1])?;
            Some(Rev::Ancestor(Box::new(rev), caps[2].parse().ok()?))
        } else if let Some(caps) = self.upstream.captures(expr) {
            let rev = self.parse(&caps[1])?;
            Some(Rev::Upstream(Box::new(rev)))
        } else if self.invalid_name.is_match(expr) {
            None
        } else {
            let name = match expr {
                "@" | "" => HEAD,
                name => name,
            };
            Some(Rev::Ref(name.to_owned()))
        }
    }
}

impl Rev {
    /// `None` when the expression is not valid revision syntax.
    pub fn parse(expr: &str) -> Result<Option<Rev>, RevWalkError> {
        Ok(Patterns::new()?.parse(expr))
    }
}

/// A revision expression bound to the repository it is resolved in.
pub struct Revision<'r> {
    repo: &'r Repository,
    expr: String,
    query: Option<Rev>,
    hints: Vec<String>,
}

impl<'r> Revision<'r> {
    pub fn new(repo: &'r Repository, expr: &str) -> Result<Self, RevWalkError> {
        Ok(Self {
            repo,
            expr: expr.to_owned(),
            query: Rev::parse(expr)?,
            hints: Vec::new(),
        })
    }

    /// The object the expression names, which must be of `kind` when given.
    pub fn resolve(&mut self, kind: Option<ObjectType>) -> Result<ObjectId, RevWalkError> {
        let Some(query) = self.query.clone() else {
            return Err(RevWalkError::InvalidName(self.expr.clone()));
        };
        let mut oid = self.evaluate(&query)?;
        if let (Some(found), Some(kind)) = (oid, kind) {
            if self.load_typed(&found, kind)?.is_none() {
                oid = None;
            }
        }
        oid.ok_or_else(|| RevWalkError::InvalidObject {
            expr: self.expr.clone(),
            hints: std::mem::take(&mut self.hints),
        })
    }

    /// Shorthand for resolving to a commit.
    pub fn resolve_commit(&mut self) -> Result<ObjectId, RevWalkError> {
        self.resolve(Some(ObjectType::Commit))
    }

    fn evaluate(&mut self, rev: &Rev) -> Result<Option<ObjectId>, RevWalkError> {
        match rev {
            Rev::Ref(name) => self.read_ref(name),
            Rev::Parent(rev, n) => {
                let oid = self.evaluate(rev)?;
                self.commit_parent(oid, *n)
            }
            Rev::Ancestor(rev, n) => {
                let mut oid = self.evaluate(rev)?;
                for _ in 0..*n {
                    oid = self.commit_parent(oid, 1)?;
                }
                Ok(oid)
            }
            Rev::Upstream(rev) => {
                let Rev::Ref(branch) = rev.as_ref() else {
                    return Ok(None);
                };
                match self.upstream(branch)? {
                    Some(name) => self.read_ref(&name),
                    None => Ok(None),
                }
            }
        }
    }

    fn commit_parent(&mut self, oid: Option<ObjectId>, n: usize) -> Result<Option<ObjectId>, RevWalkError> {
        let Some(oid) = oid else {
            return Ok(None);
        };
        let Some(object) = self.load_typed(&oid, ObjectType::Commit)? else {
            return Ok(None);
        };
        if n == 0 {
            return Ok(Some(oid));
        }
        Ok(object
            .as_commit()
            .and_then(|commit| commit.parents.get(n - 1).copied()))
    }

    /// A ref by name, or else an object id prefix that matches exactly one
    /// object.
    fn read_ref(&self, name: &str) -> Result<Option<ObjectId>, RevWalkError> {
        if let Some(oid) = self.repo.refs().read_ref(name)? {
            return Ok(Some(oid));
        }
        let candidates = self.repo.database().prefix_match(name)?;
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(candidates.first().copied()),
            _ => Err(self.ambiguous(name, candidates)?),
        }
    }

    fn ambiguous(&self, name: &str, mut candidates: Vec<ObjectId>) -> Result<RevWalkError, RevWalkError> {
        let db = self.repo.database();
        candidates.sort();
        let mut lines = Vec::with_capacity(candidates.len());
        for oid in &candidates {
            let object = db.load(oid)?;
            let mut line = format!("  {} {}", db.short_oid(oid), object.object_type().as_str());
            if let Some(commit) = object.as_commit() {
                line += &format!(" {} - {}", commit.author.time.short_date(), commit.title_line());
            }
            lines.push(line);
        }
        tracing::debug!(name, count = lines.len(), "ambiguous object name");
        Ok(RevWalkError::AmbiguousOid {
            name: name.to_owned(),
            candidates: lines,
        })
    }

    /// The ref that `branch` tracks, per `branch.<name>.remote`,
    /// `branch.<name>.merge` and the remote's fetch refspecs.
    fn upstream(&self, branch: &str) -> Result<Option<String>, RevWalkError> {
        let refs: &Refs = self.repo.refs();
        let branch = if branch == HEAD {
            refs.current_ref(HEAD)?.short_name().to_owned()
        } else {
            branch.to_owned()
        };

        let mut config = ConfigStack::new(self.repo.git_dir());
        let Some(remote) = config.get_string(&format!("branch.{branch}.remote"))? else {
            return Ok(None);
        };
        let Some(merge) = config.get_string(&format!("branch.{branch}.merge"))? else {
            return Ok(None);
        };
        let specs: Vec<String> = config
            .get_all(&format!("remote.{remote}.fetch"))?
            .iter()
            .map(ToString::to_string)
            .collect();
        Ok(Refspec::expand(&specs, &[merge]).into_keys().next())
    }

    fn load_typed(&mut self, oid: &ObjectId, kind: ObjectType) -> Result<Option<std::sync::Arc<Object>>, RevWalkError> {
        let object = self.repo.database().load(oid)?;
        let actual = object.object_type();
        if actual == kind {
            return Ok(Some(object));
        }
        self.hints.push(format!("object {oid} is a {}, not a {}", actual.as_str(), kind.as_str()));
        Ok(None)
    }
}
