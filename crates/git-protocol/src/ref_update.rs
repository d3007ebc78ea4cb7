//! Ref updates carried out (or refused) by fetch and push, and the
//! fast-forward rule they are checked against.

use git_hash::ObjectId;
use git_odb::Database;
use git_ref::Refs;
use git_revwalk::merge_base::Flags;
use git_revwalk::CommonAncestors;

use crate::ProtocolError;

/// Why moving a ref from `old` to `new` would lose commits, if it would.
///
/// Creating or deleting a ref is always a fast-forward. When `old` is not
/// in `db` the other side has moved on: `fetch first`.
pub fn fast_forward_error(
    db: &Database,
    old: Option<&ObjectId>,
    new: Option<&ObjectId>,
) -> Result<Option<String>, ProtocolError> {
    let (Some(old), Some(new)) = (old, new) else {
        return Ok(None);
    };
    if !db.has(old) {
        return Ok(Some("fetch first".into()));
    }
    let mut common = CommonAncestors::new(db, old, &[*new])?;
    common.find()?;
    if !common.is_marked(old, Flags::PARENT2) {
        return Ok(Some("non-fast-forward".into()));
    }
    Ok(None)
}

/// One ref on the receiving side, and what became of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdate {
    /// The ref the value came from; `None` for a deletion.
    pub source: Option<String>,
    pub target: String,
    pub old: Option<ObjectId>,
    pub new: Option<ObjectId>,
    /// Whether `old` is an ancestor of `new`.
    pub fast_forward: bool,
    /// Why the update was refused.
    pub error: Option<String>,
}

impl RefUpdate {
    pub fn is_rejected(&self) -> bool {
        self.error.is_some()
    }

    /// The summary line `git fetch` and `git push` print for this ref, or
    /// `None` when the ref did not change.
    ///
    /// ```text
    ///  * [new branch] main -> origin/main
    ///    3a1f2c4..8e9d0b1 main -> origin/main
    ///  + 3a1f2c4...5c6d7e8 topic -> origin/topic (forced update)
    ///  ! [rejected] main -> main (non-fast-forward)
    /// ```
    pub fn summary(&self, db: &Database) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(self.line('!', "[rejected]", Some(error)));
        }
        match (&self.old, &self.new) {
            (old, new) if old == new => None,
            (None, _) => Some(self.line('*', "[new branch]", None)),
            (_, None) => Some(self.line('-', "[deleted]", None)),
            (Some(old), Some(new)) => {
                let (old, new) = (db.short_oid(old), db.short_oid(new));
                Some(if self.fast_forward {
                    self.line(' ', &format!("{old}..{new}"), None)
                } else {
                    self.line('+', &format!("{old}...{new}"), Some("forced update"))
                })
            }
        }
    }

    fn line(&self, flag: char, summary: &str, reason: Option<&str>) -> String {
        let names: Vec<&str> = self
            .source
            .iter()
            .chain(std::iter::once(&self.target))
            .map(|name| Refs::short_name(name))
            .collect();
        let mut line = format!(" {flag} {summary} {}", names.join(" -> "));
        if let Some(reason) = reason {
            line.push_str(&format!(" ({reason})"));
        }
        line
    }
}
