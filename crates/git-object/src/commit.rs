use bstr::{BString, ByteSlice};
use git_hash::ObjectId;
use git_utils::date::GitDate;

use crate::{Author, ObjectError};

/// A commit: a tree snapshot plus its parents, identities and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    /// Empty for a root commit, two or more for merges.
    pub parents: Vec<ObjectId>,
    pub author: Author,
    pub committer: Author,
    /// Everything after the blank line, verbatim.
    pub message: BString,
}

impl Commit {
    /// A commit whose committer is its author.
    pub fn new(
        parents: Vec<ObjectId>,
        tree: ObjectId,
        author: Author,
        message: impl Into<BString>,
    ) -> Self {
        Self {
            tree,
            parents,
            committer: author.clone(),
            author,
            message: message.into(),
        }
    }

    pub fn with_committer(mut self, committer: Author) -> Self {
        self.committer = committer;
        self
    }

    /// Parse header lines up to the first blank line; the rest is the message.
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut pos = 0;

        while pos < content.len() {
            let end = content[pos..]
                .find_byte(b'\n')
                .map_or(content.len(), |i| pos + i);
            let line = &content[pos..end];
            pos = end + 1;

            if line.is_empty() {
                break;
            }
            let (key, value) = match line.find_byte(b' ') {
                Some(sp) => (&line[..sp], &line[sp + 1..]),
                None => (line, &b""[..]),
            };
            match key {
                b"tree" => tree = Some(parse_oid(value)?),
                b"parent" => parents.push(parse_oid(value)?),
                b"author" => author = Some(Author::parse(value)?),
                b"committer" => committer = Some(Author::parse(value)?),
                _ => {}
            }
        }

        let author = author.ok_or(ObjectError::MissingCommitField { field: "author" })?;
        Ok(Self {
            tree: tree.ok_or(ObjectError::MissingCommitField { field: "tree" })?,
            parents,
            committer: committer.unwrap_or_else(|| author.clone()),
            author,
            message: BString::from(content.get(pos..).unwrap_or_default()),
        })
    }

    pub fn serialize_content(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + self.message.len());
        out.extend_from_slice(format!("tree {}\n", self.tree).as_bytes());
        for parent in &self.parents {
            out.extend_from_slice(format!("parent {parent}\n").as_bytes());
        }
        out.extend_from_slice(b"author ");
        out.extend_from_slice(&self.author.to_bytes());
        out.extend_from_slice(b"\ncommitter ");
        out.extend_from_slice(&self.committer.to_bytes());
        out.extend_from_slice(b"\n\n");
        out.extend_from_slice(&self.message);
        out
    }

    /// First parent, if any.
    pub fn parent(&self) -> Option<ObjectId> {
        self.parents.first().copied()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// First line of the message, without its newline.
    pub fn title_line(&self) -> BString {
        let first = self.message.lines().next().unwrap_or_default();
        BString::from(first)
    }

    /// Ordering key for history walks: the author time.
    pub fn date(&self) -> GitDate {
        self.author.time
    }
}

fn parse_oid(value: &[u8]) -> Result<ObjectId, ObjectError> {
    let hex = std::str::from_utf8(value)
        .map_err(|_| ObjectError::InvalidHeader("non-ASCII object id".into()))?;
    Ok(ObjectId::from_hex(hex.trim())?)
}
