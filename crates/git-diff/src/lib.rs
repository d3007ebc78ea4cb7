//! Line-level diffing.
//!
//! [`myers`] computes the shortest edit script between two documents,
//! [`hunk`] groups it into unified-diff hunks, [`diff3`] merges two edits of
//! a common base, and [`combined`] interleaves several scripts that share a
//! target for merge-commit display.

pub mod combined;
pub mod diff3;
pub mod hunk;
pub mod myers;

use std::fmt;

use bstr::ByteSlice;

pub use combined::Row;
pub use diff3::{Chunk, Diff3Result};
pub use hunk::Hunk;

/// One line of a document, numbered from 1. `text` keeps its terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    pub number: usize,
    pub text: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKind {
    Eql,
    Ins,
    Del,
}

impl EditKind {
    pub fn symbol(&self) -> char {
        match self {
            Self::Eql => ' ',
            Self::Ins => '+',
            Self::Del => '-',
        }
    }
}

/// A step of an edit script. `Eql` carries both lines, `Ins` only the new
/// one and `Del` only the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit<'a> {
    pub kind: EditKind,
    pub a_line: Option<Line<'a>>,
    pub b_line: Option<Line<'a>>,
}

impl<'a> Edit<'a> {
    pub fn equal(a_line: Line<'a>, b_line: Line<'a>) -> Self {
        Self {
            kind: EditKind::Eql,
            a_line: Some(a_line),
            b_line: Some(b_line),
        }
    }

    pub fn insert(b_line: Line<'a>) -> Self {
        Self {
            kind: EditKind::Ins,
            a_line: None,
            b_line: Some(b_line),
        }
    }

    pub fn delete(a_line: Line<'a>) -> Self {
        Self {
            kind: EditKind::Del,
            a_line: Some(a_line),
            b_line: None,
        }
    }

    pub fn text(&self) -> &'a [u8] {
        self.a_line.or(self.b_line).map_or(&[][..], |line| line.text)
    }
}

impl fmt::Display for Edit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.symbol(), self.text().as_bstr())
    }
}

/// Split a document into numbered lines, terminators included.
pub fn lines(document: &[u8]) -> Vec<Line<'_>> {
    number_lines(document.lines_with_terminator())
}

/// Number pre-split items from 1.
pub fn number_lines<'a>(items: impl IntoIterator<Item = &'a [u8]>) -> Vec<Line<'a>> {
    items
        .into_iter()
        .enumerate()
        .map(|(i, text)| Line { number: i + 1, text })
        .collect()
}

/// Edit script turning document `a` into `b`.
pub fn diff<'a>(a: &'a [u8], b: &'a [u8]) -> Vec<Edit<'a>> {
    myers::diff(&lines(a), &lines(b))
}

/// Unified hunks, with three lines of context, turning `a` into `b`.
pub fn diff_hunks<'a>(a: &'a [u8], b: &'a [u8]) -> Vec<Hunk<Edit<'a>>> {
    hunk::filter(&diff(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_keep_terminators() {
        let lines = lines(b"one\ntwo\nthree");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], Line { number: 1, text: b"one\n" });
        assert_eq!(lines[2], Line { number: 3, text: b"three" });
        assert!(super::lines(b"").is_empty());
    }

    #[test]
    fn edits_display_with_their_symbol() {
        let line = Line { number: 4, text: b"fox" };
        assert_eq!(Edit::insert(line).to_string(), "+fox");
        assert_eq!(Edit::delete(line).to_string(), "-fox");
        assert_eq!(Edit::equal(line, line).to_string(), " fox");
    }
}
