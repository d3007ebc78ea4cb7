//! Combined diffs: several edit scripts against one target, shown side by
//! side with a symbol column per parent.

use std::fmt;

use bstr::ByteSlice;

use crate::hunk::Change;
use crate::{Edit, EditKind, Line};

/// One output line of a combined diff. `edits[i]` is parent `i`'s edit, or
/// `None` when that parent has nothing at this row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row<'a> {
    pub edits: Vec<Option<Edit<'a>>>,
}

impl<'a> Row<'a> {
    fn text(&self) -> &'a [u8] {
        let deleted = self
            .edits
            .iter()
            .flatten()
            .find(|edit| edit.kind == EditKind::Del)
            .and_then(|edit| edit.a_line);
        deleted
            .or_else(|| self.b_line())
            .map_or(&[][..], |line| line.text)
    }
}

impl<'a> Change<'a> for Row<'a> {
    /// An insertion on any side makes the row an insertion.
    fn kind(&self) -> EditKind {
        let mut kinds = self.edits.iter().flatten().map(|edit| edit.kind);
        let first = kinds.next().unwrap_or(EditKind::Eql);
        if first == EditKind::Ins || kinds.any(|kind| kind == EditKind::Ins) {
            EditKind::Ins
        } else {
            first
        }
    }

    fn a_lines(&self) -> Vec<Option<Line<'a>>> {
        self.edits
            .iter()
            .map(|edit| edit.and_then(|edit| edit.a_line))
            .collect()
    }

    fn b_line(&self) -> Option<Line<'a>> {
        self.edits.first().copied().flatten().and_then(|edit| edit.b_line)
    }
}

impl fmt::Display for Row<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for edit in &self.edits {
            let symbol = edit.map_or(' ', |edit| edit.kind.symbol());
            write!(f, "{symbol}")?;
        }
        write!(f, "{}", self.text().as_bstr())
    }
}

/// Interleave `diffs`, each turning a different parent into the same
/// target. Deletions are emitted on their own rows, parent by parent, before
/// the next shared target line.
pub fn rows<'a>(diffs: &[Vec<Edit<'a>>]) -> Vec<Row<'a>> {
    let mut offsets = vec![0; diffs.len()];
    let mut rows = Vec::new();

    loop {
        for (i, diff) in diffs.iter().enumerate() {
            while let Some(edit) = diff.get(offsets[i]).filter(|e| e.kind == EditKind::Del) {
                let mut edits = vec![None; diffs.len()];
                edits[i] = Some(*edit);
                offsets[i] += 1;
                rows.push(Row { edits });
            }
        }

        if offsets.iter().zip(diffs).all(|(offset, diff)| *offset == diff.len()) {
            return rows;
        }

        let edits = offsets
            .iter()
            .zip(diffs)
            .map(|(offset, diff)| diff.get(*offset).copied())
            .collect();
        offsets.iter_mut().for_each(|offset| *offset += 1);
        rows.push(Row { edits });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{hunk, myers, number_lines};

    fn lines(items: &[&'static str]) -> Vec<Line<'static>> {
        number_lines(items.iter().map(|s| s.as_bytes()))
    }

    #[test]
    fn rows_show_one_column_per_parent() {
        let merged = lines(&["a", "left", "right", "z"]);
        let left = lines(&["a", "left", "z"]);
        let right = lines(&["a", "right", "z"]);
        let diffs = vec![myers::diff(&left, &merged), myers::diff(&right, &merged)];

        let rows: Vec<String> = rows(&diffs).iter().map(ToString::to_string).collect();
        assert_eq!(rows, ["  a", " +left", "+ right", "  z"]);
    }

    #[test]
    fn deletions_come_before_the_shared_line() {
        let merged = lines(&["a", "z"]);
        let left = lines(&["a", "gone", "z"]);
        let right = lines(&["a", "z"]);
        let diffs = vec![myers::diff(&left, &merged), myers::diff(&right, &merged)];

        let rows: Vec<String> = rows(&diffs).iter().map(ToString::to_string).collect();
        assert_eq!(rows, ["  a", "- gone", "  z"]);
    }

    #[test]
    fn combined_hunk_header_has_a_range_per_parent() {
        let merged = lines(&["a", "left", "right", "z"]);
        let left = lines(&["a", "left", "z"]);
        let right = lines(&["a", "right", "z"]);
        let diffs = vec![myers::diff(&left, &merged), myers::diff(&right, &merged)];

        let hunks = hunk::filter(&rows(&diffs));
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].header(), "@@@ -1,3 -1,3 +1,4 @@@");
    }
}
