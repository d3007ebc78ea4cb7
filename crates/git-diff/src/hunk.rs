//! Grouping edit scripts into unified-diff hunks.

use crate::{Edit, EditKind, Line};

/// Lines of unchanged context kept around each change.
pub const CONTEXT: usize = 3;

/// Anything a hunk can be built from: a plain [`Edit`], or a combined
/// [`Row`](crate::Row) with one old line per parent.
pub trait Change<'a>: Clone {
    fn kind(&self) -> EditKind;

    /// The old line on each parent's side.
    fn a_lines(&self) -> Vec<Option<Line<'a>>>;

    fn b_line(&self) -> Option<Line<'a>>;
}

impl<'a> Change<'a> for Edit<'a> {
    fn kind(&self) -> EditKind {
        self.kind
    }

    fn a_lines(&self) -> Vec<Option<Line<'a>>> {
        vec![self.a_line]
    }

    fn b_line(&self) -> Option<Line<'a>> {
        self.b_line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk<E> {
    /// Line each old side starts at, used when the hunk has no old lines.
    pub a_starts: Vec<Option<usize>>,
    pub b_start: Option<usize>,
    pub edits: Vec<E>,
}

/// Split `edits` into hunks, each change surrounded by [`CONTEXT`] lines.
/// Changes whose context windows touch share one hunk.
pub fn filter<'a, E: Change<'a>>(edits: &[E]) -> Vec<Hunk<E>> {
    let len = edits.len() as isize;
    let context = CONTEXT as isize;
    let mut hunks = Vec::new();
    let mut offset: isize = 0;

    loop {
        while offset < len && edits[offset as usize].kind() == EditKind::Eql {
            offset += 1;
        }
        if offset >= len {
            return hunks;
        }

        offset -= context + 1;
        let (a_starts, b_start) = match usize::try_from(offset).ok().map(|at| &edits[at]) {
            Some(edit) => (
                edit.a_lines().iter().map(|line| line.map(|l| l.number)).collect(),
                edit.b_line().map(|l| l.number),
            ),
            None => (Vec::new(), None),
        };
        let mut hunk = Hunk {
            a_starts,
            b_start,
            edits: Vec::new(),
        };
        offset = build(&mut hunk, edits, offset);
        hunks.push(hunk);
    }
}

/// Fill `hunk` from `offset` until [`CONTEXT`] lines follow the last change.
fn build<'a, E: Change<'a>>(hunk: &mut Hunk<E>, edits: &[E], mut offset: isize) -> isize {
    let len = edits.len() as isize;
    let context = CONTEXT as isize;
    let mut counter: isize = -1;

    while counter != 0 {
        if offset >= 0 && counter > 0 {
            hunk.edits.push(edits[offset as usize].clone());
        }
        offset += 1;
        if offset >= len {
            break;
        }
        match edits.get((offset + context) as usize).map(Change::kind) {
            Some(EditKind::Ins | EditKind::Del) => counter = 2 * context + 1,
            _ => counter -= 1,
        }
    }
    offset
}

impl<'a, E: Change<'a>> Hunk<E> {
    /// `@@ -a,b +c,d @@`, or with one `-` range per parent and a matching
    /// number of `@` for combined hunks.
    pub fn header(&self) -> String {
        let parents = self
            .edits
            .first()
            .map_or(self.a_starts.len().max(1), |edit| edit.a_lines().len());

        let mut offsets = Vec::with_capacity(parents + 1);
        for i in 0..parents {
            let lines: Vec<Line<'a>> = self
                .edits
                .iter()
                .filter_map(|edit| edit.a_lines().get(i).copied().flatten())
                .collect();
            let start = self.a_starts.get(i).copied().flatten();
            offsets.push(format_range('-', &lines, start));
        }
        let lines: Vec<Line<'a>> = self.edits.iter().filter_map(Change::b_line).collect();
        offsets.push(format_range('+', &lines, self.b_start));

        let sep = "@".repeat(offsets.len());
        format!("{sep} {} {sep}", offsets.join(" "))
    }
}

fn format_range(sign: char, lines: &[Line<'_>], start: Option<usize>) -> String {
    let start = lines.first().map(|l| l.number).or(start).unwrap_or(0);
    format!("{sign}{start},{}", lines.len())
}
