//! Three-way text merge.
//!
//! Both sides are diffed against the base. Walking the three documents in
//! lockstep, runs of lines that every side agrees on are stable; the regions
//! between them are taken from whichever side changed, or become a conflict
//! when both changed differently.

use std::collections::HashMap;

use bstr::ByteSlice;

use crate::{myers, number_lines, EditKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk<'a> {
    Clean(Vec<&'a [u8]>),
    Conflict {
        o_lines: Vec<&'a [u8]>,
        a_lines: Vec<&'a [u8]>,
        b_lines: Vec<&'a [u8]>,
    },
}

impl Chunk<'_> {
    fn write_to(&self, out: &mut Vec<u8>, a_name: Option<&str>, b_name: Option<&str>) {
        match self {
            Chunk::Clean(lines) => lines.iter().for_each(|line| out.extend_from_slice(line)),
            Chunk::Conflict { a_lines, b_lines, .. } => {
                separator(out, '<', a_name);
                write_side(out, a_lines);
                separator(out, '=', None);
                write_side(out, b_lines);
                separator(out, '>', b_name);
            }
        }
    }
}

/// A conflict side's lines, newline-terminated so the next marker starts
/// its own line.
fn write_side(out: &mut Vec<u8>, lines: &[&[u8]]) {
    lines.iter().for_each(|line| out.extend_from_slice(line));
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }
}

fn separator(out: &mut Vec<u8>, marker: char, name: Option<&str>) {
    out.extend(std::iter::repeat(marker as u8).take(7));
    if let Some(name) = name {
        out.push(b' ');
        out.extend_from_slice(name.as_bytes());
    }
    out.push(b'\n');
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff3Result<'a> {
    pub chunks: Vec<Chunk<'a>>,
}

impl Diff3Result<'_> {
    pub fn is_clean(&self) -> bool {
        !self.chunks.iter().any(|chunk| matches!(chunk, Chunk::Conflict { .. }))
    }

    /// The merged text, conflicts wrapped in markers labelled with the
    /// optional side names.
    pub fn to_bytes(&self, a_name: Option<&str>, b_name: Option<&str>) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in &self.chunks {
            chunk.write_to(&mut out, a_name, b_name);
        }
        out
    }
}

/// Merge two edits `a` and `b` of the document `o`.
pub fn merge<'a>(o: &'a [u8], a: &'a [u8], b: &'a [u8]) -> Diff3Result<'a> {
    merge_lines(
        &o.lines_with_terminator().collect::<Vec<_>>(),
        &a.lines_with_terminator().collect::<Vec<_>>(),
        &b.lines_with_terminator().collect::<Vec<_>>(),
    )
}

/// [`merge`] over documents already split into lines.
pub fn merge_lines<'a>(o: &[&'a [u8]], a: &[&'a [u8]], b: &[&'a [u8]]) -> Diff3Result<'a> {
    let mut merger = Merger {
        match_a: match_set(o, a),
        match_b: match_set(o, b),
        o,
        a,
        b,
        line_o: 0,
        line_a: 0,
        line_b: 0,
        chunks: Vec::new(),
    };
    merger.generate_chunks();
    Diff3Result {
        chunks: merger.chunks,
    }
}

/// Base line number → matching line number in `file`, both 1-based.
fn match_set(o: &[&[u8]], file: &[&[u8]]) -> HashMap<usize, usize> {
    let o = number_lines(o.iter().copied());
    let file = number_lines(file.iter().copied());
    myers::diff(&o, &file)
        .into_iter()
        .filter(|edit| edit.kind == EditKind::Eql)
        .filter_map(|edit| Some((edit.a_line?.number, edit.b_line?.number)))
        .collect()
}

struct Merger<'m, 'a> {
    o: &'m [&'a [u8]],
    a: &'m [&'a [u8]],
    b: &'m [&'a [u8]],
    match_a: HashMap<usize, usize>,
    match_b: HashMap<usize, usize>,
    line_o: usize,
    line_a: usize,
    line_b: usize,
    chunks: Vec<Chunk<'a>>,
}

impl<'a> Merger<'_, 'a> {
    fn generate_chunks(&mut self) {
        loop {
            match self.find_next_mismatch() {
                Some(1) => match self.find_next_match() {
                    (o, Some(a), Some(b)) => self.emit_chunk(o, a, b),
                    _ => return self.emit_final_chunk(),
                },
                Some(i) => self.emit_chunk(self.line_o + i, self.line_a + i, self.line_b + i),
                None => return self.emit_final_chunk(),
            }
        }
    }

    /// Distance to the first line where a side departs from the base.
    fn find_next_mismatch(&self) -> Option<usize> {
        let mut i = 1;
        while self.in_bounds(i)
            && matches_at(&self.match_a, self.line_o, self.line_a, i)
            && matches_at(&self.match_b, self.line_o, self.line_b, i)
        {
            i += 1;
        }
        self.in_bounds(i).then_some(i)
    }

    fn in_bounds(&self, i: usize) -> bool {
        self.line_o + i <= self.o.len()
            || self.line_a + i <= self.a.len()
            || self.line_b + i <= self.b.len()
    }

    /// The next base line both sides kept, with where each side has it.
    fn find_next_match(&self) -> (usize, Option<usize>, Option<usize>) {
        let mut o = self.line_o + 1;
        while o <= self.o.len() && !(self.match_a.contains_key(&o) && self.match_b.contains_key(&o)) {
            o += 1;
        }
        (o, self.match_a.get(&o).copied(), self.match_b.get(&o).copied())
    }

    fn emit_chunk(&mut self, o: usize, a: usize, b: usize) {
        let (docs_o, docs_a, docs_b) = (self.o, self.a, self.b);
        self.write_chunk(
            &docs_o[self.line_o..o - 1],
            &docs_a[self.line_a..a - 1],
            &docs_b[self.line_b..b - 1],
        );
        self.line_o = o - 1;
        self.line_a = a - 1;
        self.line_b = b - 1;
    }

    fn emit_final_chunk(&mut self) {
        let (docs_o, docs_a, docs_b) = (self.o, self.a, self.b);
        self.write_chunk(
            &docs_o[self.line_o..],
            &docs_a[self.line_a..],
            &docs_b[self.line_b..],
        );
    }

    fn write_chunk(&mut self, o: &[&'a [u8]], a: &[&'a [u8]], b: &[&'a [u8]]) {
        let chunk = if a == o || a == b {
            Chunk::Clean(b.to_vec())
        } else if b == o {
            Chunk::Clean(a.to_vec())
        } else {
            Chunk::Conflict {
                o_lines: o.to_vec(),
                a_lines: a.to_vec(),
                b_lines: b.to_vec(),
            }
        };
        self.chunks.push(chunk);
    }
}

fn matches_at(matches: &HashMap<usize, usize>, line_o: usize, offset: usize, i: usize) -> bool {
    matches.get(&(line_o + i)) == Some(&(offset + i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(result: &Diff3Result<'_>) -> String {
        String::from_utf8(result.to_bytes(None, None)).unwrap()
    }

    #[test]
    fn merges_changes_on_both_sides() {
        let result = merge(b"a\nb\nc\n", b"d\nb\nc\n", b"a\nb\ne\n");
        assert!(result.is_clean());
        assert_eq!(render(&result), "d\nb\ne\n");
    }

    #[test]
    fn identical_edits_are_clean() {
        let result = merge(b"a\nb\nc\n", b"d\nb\nc\n", b"d\nb\ne\n");
        assert!(result.is_clean());
        assert_eq!(render(&result), "d\nb\ne\n");
    }

    #[test]
    fn conflicting_edits_get_markers() {
        let result = merge(b"a\nb\nc\n", b"d\nb\nc\n", b"e\nb\nc\n");
        assert!(!result.is_clean());
        assert_eq!(render(&result), "<<<<<<<\nd\n=======\ne\n>>>>>>>\nb\nc\n");
    }

    #[test]
    fn conflict_against_an_empty_base() {
        let result = merge(b"", b"d\nb\nc\n", b"e\nb\nc\n");
        assert!(!result.is_clean());
        assert_eq!(render(&result), "<<<<<<<\nd\nb\nc\n=======\ne\nb\nc\n>>>>>>>\n");
    }

    #[test]
    fn markers_carry_side_names() {
        let result = merge(b"a\nb\nc\n", b"d\nb\nc\n", b"e\nb\nc\n");
        let text = result.to_bytes(Some("left"), Some("right"));
        assert_eq!(
            text.as_bstr(),
            "<<<<<<< left\nd\n=======\ne\n>>>>>>> right\nb\nc\n"
        );
    }

    #[test]
    fn missing_final_newline_is_added_inside_markers() {
        let result = merge(b"a\n", b"a\nleft", b"a\nright");
        assert!(!result.is_clean());
        assert_eq!(render(&result), "a\n<<<<<<<\nleft\n=======\nright\n>>>>>>>\n");
    }

    #[test]
    fn one_sided_change_equals_that_side() {
        let base = b"one\ntwo\nthree\nfour\n";
        let changed = b"one\n2\nthree\nfour\nfive\n";
        assert_eq!(merge(base, changed, base).to_bytes(None, None), changed);
        assert_eq!(merge(base, base, changed).to_bytes(None, None), changed);
    }
}
