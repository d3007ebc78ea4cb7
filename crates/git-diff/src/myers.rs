//! Myers' O((N+M)D) shortest edit script.
//!
//! The forward pass records the furthest-reaching `x` on every diagonal
//! `k = x - y` for each edit distance `d`, keeping a snapshot per round. The
//! backward pass walks those snapshots from the end, yielding moves in
//! reverse. The choice between stepping down (from `k + 1`) and right (from
//! `k - 1`) is fixed so that hunks come out byte-identical to git's.

use crate::{Edit, Line};

/// The edit script turning `a` into `b`, in document order.
pub fn diff<'a>(a: &[Line<'a>], b: &[Line<'a>]) -> Vec<Edit<'a>> {
    let mut edits = Vec::with_capacity(a.len().max(b.len()));
    backtrack(a, b, |prev_x, prev_y, x, y| {
        if x == prev_x {
            edits.push(Edit::insert(b[prev_y]));
        } else if y == prev_y {
            edits.push(Edit::delete(a[prev_x]));
        } else {
            edits.push(Edit::equal(a[prev_x], b[prev_y]));
        }
    });
    edits.reverse();
    edits
}

/// Frontier of furthest `x` per diagonal, indexed from `-max - 1`.
#[derive(Clone)]
struct Frontier {
    v: Vec<isize>,
    max: isize,
}

impl Frontier {
    fn new(max: usize) -> Self {
        Self {
            v: vec![0; 2 * max + 3],
            max: max as isize,
        }
    }

    fn get(&self, k: isize) -> isize {
        self.v[(k + self.max + 1) as usize]
    }

    fn set(&mut self, k: isize, x: isize) {
        self.v[(k + self.max + 1) as usize] = x;
    }

    fn moves_down(&self, k: isize, d: isize) -> bool {
        k == -d || (k != d && self.get(k - 1) < self.get(k + 1))
    }
}

fn shortest_edit(a: &[Line<'_>], b: &[Line<'_>]) -> Vec<Frontier> {
    let (n, m) = (a.len() as isize, b.len() as isize);
    let max = a.len() + b.len();

    let mut v = Frontier::new(max);
    let mut trace = Vec::new();

    for d in 0..=max as isize {
        trace.push(v.clone());

        for k in (-d..=d).step_by(2) {
            let mut x = if v.moves_down(k, d) {
                v.get(k + 1)
            } else {
                v.get(k - 1) + 1
            };
            let mut y = x - k;

            while x < n && y < m && a[x as usize].text == b[y as usize].text {
                x += 1;
                y += 1;
            }
            v.set(k, x);

            if x >= n && y >= m {
                return trace;
            }
        }
    }
    trace
}

fn backtrack(a: &[Line<'_>], b: &[Line<'_>], mut step: impl FnMut(usize, usize, usize, usize)) {
    let (mut x, mut y) = (a.len() as isize, b.len() as isize);

    for (d, v) in shortest_edit(a, b).iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let prev_k = if v.moves_down(k, d) { k + 1 } else { k - 1 };
        let prev_x = v.get(prev_k);
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            step((x - 1) as usize, (y - 1) as usize, x as usize, y as usize);
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            step(prev_x as usize, prev_y as usize, x as usize, y as usize);
        }
        x = prev_x;
        y = prev_y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{number_lines, EditKind};

    fn chars(s: &str) -> Vec<&[u8]> {
        s.as_bytes().chunks(1).collect()
    }

    #[test]
    fn classic_example() {
        let a = number_lines(chars("ABCABBA"));
        let b = number_lines(chars("CBABAC"));
        let edits: Vec<String> = diff(&a, &b).iter().map(ToString::to_string).collect();
        assert_eq!(edits, ["-A", "-B", " C", "+B", " A", " B", "-B", " A", "+C"]);
    }

    #[test]
    fn empty_inputs() {
        assert!(diff(&[], &[]).is_empty());

        let b = number_lines(chars("xy"));
        let edits = diff(&[], &b);
        assert!(edits.iter().all(|e| e.kind == EditKind::Ins));
        assert_eq!(edits.len(), 2);

        let edits = diff(&b, &[]);
        assert!(edits.iter().all(|e| e.kind == EditKind::Del));
    }

    #[test]
    fn line_numbers_are_carried() {
        let a = number_lines(chars("ab"));
        let b = number_lines(chars("b"));
        let edits = diff(&a, &b);
        assert_eq!(edits[0].a_line.map(|l| l.number), Some(1));
        assert_eq!(edits[1].a_line.map(|l| l.number), Some(2));
        assert_eq!(edits[1].b_line.map(|l| l.number), Some(1));
    }
}
