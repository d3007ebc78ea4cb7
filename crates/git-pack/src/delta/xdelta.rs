use std::collections::HashMap;

use super::{Op, MAX_COPY_SIZE, MAX_INSERT_SIZE};

pub const BLOCK_SIZE: usize = 16;

/// A block index over a delta source, reusable across many targets.
///
/// Every aligned 16-byte block of the source is recorded by content.
/// Identical blocks chain their offsets in source order.
#[derive(Debug, Clone)]
pub struct XDelta {
    source: Vec<u8>,
    index: HashMap<[u8; BLOCK_SIZE], Vec<usize>>,
}

impl XDelta {
    pub fn new(source: Vec<u8>) -> Self {
        let mut index: HashMap<[u8; BLOCK_SIZE], Vec<usize>> = HashMap::new();
        for (i, block) in source.chunks_exact(BLOCK_SIZE).enumerate() {
            let mut key = [0u8; BLOCK_SIZE];
            key.copy_from_slice(block);
            index.entry(key).or_default().push(i * BLOCK_SIZE);
        }
        Self { source, index }
    }

    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Describe `target` as copies out of the source plus literal inserts.
    pub fn compress(&self, target: &[u8]) -> Vec<Op> {
        let mut run = Compression {
            source: &self.source,
            index: &self.index,
            target,
            offset: 0,
            insert: Vec::new(),
            ops: Vec::new(),
        };
        while run.offset < target.len() {
            run.generate_ops();
        }
        run.flush_insert(None);
        run.ops
    }
}

struct Compression<'a> {
    source: &'a [u8],
    index: &'a HashMap<[u8; BLOCK_SIZE], Vec<usize>>,
    target: &'a [u8],
    offset: usize,
    insert: Vec<u8>,
    ops: Vec<Op>,
}

impl Compression<'_> {
    fn generate_ops(&mut self) {
        let (m_offset, m_size) = self.longest_match();
        if m_size == 0 {
            self.push_insert();
            return;
        }
        let (m_offset, m_size) = self.expand_match(m_offset, m_size);
        self.flush_insert(None);
        self.ops.push(Op::Copy {
            offset: m_offset,
            size: m_size,
        });
    }

    fn longest_match(&self) -> (usize, usize) {
        let Some(block) = self.target.get(self.offset..self.offset + BLOCK_SIZE) else {
            return (0, 0);
        };
        let mut key = [0u8; BLOCK_SIZE];
        key.copy_from_slice(block);
        let Some(candidates) = self.index.get(&key) else {
            return (0, 0);
        };

        let (mut m_offset, mut m_size) = (0, 0);
        for &pos in candidates {
            let remaining = self.remaining_bytes(pos);
            if remaining <= m_size {
                break;
            }
            let end = self.match_from(pos, remaining);
            if m_size >= end - pos {
                continue;
            }
            m_offset = pos;
            m_size = end - pos;
        }
        (m_offset, m_size)
    }

    fn remaining_bytes(&self, pos: usize) -> usize {
        let source_remaining = self.source.len() - pos;
        let target_remaining = self.target.len() - self.offset;
        source_remaining.min(target_remaining).min(MAX_COPY_SIZE)
    }

    fn match_from(&self, pos: usize, mut remaining: usize) -> usize {
        let (mut s, mut t) = (pos, self.offset);
        while remaining > 0 && self.source[s] == self.target[t] {
            s += 1;
            t += 1;
            remaining -= 1;
        }
        s
    }

    /// Grow a match backwards over bytes still sitting in the insert buffer.
    fn expand_match(&mut self, mut m_offset: usize, mut m_size: usize) -> (usize, usize) {
        while m_offset > 0 && self.insert.last() == Some(&self.source[m_offset - 1]) {
            if m_size == MAX_COPY_SIZE {
                break;
            }
            self.offset -= 1;
            m_offset -= 1;
            m_size += 1;
            self.insert.pop();
        }
        self.offset += m_size;
        (m_offset, m_size)
    }

    fn push_insert(&mut self) {
        self.insert.push(self.target[self.offset]);
        self.offset += 1;
        self.flush_insert(Some(MAX_INSERT_SIZE));
    }

    fn flush_insert(&mut self, size: Option<usize>) {
        if size.is_some_and(|size| self.insert.len() < size) {
            return;
        }
        if self.insert.is_empty() {
            return;
        }
        self.ops.push(Op::Insert(std::mem::take(&mut self.insert)));
    }
}
