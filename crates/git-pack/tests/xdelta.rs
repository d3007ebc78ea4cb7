use git_pack::delta::{self, Op, XDelta};
use proptest::prelude::*;

const SOURCE: &str = "the quick brown fox jumps over the slow lazy dog";

fn ops(source: &str, target: &str) -> Vec<Op> {
    XDelta::new(source.as_bytes().to_vec()).compress(target.as_bytes())
}

fn insert(s: &str) -> Op {
    Op::Insert(s.as_bytes().to_vec())
}

fn copy(offset: usize, size: usize) -> Op {
    Op::Copy { offset, size }
}

#[test]
fn compresses_a_string() {
    assert_eq!(
        ops(SOURCE, "a swift auburn fox jumps over three dormant hounds"),
        vec![insert("a swift aubur"), copy(14, 19), insert("ree dormant hounds")]
    );
}

#[test]
fn compresses_an_incomplete_block() {
    assert_eq!(
        ops(SOURCE, "he quick brown fox jumps over trees"),
        vec![copy(1, 31), insert("rees")]
    );
}

#[test]
fn compresses_at_source_start() {
    assert_eq!(ops(SOURCE, "the quick brown "), vec![copy(0, 16)]);
}

#[test]
fn compresses_at_source_start_with_right_expansion() {
    assert_eq!(
        ops(SOURCE, "the quick brown fox hops"),
        vec![copy(0, 20), insert("hops")]
    );
}

#[test]
fn compresses_at_source_start_with_left_offset() {
    assert_eq!(
        ops(SOURCE, "behold the quick brown foal"),
        vec![insert("behold "), copy(0, 18), insert("al")]
    );
}

#[test]
fn compresses_at_source_end() {
    assert_eq!(ops(SOURCE, "he slow lazy dog"), vec![copy(32, 16)]);
}

#[test]
fn compresses_at_source_end_with_left_expansion() {
    assert_eq!(
        ops(SOURCE, "under the slow lazy dog"),
        vec![insert("und"), copy(28, 20)]
    );
}

#[test]
fn compresses_towards_source_end_with_right_offset() {
    assert_eq!(
        ops(SOURCE, "under the slow lazy dog's legs"),
        vec![insert("und"), copy(28, 20), insert("'s legs")]
    );
}

#[test]
fn compresses_unindexed_bytes() {
    assert_eq!(
        ops("the quick brown fox", "see the quick brown fox"),
        vec![insert("see "), copy(0, 19)]
    );
}

#[test]
fn does_not_compress_unindexed_bytes() {
    assert_eq!(
        ops("the quick brown fox", "a quick brown fox"),
        vec![insert("a quick brown fox")]
    );
}

fn apply(source: &[u8], target: &[u8]) -> Vec<u8> {
    let ops = XDelta::new(source.to_vec()).compress(target);
    let encoded = delta::encode(source.len(), target.len(), &ops);
    delta::expand(source, &encoded).unwrap()
}

proptest! {
    #[test]
    fn expand_reverses_compress(
        source in proptest::collection::vec(any::<u8>(), 0..600),
        edits in proptest::collection::vec((any::<usize>(), any::<u8>()), 0..8),
        tail in proptest::collection::vec(any::<u8>(), 0..40),
    ) {
        let mut target = source.clone();
        for (at, byte) in edits {
            if !target.is_empty() {
                let at = at % target.len();
                target[at] = byte;
            }
        }
        target.extend(tail);
        prop_assert_eq!(apply(&source, &target), target);
    }

    #[test]
    fn expand_handles_repetitive_sources(block in "[ab]{16}", repeats in 1usize..12) {
        let source = block.repeat(repeats).into_bytes();
        let mut target = source.clone();
        target.extend_from_slice(b"xyz");
        target.extend_from_slice(&source);
        prop_assert_eq!(apply(&source, &target), target);
    }
}
