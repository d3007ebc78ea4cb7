//! Common ancestor and merge base computation over hand-built histories.
//!
//! Every commit shares one timestamp, so the results also pin down the
//! stable ordering among equal dates.

use std::collections::HashMap;

use git_hash::ObjectId;
use git_object::{Author, Commit, Object};
use git_odb::Database;
use git_revwalk::{Bases, CommonAncestors};
use git_utils::date::GitDate;

struct Graph {
    _dir: tempfile::TempDir,
    db: Database,
    commits: HashMap<String, ObjectId>,
}

impl Graph {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("objects"));
        Self {
            _dir: dir,
            db,
            commits: HashMap::new(),
        }
    }

    fn commit(&mut self, parents: &[&str], message: &str) {
        let parents = parents.iter().map(|name| self.commits[*name]).collect();
        let author = Author::new("A. U. Thor", "author@example.com", GitDate::new(1_700_000_000, 0));
        let tree = ObjectId::from_hex(&"0".repeat(40)).unwrap();
        let commit = Commit::new(parents, tree, author, message);
        let oid = self.db.store(&Object::Commit(commit)).unwrap();
        self.commits.insert(message.to_owned(), oid);
    }

    /// Commit each name on top of the one before it; `None` starts a root.
    fn chain(&mut self, names: &[Option<&str>]) {
        for pair in names.windows(2) {
            let parents: Vec<&str> = pair[0].into_iter().collect();
            self.commit(&parents, pair[1].unwrap());
        }
    }

    fn names(&self, oids: Vec<ObjectId>) -> Vec<String> {
        oids.iter()
            .map(|oid| self.db.load_commit(oid).unwrap().message.to_string())
            .collect()
    }

    fn ancestor(&self, left: &str, right: &str) -> Vec<String> {
        let mut common =
            CommonAncestors::new(&self.db, &self.commits[left], &[self.commits[right]]).unwrap();
        self.names(common.find().unwrap())
    }

    fn merge_base(&self, left: &str, right: &str) -> Vec<String> {
        let bases = Bases::new(&self.db, &self.commits[left], &self.commits[right]);
        self.names(bases.find().unwrap())
    }
}

fn names(list: &str) -> Vec<Option<&str>> {
    list.split_whitespace().map(Some).collect()
}

fn rooted(list: &str) -> Vec<Option<&str>> {
    let mut chain = vec![None];
    chain.extend(names(list));
    chain
}

//   o---o---o---o
//   A   B   C   D
fn linear() -> Graph {
    let mut graph = Graph::new();
    graph.chain(&rooted("A B C D"));
    graph
}

#[test]
fn linear_history() {
    let graph = linear();
    assert_eq!(graph.ancestor("D", "D"), ["D"]);
    assert_eq!(graph.ancestor("B", "D"), ["B"]);
    assert_eq!(graph.ancestor("D", "B"), ["B"]);
    assert_eq!(graph.ancestor("A", "C"), ["A"]);
    assert_eq!(graph.ancestor("A", "A"), ["A"]);
}

//          E   F   G   H
//          o---o---o---o
//         /         \
//        /  C   D    \
//   o---o---o---o     o---o
//   A   B    \        J   K
//             \
//              o---o---o
//              L   M   N
#[test]
fn forking_history() {
    let mut graph = Graph::new();
    graph.chain(&rooted("A B C D"));
    graph.chain(&names("B E F G H"));
    graph.chain(&names("G J K"));
    graph.chain(&names("C L M N"));

    assert_eq!(graph.ancestor("H", "K"), ["G"]);
    assert_eq!(graph.ancestor("D", "K"), ["B"]);
    assert_eq!(graph.ancestor("D", "L"), ["C"]);
    assert_eq!(graph.ancestor("M", "D"), ["C"]);
    assert_eq!(graph.ancestor("D", "N"), ["C"]);
    assert_eq!(graph.ancestor("K", "E"), ["E"]);
    assert_eq!(graph.ancestor("J", "A"), ["A"]);
}

//   A   B   C   G   H
//   o---o---o---o---o
//        \     /
//         o---o---o
//         D   E   F
#[test]
fn history_with_merge() {
    let mut graph = Graph::new();
    graph.chain(&rooted("A B C"));
    graph.chain(&names("B D E F"));
    graph.commit(&["C", "E"], "G");
    graph.chain(&names("G H"));

    assert_eq!(graph.ancestor("H", "F"), ["E"]);
    assert_eq!(graph.ancestor("C", "G"), ["C"]);
    assert_eq!(graph.ancestor("G", "E"), ["E"]);
}

//   A   B   C   G   H   J
//   o---o---o---o---o---o
//        \     /
//         o---o---o
//         D   E   F
#[test]
fn merge_further_from_one_parent() {
    let mut graph = Graph::new();
    graph.chain(&rooted("A B C"));
    graph.chain(&names("B D E F"));
    graph.commit(&["C", "E"], "G");
    graph.chain(&names("G H J"));

    assert_eq!(graph.ancestor("J", "F"), ["E", "B"]);
    assert_eq!(graph.merge_base("J", "F"), ["E"]);
}

//   A   B   C       H   J
//   o---o---o-------o---o
//        \         /
//         o---o---o G
//         D  E \
//               o F
#[test]
fn commits_between_ancestor_and_merge() {
    let mut graph = Graph::new();
    graph.chain(&rooted("A B C"));
    graph.chain(&names("B D E F"));
    graph.chain(&names("E G"));
    graph.commit(&["C", "G"], "H");
    graph.chain(&names("H J"));

    assert_eq!(graph.ancestor("J", "F"), ["B", "E"]);
    assert_eq!(graph.merge_base("J", "F"), ["E"]);
}

//   A   B   C             H   J
//   o---o---o-------------o---o
//        \      E        /
//         o-----o-------o
//        D \     \     / G
//           \     o   /
//            \    F  /
//             o-----o
//             P     Q
#[test]
fn enough_history_to_find_all_stale() {
    let mut graph = Graph::new();
    graph.chain(&rooted("A B C"));
    graph.chain(&names("B D E F"));
    graph.chain(&names("D P Q"));
    graph.commit(&["E", "Q"], "G");
    graph.commit(&["C", "G"], "H");
    graph.chain(&names("H J"));

    assert_eq!(graph.ancestor("J", "F"), ["E"]);
    assert_eq!(graph.ancestor("F", "J"), ["E"]);
}

//         L   M   N   P   Q   R   S   T
//         o---o---o---o---o---o---o---o
//        /       /       /       /
//   o---o---o...o---o...o---o---o---o---o
//   A   B  C \  D  E \  F  G \  H   J   K
//             \       \       \
//              o---o---o---o---o---o
//              U   V   W   X   Y   Z
#[test]
fn many_common_ancestors() {
    let mut graph = Graph::new();
    let mut trunk = vec!["A", "B", "C"];
    let pad_one: Vec<String> = (1..=4).map(|n| format!("pad-1-{n}")).collect();
    let pad_two: Vec<String> = (1..=4).map(|n| format!("pad-2-{n}")).collect();
    trunk.extend(pad_one.iter().map(String::as_str));
    trunk.extend(["D", "E"]);
    trunk.extend(pad_two.iter().map(String::as_str));
    trunk.extend(["F", "G", "H", "J", "K"]);
    let mut chain = vec![None];
    chain.extend(trunk.into_iter().map(Some));
    graph.chain(&chain);

    graph.chain(&names("B L M"));
    graph.commit(&["M", "D"], "N");
    graph.chain(&names("N P"));
    graph.commit(&["P", "F"], "Q");
    graph.chain(&names("Q R"));
    graph.commit(&["R", "H"], "S");
    graph.chain(&names("S T"));

    graph.chain(&names("C U V"));
    graph.commit(&["V", "E"], "W");
    graph.chain(&names("W X"));
    graph.commit(&["X", "G"], "Y");
    graph.chain(&names("Y Z"));

    assert_eq!(graph.ancestor("T", "Z"), ["G", "D", "B"]);
    assert_eq!(graph.merge_base("T", "Z"), ["G"]);
}

#[test]
fn single_candidate_is_its_own_merge_base() {
    let graph = linear();
    assert_eq!(graph.merge_base("B", "D"), ["B"]);
    assert_eq!(graph.merge_base("D", "D"), ["D"]);
}
