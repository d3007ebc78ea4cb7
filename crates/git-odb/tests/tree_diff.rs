use bstr::BString;
use git_hash::ObjectId;
use git_object::{Blob, FileMode, Object, TreeBuilder};
use git_odb::{Database, Entry, PathFilter};

fn store_tree(db: &Database, contents: &[(&str, &str)]) -> ObjectId {
    let mut builder = TreeBuilder::new();
    for (path, data) in contents {
        let oid = db
            .store(&Object::Blob(Blob::new(data.as_bytes().to_vec())))
            .unwrap();
        builder.add(path.as_bytes(), oid, FileMode::Regular);
    }
    builder
        .write(&mut |tree| db.store(&Object::Tree(tree.clone())))
        .unwrap()
}

fn blob(hex: &str) -> Entry {
    Entry::new(ObjectId::from_hex(hex).unwrap(), FileMode::Regular)
}

fn diff(db: &Database, a: ObjectId, b: ObjectId) -> Vec<(BString, (Option<Entry>, Option<Entry>))> {
    db.tree_diff(Some(&a), Some(&b), &PathFilter::default())
        .unwrap()
        .into_iter()
        .collect()
}

#[test]
fn reports_a_changed_file() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path());
    let a = store_tree(&db, &[("alice.txt", "alice"), ("bob.txt", "bob")]);
    let b = store_tree(&db, &[("alice.txt", "changed"), ("bob.txt", "bob")]);

    assert_eq!(
        diff(&db, a, b),
        vec![(
            BString::from("alice.txt"),
            (
                Some(blob("ca56b59dbf8c0884b1b9ceb306873b24b73de969")),
                Some(blob("21fb1eca31e64cd3914025058b21992ab76edcf9")),
            )
        )]
    );
}

#[test]
fn reports_an_added_file() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path());
    let a = store_tree(&db, &[("alice.txt", "alice")]);
    let b = store_tree(&db, &[("alice.txt", "alice"), ("bob.txt", "bob")]);

    assert_eq!(
        diff(&db, a, b),
        vec![(
            BString::from("bob.txt"),
            (None, Some(blob("2529de8969e5ee206e572ed72a0389c3115ad95c")))
        )]
    );
}

#[test]
fn reports_a_deleted_file() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path());
    let a = store_tree(&db, &[("alice.txt", "alice"), ("bob.txt", "bob")]);
    let b = store_tree(&db, &[("alice.txt", "alice")]);

    assert_eq!(
        diff(&db, a, b),
        vec![(
            BString::from("bob.txt"),
            (Some(blob("2529de8969e5ee206e572ed72a0389c3115ad95c")), None)
        )]
    );
}

#[test]
fn reports_an_added_file_in_a_new_directory() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path());
    let a = store_tree(&db, &[("1.txt", "1"), ("outer/2.txt", "2")]);
    let b = store_tree(
        &db,
        &[("1.txt", "1"), ("outer/2.txt", "2"), ("outer/new/4.txt", "4")],
    );

    assert_eq!(
        diff(&db, a, b),
        vec![(
            BString::from("outer/new/4.txt"),
            (None, Some(blob("bf0d87ab1b2b0ec1a11a3973d2845b42413d9767")))
        )]
    );
}

#[test]
fn reports_a_deleted_file_in_a_removed_directory() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path());
    let a = store_tree(
        &db,
        &[("1.txt", "1"), ("outer/2.txt", "2"), ("outer/inner/3.txt", "3")],
    );
    let b = store_tree(&db, &[("1.txt", "1"), ("outer/2.txt", "2")]);

    assert_eq!(
        diff(&db, a, b),
        vec![(
            BString::from("outer/inner/3.txt"),
            (Some(blob("e440e5c842586965a7fb77deda2eca68612b1f53")), None)
        )]
    );
}

#[test]
fn file_replaced_by_directory_reports_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path());
    let a = store_tree(&db, &[("nested", "was a file")]);
    let b = store_tree(&db, &[("nested/inner.txt", "now a dir")]);

    let changes = db.tree_diff(Some(&a), Some(&b), &PathFilter::default()).unwrap();
    let paths: Vec<_> = changes.keys().cloned().collect();
    assert_eq!(paths, vec![BString::from("nested"), BString::from("nested/inner.txt")]);
    assert!(changes[&BString::from("nested")].1.is_none());
    assert!(changes[&BString::from("nested/inner.txt")].0.is_none());
}

#[test]
fn path_filter_limits_the_walk() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path());
    let a = store_tree(&db, &[("a/1.txt", "1"), ("b/2.txt", "2")]);
    let b = store_tree(&db, &[("a/1.txt", "one"), ("b/2.txt", "two")]);

    let filter = PathFilter::build(&["b"]);
    let changes = db.tree_diff(Some(&a), Some(&b), &filter).unwrap();
    let paths: Vec<_> = changes.keys().cloned().collect();
    assert_eq!(paths, vec![BString::from("b/2.txt")]);
}

#[test]
fn identical_trees_have_no_changes() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path());
    let a = store_tree(&db, &[("x", "same")]);
    assert!(diff(&db, a, a).is_empty());
    assert!(db
        .tree_diff(None, None, &PathFilter::default())
        .unwrap()
        .is_empty());
}

#[test]
fn diffing_in_reverse_swaps_old_and_new() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path());
    let a = store_tree(
        &db,
        &[("d", "file"), ("f", "before"), ("g/h/j", "j"), ("x", "same")],
    );
    let b = store_tree(
        &db,
        &[
            ("d/e.txt", "now a dir"),
            ("f", "after"),
            ("g/h/i", "new"),
            ("g/h/j", "j"),
            ("x", "same"),
        ],
    );

    let forward = diff(&db, a, b);
    let backward = diff(&db, b, a);
    let paths: Vec<_> = forward.iter().map(|(path, _)| path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            BString::from("d"),
            BString::from("d/e.txt"),
            BString::from("f"),
            BString::from("g/h/i"),
        ]
    );

    let swapped: Vec<_> = backward
        .into_iter()
        .map(|(path, (old, new))| (path, (new, old)))
        .collect();
    assert_eq!(forward, swapped);
}
