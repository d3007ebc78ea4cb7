use std::fs::Metadata;

use bstr::{BStr, BString};
use git_hash::ObjectId;
use git_index::{Index, IndexError, Stage};
use git_object::{FileMode, Object};
use git_odb::Database;

fn stat() -> Metadata {
    std::fs::metadata(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/index.rs")).unwrap()
}

fn oid() -> ObjectId {
    ObjectId::from_hex("4dd0b3f5ef2eb7c2c2ab4d3a8e2e87b7f4b2e1a9").unwrap()
}

fn paths(index: &Index) -> Vec<BString> {
    index.entries().map(|e| e.path.clone()).collect()
}

fn add(index: &mut Index, path: &str) {
    index.add(BStr::new(path), oid(), &stat());
}

#[test]
fn add_single_file() {
    let mut index = Index::new("unused");
    add(&mut index, "alice.txt");
    assert_eq!(paths(&index), vec!["alice.txt"]);
}

#[test]
fn replace_file_with_directory() {
    let mut index = Index::new("unused");
    add(&mut index, "alice.txt");
    add(&mut index, "bob.txt");
    add(&mut index, "alice.txt/nested.txt");

    assert_eq!(paths(&index), vec!["alice.txt/nested.txt", "bob.txt"]);
}

#[test]
fn replace_directory_with_file() {
    let mut index = Index::new("unused");
    add(&mut index, "alice.txt");
    add(&mut index, "nested/bob.txt");

    add(&mut index, "nested");

    assert_eq!(paths(&index), vec!["alice.txt", "nested"]);
}

#[test]
fn recursively_replace_directory_with_file() {
    let mut index = Index::new("unused");
    add(&mut index, "alice.txt");
    add(&mut index, "nested/bob.txt");
    add(&mut index, "nested/inner/claire.txt");

    add(&mut index, "nested");

    assert_eq!(paths(&index), vec!["alice.txt", "nested"]);
    assert!(!index.is_tracked(BStr::new("nested/inner")));
}

#[test]
fn adding_a_file_resolves_its_conflict() {
    let mut index = Index::new("unused");
    let side = git_odb::Entry::new(oid(), FileMode::Regular);
    index.add_conflict_set(BStr::new("f.txt"), [Some(side), Some(side), Some(side)]);
    assert_eq!(index.len(), 3);

    add(&mut index, "f.txt");
    assert!(!index.is_conflicted());
    assert!(index.entry_for_path(BStr::new("f.txt"), Stage::Normal).is_some());
}

#[test]
fn write_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");

    let mut index = Index::new(&path);
    index.load_for_update().unwrap();
    add(&mut index, "alice.txt");
    add(&mut index, "nested/bob.txt");
    let side = git_odb::Entry::new(oid(), FileMode::Executable);
    index.add_conflict_set(BStr::new("conflicted"), [None, Some(side), Some(side)]);
    index.write_updates().unwrap();
    assert!(!path.with_extension("lock").exists());

    let mut reloaded = Index::new(&path);
    reloaded.load().unwrap();
    let expected: Vec<_> = index.entries().cloned().collect();
    let actual: Vec<_> = reloaded.entries().cloned().collect();
    assert_eq!(actual, expected);
    assert_eq!(reloaded.conflict_paths(), vec![BString::from("conflicted")]);
    assert!(!reloaded.is_changed());
}

#[test]
fn missing_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut index = Index::new(dir.path().join("index"));
    index.load().unwrap();
    assert!(index.is_empty());
}

#[test]
fn corrupt_checksum_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");

    let mut index = Index::new(&path);
    index.load_for_update().unwrap();
    add(&mut index, "alice.txt");
    index.write_updates().unwrap();

    let mut data = std::fs::read(&path).unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xff;
    std::fs::write(&path, data).unwrap();

    let err = Index::new(&path).load().unwrap_err();
    assert!(matches!(err, IndexError::ChecksumMismatch));
}

#[test]
fn unchanged_index_is_not_rewritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");

    let mut index = Index::new(&path);
    index.load_for_update().unwrap();
    index.write_updates().unwrap();
    assert!(!path.exists());
}

#[test]
fn write_updates_requires_the_lock() {
    let mut index = Index::new("unused");
    add(&mut index, "alice.txt");
    assert!(matches!(index.write_updates(), Err(IndexError::NotLocked)));
}

#[test]
fn write_tree_builds_nested_trees() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("objects"));
    let blob = db
        .store(&Object::Blob(git_object::Blob::new(b"hello\n".to_vec())))
        .unwrap();

    let mut index = Index::new("unused");
    index.add_from_db(BStr::new("a/b.txt"), &git_odb::Entry::new(blob, FileMode::Regular));
    index.add_from_db(BStr::new("c.txt"), &git_odb::Entry::new(blob, FileMode::Executable));

    let root = index.write_tree(&db).unwrap();
    let list = db.load_tree_list(Some(&root), None).unwrap();
    let names: Vec<&BString> = list.keys().collect();
    assert_eq!(names, vec!["a/b.txt", "c.txt"]);
    assert_eq!(list[&BString::from("c.txt")].mode, FileMode::Executable);
}
