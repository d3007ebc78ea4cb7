//! Cross-thread contention on a single lock file.

use std::fs;
use std::io::Write;
use std::sync::{Arc, Barrier};
use std::thread;

use git_utils::lockfile::LockFile;

#[test]
fn exactly_one_racer_wins() {
    let dir = tempfile::tempdir().unwrap();
    let target = Arc::new(dir.path().join("index"));

    let start = Arc::new(Barrier::new(8));
    let hold = Arc::new(Barrier::new(8));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let start = Arc::clone(&start);
            let hold = Arc::clone(&hold);
            let target = Arc::clone(&target);
            thread::spawn(move || {
                start.wait();
                let lock = LockFile::try_acquire(&*target).unwrap();
                let won = lock.is_some();
                hold.wait();
                won
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&won| won)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn sequential_updates_each_land() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("ORIG_HEAD");

    for i in 0..5 {
        let mut lock = LockFile::acquire(&target).unwrap();
        writeln!(lock, "rev {i}").unwrap();
        lock.commit().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), format!("rev {i}\n"));
    }
}
