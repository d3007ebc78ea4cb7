//! Fetch and push between two repositories, each end on its own thread,
//! joined by a socket pair.
#![cfg(unix)]

use std::io::Cursor;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use git_config::{ConfigScope, Value};
use git_hash::ObjectId;
use git_object::{Author, Blob, Commit, FileMode, Object, Tree, TreeEntry};
use git_protocol::{
    fetch, push, receive_pack, upload_pack, FetchOptions, ProtocolError, PushOptions, PushReport, RefUpdate,
};
use git_repository::Repository;
use git_utils::date::GitDate;

const TRACKING: &str = "+refs/heads/*:refs/remotes/origin/*";

struct Repo {
    dir: tempfile::TempDir,
    repo: Repository,
    clock: i64,
}

impl Repo {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        Self {
            dir,
            repo,
            clock: 1_700_000_000,
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Commit a single file holding `content` on `branch`.
    fn commit(&mut self, branch: &str, parent: Option<ObjectId>, content: &str) -> ObjectId {
        self.clock += 60;
        let db = self.repo.database();
        let blob = db
            .store(&Object::Blob(Blob::new(content.as_bytes().to_vec())))
            .unwrap();
        let tree = Tree::new(vec![TreeEntry::new("file.txt", blob, FileMode::Regular)]);
        let tree = db.store(&Object::Tree(tree)).unwrap();
        let author = Author::new("A. U. Thor", "author@example.com", GitDate::new(self.clock, 0));
        let commit = Commit::new(parent.into_iter().collect(), tree, author, format!("{content}\n"));
        let oid = db.store(&Object::Commit(commit)).unwrap();
        self.repo
            .refs()
            .update_ref(&format!("refs/heads/{branch}"), Some(&oid))
            .unwrap();
        oid
    }

    fn set_config(&mut self, key: &str, value: impl Into<Value>) {
        let config = self.repo.config().file(ConfigScope::Local);
        config.open_for_update().unwrap();
        config.set(key, value).unwrap();
        config.save().unwrap();
    }

    fn read_ref(&self, name: &str) -> Option<ObjectId> {
        self.repo.refs().read_ref(name).unwrap()
    }

    fn pack_files(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.repo.database().pack_path()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter_map(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_owned()))
            .collect();
        names.sort();
        names
    }

    fn summaries(&self, updates: &[RefUpdate]) -> Vec<String> {
        updates
            .iter()
            .filter_map(|update| update.summary(self.repo.database()))
            .collect()
    }

    fn short(&self, oid: &ObjectId) -> String {
        self.repo.database().short_oid(oid)
    }
}

type Service = fn(&mut Repository, UnixStream, UnixStream) -> Result<(), ProtocolError>;

/// Run `service` against the repository at `remote` on another thread.
fn connect(remote: &Path, service: Service) -> (UnixStream, JoinHandle<Result<(), String>>) {
    let (client, server) = UnixStream::pair().unwrap();
    let path: PathBuf = remote.to_path_buf();
    let handle = thread::spawn(move || {
        let run = move || -> Result<(), ProtocolError> {
            let mut repo = Repository::open(&path)?;
            let output = server.try_clone()?;
            service(&mut repo, server, output)
        };
        run().map_err(|e| e.to_string())
    });
    (client, handle)
}

fn fetch_from(local: &mut Repo, remote: &Repo, options: &FetchOptions) -> Vec<RefUpdate> {
    let (stream, server) = connect(remote.path(), upload_pack);
    let updates = fetch(&mut local.repo, &stream, &stream, options).unwrap();
    drop(stream);
    server.join().unwrap().unwrap();
    updates
}

fn push_to(local: &mut Repo, remote: &Repo, specs: &[&str], force: bool) -> PushReport {
    let options = PushOptions {
        specs: specs.iter().map(|spec| spec.to_string()).collect(),
        fetch_specs: vec![TRACKING.to_owned()],
        force,
    };
    let (stream, server) = connect(remote.path(), receive_pack);
    let report = push(&mut local.repo, &stream, &stream, &options).unwrap();
    drop(stream);
    server.join().unwrap().unwrap();
    report
}

fn tracking() -> FetchOptions {
    FetchOptions {
        specs: vec![TRACKING.to_owned()],
        force: false,
    }
}

#[test]
fn empty_repository_advertises_capabilities_on_a_placeholder() {
    let remote = Repo::new();
    let mut repo = Repository::open(remote.path()).unwrap();
    let mut output = Vec::new();
    upload_pack(&mut repo, Cursor::new(b"0000".to_vec()), &mut output).unwrap();

    let expected = format!("0047{} capabilities^{{}}\0ofs-delta\n0000", ObjectId::NULL);
    assert_eq!(String::from_utf8(output).unwrap(), expected);
}

mod fetching {
    use super::*;

    /// `main` three commits long, `topic` branching off its root.
    fn remote() -> (Repo, [ObjectId; 4]) {
        let mut remote = Repo::new();
        let c1 = remote.commit("main", None, "one");
        let c2 = remote.commit("main", Some(c1), "two");
        let c3 = remote.commit("main", Some(c2), "three");
        let t1 = remote.commit("topic", Some(c1), "topic");
        (remote, [c1, c2, c3, t1])
    }

    #[test]
    fn into_an_empty_repository() {
        let (remote, [c1, _, c3, t1]) = remote();
        let mut local = Repo::new();

        let updates = fetch_from(&mut local, &remote, &tracking());
        assert_eq!(
            local.summaries(&updates),
            vec![
                " * [new branch] main -> origin/main",
                " * [new branch] topic -> origin/topic"
            ]
        );
        assert_eq!(local.read_ref("refs/remotes/origin/main"), Some(c3));
        assert_eq!(local.read_ref("refs/remotes/origin/topic"), Some(t1));

        let commit = local.repo.database().load_commit(&c3).unwrap();
        assert_eq!(commit.message, "three\n");
        assert!(local.repo.database().has(&c1));
        assert!(local.pack_files().is_empty(), "small packs are unpacked");
    }

    #[test]
    fn nothing_new_is_a_no_op() {
        let (remote, _) = remote();
        let mut local = Repo::new();
        fetch_from(&mut local, &remote, &tracking());

        let updates = fetch_from(&mut local, &remote, &tracking());
        assert!(updates.is_empty());
    }

    #[test]
    fn fast_forwards_tracking_refs() {
        let (mut remote, [_, _, c3, _]) = remote();
        let mut local = Repo::new();
        fetch_from(&mut local, &remote, &tracking());

        let c4 = remote.commit("main", Some(c3), "four");
        let updates = fetch_from(&mut local, &remote, &tracking());

        assert_eq!(updates.len(), 1);
        assert!(updates[0].fast_forward);
        assert_eq!(
            local.summaries(&updates),
            vec![format!("   {}..{} main -> origin/main", local.short(&c3), local.short(&c4))]
        );
        assert_eq!(local.read_ref("refs/remotes/origin/main"), Some(c4));
    }

    #[test]
    fn refuses_non_fast_forward_unless_forced() {
        let (mut remote, [_, c2, c3, _]) = remote();
        let mut local = Repo::new();
        let unforced = FetchOptions {
            specs: vec!["refs/heads/*:refs/remotes/origin/*".to_owned()],
            force: false,
        };
        fetch_from(&mut local, &remote, &unforced);

        let n3 = remote.commit("main", Some(c2), "rewritten");
        let updates = fetch_from(&mut local, &remote, &unforced);
        assert_eq!(updates[0].error.as_deref(), Some("non-fast-forward"));
        assert_eq!(
            local.summaries(&updates),
            vec![" ! [rejected] main -> origin/main (non-fast-forward)"]
        );
        assert_eq!(local.read_ref("refs/remotes/origin/main"), Some(c3));

        let forced = FetchOptions {
            force: true,
            ..unforced
        };
        let updates = fetch_from(&mut local, &remote, &forced);
        assert_eq!(
            local.summaries(&updates),
            vec![format!(
                " + {}...{} main -> origin/main (forced update)",
                local.short(&c3),
                local.short(&n3)
            )]
        );
        assert_eq!(local.read_ref("refs/remotes/origin/main"), Some(n3));
    }

    #[test]
    fn keeps_large_packs_whole() {
        let (remote, [_, _, c3, _]) = remote();
        let mut local = Repo::new();
        local.set_config("transfer.unpackLimit", 1i64);

        fetch_from(&mut local, &remote, &tracking());
        assert_eq!(local.pack_files(), vec!["idx", "pack"]);
        let commit = local.repo.database().load_commit(&c3).unwrap();
        assert_eq!(commit.message, "three\n");
    }

    #[test]
    fn from_an_empty_repository() {
        let remote = Repo::new();
        let mut local = Repo::new();
        assert!(fetch_from(&mut local, &remote, &tracking()).is_empty());
    }
}

mod pushing {
    use super::*;

    /// A local `feature` branch two commits long, and an empty remote.
    fn setup() -> (Repo, Repo, [ObjectId; 2]) {
        let mut local = Repo::new();
        let f1 = local.commit("feature", None, "one");
        let f2 = local.commit("feature", Some(f1), "two");
        (local, Repo::new(), [f1, f2])
    }

    #[test]
    fn creates_a_branch() {
        let (mut local, remote, [f1, f2]) = setup();

        let report = push_to(&mut local, &remote, &["feature"], false);
        assert!(report.is_ok());
        assert_eq!(local.summaries(&report.updates), vec![" * [new branch] feature -> feature"]);

        assert_eq!(remote.read_ref("refs/heads/feature"), Some(f2));
        assert!(remote.repo.database().has(&f1));
        assert_eq!(local.read_ref("refs/remotes/origin/feature"), Some(f2));
    }

    #[test]
    fn fast_forwards_a_branch() {
        let (mut local, remote, [_, f2]) = setup();
        push_to(&mut local, &remote, &["feature"], false);

        let f3 = local.commit("feature", Some(f2), "three");
        let report = push_to(&mut local, &remote, &["feature"], false);
        assert_eq!(
            local.summaries(&report.updates),
            vec![format!("   {}..{} feature -> feature", local.short(&f2), local.short(&f3))]
        );
        assert_eq!(remote.read_ref("refs/heads/feature"), Some(f3));
    }

    #[test]
    fn refuses_non_fast_forward_unless_forced() {
        let (mut local, remote, [f1, f2]) = setup();
        push_to(&mut local, &remote, &["feature"], false);

        let g2 = local.commit("feature", Some(f1), "rewritten");
        let report = push_to(&mut local, &remote, &["feature"], false);
        assert!(!report.is_ok());
        assert_eq!(
            local.summaries(&report.updates),
            vec![" ! [rejected] feature -> feature (non-fast-forward)"]
        );
        assert_eq!(remote.read_ref("refs/heads/feature"), Some(f2));

        let report = push_to(&mut local, &remote, &["feature"], true);
        assert!(report.is_ok());
        assert_eq!(remote.read_ref("refs/heads/feature"), Some(g2));
        assert_eq!(local.read_ref("refs/remotes/origin/feature"), Some(g2));
    }

    #[test]
    fn asks_to_fetch_first_when_the_remote_moved_on() {
        let (mut local, mut remote, [f1, _]) = setup();
        remote.commit("feature", None, "elsewhere");

        let report = push_to(&mut local, &remote, &["feature"], false);
        assert_eq!(report.updates[0].error.as_deref(), Some("fetch first"));
        assert!(!remote.repo.database().has(&f1));
    }

    #[test]
    fn remote_refuses_its_checked_out_branch() {
        let (mut local, remote, [_, f2]) = setup();

        let report = push_to(&mut local, &remote, &["feature:main"], false);
        assert_eq!(report.unpack_error, None);
        assert_eq!(
            report.updates[0].error.as_deref(),
            Some("branch is currently checked out")
        );
        assert_eq!(remote.read_ref("refs/heads/main"), None);
        assert!(remote.repo.database().has(&f2));
        assert_eq!(local.read_ref("refs/remotes/origin/main"), None);
    }

    #[test]
    fn checked_out_branch_can_be_allowed() {
        let (mut local, mut remote, [_, f2]) = setup();
        remote.set_config("receive.denyCurrentBranch", false);

        let report = push_to(&mut local, &remote, &["feature:main"], false);
        assert!(report.is_ok());
        assert_eq!(remote.read_ref("refs/heads/main"), Some(f2));
    }

    #[test]
    fn remote_refuses_non_fast_forward_when_configured() {
        let (mut local, mut remote, [f1, f2]) = setup();
        push_to(&mut local, &remote, &["feature"], false);
        remote.set_config("receive.denyNonFastForwards", true);

        local.commit("feature", Some(f1), "rewritten");
        let report = push_to(&mut local, &remote, &["feature"], true);
        assert_eq!(report.updates[0].error.as_deref(), Some("non-fast-forward"));
        assert_eq!(remote.read_ref("refs/heads/feature"), Some(f2));
    }

    #[test]
    fn deletes_a_branch() {
        let (mut local, remote, _) = setup();
        push_to(&mut local, &remote, &["feature"], false);

        let report = push_to(&mut local, &remote, &[":refs/heads/feature"], false);
        assert!(report.is_ok());
        assert_eq!(local.summaries(&report.updates), vec![" - [deleted] feature"]);
        assert_eq!(remote.read_ref("refs/heads/feature"), None);
        assert_eq!(local.read_ref("refs/remotes/origin/feature"), None);
    }

    #[test]
    fn remote_can_forbid_deletion() {
        let (mut local, mut remote, [_, f2]) = setup();
        push_to(&mut local, &remote, &["feature"], false);
        remote.set_config("receive.denyDeletes", true);

        let report = push_to(&mut local, &remote, &[":refs/heads/feature"], false);
        assert_eq!(report.updates[0].error.as_deref(), Some("deletion prohibited"));
        assert_eq!(remote.read_ref("refs/heads/feature"), Some(f2));
    }

    #[test]
    fn remote_keeps_large_packs_whole() {
        let (mut local, mut remote, [_, f2]) = setup();
        remote.set_config("receive.unpackLimit", 1i64);

        let report = push_to(&mut local, &remote, &["feature"], false);
        assert!(report.is_ok());
        assert_eq!(remote.pack_files(), vec!["idx", "pack"]);

        let reopened = Repository::open(remote.path()).unwrap();
        assert_eq!(reopened.database().load_commit(&f2).unwrap().message, "two\n");
    }

    #[test]
    fn fetch_sees_what_was_pushed() {
        let (mut local, remote, [_, f2]) = setup();
        push_to(&mut local, &remote, &["feature"], false);

        let mut other = Repo::new();
        let updates = fetch_from(&mut other, &remote, &tracking());
        assert_eq!(updates.len(), 1);
        assert_eq!(other.read_ref("refs/remotes/origin/feature"), Some(f2));
    }
}
