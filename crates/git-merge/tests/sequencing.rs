mod common;

use std::collections::BTreeMap;

use common::{files, Fixture};
use git_merge::commit::resume_merge;
use git_merge::{
    cherry_pick, merge, revert, sequence_abort, sequence_continue, sequence_quit, MergeError,
    SequenceOptions, SequenceOutcome,
};
use git_repository::sequencer::UNSAFE_MESSAGE;
use git_repository::MergeKind;

fn pick(fx: &mut Fixture, revs: &[&str]) -> SequenceOutcome {
    cherry_pick(&mut fx.repo, revs, SequenceOptions::default()).unwrap()
}

fn undo(fx: &mut Fixture, revs: &[&str]) -> SequenceOutcome {
    revert(&mut fx.repo, revs, SequenceOptions::default()).unwrap()
}

fn conflicts(pairs: &[(&str, &[u8])]) -> BTreeMap<String, Vec<u8>> {
    pairs
        .iter()
        .map(|(path, stages)| (path.to_string(), stages.to_vec()))
        .collect()
}

fn assert_conflicted(outcome: &SequenceOutcome) {
    assert!(
        matches!(outcome, SequenceOutcome::Conflicted { .. }),
        "expected a conflict, got {outcome:?}"
    );
}

fn assert_completed(outcome: &SequenceOutcome) {
    assert!(
        matches!(outcome, SequenceOutcome::Completed { .. }),
        "expected completion, got {outcome:?}"
    );
}

mod cherry_picking {
    use super::*;

    /// `main`: one, two, three, four editing f.txt. `topic` forks at two:
    /// five (g.txt), six (f.txt), seven (g.txt), eight (g.txt).
    fn two_branches() -> Fixture {
        let mut fx = Fixture::new();
        for message in ["one", "two", "three", "four"] {
            fx.commit_tree(message, &[("f.txt", Some(message))]);
        }
        fx.branch("topic", "@~2");
        fx.checkout("topic");
        fx.commit_tree("five", &[("g.txt", Some("five"))]);
        fx.commit_tree("six", &[("f.txt", Some("six"))]);
        fx.commit_tree("seven", &[("g.txt", Some("seven"))]);
        fx.commit_tree("eight", &[("g.txt", Some("eight"))]);
        fx.checkout("main");
        fx
    }

    #[test]
    fn applies_a_commit_on_head() {
        let mut fx = two_branches();
        let outcome = pick(&mut fx, &["topic~3"]);

        assert_eq!(
            outcome,
            SequenceOutcome::Completed {
                commits: vec![fx.resolve("HEAD")]
            }
        );
        assert_eq!(fx.messages(&["@~3.."]), vec!["five", "four", "three"]);
        assert_eq!(fx.index_contents(), files(&[("f.txt", "four"), ("g.txt", "five")]));
        assert_eq!(fx.workspace(), files(&[("f.txt", "four"), ("g.txt", "five")]));
        assert!(!fx.repo.sequencer().in_progress());

        let picked = fx.load_commit("HEAD");
        assert_eq!(picked.author, fx.load_commit("topic~3").author);
        fx.assert_clean();
    }

    #[test]
    fn stops_on_a_content_conflict() {
        let mut fx = two_branches();
        let short = fx.repo.database().short_oid(&fx.resolve("topic^^"));
        let outcome = pick(&mut fx, &["topic^^"]);

        assert_eq!(
            outcome,
            SequenceOutcome::Conflicted {
                name: format!("{short}... six"),
                paths: vec!["f.txt".into()],
            }
        );
        assert_eq!(
            fx.read("f.txt"),
            format!("<<<<<<< HEAD\nfour\n=======\nsix\n>>>>>>> {short}... six\n")
        );
        assert_eq!(fx.conflicts(), conflicts(&[("f.txt", &[1, 2, 3])]));

        let pending = fx.repo.pending_commit();
        assert_eq!(pending.merge_type(), Some(MergeKind::CherryPick));
        assert_eq!(pending.merge_message().unwrap(), "six\n\n# Conflicts:\n# \tf.txt\n");
        assert!(fx.repo.sequencer().in_progress());
    }

    #[test]
    fn stops_on_a_modify_delete_conflict() {
        let mut fx = two_branches();
        assert_conflicted(&pick(&mut fx, &["topic"]));

        assert_eq!(fx.workspace(), files(&[("f.txt", "four"), ("g.txt", "eight")]));
        assert_eq!(fx.conflicts(), conflicts(&[("g.txt", &[1, 3])]));
    }

    #[test]
    fn continues_after_resolving() {
        let mut fx = two_branches();
        pick(&mut fx, &["topic"]);
        fx.add("g.txt");

        let outcome = sequence_continue(&mut fx.repo).unwrap();
        assert_eq!(
            outcome,
            SequenceOutcome::Completed {
                commits: vec![fx.resolve("HEAD")]
            }
        );
        assert_eq!(fx.load_commit("HEAD").parents, vec![fx.resolve("@^")]);
        assert_eq!(fx.messages(&["@~3.."]), vec!["eight", "four", "three"]);
        assert_eq!(fx.index_contents(), files(&[("f.txt", "four"), ("g.txt", "eight")]));
        assert!(!fx.repo.pending_commit().in_progress());
        assert!(!fx.repo.sequencer().in_progress());
    }

    #[test]
    fn continues_after_committing_the_resolution() {
        let mut fx = two_branches();
        pick(&mut fx, &["topic"]);
        fx.add("g.txt");
        resume_merge(&mut fx.repo, MergeKind::CherryPick).unwrap();

        let outcome = sequence_continue(&mut fx.repo).unwrap();
        assert_eq!(outcome, SequenceOutcome::Completed { commits: vec![] });
        assert_eq!(fx.messages(&["@~3.."]), vec!["eight", "four", "three"]);
        assert!(!fx.repo.sequencer().in_progress());
    }

    #[test]
    fn applies_several_commits_in_order() {
        let mut fx = two_branches();
        let outcome = pick(&mut fx, &["topic~3", "topic^", "topic"]);

        assert_completed(&outcome);
        assert_eq!(fx.messages(&["@~4.."]), vec!["eight", "seven", "five", "four"]);
        assert_eq!(fx.index_contents(), files(&[("f.txt", "four"), ("g.txt", "eight")]));
        fx.assert_clean();
    }

    #[test]
    fn stops_partway_through_a_list() {
        let mut fx = two_branches();
        assert_conflicted(&pick(&mut fx, &["topic^", "topic~3"]));
        assert_eq!(fx.conflicts(), conflicts(&[("g.txt", &[1, 3])]));
    }

    #[test]
    fn stops_partway_through_a_range() {
        let mut fx = two_branches();
        assert_conflicted(&pick(&mut fx, &["..topic"]));
        assert_eq!(fx.conflicts(), conflicts(&[("f.txt", &[1, 2, 3])]));
        assert_eq!(fx.messages(&["@~2.."]), vec!["five", "four"]);
    }

    #[test]
    fn refuses_to_continue_with_unmerged_files() {
        let mut fx = two_branches();
        pick(&mut fx, &["..topic"]);

        let err = sequence_continue(&mut fx.repo).unwrap_err();
        assert!(matches!(err, MergeError::Unmerged));
        let err = resume_merge(&mut fx.repo, MergeKind::CherryPick).unwrap_err();
        assert!(matches!(err, MergeError::Unmerged));
    }

    #[test]
    fn runs_the_rest_of_a_range_after_resolving() {
        let mut fx = two_branches();
        pick(&mut fx, &["..topic"]);
        fx.write("f.txt", "six");
        fx.add("f.txt");

        let outcome = sequence_continue(&mut fx.repo).unwrap();
        let SequenceOutcome::Completed { commits } = outcome else {
            panic!("expected completion, got {outcome:?}");
        };
        assert_eq!(commits.len(), 3);
        assert_eq!(
            fx.messages(&["@~5.."]),
            vec!["eight", "seven", "six", "five", "four"]
        );
        assert_eq!(fx.index_contents(), files(&[("f.txt", "six"), ("g.txt", "eight")]));
        fx.assert_clean();
    }

    #[test]
    fn runs_the_rest_of_a_range_after_committing() {
        let mut fx = two_branches();
        pick(&mut fx, &["..topic"]);
        fx.write("f.txt", "six");
        fx.add("f.txt");
        resume_merge(&mut fx.repo, MergeKind::CherryPick).unwrap();

        assert_completed(&sequence_continue(&mut fx.repo).unwrap());
        assert_eq!(
            fx.messages(&["@~5.."]),
            vec!["eight", "seven", "six", "five", "four"]
        );
    }

    #[test]
    fn abort_puts_the_branch_back() {
        let mut fx = two_branches();
        let before = fx.resolve("main");
        pick(&mut fx, &["..topic"]);

        let warnings = sequence_abort(&mut fx.repo).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(fx.resolve("main"), before);
        assert_eq!(fx.workspace(), files(&[("f.txt", "four")]));
        assert!(!fx.repo.pending_commit().in_progress());
        assert!(!fx.repo.sequencer().in_progress());
        fx.assert_clean();
    }

    #[test]
    fn abort_after_a_manual_commit_leaves_head() {
        let mut fx = two_branches();
        pick(&mut fx, &["..topic"]);
        fx.add("f.txt");
        let committed = resume_merge(&mut fx.repo, MergeKind::CherryPick).unwrap();

        let warnings = sequence_abort(&mut fx.repo).unwrap();
        assert_eq!(warnings, vec![UNSAFE_MESSAGE.to_string()]);
        assert_eq!(fx.head(), Some(committed));
        assert!(!fx.repo.sequencer().in_progress());
    }

    #[test]
    fn quit_keeps_the_work_done() {
        let mut fx = two_branches();
        pick(&mut fx, &["..topic"]);
        let head = fx.head();

        sequence_quit(&mut fx.repo).unwrap();
        assert_eq!(fx.head(), head);
        assert_eq!(fx.messages(&["@^.."]), vec!["five"]);
        assert!(!fx.repo.pending_commit().in_progress());
        assert!(!fx.repo.sequencer().in_progress());

        let err = sequence_continue(&mut fx.repo).unwrap_err();
        assert!(matches!(err, MergeError::NoSequence));
    }

    #[test]
    fn refuses_to_start_while_running() {
        let mut fx = two_branches();
        pick(&mut fx, &["..topic"]);
        let err = cherry_pick(&mut fx.repo, &["topic"], SequenceOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "a cherry-pick or revert is already in progress");
    }
}

mod merges {
    use super::*;

    /// `main`: A (f.txt=1), B (f.txt=2), then M merging `topic`, which adds
    /// g.txt in C on top of A. `side` stays at A.
    fn with_merge() -> Fixture {
        let mut fx = Fixture::new();
        fx.commit_tree("A", &[("f.txt", Some("1"))]);
        fx.branch("topic", "main");
        fx.branch("side", "main");
        fx.commit_tree("B", &[("f.txt", Some("2"))]);
        fx.checkout("topic");
        fx.commit_tree("C", &[("g.txt", Some("1"))]);
        fx.checkout("main");
        merge(&mut fx.repo, "topic", Some("M"), |_| {}).unwrap();
        fx.checkout("side");
        fx
    }

    fn mainline(n: usize) -> SequenceOptions {
        SequenceOptions { mainline: Some(n) }
    }

    #[test]
    fn merge_commit_needs_a_mainline() {
        let mut fx = with_merge();
        let oid = fx.resolve("main");
        let err = cherry_pick(&mut fx.repo, &["main"], SequenceOptions::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("commit {oid} is a merge but no -m option was given")
        );
        assert!(!fx.repo.sequencer().in_progress());
    }

    #[test]
    fn mainline_needs_a_merge_commit() {
        let mut fx = with_merge();
        let oid = fx.resolve("main^");
        let err = cherry_pick(&mut fx.repo, &["main^"], mainline(1)).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("mainline was specified but commit {oid} is not a merge")
        );
        assert!(!fx.repo.sequencer().in_progress());
    }

    #[test]
    fn picks_against_the_first_parent() {
        let mut fx = with_merge();
        assert_completed(&cherry_pick(&mut fx.repo, &["main"], mainline(1)).unwrap());
        assert_eq!(fx.workspace(), files(&[("f.txt", "1"), ("g.txt", "1")]));
        assert_eq!(fx.messages(&["@^.."]), vec!["M"]);
    }

    #[test]
    fn picks_against_the_second_parent() {
        let mut fx = with_merge();
        assert_completed(&cherry_pick(&mut fx.repo, &["main"], mainline(2)).unwrap());
        assert_eq!(fx.workspace(), files(&[("f.txt", "2")]));
    }

    #[test]
    fn reverts_against_the_first_parent() {
        let mut fx = with_merge();
        fx.checkout("main");
        assert_completed(&revert(&mut fx.repo, &["@"], mainline(1)).unwrap());
        assert_eq!(fx.workspace(), files(&[("f.txt", "2")]));
        assert_eq!(fx.messages(&["@^.."]), vec!["Revert \"M\""]);
    }
}

mod reverting {
    use super::*;

    /// One line of history: one to four edit f.txt, then five (g.txt), six
    /// (f.txt), seven (g.txt), eight (g.txt).
    fn history() -> Fixture {
        let mut fx = Fixture::new();
        for message in ["one", "two", "three", "four"] {
            fx.commit_tree(message, &[("f.txt", Some(message))]);
        }
        fx.commit_tree("five", &[("g.txt", Some("five"))]);
        fx.commit_tree("six", &[("f.txt", Some("six"))]);
        fx.commit_tree("seven", &[("g.txt", Some("seven"))]);
        fx.commit_tree("eight", &[("g.txt", Some("eight"))]);
        fx
    }

    #[test]
    fn reverts_a_commit_on_head() {
        let mut fx = history();
        let six = fx.resolve("@~2");
        assert_completed(&undo(&mut fx, &["@~2"]));

        assert_eq!(fx.messages(&["@~2.."]), vec!["Revert \"six\"", "eight"]);
        assert_eq!(
            fx.load_commit("HEAD").message,
            format!("Revert \"six\"\n\nThis reverts commit {six}.\n")
        );
        assert_eq!(fx.index_contents(), files(&[("f.txt", "four"), ("g.txt", "eight")]));
        fx.assert_clean();
    }

    #[test]
    fn stops_on_a_content_conflict() {
        let mut fx = history();
        let short = fx.repo.database().short_oid(&fx.resolve("@~4"));
        let outcome = undo(&mut fx, &["@~4"]);

        assert_eq!(
            outcome,
            SequenceOutcome::Conflicted {
                name: format!("parent of {short}... four"),
                paths: vec!["f.txt".into()],
            }
        );
        assert_eq!(
            fx.read("f.txt"),
            format!("<<<<<<< HEAD\nsix\n=======\nthree\n>>>>>>> parent of {short}... four\n")
        );
        assert_eq!(fx.conflicts(), conflicts(&[("f.txt", &[1, 2, 3])]));
        assert_eq!(fx.repo.pending_commit().merge_type(), Some(MergeKind::Revert));
    }

    #[test]
    fn stops_on_a_modify_delete_conflict() {
        let mut fx = history();
        assert_conflicted(&undo(&mut fx, &["@~3"]));

        assert_eq!(fx.workspace(), files(&[("f.txt", "six"), ("g.txt", "eight")]));
        assert_eq!(fx.conflicts(), conflicts(&[("g.txt", &[1, 2])]));
    }

    #[test]
    fn continues_after_resolving() {
        let mut fx = history();
        let five = fx.resolve("@~3");
        undo(&mut fx, &["@~3"]);
        fx.add("g.txt");

        assert_completed(&sequence_continue(&mut fx.repo).unwrap());
        let head = fx.load_commit("HEAD");
        assert_eq!(head.parents, vec![fx.resolve("@^")]);
        assert_eq!(head.message, format!("Revert \"five\"\n\nThis reverts commit {five}.\n"));
        assert_eq!(fx.messages(&["@~2.."]), vec!["Revert \"five\"", "eight"]);
        assert_eq!(fx.index_contents(), files(&[("f.txt", "six"), ("g.txt", "eight")]));
    }

    #[test]
    fn reverts_several_commits_in_order() {
        let mut fx = history();
        assert_completed(&undo(&mut fx, &["@", "@^", "@^^"]));

        assert_eq!(
            fx.messages(&["@~4.."]),
            vec!["Revert \"six\"", "Revert \"seven\"", "Revert \"eight\"", "eight"]
        );
        assert_eq!(fx.index_contents(), files(&[("f.txt", "four"), ("g.txt", "five")]));
        fx.assert_clean();
    }

    #[test]
    fn stops_partway_through_a_list() {
        let mut fx = history();
        assert_conflicted(&undo(&mut fx, &["@^", "@"]));
        assert_eq!(fx.conflicts(), conflicts(&[("g.txt", &[1, 2, 3])]));
    }

    #[test]
    fn stops_partway_through_a_range() {
        let mut fx = history();
        assert_conflicted(&undo(&mut fx, &["@~5..@~2"]));
        assert_eq!(fx.conflicts(), conflicts(&[("g.txt", &[1, 2])]));
        assert_eq!(fx.messages(&["@^.."]), vec!["Revert \"six\""]);
    }

    #[test]
    fn abort_puts_the_branch_back() {
        let mut fx = history();
        let before = fx.head();
        undo(&mut fx, &["@~5..@~2"]);

        assert!(sequence_abort(&mut fx.repo).unwrap().is_empty());
        assert_eq!(fx.head(), before);
        assert_eq!(fx.workspace(), files(&[("f.txt", "six"), ("g.txt", "eight")]));
        fx.assert_clean();
    }

    #[test]
    fn reverting_a_root_commit_removes_its_files() {
        let mut fx = Fixture::new();
        fx.commit_tree("A", &[("f.txt", Some("1"))]);
        fx.commit_tree("B", &[("g.txt", Some("1"))]);

        assert_completed(&undo(&mut fx, &["@^"]));
        assert_eq!(fx.workspace(), files(&[("g.txt", "1")]));
        assert_eq!(fx.messages(&["@^.."]), vec!["Revert \"A\""]);
        fx.assert_clean();
    }

    #[test]
    fn nothing_to_continue() {
        let mut fx = history();
        let err = sequence_continue(&mut fx.repo).unwrap_err();
        assert!(matches!(err, MergeError::NoSequence));
        let err = sequence_abort(&mut fx.repo).unwrap_err();
        assert!(matches!(err, MergeError::NoSequence));
    }
}
