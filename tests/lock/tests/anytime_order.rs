//! Lock tests: step-by-step OPEN accounting, anytime solution order and
//! the dominance query.

use arbor_harness::runner::EventRecorder;
use arbor_harness::worlds::balanced_tree::{BalancedTree, TreeState};
use arbor_search::{GraphEvent, NodeKind, Step, Termination};
use lock_tests::{config, place_search_with, tree_search, two_level};

// ---------------------------------------------------------------------------
// ACCEPTANCE: OPEN size moves by (non-goal successors) - 1 per expansion
// ---------------------------------------------------------------------------

#[test_log::test]
fn open_size_tracks_each_step() {
    let search = tree_search(BalancedTree::new(2, 3), config(1));
    let mut recorder = EventRecorder::attach(&search);
    let mut before = search.open_len();
    assert_eq!(before, 0);
    loop {
        let step = search.step().unwrap();
        let after = search.open_len();
        let opened = recorder
            .take_new()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    GraphEvent::NodeAdded {
                        kind: NodeKind::Open,
                        parent: Some(_),
                        ..
                    }
                )
            })
            .count();
        match step {
            Step::Initialized => assert_eq!(after, 1),
            Step::ExpansionSubmitted { successors, .. } => {
                assert!(opened <= successors);
                assert_eq!(after + 1, before + opened);
            }
            Step::GoalNodeClosed { .. } => panic!("no goal node is ever on OPEN here"),
            Step::SolutionFound(_) => assert_eq!(after, before),
            Step::Finished(reason) => {
                assert_eq!(reason, Termination::Exhausted);
                assert_eq!(after, 0);
                break;
            }
        }
        before = after;
    }
}

#[test_log::test]
fn expansions_follow_label_order() {
    let search = tree_search(BalancedTree::new(2, 3), config(1));
    let mut order = Vec::new();
    while let Some(node) = search.next_expansion().unwrap() {
        let off_open = search.open_snapshot().iter().all(|(id, _)| *id != node);
        assert!(off_open, "expanded node still on OPEN");
        order.push(node);
    }
    // Labels are depths, so ids (creation order) come out level by level.
    assert!(order.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(order.len(), 7, "only inner nodes are expanded");
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: two-level scenario
// ---------------------------------------------------------------------------

#[test_log::test]
fn solutions_arrive_in_discovery_order() {
    let (graph, labels) = two_level();
    let search = place_search_with(graph, labels, config(1)).unwrap();
    let scores: Vec<u32> = std::iter::from_fn(|| search.next_solution().unwrap())
        .map(|s| s.score)
        .collect();
    // `a` (10) is expanded before `b` (11).
    assert_eq!(scores, vec![20, 21, 15, 16]);
    assert_eq!(search.best_score(), Some(15));
}

#[test_log::test]
fn dominance_query_returns_the_best_leaf() {
    let (graph, labels) = two_level();
    let search = place_search_with(graph, labels, config(1)).unwrap();
    let mut recorder = EventRecorder::attach(&search);

    let best = search.next_solution_dominating_open().unwrap().unwrap();
    assert_eq!(best.score, 15);
    assert_eq!(best.states, vec!["r", "b", "b0"]);

    let added: Vec<_> = recorder
        .drain()
        .iter()
        .filter_map(|e| match e {
            GraphEvent::NodeAdded { state, kind, .. } => Some((*state, *kind)),
            _ => None,
        })
        .collect();
    assert_eq!(added.len(), 7);
    assert_eq!(added[0], ("r", NodeKind::Open));
    assert_eq!(
        added.iter().filter(|(_, k)| *k == NodeKind::Solution).count(),
        4
    );
}

#[test_log::test]
fn best_score_never_regresses() {
    let (graph, labels) = two_level();
    let search = place_search_with(graph, labels, config(1)).unwrap();
    let mut best = None;
    while search.next_solution().unwrap().is_some() {
        let now = search.best_score();
        if let (Some(previous), Some(current)) = (best, now) {
            assert!(current <= previous);
        }
        best = now;
    }
    assert_eq!(best, Some(15));
}

#[test_log::test]
fn annotations_record_evaluation_time() {
    let search = tree_search(BalancedTree::new(2, 1), config(1));
    search.run_to_completion().unwrap();
    let notes = search.node_annotations(&TreeState::new(1, 1)).unwrap();
    assert!(notes.contains_key("f_time_ms"));
    assert!(!notes.contains_key("f_error"));
}
