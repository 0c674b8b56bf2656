//! Lock tests: the three parent-discarding policies on graphs where a
//! state is reached along more than one path.

use arbor_harness::runner::EventRecorder;
use arbor_search::{GraphEvent, NodeKind, ParentDiscarding, SearchConfig, SearchError};
use lock_tests::{detour, diamond, place_search, relay};

fn with_policy(parent_discarding: ParentDiscarding) -> SearchConfig {
    SearchConfig {
        parent_discarding,
        ..SearchConfig::default()
    }
}

// ---------------------------------------------------------------------------
// NONE: the graph must be a tree
// ---------------------------------------------------------------------------

#[test_log::test]
fn none_rejects_a_state_reached_twice() {
    let search = place_search(diamond(), with_policy(ParentDiscarding::None)).unwrap();
    let first = search.next_solution().unwrap().unwrap();
    assert_eq!(first.states, vec!["s", "a", "t"]);
    let err = search.next_solution().unwrap_err();
    assert!(
        matches!(&err, SearchError::StateReachedTwice { state } if state.contains('t')),
        "got {err:?}"
    );
    let again = search.next_solution().unwrap_err();
    assert!(matches!(again, SearchError::Aborted { .. }), "got {again:?}");
}

// ---------------------------------------------------------------------------
// OPEN: keep the better of two OPEN entries
// ---------------------------------------------------------------------------

#[test_log::test]
fn open_keeps_the_cheaper_duplicate() {
    let config = SearchConfig::from_json_str(r#"{"parent_discarding": "open"}"#).unwrap();
    let search = place_search(relay(), config).unwrap();
    let mut recorder = EventRecorder::attach(&search);

    let solutions = search.run_to_completion().unwrap();
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].score, 6);
    assert_eq!(solutions[0].states, vec!["s", "b", "m", "g"]);
    assert_eq!(search.label_of(&"m"), Some(5));
    // s, a, b and the surviving m.
    assert_eq!(search.expanded_count(), 4);

    let events = recorder.drain();
    let first_m = events
        .iter()
        .find_map(|e| match e {
            GraphEvent::NodeAdded { node, state, .. } if *state == "m" => Some(*node),
            _ => None,
        })
        .unwrap();
    let removed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            GraphEvent::NodeRemoved { node } => Some(*node),
            _ => None,
        })
        .collect();
    assert_eq!(removed, vec![first_m], "the first m entry leaves OPEN");
}

#[test_log::test]
fn open_reports_every_goal_path_without_queueing_goals() {
    let search = place_search(diamond(), with_policy(ParentDiscarding::Open)).unwrap();
    let mut recorder = EventRecorder::attach(&search);

    let scores: Vec<u32> = search
        .run_to_completion()
        .unwrap()
        .iter()
        .map(|s| s.score)
        .collect();
    assert_eq!(scores, vec![6, 5], "both goal paths are reported");
    assert_eq!(search.best_score(), Some(5));
    assert_eq!(search.label_of(&"t"), Some(5));
    assert_eq!(search.path_to(&"t").unwrap().states, vec!["s", "b", "t"]);
    assert_eq!(search.expanded_count(), 3);
    assert!(
        !recorder
            .drain()
            .iter()
            .any(|e| matches!(e, GraphEvent::NodeRemoved { .. })),
        "goal entries never meet on OPEN"
    );
}

#[test_log::test]
fn open_does_not_reopen_closed_states() {
    let search = place_search(detour(), with_policy(ParentDiscarding::Open)).unwrap();
    let scores: Vec<u32> = search
        .run_to_completion()
        .unwrap()
        .iter()
        .map(|s| s.score)
        .collect();
    assert_eq!(scores, vec![7]);
    // s, a, c, b; the goal t is never expanded.
    assert_eq!(search.expanded_count(), 4);
    assert_eq!(search.path_to(&"c").unwrap().states, vec!["s", "a", "c"]);
    assert_eq!(search.label_of(&"c"), Some(6));
}

// ---------------------------------------------------------------------------
// ALL: closed states are reopened on a strictly better path
// ---------------------------------------------------------------------------

#[test_log::test]
fn all_reopens_closed_states_on_a_better_path() {
    let search = place_search(detour(), with_policy(ParentDiscarding::All)).unwrap();
    let mut recorder = EventRecorder::attach(&search);

    let scores: Vec<u32> = search
        .run_to_completion()
        .unwrap()
        .iter()
        .map(|s| s.score)
        .collect();
    assert_eq!(scores, vec![7, 4]);
    assert_eq!(search.best_score(), Some(4));
    // c is expanded twice: once via a, once after reopening via b.
    assert_eq!(search.expanded_count(), 5);
    assert_eq!(search.label_of(&"c"), Some(3));
    assert_eq!(
        search.path_to(&"t").unwrap().states,
        vec!["s", "b", "c", "t"]
    );

    let c = search.node(&"c").unwrap();
    let b = search.node(&"b").unwrap();
    assert_eq!(c.parent, Some(b.id));
    assert_eq!(c.depth, 2);

    let events = recorder.drain();
    let switched: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            GraphEvent::NodeParentSwitched {
                node, new_parent, ..
            } => Some((*node, *new_parent)),
            _ => None,
        })
        .collect();
    assert_eq!(switched, vec![(c.id, Some(b.id))]);
    let reopened = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                GraphEvent::NodeTypeSwitched {
                    kind: NodeKind::Open,
                    ..
                }
            )
        })
        .count();
    assert_eq!(reopened, 1);
}

#[test_log::test]
fn all_keeps_closed_state_when_new_path_is_not_better() {
    // `c` is closed before `b` reaches it again at a higher cost.
    let graph = arbor_harness::worlds::weighted_graph::WeightedGraph::builder()
        .root("s")
        .edge("s", "a", 1)
        .edge("s", "b", 5)
        .edge("a", "c", 1)
        .edge("b", "c", 3)
        .goal("z")
        .build();
    let search = place_search(graph, with_policy(ParentDiscarding::All)).unwrap();
    assert!(search.run_to_completion().unwrap().is_empty());
    assert_eq!(search.path_to(&"c").unwrap().states, vec!["s", "a", "c"]);
    assert_eq!(search.expanded_count(), 4);
}
