//! Lock tests: structural failures of the graph, the goal test or the
//! configuration end the search with a typed error, returned once.

use std::sync::Arc;

use arbor_harness::evaluators::PathCost;
use arbor_harness::worlds::weighted_graph::{Place, WeightedGraph};
use arbor_search::{
    BestFirst, GoalTest, GraphError, NodeGoalTester, PanicStage, SearchConfig, SearchError, Step,
    Termination,
};
use lock_tests::{config, place_search, PlaceSearch};

fn chain() -> WeightedGraph {
    WeightedGraph::builder()
        .root("s")
        .edge("s", "a", 1)
        .edge("s", "b", 2)
        .edge("a", "c", 1)
        .goal("c")
        .build()
}

// ---------------------------------------------------------------------------
// Successor generation
// ---------------------------------------------------------------------------

#[test_log::test]
fn successor_error_is_returned_then_search_is_aborted() {
    let graph = WeightedGraph::builder()
        .root("s")
        .edge("s", "a", 1)
        .fail_on("a")
        .build();
    let search = place_search(graph, config(1)).unwrap();

    let err = search.next_solution().unwrap_err();
    match &err {
        SearchError::SuccessorGeneration { state, source } => {
            assert!(state.contains('a'));
            assert!(source.message().contains("no successors"));
        }
        other => panic!("expected SuccessorGeneration, got {other:?}"),
    }
    let later = search.next_solution().unwrap_err();
    assert!(
        matches!(&later, SearchError::Aborted { detail } if detail.contains("no successors")),
        "got {later:?}"
    );
    assert!(matches!(
        search.step().unwrap(),
        Step::Finished(Termination::Failed)
    ));
}

#[test_log::test]
fn successor_panic_is_caught() {
    let graph = WeightedGraph::builder()
        .root("s")
        .edge("s", "a", 1)
        .panic_on("s")
        .build();
    let search = place_search(graph, config(1)).unwrap();
    let err = search.run_to_completion().unwrap_err();
    assert!(
        matches!(
            &err,
            SearchError::Panicked { stage: PanicStage::SuccessorGeneration, message }
                if message.contains("exploded")
        ),
        "got {err:?}"
    );
}

#[test_log::test]
fn root_generation_failure() {
    let search = place_search(WeightedGraph::default(), config(1)).unwrap();
    let err = search.step().unwrap_err();
    assert!(matches!(err, SearchError::RootGeneration(_)), "got {err:?}");
    assert!(matches!(
        search.step().unwrap(),
        Step::Finished(Termination::Failed)
    ));
}

// ---------------------------------------------------------------------------
// Goal test
// ---------------------------------------------------------------------------

/// Fails on `b`; goal is `c`.
struct Picky;

impl NodeGoalTester<Place> for Picky {
    fn is_goal(&self, state: &Place) -> Result<bool, GraphError> {
        match *state {
            "b" => Err(GraphError::new("cannot judge b")),
            other => Ok(other == "c"),
        }
    }
}

#[test_log::test]
fn goal_test_error_on_a_worker_reaches_the_driver() {
    let graph = chain();
    let search: PlaceSearch = BestFirst::new(
        Arc::new(graph.clone()),
        GoalTest::Node(Arc::new(Picky)),
        Arc::new(PathCost::new(graph)),
        config(3),
    )
    .unwrap();
    assert_eq!(search.pool_size(), 2);
    let err = search.run_to_completion().unwrap_err();
    assert!(
        matches!(&err, SearchError::GoalTest { state, .. } if state.contains('b')),
        "got {err:?}"
    );
    assert!(search.next_solution().is_err());
}

#[test_log::test]
fn goal_test_panic_at_the_root() {
    let graph = chain();
    let search: PlaceSearch = BestFirst::new(
        Arc::new(graph.clone()),
        GoalTest::node_fn(|_: &Place| panic!("goal test exploded")),
        Arc::new(PathCost::new(graph)),
        SearchConfig::default(),
    )
    .unwrap();
    let err = search.step().unwrap_err();
    assert!(
        matches!(
            &err,
            SearchError::Panicked { stage: PanicStage::GoalTest, .. }
        ),
        "got {err:?}"
    );
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test_log::test]
fn invalid_configuration_is_rejected_at_build() {
    let err = place_search(chain(), config(0)).err().unwrap();
    assert!(matches!(err, SearchError::InvalidConfig { .. }), "got {err:?}");
}
