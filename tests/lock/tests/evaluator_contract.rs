//! Lock tests: how each evaluator outcome lands on the node (label,
//! prune, failure, panic, per-node timeout with and without fallback) and
//! evaluators that report solutions themselves.

use std::sync::Arc;
use std::time::Duration;

use arbor_harness::evaluators::{Depth, Fault, Faulty, Reporting, Slow};
use arbor_harness::runner::EventRecorder;
use arbor_harness::worlds::balanced_tree::{BalancedTree, TreeState};
use arbor_search::{
    AlternativeEvaluator, BestFirst, EvalContext, EvalError, FnEvaluator, GraphEvent, NodeKind, SearchConfig,
    SearchError, SearchPath, Termination,
};
use lock_tests::{config, tree_search_with, TreeEvaluator, TreeSearch};
use serde_json::json;

const LEFT: TreeState = TreeState { depth: 1, index: 0 };
const RIGHT: TreeState = TreeState { depth: 1, index: 1 };

fn depth() -> TreeEvaluator {
    Arc::new(Depth)
}

fn faulty(fault: Fault, target: TreeState) -> TreeEvaluator {
    Arc::new(Faulty::new(depth(), fault, move |s: &TreeState| *s == target))
}

fn constant(label: usize) -> TreeEvaluator {
    Arc::new(FnEvaluator::new(
        move |_: &SearchPath<TreeState, u32>, _: &EvalContext| -> Result<Option<usize>, EvalError> {
            Ok(Some(label))
        },
    ))
}

fn kind_switches(recorder: &mut EventRecorder<TreeState, u32, usize>, kind: NodeKind) -> usize {
    recorder
        .drain()
        .iter()
        .filter(|e| matches!(e, GraphEvent::NodeTypeSwitched { kind: k, .. } if *k == kind))
        .count()
}

// ---------------------------------------------------------------------------
// Prunes, failures and panics
// ---------------------------------------------------------------------------

#[test_log::test]
fn pruned_node_never_reaches_open() {
    let search = tree_search_with(BalancedTree::new(2, 2), faulty(Fault::Prune, LEFT), config(1))
        .unwrap();
    let mut recorder = EventRecorder::attach(&search);
    assert_eq!(search.run_to_completion().unwrap().len(), 2);

    let node = search.node(&LEFT).unwrap();
    assert_eq!(node.label, None);
    assert!(!node.annotations.contains_key("f_error"));
    assert_eq!(kind_switches(&mut recorder, NodeKind::Pruned), 1);
}

#[test_log::test]
fn failed_evaluation_is_annotated_and_pruned() {
    let search = tree_search_with(BalancedTree::new(2, 2), faulty(Fault::Fail, LEFT), config(1))
        .unwrap();
    assert_eq!(search.run_to_completion().unwrap().len(), 2);
    let notes = search.node_annotations(&LEFT).unwrap();
    let error = notes["f_error"].as_str().unwrap();
    assert!(error.starts_with("refusing to label"), "got {error}");
}

#[test_log::test]
fn panicking_evaluator_is_contained() {
    let search = tree_search_with(
        BalancedTree::new(2, 2),
        faulty(Fault::Panic, RIGHT),
        config(4),
    )
    .unwrap();
    assert_eq!(search.run_to_completion().unwrap().len(), 2);
    assert_eq!(
        search.lifecycle(),
        arbor_search::Lifecycle::Inactive(Termination::Exhausted)
    );
    let notes = search.node_annotations(&RIGHT).unwrap();
    let error = notes["f_error"].as_str().unwrap();
    assert!(error.starts_with("panic: evaluator exploded"), "got {error}");
}

#[test_log::test]
fn pruned_root_is_a_structural_failure() {
    let search = tree_search_with(
        BalancedTree::new(2, 2),
        faulty(Fault::Prune, TreeState::ROOT),
        config(1),
    )
    .unwrap();
    let err = search.step().unwrap_err();
    assert!(matches!(err, SearchError::UnlabeledRoot { .. }), "got {err:?}");
}

#[test_log::test]
fn alternative_evaluator_labels_what_the_primary_prunes() {
    let evaluator: TreeEvaluator = Arc::new(AlternativeEvaluator::new(
        faulty(Fault::Prune, LEFT),
        constant(50),
    ));
    let search = tree_search_with(BalancedTree::new(2, 2), evaluator, config(1)).unwrap();
    assert_eq!(search.run_to_completion().unwrap().len(), 4);
    assert_eq!(search.label_of(&LEFT), Some(50));
    assert_eq!(search.label_of(&RIGHT), Some(1));
}

// ---------------------------------------------------------------------------
// Per-node timeout
// ---------------------------------------------------------------------------

fn slow_right(stubborn: bool) -> TreeEvaluator {
    let slow = Slow::new(depth(), Duration::from_millis(120))
        .only_when(|s: &TreeState| *s == RIGHT);
    if stubborn {
        Arc::new(slow.stubborn())
    } else {
        Arc::new(slow)
    }
}

fn node_budget() -> SearchConfig {
    SearchConfig {
        node_timeout_ms: Some(20),
        ..SearchConfig::default()
    }
}

#[test_log::test]
fn late_result_falls_back_to_the_fallback_evaluator() {
    let tree = BalancedTree::new(2, 2);
    let search: TreeSearch = BestFirst::builder(Arc::new(tree), tree.goal(), slow_right(true))
        .config(node_budget())
        .fallback_evaluator(constant(100))
        .build()
        .unwrap();
    assert_eq!(search.run_to_completion().unwrap().len(), 4);
    assert_eq!(search.label_of(&RIGHT), Some(100));
    let notes = search.node_annotations(&RIGHT).unwrap();
    assert_eq!(notes["f_error"], json!("timeout"));
    assert_eq!(notes["f_fallback"], json!(true));
}

#[test_log::test]
fn timed_out_node_without_fallback_is_dropped() {
    for stubborn in [false, true] {
        let search =
            tree_search_with(BalancedTree::new(2, 2), slow_right(stubborn), node_budget()).unwrap();
        let mut recorder = EventRecorder::attach(&search);
        assert_eq!(search.run_to_completion().unwrap().len(), 2, "stubborn={stubborn}");
        assert_eq!(search.label_of(&RIGHT), None);
        let notes = search.node_annotations(&RIGHT).unwrap();
        assert_eq!(notes["f_error"], json!("timeout"));
        assert_eq!(kind_switches(&mut recorder, NodeKind::TimedOut), 1);
    }
}

#[test_log::test]
fn evaluator_annotations_are_kept() {
    let evaluator: TreeEvaluator = Arc::new(Slow::new(depth(), Duration::from_millis(1)));
    let search = tree_search_with(BalancedTree::new(2, 1), evaluator, config(1)).unwrap();
    search.run_to_completion().unwrap();
    let notes = search.node_annotations(&RIGHT).unwrap();
    assert_eq!(notes["slept_ms"], json!(1));
}

// ---------------------------------------------------------------------------
// Evaluators that report solutions
// ---------------------------------------------------------------------------

#[test_log::test]
fn reporting_evaluator_owns_solution_registration() {
    let reporter = Arc::new(Reporting::new(depth()));
    let search = tree_search_with(BalancedTree::new(2, 2), reporter.clone(), config(4)).unwrap();
    assert!(reporter.is_attached());
    let mut recorder = EventRecorder::attach(&search);

    let solutions = search.run_to_completion().unwrap();
    assert_eq!(solutions.len(), 4);
    assert_eq!(reporter.reported(), 4);
    for solution in &solutions {
        assert_eq!(solution.annotations["reported_by"], json!("evaluator"));
    }
    let counts = recorder.counts();
    assert_eq!(counts.get("solution_found"), Some(&4));
    assert_eq!(counts.get("solution_annotated"), Some(&4));
}
