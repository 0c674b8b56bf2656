//! Shared scenarios for the lock tests.
//!
//! Each scenario returns a fully typed search so call sites never rely on
//! trait-object inference, plus whatever handles the test needs to inspect
//! afterwards (for example the evaluator, to read its counters).

use std::sync::Arc;

use arbor_harness::evaluators::{Depth, PathCost, Scripted};
use arbor_harness::worlds::balanced_tree::{BalancedTree, TreeState};
use arbor_harness::worlds::weighted_graph::{Place, WeightedGraph};
use arbor_search::{BestFirst, NodeEvaluator, SearchConfig, SearchError};

pub type TreeSearch = BestFirst<TreeState, u32, usize>;
pub type PlaceSearch = BestFirst<Place, u32, u32>;
pub type TreeEvaluator = Arc<dyn NodeEvaluator<TreeState, u32, usize>>;
pub type PlaceEvaluator = Arc<dyn NodeEvaluator<Place, u32, u32>>;

#[must_use]
pub fn config(cpus: usize) -> SearchConfig {
    SearchConfig {
        cpus,
        ..SearchConfig::default()
    }
}

/// Depth-labeled search over a balanced tree.
///
/// # Panics
///
/// If the configuration does not validate.
#[must_use]
pub fn tree_search(tree: BalancedTree, config: SearchConfig) -> TreeSearch {
    tree_search_with(tree, Arc::new(Depth), config).unwrap()
}

/// # Errors
///
/// As [`BestFirst::new`].
pub fn tree_search_with(
    tree: BalancedTree,
    evaluator: TreeEvaluator,
    config: SearchConfig,
) -> Result<TreeSearch, SearchError> {
    BestFirst::new(Arc::new(tree), tree.goal(), evaluator, config)
}

/// Path-cost search over a weighted graph.
///
/// # Errors
///
/// As [`BestFirst::new`].
pub fn place_search(graph: WeightedGraph, config: SearchConfig) -> Result<PlaceSearch, SearchError> {
    let evaluator: PlaceEvaluator = Arc::new(PathCost::new(graph.clone()));
    place_search_with(graph, evaluator, config)
}

/// # Errors
///
/// As [`BestFirst::new`].
pub fn place_search_with(
    graph: WeightedGraph,
    evaluator: PlaceEvaluator,
    config: SearchConfig,
) -> Result<PlaceSearch, SearchError> {
    let goal = graph.goal();
    BestFirst::new(Arc::new(graph), goal, evaluator, config)
}

/// `t` is reachable through `a` (cost 6) and, more cheaply, through `b`
/// (cost 5). `a` is labeled lower, so the expensive path is found first.
#[must_use]
pub fn diamond() -> WeightedGraph {
    WeightedGraph::builder()
        .root("s")
        .edge("s", "a", 1)
        .edge("s", "b", 4)
        .edge("a", "t", 5)
        .edge("b", "t", 1)
        .goal("t")
        .build()
}

/// Like [`diamond`], but the doubly reached state `m` is an inner node in
/// front of the goal `g`, so both entries for `m` meet on OPEN.
#[must_use]
pub fn relay() -> WeightedGraph {
    WeightedGraph::builder()
        .root("s")
        .edge("s", "a", 1)
        .edge("s", "b", 4)
        .edge("a", "m", 5)
        .edge("b", "m", 1)
        .edge("m", "g", 1)
        .goal("g")
        .build()
}

/// `c` is expanded through `a` (cost 6) before an overestimate on `b`
/// lets the cheaper path through `b` (cost 3) surface, so `c` and the goal
/// `t` behind it are re-reached after they were closed.
#[must_use]
pub fn detour() -> WeightedGraph {
    WeightedGraph::builder()
        .root("s")
        .edge("s", "a", 1)
        .edge("s", "b", 2)
        .edge("a", "c", 5)
        .edge("b", "c", 1)
        .edge("c", "t", 1)
        .goal("t")
        .estimate("b", 10)
        .build()
}

/// Root `r` with inner nodes `a` (10) and `b` (11); leaves `a0` (20),
/// `a1` (21), `b0` (15), `b1` (16) are the goals.
#[must_use]
pub fn two_level() -> (WeightedGraph, PlaceEvaluator) {
    let graph = WeightedGraph::builder()
        .root("r")
        .edge("r", "a", 1)
        .edge("r", "b", 1)
        .edge("a", "a0", 1)
        .edge("a", "a1", 1)
        .edge("b", "b0", 1)
        .edge("b", "b1", 1)
        .goal("a0")
        .goal("a1")
        .goal("b0")
        .goal("b1")
        .build();
    let labels: PlaceEvaluator = Arc::new(Scripted::<Place, u32>::new([
        ("r", 0),
        ("a", 10),
        ("b", 11),
        ("a0", 20),
        ("a1", 21),
        ("b0", 15),
        ("b1", 16),
    ]));
    (graph, labels)
}
