//! Lock tests: focal selection picks by secondary key among OPEN nodes
//! within the bound of the best label, and degrades to best-first with a
//! zero bound.

use std::sync::Arc;

use arbor_harness::evaluators::PathCost;
use arbor_harness::worlds::weighted_graph::{Place, WeightedGraph};
use arbor_search::{BestFirst, FocalPolicy, NodeId};
use lock_tests::PlaceSearch;

/// Within `slack` of the best label, prefer `z`, then `y`, then anything.
struct PreferLate {
    slack: u32,
}

impl FocalPolicy<Place, u32> for PreferLate {
    fn within_bound(&self, best: &u32, candidate: &u32) -> bool {
        *candidate <= best + self.slack
    }

    fn secondary(&self, state: &Place, _label: &u32) -> i64 {
        match *state {
            "z" => 0,
            "y" => 1,
            _ => 2,
        }
    }
}

fn fan() -> WeightedGraph {
    WeightedGraph::builder()
        .root("r")
        .edge("r", "x", 1)
        .edge("r", "y", 2)
        .edge("r", "z", 3)
        .build()
}

fn expansion_order(slack: u32) -> Vec<Place> {
    let graph = fan();
    let search: PlaceSearch = BestFirst::builder(
        Arc::new(graph.clone()),
        graph.goal(),
        Arc::new(PathCost::new(graph)),
    )
    .focal(Arc::new(PreferLate { slack }))
    .build()
    .unwrap();

    let mut order = Vec::new();
    while let Some(node) = search.next_expansion().unwrap() {
        order.push(state_of(&search, node));
    }
    order
}

fn state_of(search: &PlaceSearch, node: NodeId) -> Place {
    ["r", "x", "y", "z"]
        .into_iter()
        .find(|s| search.node(s).is_some_and(|n| n.id == node))
        .unwrap()
}

#[test_log::test]
fn wide_bound_follows_the_secondary_key() {
    assert_eq!(expansion_order(2), vec!["r", "z", "y", "x"]);
}

#[test_log::test]
fn narrow_bound_limits_the_focal_list() {
    assert_eq!(expansion_order(1), vec!["r", "y", "x", "z"]);
}

#[test_log::test]
fn zero_bound_is_plain_best_first() {
    assert_eq!(expansion_order(0), vec!["r", "x", "y", "z"]);
}
