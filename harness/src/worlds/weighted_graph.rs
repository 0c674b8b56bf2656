//! `WeightedGraph`: an explicit edge table with per-edge costs.
//!
//! Unlike [`super::balanced_tree::BalancedTree`], states may be reached
//! along several paths, which is what the parent-discarding policies act
//! on. Actions are the edge costs, so the cost of a path is the sum of its
//! actions. An optional heuristic table turns the path cost into an A*
//! style label (see [`crate::evaluators::PathCost`]).
//!
//! States listed with [`WeightedGraphBuilder::fail_on`] make successor
//! generation return an error; [`WeightedGraphBuilder::panic_on`] makes it
//! panic.

use std::collections::{BTreeMap, BTreeSet};

use arbor_search::{GoalTest, GraphError, SearchGraph, Successor};

pub type Place = &'static str;

#[derive(Debug, Clone, Default)]
pub struct WeightedGraph {
    roots: Vec<Place>,
    edges: BTreeMap<Place, Vec<(Place, u32)>>,
    goals: BTreeSet<Place>,
    heuristic: BTreeMap<Place, u32>,
    fail_on: BTreeSet<Place>,
    panic_on: BTreeSet<Place>,
}

#[derive(Debug, Default)]
pub struct WeightedGraphBuilder {
    graph: WeightedGraph,
}

impl WeightedGraphBuilder {
    #[must_use]
    pub fn root(mut self, place: Place) -> Self {
        self.graph.roots.push(place);
        self
    }

    /// Directed edge. Successors come out in insertion order.
    #[must_use]
    pub fn edge(mut self, from: Place, to: Place, cost: u32) -> Self {
        self.graph.edges.entry(from).or_default().push((to, cost));
        self
    }

    #[must_use]
    pub fn goal(mut self, place: Place) -> Self {
        self.graph.goals.insert(place);
        self
    }

    /// Estimated remaining cost from `place`. Missing entries count as 0.
    #[must_use]
    pub fn estimate(mut self, place: Place, cost: u32) -> Self {
        self.graph.heuristic.insert(place, cost);
        self
    }

    #[must_use]
    pub fn fail_on(mut self, place: Place) -> Self {
        self.graph.fail_on.insert(place);
        self
    }

    #[must_use]
    pub fn panic_on(mut self, place: Place) -> Self {
        self.graph.panic_on.insert(place);
        self
    }

    #[must_use]
    pub fn build(self) -> WeightedGraph {
        self.graph
    }
}

impl WeightedGraph {
    #[must_use]
    pub fn builder() -> WeightedGraphBuilder {
        WeightedGraphBuilder::default()
    }

    #[must_use]
    pub fn estimate(&self, place: Place) -> u32 {
        self.heuristic.get(place).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn is_goal(&self, place: Place) -> bool {
        self.goals.contains(place)
    }

    #[must_use]
    pub fn goal(&self) -> GoalTest<Place, u32> {
        let goals = self.goals.clone();
        GoalTest::node_fn(move |p: &Place| goals.contains(p))
    }

    /// Number of distinct places mentioned anywhere in the table.
    #[must_use]
    pub fn place_count(&self) -> usize {
        let mut places: BTreeSet<Place> = self.roots.iter().copied().collect();
        for (from, outs) in &self.edges {
            places.insert(*from);
            places.extend(outs.iter().map(|(to, _)| *to));
        }
        places.len()
    }
}

impl SearchGraph<Place, u32> for WeightedGraph {
    fn roots(&self) -> Result<Vec<Place>, GraphError> {
        if self.roots.is_empty() {
            return Err(GraphError::new("graph has no roots"));
        }
        Ok(self.roots.clone())
    }

    fn successors(&self, state: &Place) -> Result<Vec<Successor<Place, u32>>, GraphError> {
        if self.fail_on.contains(state) {
            return Err(GraphError::new(format!("no successors available for {state}")));
        }
        assert!(
            !self.panic_on.contains(state),
            "successor generator exploded at {state}"
        );
        Ok(self
            .edges
            .get(state)
            .map(|outs| {
                outs.iter()
                    .map(|&(to, cost)| Successor::new(cost, to))
                    .collect()
            })
            .unwrap_or_default())
    }
}
