//! `BalancedTree`: a complete tree of fixed branching factor and depth.
//!
//! States are `(depth, index)` pairs, so every state is reached by exactly
//! one path and the graph is a tree. Goals are the leaves. With branching
//! `b` and depth `d` the tree has `b^d` leaves and `(b^d - 1) / (b - 1)`
//! inner nodes, which tests use as exact expectations.

use serde::Serialize;

use arbor_search::{GoalTest, GraphError, SearchGraph, Successor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TreeState {
    pub depth: u32,
    pub index: u64,
}

impl TreeState {
    pub const ROOT: Self = Self { depth: 0, index: 0 };

    #[must_use]
    pub fn new(depth: u32, index: u64) -> Self {
        Self { depth, index }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BalancedTree {
    branching: u32,
    depth: u32,
}

impl BalancedTree {
    #[must_use]
    pub fn new(branching: u32, depth: u32) -> Self {
        Self { branching, depth }
    }

    #[must_use]
    pub fn branching(&self) -> u32 {
        self.branching
    }

    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[must_use]
    pub fn leaf_count(&self) -> u64 {
        u64::from(self.branching).pow(self.depth)
    }

    /// Nodes with children.
    #[must_use]
    pub fn inner_count(&self) -> u64 {
        (0..self.depth)
            .map(|d| u64::from(self.branching).pow(d))
            .sum()
    }

    #[must_use]
    pub fn is_leaf(&self, state: &TreeState) -> bool {
        state.depth >= self.depth
    }

    /// Goal test matching the leaves.
    #[must_use]
    pub fn goal(&self) -> GoalTest<TreeState, u32> {
        let depth = self.depth;
        GoalTest::node_fn(move |s: &TreeState| s.depth >= depth)
    }
}

impl SearchGraph<TreeState, u32> for BalancedTree {
    fn roots(&self) -> Result<Vec<TreeState>, GraphError> {
        Ok(vec![TreeState::ROOT])
    }

    fn successors(&self, state: &TreeState) -> Result<Vec<Successor<TreeState, u32>>, GraphError> {
        if self.is_leaf(state) {
            return Ok(Vec::new());
        }
        let base = state.index * u64::from(self.branching);
        Ok((0..self.branching)
            .map(|b| Successor::new(b, TreeState::new(state.depth + 1, base + u64::from(b))))
            .collect())
    }
}
