//! World implementations for the harness runner.

pub mod balanced_tree;
pub mod weighted_graph;
