//! Observer event stream.
//!
//! Events are published in causal order (a node's `NodeAdded` precedes any
//! event about its children) to every live subscriber. Delivery is
//! best-effort: subscribers whose receiver was dropped are pruned on the
//! next publish.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;

use crate::node::NodeId;
use crate::solution::Solution;

/// Role of a node as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Open,
    Expanding,
    Closed,
    Pruned,
    TimedOut,
    /// Goal node.
    Solution,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent<S, A, V> {
    /// All roots are labeled and on OPEN.
    GraphInitialized { roots: Vec<NodeId> },
    NodeAdded {
        parent: Option<NodeId>,
        node: NodeId,
        state: S,
        kind: NodeKind,
    },
    NodeTypeSwitched { node: NodeId, kind: NodeKind },
    /// A discarding decision dropped `node` from OPEN (or never admitted it).
    NodeRemoved { node: NodeId },
    NodeParentSwitched {
        node: NodeId,
        old_parent: Option<NodeId>,
        new_parent: Option<NodeId>,
    },
    SuccessorsComputed { node: NodeId, successors: usize },
    ExpansionSubmitted { node: NodeId },
    /// The last node builder of an expansion finished.
    ExpansionCompleted { node: NodeId },
    SolutionFound { solution: Solution<S, A, V> },
    SolutionAnnotated {
        states: Vec<S>,
        key: String,
        value: serde_json::Value,
    },
}

impl<S, A, V> GraphEvent<S, A, V> {
    /// Short name, matching the serialized `type` tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::GraphInitialized { .. } => "graph_initialized",
            Self::NodeAdded { .. } => "node_added",
            Self::NodeTypeSwitched { .. } => "node_type_switched",
            Self::NodeRemoved { .. } => "node_removed",
            Self::NodeParentSwitched { .. } => "node_parent_switched",
            Self::SuccessorsComputed { .. } => "successors_computed",
            Self::ExpansionSubmitted { .. } => "expansion_submitted",
            Self::ExpansionCompleted { .. } => "expansion_completed",
            Self::SolutionFound { .. } => "solution_found",
            Self::SolutionAnnotated { .. } => "solution_annotated",
        }
    }
}

impl<S: Serialize, A: Serialize, V: Serialize> GraphEvent<S, A, V> {
    /// Render as one JSON object.
    ///
    /// # Errors
    ///
    /// Propagates a serializer failure from a state, action or label type.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Fan-out to subscribers.
pub(crate) struct EventBus<E> {
    subscribers: Mutex<Vec<Sender<E>>>,
}

impl<E: Clone> EventBus<E> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Build the event only if someone is listening.
    pub(crate) fn publish_with(&self, build: impl FnOnce() -> E) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        let event = build();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn publish(&self, event: E) {
        self.publish_with(|| event);
    }
}
