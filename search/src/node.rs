//! Search nodes and the state → node registry.
//!
//! Nodes live in an append-only arena addressed by [`NodeId`]; parent links
//! are ids, never references. The registry index maps each external state
//! to its one *indexed* node. Under a discarding policy a re-reached state
//! gets an unindexed candidate record, which either loses (and stays in the
//! arena as history) or takes over the index.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::contract::{SearchAction, SearchState};
use crate::error::SearchError;

/// Stable arena index. Ids are assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl NodeId {
    fn index(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

/// A node of the search tree.
#[derive(Debug, Clone)]
pub struct SearchNode<S, A, V> {
    pub id: NodeId,
    pub state: S,
    /// Arc label from the parent (`None` for roots).
    pub action: Option<A>,
    /// `None` only for roots. Rewritten only when a closed node is reopened.
    pub parent: Option<NodeId>,
    /// `None` until evaluated. Unlabeled nodes never enter OPEN.
    pub label: Option<V>,
    pub is_goal: bool,
    /// Tree depth (root = 0).
    pub depth: u32,
    /// Append-only diagnostic bag (`f_time_ms`, `f_error`, ...).
    pub annotations: BTreeMap<String, serde_json::Value>,
}

/// A root-first path: `states[0]` is a root, `actions[i]` leads from
/// `states[i]` to `states[i + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath<S, A> {
    pub states: Vec<S>,
    pub actions: Vec<A>,
}

impl<S, A> SearchPath<S, A> {
    #[must_use]
    pub fn root(state: S) -> Self {
        Self {
            states: vec![state],
            actions: Vec::new(),
        }
    }

    /// The last state on the path (the node being evaluated or tested).
    #[must_use]
    pub fn head(&self) -> Option<&S> {
        self.states.last()
    }

    /// Number of states on the path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Depth of the head node (root = 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.states.len().saturating_sub(1)
    }

    /// Extend by one arc.
    #[must_use]
    pub fn extended(&self, action: A, state: S) -> Self
    where
        S: Clone,
        A: Clone,
    {
        let mut next = self.clone();
        next.actions.push(action);
        next.states.push(state);
        next
    }
}

/// Result of [`Registry::insert_child`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Insertion {
    /// First time this state was seen; the new node is indexed.
    Fresh(NodeId),
    /// The state already has an indexed node; `candidate` is unindexed.
    Duplicate { candidate: NodeId, existing: NodeId },
}

impl Insertion {
    pub(crate) fn node(self) -> NodeId {
        match self {
            Self::Fresh(id) | Self::Duplicate { candidate: id, .. } => id,
        }
    }
}

/// Arena + index. Guarded by one `RwLock` in the driver.
pub(crate) struct Registry<S, A, V> {
    nodes: Vec<SearchNode<S, A, V>>,
    index: HashMap<S, NodeId>,
}

impl<S: SearchState, A: SearchAction, V: Clone> Registry<S, A, V> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn push(&mut self, node_fn: impl FnOnce(NodeId) -> SearchNode<S, A, V>) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(node_fn(id));
        id
    }

    /// Register a root.
    ///
    /// # Errors
    ///
    /// [`SearchError::StateReachedTwice`] if the state is already indexed.
    pub(crate) fn insert_root(&mut self, state: S, is_goal: bool) -> Result<NodeId, SearchError> {
        if self.index.contains_key(&state) {
            return Err(SearchError::StateReachedTwice {
                state: format!("{state:?}"),
            });
        }
        let key = state.clone();
        let id = self.push(|id| SearchNode {
            id,
            state,
            action: None,
            parent: None,
            label: None,
            is_goal,
            depth: 0,
            annotations: BTreeMap::new(),
        });
        self.index.insert(key, id);
        Ok(id)
    }

    /// Register a child of `parent`.
    ///
    /// With `allow_duplicates == false` a second sighting of an indexed
    /// state is a structural failure.
    pub(crate) fn insert_child(
        &mut self,
        parent: NodeId,
        state: S,
        action: A,
        is_goal: bool,
        allow_duplicates: bool,
    ) -> Result<Insertion, SearchError> {
        let depth = self
            .get(parent)
            .map(|p| p.depth.saturating_add(1))
            .ok_or_else(|| SearchError::invariant(format!("unknown parent {parent}")))?;
        let existing = self.index.get(&state).copied();
        if existing.is_some() && !allow_duplicates {
            return Err(SearchError::StateReachedTwice {
                state: format!("{state:?}"),
            });
        }
        let key = existing.is_none().then(|| state.clone());
        let id = self.push(|id| SearchNode {
            id,
            state,
            action: Some(action),
            parent: Some(parent),
            label: None,
            is_goal,
            depth,
            annotations: BTreeMap::new(),
        });
        match (existing, key) {
            (Some(existing), _) => Ok(Insertion::Duplicate {
                candidate: id,
                existing,
            }),
            (None, Some(key)) => {
                self.index.insert(key, id);
                Ok(Insertion::Fresh(id))
            }
            (None, None) => Err(SearchError::invariant("index key lost")),
        }
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&SearchNode<S, A, V>> {
        self.nodes.get(id.index())
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut SearchNode<S, A, V>, SearchError> {
        self.nodes
            .get_mut(id.index())
            .ok_or_else(|| SearchError::invariant(format!("unknown node {id}")))
    }

    /// The indexed node for `state`, if any.
    pub(crate) fn lookup(&self, state: &S) -> Option<NodeId> {
        self.index.get(state).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn set_label(&mut self, id: NodeId, label: V) -> Result<(), SearchError> {
        self.get_mut(id)?.label = Some(label);
        Ok(())
    }

    pub(crate) fn label(&self, id: NodeId) -> Option<V> {
        self.get(id).and_then(|n| n.label.clone())
    }

    pub(crate) fn annotate(
        &mut self,
        id: NodeId,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), SearchError> {
        self.get_mut(id)?.annotations.insert(key.into(), value);
        Ok(())
    }

    /// Root-first path ending at `id`.
    ///
    /// The walk is bounded by the arena size, so a corrupted parent chain
    /// is reported instead of looping.
    pub(crate) fn path(&self, id: NodeId) -> Result<SearchPath<S, A>, SearchError> {
        let mut states = Vec::new();
        let mut actions = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if states.len() > self.nodes.len() {
                return Err(SearchError::invariant(format!(
                    "parent chain of {id} does not reach a root"
                )));
            }
            let node = self
                .get(current)
                .ok_or_else(|| SearchError::invariant(format!("unknown node {current}")))?;
            states.push(node.state.clone());
            if let Some(action) = &node.action {
                actions.push(action.clone());
            }
            cursor = node.parent;
        }
        states.reverse();
        actions.reverse();
        Ok(SearchPath { states, actions })
    }

    /// Make `candidate` the indexed node of its state.
    pub(crate) fn reindex(&mut self, candidate: NodeId) -> Result<(), SearchError> {
        let state = self
            .get(candidate)
            .map(|n| n.state.clone())
            .ok_or_else(|| SearchError::invariant(format!("unknown node {candidate}")))?;
        self.index.insert(state, candidate);
        Ok(())
    }

    /// Move `target` onto the path that produced `candidate`: copy its
    /// parent, action, label and depth.
    ///
    /// Returns `false` (and changes nothing) if the candidate descends from
    /// `target`, since the rewrite would close a cycle.
    pub(crate) fn reparent(&mut self, target: NodeId, candidate: NodeId) -> Result<bool, SearchError> {
        let source = self
            .get(candidate)
            .cloned()
            .ok_or_else(|| SearchError::invariant(format!("unknown node {candidate}")))?;
        let mut cursor = source.parent;
        let mut steps = 0usize;
        while let Some(ancestor) = cursor {
            if ancestor == target {
                return Ok(false);
            }
            steps += 1;
            if steps > self.nodes.len() {
                return Err(SearchError::invariant(format!(
                    "parent chain of {candidate} does not reach a root"
                )));
            }
            cursor = self.get(ancestor).and_then(|n| n.parent);
        }
        let node = self.get_mut(target)?;
        node.parent = source.parent;
        node.action = source.action;
        node.label = source.label;
        node.depth = source.depth;
        Ok(true)
    }
}
