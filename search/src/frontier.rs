//! OPEN: the priority frontier of evaluated, unexpanded nodes.
//!
//! Entries are ordered by `(label, insertion_seq)`, so equal labels pop in
//! FIFO order. The frontier stores ids plus a copy of each state and label.
//! Node records stay in the registry. Callers hold the driver's `open` lock
//! for every operation.
//!
//! Selection is either plain best-first or *focal*: among the entries whose
//! label is within a bound of the best label, pick the one minimizing a
//! secondary evaluation.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::Arc;

use crate::node::NodeId;

/// Focal-list selection policy.
///
/// `within_bound(best, candidate)` must hold for `candidate == best`.
/// Secondary values are computed at most once per node and cached.
pub trait FocalPolicy<S, V>: Send + Sync {
    /// Whether `candidate` belongs to the focal list when `best` is the
    /// lowest label in OPEN.
    fn within_bound(&self, best: &V, candidate: &V) -> bool;

    /// Secondary evaluation. Lower is preferred.
    fn secondary(&self, state: &S, label: &V) -> i64;
}

struct Member<S, V> {
    state: S,
    label: V,
    seq: u64,
}

/// Best-first frontier keyed by `(label, insertion order)`.
pub struct Frontier<S, V> {
    order: BTreeSet<(V, u64, NodeId)>,
    members: HashMap<NodeId, Member<S, V>>,
    by_state: HashMap<S, NodeId>,
    focal: Option<Arc<dyn FocalPolicy<S, V>>>,
    secondary: HashMap<NodeId, i64>,
    next_seq: u64,
    high_water: usize,
}

impl<S, V> Frontier<S, V>
where
    S: Clone + Eq + Hash,
    V: Ord + Clone,
{
    /// Create a new empty frontier with plain best-first selection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            order: BTreeSet::new(),
            members: HashMap::new(),
            by_state: HashMap::new(),
            focal: None,
            secondary: HashMap::new(),
            next_seq: 0,
            high_water: 0,
        }
    }

    /// Create a frontier that selects from the focal list.
    #[must_use]
    pub fn with_focal(policy: Arc<dyn FocalPolicy<S, V>>) -> Self {
        Self {
            focal: Some(policy),
            ..Self::new()
        }
    }

    /// Insert an evaluated node.
    ///
    /// Returns `false` if the id or its state is already present; the
    /// frontier is unchanged in that case. Keeping states unique is the
    /// discarding policy's job, so a rejected insert is a caller bug.
    pub fn insert(&mut self, id: NodeId, state: S, label: V) -> bool {
        let present = self.members.contains_key(&id) || self.by_state.contains_key(&state);
        debug_assert!(!present, "{id} or its state is already on OPEN");
        if present {
            return false;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert((label.clone(), seq, id));
        self.by_state.insert(state.clone(), id);
        self.members.insert(id, Member { state, label, seq });
        self.high_water = self.high_water.max(self.members.len());
        true
    }

    /// The node the next expansion should take, without removing it.
    pub fn peek_best(&mut self) -> Option<NodeId> {
        let (best, _, first) = self.order.first()?;
        let Some(policy) = self.focal.clone() else {
            return Some(*first);
        };
        let mut choice: Option<(i64, NodeId)> = None;
        for (label, _, id) in &self.order {
            if !policy.within_bound(best, label) {
                break;
            }
            let value = match self.secondary.get(id) {
                Some(v) => *v,
                None => {
                    let state = &self.members.get(id)?.state;
                    let v = policy.secondary(state, label);
                    self.secondary.insert(*id, v);
                    v
                }
            };
            match choice {
                Some((current, _)) if value >= current => {}
                _ => choice = Some((value, *id)),
            }
        }
        choice.map(|(_, id)| id)
    }

    /// Remove and return the node [`Self::peek_best`] would choose.
    pub fn pop_best(&mut self) -> Option<NodeId> {
        let id = self.peek_best()?;
        self.remove(id);
        Some(id)
    }

    /// Remove a specific node. Returns `false` if it was not present.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(member) = self.members.remove(&id) else {
            return false;
        };
        self.order.remove(&(member.label, member.seq, id));
        self.by_state.remove(&member.state);
        self.secondary.remove(&id);
        true
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.members.contains_key(&id)
    }

    /// The OPEN entry holding `state`, if any.
    #[must_use]
    pub fn find_by_state(&self, state: &S) -> Option<NodeId> {
        self.by_state.get(state).copied()
    }

    #[must_use]
    pub fn label_of(&self, id: NodeId) -> Option<&V> {
        self.members.get(&id).map(|m| &m.label)
    }

    /// Lowest label on OPEN, regardless of the selection policy.
    #[must_use]
    pub fn best_label(&self) -> Option<&V> {
        self.order.first().map(|(label, _, _)| label)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Ordered copy of the frontier, best first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(NodeId, V)> {
        self.order
            .iter()
            .map(|(label, _, id)| (*id, label.clone()))
            .collect()
    }

    /// Largest size the frontier has reached.
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.high_water
    }
}

impl<S, V> Default for Frontier<S, V>
where
    S: Clone + Eq + Hash,
    V: Ord + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
