//! Solutions and their registration.
//!
//! Goal nodes found by expansion and solutions pushed by a
//! solution-reporting evaluator both go through [`SolutionBoard::register`]:
//! one FIFO queue drained by the driver, a record of everything found, and
//! a best score that never regresses.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use crate::events::{EventBus, GraphEvent};
use crate::interrupt::RunToken;

/// An owned root-to-goal path and its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution<S, A, V> {
    pub states: Vec<S>,
    pub actions: Vec<A>,
    pub score: V,
    pub annotations: BTreeMap<String, serde_json::Value>,
}

impl<S, A, V> Solution<S, A, V> {
    #[must_use]
    pub fn new(states: Vec<S>, actions: Vec<A>, score: V) -> Self {
        Self {
            states,
            actions,
            score,
            annotations: BTreeMap::new(),
        }
    }

    /// The goal state.
    #[must_use]
    pub fn goal(&self) -> Option<&S> {
        self.states.last()
    }
}

struct Board<S, A, V> {
    seen: HashSet<Vec<S>>,
    pending: VecDeque<Solution<S, A, V>>,
    found: Vec<Solution<S, A, V>>,
    best: Option<V>,
}

pub(crate) struct SolutionBoard<S, A, V> {
    inner: Mutex<Board<S, A, V>>,
    events: Arc<EventBus<GraphEvent<S, A, V>>>,
    run: Arc<RunToken>,
}

impl<S, A, V> SolutionBoard<S, A, V>
where
    S: Clone + Eq + Hash + std::fmt::Debug,
    A: Clone,
    V: Ord + Clone,
{
    pub(crate) fn new(events: Arc<EventBus<GraphEvent<S, A, V>>>, run: Arc<RunToken>) -> Self {
        Self {
            inner: Mutex::new(Board {
                seen: HashSet::new(),
                pending: VecDeque::new(),
                found: Vec::new(),
                best: None,
            }),
            events,
            run,
        }
    }

    /// Queue a solution. A path (by its states) is accepted once; a repeat
    /// is a collaborator bug, logged and dropped. Nothing is accepted after
    /// the run stopped.
    pub(crate) fn register(&self, solution: Solution<S, A, V>) -> bool {
        if self.run.is_stopped() {
            tracing::debug!(goal = ?solution.goal(), "solution after stop ignored");
            return false;
        }
        let mut board = self.inner.lock();
        if !board.seen.insert(solution.states.clone()) {
            tracing::error!(goal = ?solution.goal(), "solution registered twice, dropping");
            return false;
        }
        let improves = match &board.best {
            Some(best) => solution.score < *best,
            None => true,
        };
        if improves {
            board.best = Some(solution.score.clone());
        }
        board.found.push(solution.clone());
        tracing::debug!(
            goal = ?solution.goal(),
            found = board.found.len(),
            "solution registered"
        );
        self.events
            .publish_with(|| GraphEvent::SolutionFound { solution: solution.clone() });
        board.pending.push_back(solution);
        true
    }

    pub(crate) fn pop_pending(&self) -> Option<Solution<S, A, V>> {
        self.inner.lock().pending.pop_front()
    }

    pub(crate) fn best_score(&self) -> Option<V> {
        self.inner.lock().best.clone()
    }

    pub(crate) fn found(&self) -> Vec<Solution<S, A, V>> {
        self.inner.lock().found.clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.inner.lock().found.len()
    }

    /// Attach a key to an already registered solution (queued copy included).
    pub(crate) fn annotate(&self, states: &[S], key: &str, value: &serde_json::Value) -> bool {
        let mut board = self.inner.lock();
        let Board { pending, found, .. } = &mut *board;
        let mut hit = false;
        for solution in found.iter_mut().chain(pending.iter_mut()) {
            if solution.states == states {
                solution.annotations.insert(key.to_string(), value.clone());
                hit = true;
            }
        }
        if hit {
            self.events.publish_with(|| GraphEvent::SolutionAnnotated {
                states: states.to_vec(),
                key: key.to_string(),
                value: value.clone(),
            });
        }
        hit
    }
}

/// Handle given to solution-reporting evaluators.
///
/// Holds the board weakly; reports after the search is dropped are ignored.
pub struct SolutionSink<S, A, V> {
    board: Weak<SolutionBoard<S, A, V>>,
}

impl<S, A, V> Clone for SolutionSink<S, A, V> {
    fn clone(&self) -> Self {
        Self {
            board: Weak::clone(&self.board),
        }
    }
}

impl<S, A, V> SolutionSink<S, A, V>
where
    S: Clone + Eq + Hash + std::fmt::Debug,
    A: Clone,
    V: Ord + Clone,
{
    pub(crate) fn new(board: &Arc<SolutionBoard<S, A, V>>) -> Self {
        Self {
            board: Arc::downgrade(board),
        }
    }

    /// Report a complete solution. Returns `false` if it was a repeat or
    /// the search is gone.
    pub fn report(&self, solution: Solution<S, A, V>) -> bool {
        self.board.upgrade().is_some_and(|b| b.register(solution))
    }

    /// Annotate a previously reported solution.
    pub fn annotate(&self, states: &[S], key: &str, value: serde_json::Value) -> bool {
        self.board
            .upgrade()
            .is_some_and(|b| b.annotate(states, key, &value))
    }
}
