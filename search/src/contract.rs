//! Collaborator contracts: the graph being searched and its goal test.
//!
//! The engine never constructs states itself. Roots and successors come
//! from a [`SearchGraph`]; goal detection comes from exactly one
//! [`GoalTest`] kind per search instance.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use crate::node::SearchPath;

/// Bound for external states. Identity is `Eq + Hash`.
pub trait SearchState: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> SearchState for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Bound for arc labels (the action leading from a parent to a child).
pub trait SearchAction: Clone + Debug + Send + Sync + 'static {}

impl<T> SearchAction for T where T: Clone + Debug + Send + Sync + 'static {}

/// Bound for evaluation labels. Lower is better.
pub trait Label: Ord + Clone + Debug + Send + Sync + 'static {}

impl<T> Label for T where T: Ord + Clone + Debug + Send + Sync + 'static {}

/// One successor description: the action taken and the resulting state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Successor<S, A> {
    pub action: A,
    pub state: S,
}

impl<S, A> Successor<S, A> {
    #[must_use]
    pub fn new(action: A, state: S) -> Self {
        Self { action, state }
    }
}

/// Failure reported by a graph collaborator (generator or goal test).
///
/// The engine treats these as hard failures of the search, not prunes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct GraphError {
    message: String,
}

impl GraphError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// An implicit, possibly infinite graph.
///
/// # Contract
///
/// - The reachable part must be a tree unless a discarding policy other
///   than `None` is configured; a state reached twice under `None` aborts
///   the search.
/// - `successors` must return a finite list. Returning an error aborts the
///   search with [`crate::SearchError::SuccessorGeneration`].
pub trait SearchGraph<S, A>: Send + Sync {
    /// Produce the initial state(s).
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if no roots can be produced.
    fn roots(&self) -> Result<Vec<S>, GraphError>;

    /// Produce the successors of `state`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if the generator cannot proceed.
    fn successors(&self, state: &S) -> Result<Vec<Successor<S, A>>, GraphError>;
}

/// Goal test over a single state.
pub trait NodeGoalTester<S>: Send + Sync {
    /// # Errors
    ///
    /// Returns [`GraphError`] if the test cannot be decided.
    fn is_goal(&self, state: &S) -> Result<bool, GraphError>;
}

/// Goal test over the whole root-to-node path.
pub trait PathGoalTester<S, A>: Send + Sync {
    /// # Errors
    ///
    /// Returns [`GraphError`] if the test cannot be decided.
    fn is_goal(&self, path: &SearchPath<S, A>) -> Result<bool, GraphError>;
}

/// The goal test kind used by one search instance.
pub enum GoalTest<S, A> {
    /// Tests the head state only.
    Node(Arc<dyn NodeGoalTester<S>>),
    /// Tests the entire path from the root.
    Path(Arc<dyn PathGoalTester<S, A>>),
}

impl<S, A> Clone for GoalTest<S, A> {
    fn clone(&self) -> Self {
        match self {
            Self::Node(t) => Self::Node(Arc::clone(t)),
            Self::Path(t) => Self::Path(Arc::clone(t)),
        }
    }
}

impl<S, A> std::fmt::Debug for GoalTest<S, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node(_) => f.write_str("GoalTest::Node"),
            Self::Path(_) => f.write_str("GoalTest::Path"),
        }
    }
}

impl<S: SearchState, A: SearchAction> GoalTest<S, A> {
    /// Node goal test from an infallible predicate.
    pub fn node_fn<F>(predicate: F) -> Self
    where
        F: Fn(&S) -> bool + Send + Sync + 'static,
    {
        Self::Node(Arc::new(FnNodeGoal(predicate)))
    }

    /// Path goal test from an infallible predicate.
    pub fn path_fn<F>(predicate: F) -> Self
    where
        F: Fn(&SearchPath<S, A>) -> bool + Send + Sync + 'static,
    {
        Self::Path(Arc::new(FnPathGoal(predicate)))
    }

    /// Evaluate the configured test against a path ending in the node of interest.
    ///
    /// # Errors
    ///
    /// Propagates the tester's [`GraphError`].
    pub fn test(&self, path: &SearchPath<S, A>) -> Result<bool, GraphError> {
        match self {
            Self::Node(t) => match path.head() {
                Some(state) => t.is_goal(state),
                None => Err(GraphError::new("goal test on an empty path")),
            },
            Self::Path(t) => t.is_goal(path),
        }
    }
}

struct FnNodeGoal<F>(F);

impl<S, F> NodeGoalTester<S> for FnNodeGoal<F>
where
    F: Fn(&S) -> bool + Send + Sync,
{
    fn is_goal(&self, state: &S) -> Result<bool, GraphError> {
        Ok((self.0)(state))
    }
}

struct FnPathGoal<F>(F);

impl<S, A, F> PathGoalTester<S, A> for FnPathGoal<F>
where
    F: Fn(&SearchPath<S, A>) -> bool + Send + Sync,
{
    fn is_goal(&self, path: &SearchPath<S, A>) -> Result<bool, GraphError> {
        Ok((self.0)(path))
    }
}
