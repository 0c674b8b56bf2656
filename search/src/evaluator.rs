//! Node evaluator contract.
//!
//! An evaluator maps a root-to-node path to a label (lower is better). It is
//! called concurrently from worker threads with no engine lock held.
//!
//! Outcomes and how the driver reacts:
//!
//! | result                        | driver reaction                         |
//! |-------------------------------|-----------------------------------------|
//! | `Ok(Some(label))`             | node labeled, discarding policy applied |
//! | `Ok(None)` / `Err(Prune)`     | node pruned                             |
//! | `Err(Interrupted)` / deadline | fallback evaluator, else pruned         |
//! | `Err(Failed(..))` / panic     | node pruned and annotated               |
//!
//! Optional hooks are gated by [`EvaluatorCapabilities`], read once when the
//! search is built.

use std::sync::Arc;

use crate::contract::{GoalTest, SearchGraph};
use crate::interrupt::EvalContext;
use crate::node::SearchPath;
use crate::solution::SolutionSink;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    /// The node must not be explored further.
    #[error("node pruned by evaluator")]
    Prune,
    /// Evaluation gave up after observing [`EvalContext::check`].
    #[error("evaluation interrupted")]
    Interrupted,
    #[error("evaluation failed: {0}")]
    Failed(String),
}

impl EvalError {
    pub fn failed(cause: impl std::fmt::Display) -> Self {
        Self::Failed(cause.to_string())
    }
}

/// Optional evaluator hooks the driver should call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluatorCapabilities {
    /// Call [`NodeEvaluator::attach_graph`] once at construction.
    pub graph_aware: bool,
    /// Call [`NodeEvaluator::cancel_active_tasks`] on shutdown.
    pub cancelable: bool,
    /// Call [`NodeEvaluator::subscribe_solutions`] once at construction and
    /// skip goal-node registration.
    pub reports_solutions: bool,
}

impl EvaluatorCapabilities {
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            graph_aware: self.graph_aware || other.graph_aware,
            cancelable: self.cancelable || other.cancelable,
            reports_solutions: self.reports_solutions || other.reports_solutions,
        }
    }
}

pub trait NodeEvaluator<S, A, V>: Send + Sync {
    /// Label the head of `path`.
    ///
    /// # Errors
    ///
    /// See the module table.
    fn evaluate(&self, path: &SearchPath<S, A>, ctx: &EvalContext) -> Result<Option<V>, EvalError>;

    fn capabilities(&self) -> EvaluatorCapabilities {
        EvaluatorCapabilities::default()
    }

    fn attach_graph(&self, _graph: Arc<dyn SearchGraph<S, A>>, _goal: GoalTest<S, A>) {}

    fn subscribe_solutions(&self, _sink: SolutionSink<S, A, V>) {}

    fn cancel_active_tasks(&self) {}
}

/// Closure adapter.
pub struct FnEvaluator<F>(F);

impl<F> FnEvaluator<F> {
    pub fn new<S, A, V>(f: F) -> Self
    where
        F: Fn(&SearchPath<S, A>, &EvalContext) -> Result<Option<V>, EvalError> + Send + Sync,
    {
        Self(f)
    }
}

impl<S, A, V, F> NodeEvaluator<S, A, V> for FnEvaluator<F>
where
    F: Fn(&SearchPath<S, A>, &EvalContext) -> Result<Option<V>, EvalError> + Send + Sync,
{
    fn evaluate(&self, path: &SearchPath<S, A>, ctx: &EvalContext) -> Result<Option<V>, EvalError> {
        (self.0)(path, ctx)
    }
}

/// Tries `primary`; if it prunes, asks `secondary`.
///
/// Interruptions and failures of the primary are returned as-is.
pub struct AlternativeEvaluator<S, A, V> {
    primary: Arc<dyn NodeEvaluator<S, A, V>>,
    secondary: Arc<dyn NodeEvaluator<S, A, V>>,
}

impl<S, A, V> AlternativeEvaluator<S, A, V> {
    pub fn new(
        primary: Arc<dyn NodeEvaluator<S, A, V>>,
        secondary: Arc<dyn NodeEvaluator<S, A, V>>,
    ) -> Self {
        Self { primary, secondary }
    }

    fn each(&self) -> [&Arc<dyn NodeEvaluator<S, A, V>>; 2] {
        [&self.primary, &self.secondary]
    }
}

impl<S, A, V> NodeEvaluator<S, A, V> for AlternativeEvaluator<S, A, V> {
    fn evaluate(&self, path: &SearchPath<S, A>, ctx: &EvalContext) -> Result<Option<V>, EvalError> {
        match self.primary.evaluate(path, ctx) {
            Ok(None) | Err(EvalError::Prune) => {
                tracing::trace!(depth = path.depth(), "primary pruned, trying secondary");
                self.secondary.evaluate(path, ctx)
            }
            other => other,
        }
    }

    fn capabilities(&self) -> EvaluatorCapabilities {
        self.primary
            .capabilities()
            .union(self.secondary.capabilities())
    }

    fn attach_graph(&self, graph: Arc<dyn SearchGraph<S, A>>, goal: GoalTest<S, A>) {
        for e in self.each() {
            if e.capabilities().graph_aware {
                e.attach_graph(Arc::clone(&graph), goal.clone());
            }
        }
    }

    fn subscribe_solutions(&self, sink: SolutionSink<S, A, V>) {
        for e in self.each() {
            if e.capabilities().reports_solutions {
                e.subscribe_solutions(sink.clone());
            }
        }
    }

    fn cancel_active_tasks(&self) {
        for e in self.each() {
            if e.capabilities().cancelable {
                e.cancel_active_tasks();
            }
        }
    }
}
