//! Reference node evaluators.
//!
//! Each evaluator exercises one evaluator behavior the engine must handle:
//!
//! | Evaluator | Behavior |
//! |---|---|
//! | [`Depth`] | label = path depth |
//! | [`PathCost`] | label = summed edge cost + heuristic estimate |
//! | [`Scripted`] | label from a fixed table, prune when absent |
//! | [`Faulty`] | prune, fail or panic on selected states |
//! | [`Slow`] | sleeps before delegating, optionally ignoring interruption |
//! | [`Reporting`] | graph-aware, reports goal solutions itself |

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;

use arbor_search::{
    EvalContext, EvalError, EvaluatorCapabilities, GoalTest, Label, NodeEvaluator, SearchAction,
    SearchGraph, SearchPath, SearchState, Solution, SolutionSink,
};

use crate::worlds::weighted_graph::{Place, WeightedGraph};

type Predicate<S> = Arc<dyn Fn(&S) -> bool + Send + Sync>;

/// Label = number of actions on the path.
#[derive(Debug, Clone, Copy, Default)]
pub struct Depth;

impl<S, A> NodeEvaluator<S, A, usize> for Depth {
    fn evaluate(&self, path: &SearchPath<S, A>, _ctx: &EvalContext) -> Result<Option<usize>, EvalError> {
        Ok(Some(path.depth()))
    }
}

/// A*-style label over a [`WeightedGraph`]: path cost plus estimate.
#[derive(Debug, Clone)]
pub struct PathCost {
    graph: WeightedGraph,
}

impl PathCost {
    #[must_use]
    pub fn new(graph: WeightedGraph) -> Self {
        Self { graph }
    }
}

impl NodeEvaluator<Place, u32, u32> for PathCost {
    fn evaluate(&self, path: &SearchPath<Place, u32>, _ctx: &EvalContext) -> Result<Option<u32>, EvalError> {
        let Some(&head) = path.head() else {
            return Err(EvalError::failed("empty path"));
        };
        let cost: u32 = path.actions.iter().sum();
        Ok(Some(cost + self.graph.estimate(head)))
    }
}

/// Labels read from a table keyed by state; unlisted states are pruned.
#[derive(Debug, Clone)]
pub struct Scripted<S, V> {
    labels: HashMap<S, V>,
}

impl<S: SearchState, V: Label> Scripted<S, V> {
    pub fn new(labels: impl IntoIterator<Item = (S, V)>) -> Self {
        Self {
            labels: labels.into_iter().collect(),
        }
    }
}

impl<S: SearchState, A, V: Label> NodeEvaluator<S, A, V> for Scripted<S, V> {
    fn evaluate(&self, path: &SearchPath<S, A>, _ctx: &EvalContext) -> Result<Option<V>, EvalError> {
        Ok(path.head().and_then(|s| self.labels.get(s).cloned()))
    }
}

/// How [`Faulty`] misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Prune,
    Fail,
    Panic,
}

/// Delegates to `inner` except on states matching the predicate.
pub struct Faulty<S, A, V> {
    inner: Arc<dyn NodeEvaluator<S, A, V>>,
    fault: Fault,
    when: Predicate<S>,
}

impl<S, A, V> Faulty<S, A, V> {
    pub fn new(
        inner: Arc<dyn NodeEvaluator<S, A, V>>,
        fault: Fault,
        when: impl Fn(&S) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner,
            fault,
            when: Arc::new(when),
        }
    }
}

impl<S: SearchState, A, V> NodeEvaluator<S, A, V> for Faulty<S, A, V> {
    fn evaluate(&self, path: &SearchPath<S, A>, ctx: &EvalContext) -> Result<Option<V>, EvalError> {
        match path.head() {
            Some(state) if (self.when)(state) => match self.fault {
                Fault::Prune => Err(EvalError::Prune),
                Fault::Fail => Err(EvalError::failed(format!("refusing to label {state:?}"))),
                Fault::Panic => panic!("evaluator exploded at {state:?}"),
            },
            _ => self.inner.evaluate(path, ctx),
        }
    }
}

/// Sleeps for `delay` before delegating to `inner`.
///
/// A cooperative `Slow` sleeps in short slices and returns
/// [`EvalError::Interrupted`] as soon as its context is interrupted; a
/// stubborn one sleeps through. It advertises the `cancelable` capability
/// and counts how often the engine asked it to cancel.
pub struct Slow<S, A, V> {
    inner: Arc<dyn NodeEvaluator<S, A, V>>,
    delay: Duration,
    cooperative: bool,
    when: Option<Predicate<S>>,
    cancels: AtomicUsize,
    started: AtomicUsize,
}

const SLICE: Duration = Duration::from_millis(2);

impl<S, A, V> Slow<S, A, V> {
    pub fn new(inner: Arc<dyn NodeEvaluator<S, A, V>>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            cooperative: true,
            when: None,
            cancels: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
        }
    }

    /// Keep sleeping through interruptions.
    #[must_use]
    pub fn stubborn(mut self) -> Self {
        self.cooperative = false;
        self
    }

    /// Only delay on states matching `when`.
    #[must_use]
    pub fn only_when(mut self, when: impl Fn(&S) -> bool + Send + Sync + 'static) -> Self {
        self.when = Some(Arc::new(when));
        self
    }

    #[must_use]
    pub fn cancel_requests(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }

    /// Evaluations that started sleeping.
    #[must_use]
    pub fn delayed(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl<S: SearchState, A, V> NodeEvaluator<S, A, V> for Slow<S, A, V> {
    fn evaluate(&self, path: &SearchPath<S, A>, ctx: &EvalContext) -> Result<Option<V>, EvalError> {
        let applies = match (&self.when, path.head()) {
            (Some(when), Some(state)) => when(state),
            (Some(_), None) => false,
            (None, _) => true,
        };
        if applies {
            self.started.fetch_add(1, Ordering::SeqCst);
            let until = Instant::now() + self.delay;
            while Instant::now() < until {
                if self.cooperative {
                    ctx.check()?;
                }
                std::thread::sleep(SLICE.min(until.saturating_duration_since(Instant::now())));
            }
            ctx.annotate("slept_ms", json!(u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX)));
        }
        self.inner.evaluate(path, ctx)
    }

    fn capabilities(&self) -> EvaluatorCapabilities {
        EvaluatorCapabilities {
            cancelable: true,
            ..self.inner.capabilities()
        }
    }

    fn cancel_active_tasks(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.inner.cancel_active_tasks();
    }
}

/// Reports goal paths to the engine itself instead of leaving it to the
/// driver. Duplicate paths are reported once.
pub struct Reporting<S, A, V> {
    inner: Arc<dyn NodeEvaluator<S, A, V>>,
    goal: Mutex<Option<GoalTest<S, A>>>,
    sink: Mutex<Option<SolutionSink<S, A, V>>>,
    reported: Mutex<HashSet<Vec<S>>>,
}

impl<S, A, V> Reporting<S, A, V> {
    pub fn new(inner: Arc<dyn NodeEvaluator<S, A, V>>) -> Self {
        Self {
            inner,
            goal: Mutex::new(None),
            sink: Mutex::new(None),
            reported: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.goal.lock().is_some() && self.sink.lock().is_some()
    }

    #[must_use]
    pub fn reported(&self) -> usize {
        self.reported.lock().len()
    }
}

impl<S: SearchState, A: SearchAction, V: Label> NodeEvaluator<S, A, V> for Reporting<S, A, V> {
    fn evaluate(&self, path: &SearchPath<S, A>, ctx: &EvalContext) -> Result<Option<V>, EvalError> {
        let label = self.inner.evaluate(path, ctx)?;
        let Some(score) = label.clone() else {
            return Ok(None);
        };
        let goal = self.goal.lock().clone();
        let is_goal = match goal {
            Some(goal) => goal.test(path).map_err(|e| EvalError::failed(e.message()))?,
            None => false,
        };
        if is_goal && self.reported.lock().insert(path.states.clone()) {
            let sink = self.sink.lock().clone();
            if let Some(sink) = sink {
                let solution = Solution::new(path.states.clone(), path.actions.clone(), score);
                if sink.report(solution) {
                    sink.annotate(&path.states, "reported_by", json!("evaluator"));
                }
            }
        }
        Ok(label)
    }

    fn capabilities(&self) -> EvaluatorCapabilities {
        EvaluatorCapabilities {
            graph_aware: true,
            reports_solutions: true,
            ..self.inner.capabilities()
        }
    }

    fn attach_graph(&self, graph: Arc<dyn SearchGraph<S, A>>, goal: GoalTest<S, A>) {
        tracing::debug!("reporting evaluator attached to graph");
        if self.inner.capabilities().graph_aware {
            self.inner.attach_graph(graph, goal.clone());
        }
        *self.goal.lock() = Some(goal);
    }

    fn subscribe_solutions(&self, sink: SolutionSink<S, A, V>) {
        *self.sink.lock() = Some(sink);
    }

    fn cancel_active_tasks(&self) {
        self.inner.cancel_active_tasks();
    }
}
