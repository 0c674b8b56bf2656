//! The search driver.
//!
//! [`BestFirst`] is a state machine (`Created → Active → Inactive`) advanced
//! one discrete [`Step`] at a time. Each step either surfaces a pending
//! solution, expands the best OPEN node, or reports termination. Expansion
//! work (one [`NodeBuilder`] per successor) runs inline when the worker
//! budget is zero, otherwise on a [`WorkerPool`].
//!
//! # Locks
//!
//! Acquired in this order, never the reverse:
//! `selection → jobs → open → ledger → registry`. The control mutex (pool,
//! timer, lifecycle) is never held while waiting or while roots are
//! evaluated. Evaluation and successor generation run with no lock held.
//!
//! The job count covers pooled builders and claimed expansions, so a
//! search driven from several threads only reports exhaustion once every
//! caller's expansion has finished.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::builder::{ExpansionTracker, LabelOutcome, NodeBuilder};
use crate::contract::{GoalTest, Label, SearchAction, SearchGraph, SearchState};
use crate::error::{panic_message, PanicStage, SearchError};
use crate::evaluator::{EvaluatorCapabilities, NodeEvaluator};
use crate::events::{EventBus, GraphEvent, NodeKind};
use crate::frontier::{FocalPolicy, Frontier};
use crate::interrupt::{RunTimer, RunToken, Termination};
use crate::ledger::Ledger;
use crate::node::{NodeId, Registry, SearchNode, SearchPath};
use crate::policy::SearchConfig;
use crate::pool::WorkerPool;
use crate::solution::{Solution, SolutionBoard, SolutionSink};

/// One discrete outcome of [`BestFirst::step`].
#[derive(Debug, Clone)]
pub enum Step<S, A, V> {
    /// Roots generated, labeled and on OPEN.
    Initialized,
    /// A node was expanded; its successors were built or queued.
    ExpansionSubmitted { node: NodeId, successors: usize },
    /// A goal node was taken off OPEN and closed without expansion. Only
    /// goal roots, and goal nodes that displaced a worse OPEN entry for
    /// their state, are ever on OPEN.
    GoalNodeClosed { node: NodeId },
    SolutionFound(Solution<S, A, V>),
    /// Terminal. Every later step returns the same value.
    Finished(Termination),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Active,
    Inactive(Termination),
}

#[derive(Default)]
struct FailureSlot {
    error: Option<SearchError>,
    summary: Option<String>,
}

/// State shared between the driver and node builders.
pub(crate) struct Shared<S, A, V> {
    pub(crate) graph: Arc<dyn SearchGraph<S, A>>,
    pub(crate) goal: GoalTest<S, A>,
    pub(crate) evaluator: Arc<dyn NodeEvaluator<S, A, V>>,
    pub(crate) fallback: Option<Arc<dyn NodeEvaluator<S, A, V>>>,
    pub(crate) config: SearchConfig,
    pub(crate) capabilities: EvaluatorCapabilities,
    /// Node pre-selected from outside for the next expansion.
    selection: Mutex<Option<NodeId>>,
    /// Builders queued or running on the pool, plus nodes claimed for
    /// expansion and not yet closed.
    pub(crate) jobs: Mutex<usize>,
    pub(crate) jobs_changed: Condvar,
    pub(crate) open: Mutex<Frontier<S, V>>,
    pub(crate) ledger: Mutex<Ledger<S>>,
    pub(crate) registry: RwLock<Registry<S, A, V>>,
    pub(crate) run: Arc<RunToken>,
    pub(crate) solutions: Arc<SolutionBoard<S, A, V>>,
    events: Arc<EventBus<GraphEvent<S, A, V>>>,
    failure: Mutex<FailureSlot>,
}

impl<S, A, V> Shared<S, A, V> {
    /// Record the termination reason and wake every waiter. Only the first
    /// call has any effect.
    pub(crate) fn stop(&self, reason: Termination) -> bool {
        if !self.run.stop(reason) {
            return false;
        }
        tracing::info!(?reason, "search stopping");
        {
            let _jobs = self.jobs.lock();
            self.jobs_changed.notify_all();
        }
        if self.capabilities.cancelable {
            tracing::debug!("canceling evaluator tasks");
            self.evaluator.cancel_active_tasks();
        }
        true
    }
}

impl<S: SearchState, A: SearchAction, V: Label> Shared<S, A, V> {
    /// Publish unless the run already stopped.
    pub(crate) fn emit(&self, build: impl FnOnce() -> GraphEvent<S, A, V>) {
        if self.run.is_stopped() {
            return;
        }
        self.events.publish_with(build);
    }

    /// Store a structural failure for the driver and stop the run.
    pub(crate) fn fail(&self, error: SearchError) {
        tracing::error!(%error, "search failed");
        {
            let mut slot = self.failure.lock();
            slot.summary.get_or_insert_with(|| error.to_string());
            if slot.error.is_none() {
                slot.error = Some(error);
            }
        }
        self.stop(Termination::Failed);
    }

    fn take_failure(&self) -> Option<SearchError> {
        self.failure.lock().error.take()
    }

    fn failure_summary(&self) -> String {
        self.failure
            .lock()
            .summary
            .clone()
            .unwrap_or_else(|| "unknown failure".into())
    }

    /// Failure returned directly to a caller: keep only its summary.
    fn note_failure(&self, error: &SearchError) {
        self.failure
            .lock()
            .summary
            .get_or_insert_with(|| error.to_string());
        self.stop(Termination::Failed);
    }
}

struct Control {
    lifecycle: Lifecycle,
    pool: Option<WorkerPool>,
    timer: Option<RunTimer>,
    /// Shut-down pools whose workers may still be finishing jobs. Joined on drop.
    retired: Vec<WorkerPool>,
}

enum Advance<S, A, V> {
    Step(Step<S, A, V>),
    Stop(Termination),
}

/// A node taken off OPEN and already claimed in the ledger.
struct Claimed<S> {
    id: NodeId,
    state: S,
    is_goal: bool,
}

/// Releases a claimed node's share of the job count when its expansion
/// ends, on every exit path.
struct ClaimGuard<'a, S, A, V> {
    shared: &'a Shared<S, A, V>,
}

impl<S, A, V> Drop for ClaimGuard<'_, S, A, V> {
    fn drop(&mut self) {
        let mut jobs = self.shared.jobs.lock();
        *jobs = jobs.saturating_sub(1);
        self.shared.jobs_changed.notify_all();
    }
}

enum Selected<S, A, V> {
    Node(Claimed<S>),
    Solution(Solution<S, A, V>),
    Stop(Termination),
}

/// Concurrent, anytime best-first search.
///
/// All methods take `&self`; the driver can be shared between threads (for
/// example to [`cancel`](Self::cancel) a search another thread is stepping).
pub struct BestFirst<S, A, V> {
    shared: Arc<Shared<S, A, V>>,
    control: Mutex<Control>,
    /// Held by the caller generating and labeling the roots.
    starting: Mutex<()>,
    pool_size: usize,
}

/// Configures and builds a [`BestFirst`].
pub struct BestFirstBuilder<S, A, V> {
    graph: Arc<dyn SearchGraph<S, A>>,
    goal: GoalTest<S, A>,
    evaluator: Arc<dyn NodeEvaluator<S, A, V>>,
    fallback: Option<Arc<dyn NodeEvaluator<S, A, V>>>,
    focal: Option<Arc<dyn FocalPolicy<S, V>>>,
    config: SearchConfig,
}

impl<S: SearchState, A: SearchAction, V: Label> BestFirstBuilder<S, A, V> {
    #[must_use]
    pub fn config(mut self, config: SearchConfig) -> Self {
        self.config = config;
        self
    }

    /// Evaluator used when the primary one runs out of per-node time.
    #[must_use]
    pub fn fallback_evaluator(mut self, fallback: Arc<dyn NodeEvaluator<S, A, V>>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Select from the focal list instead of strictly best-first.
    #[must_use]
    pub fn focal(mut self, policy: Arc<dyn FocalPolicy<S, V>>) -> Self {
        self.focal = Some(policy);
        self
    }

    /// # Errors
    ///
    /// [`SearchError::InvalidConfig`] if the configuration does not validate.
    pub fn build(self) -> Result<BestFirst<S, A, V>, SearchError> {
        self.config.validate()?;
        let capabilities = self.evaluator.capabilities();
        let run = Arc::new(RunToken::new());
        let events = Arc::new(EventBus::new());
        let solutions = Arc::new(SolutionBoard::new(Arc::clone(&events), Arc::clone(&run)));
        let open = match self.focal {
            Some(policy) => Frontier::with_focal(policy),
            None => Frontier::new(),
        };
        let pool_size = self.config.worker_threads();

        if capabilities.graph_aware {
            self.evaluator
                .attach_graph(Arc::clone(&self.graph), self.goal.clone());
        }
        if capabilities.reports_solutions {
            self.evaluator
                .subscribe_solutions(SolutionSink::new(&solutions));
        }

        let shared = Arc::new(Shared {
            graph: self.graph,
            goal: self.goal,
            evaluator: self.evaluator,
            fallback: self.fallback,
            config: self.config,
            capabilities,
            selection: Mutex::new(None),
            jobs: Mutex::new(0),
            jobs_changed: Condvar::new(),
            open: Mutex::new(open),
            ledger: Mutex::new(Ledger::new()),
            registry: RwLock::new(Registry::new()),
            run,
            solutions,
            events,
            failure: Mutex::new(FailureSlot::default()),
        });
        Ok(BestFirst {
            shared,
            control: Mutex::new(Control {
                lifecycle: Lifecycle::Created,
                pool: None,
                timer: None,
                retired: Vec::new(),
            }),
            starting: Mutex::new(()),
            pool_size,
        })
    }
}

impl<S: SearchState, A: SearchAction, V: Label> BestFirst<S, A, V> {
    pub fn builder(
        graph: Arc<dyn SearchGraph<S, A>>,
        goal: GoalTest<S, A>,
        evaluator: Arc<dyn NodeEvaluator<S, A, V>>,
    ) -> BestFirstBuilder<S, A, V> {
        BestFirstBuilder {
            graph,
            goal,
            evaluator,
            fallback: None,
            focal: None,
            config: SearchConfig::default(),
        }
    }

    /// Shorthand for a builder with only a configuration.
    ///
    /// # Errors
    ///
    /// As [`BestFirstBuilder::build`].
    pub fn new(
        graph: Arc<dyn SearchGraph<S, A>>,
        goal: GoalTest<S, A>,
        evaluator: Arc<dyn NodeEvaluator<S, A, V>>,
        config: SearchConfig,
    ) -> Result<Self, SearchError> {
        Self::builder(graph, goal, evaluator).config(config).build()
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Advance by one discrete step.
    ///
    /// # Errors
    ///
    /// Structural failures: root or successor generation failed, a goal test
    /// failed, a state was reached twice under `ParentDiscarding::None`, a
    /// root got no label, or a bookkeeping invariant broke. The error is
    /// returned once; later steps return `Finished(Termination::Failed)`.
    pub fn step(&self) -> Result<Step<S, A, V>, SearchError> {
        let lifecycle = self.control.lock().lifecycle;
        match lifecycle {
            Lifecycle::Inactive(reason) => return Ok(Step::Finished(reason)),
            Lifecycle::Created => {
                if let Some(outcome) = self.start() {
                    return outcome;
                }
            }
            Lifecycle::Active => {}
        }
        match self.advance() {
            Ok(Advance::Step(step)) => Ok(step),
            Ok(Advance::Stop(reason)) => match self.shared.take_failure() {
                Some(error) => {
                    self.finish(Termination::Failed);
                    Err(error)
                }
                None => Ok(Step::Finished(self.finish(reason))),
            },
            Err(error) => {
                self.shared.note_failure(&error);
                self.shared.take_failure();
                self.finish(Termination::Failed);
                Err(error)
            }
        }
    }

    /// Step until a solution is produced.
    ///
    /// Returns `Ok(None)` once the graph is exhausted.
    ///
    /// # Errors
    ///
    /// [`SearchError::TimedOut`], [`SearchError::Canceled`], or any
    /// structural failure from [`Self::step`].
    pub fn next_solution(&self) -> Result<Option<Solution<S, A, V>>, SearchError> {
        loop {
            match self.step()? {
                Step::SolutionFound(solution) => return Ok(Some(solution)),
                Step::Finished(reason) => return self.finished(reason).map(|()| None),
                Step::Initialized
                | Step::ExpansionSubmitted { .. }
                | Step::GoalNodeClosed { .. } => {}
            }
        }
    }

    /// Keep collecting solutions while OPEN still holds a label strictly
    /// better than the best solution so far, then return that best solution.
    ///
    /// With an admissible evaluator the result is optimal.
    ///
    /// # Errors
    ///
    /// As [`Self::next_solution`].
    pub fn next_solution_dominating_open(
        &self,
    ) -> Result<Option<Solution<S, A, V>>, SearchError> {
        let mut best: Option<Solution<S, A, V>> = None;
        loop {
            let Some(candidate) = self.next_solution()? else {
                return Ok(best);
            };
            let current = match best.take() {
                Some(previous) if previous.score <= candidate.score => previous,
                _ => candidate,
            };
            let open_better = self
                .shared
                .open
                .lock()
                .best_label()
                .is_some_and(|label| *label < current.score);
            best = Some(current);
            if !open_better {
                return Ok(best);
            }
        }
    }

    /// Step until the next node is expanded (or closed as a goal).
    ///
    /// # Errors
    ///
    /// As [`Self::next_solution`].
    pub fn next_expansion(&self) -> Result<Option<NodeId>, SearchError> {
        loop {
            match self.step()? {
                Step::ExpansionSubmitted { node, .. } | Step::GoalNodeClosed { node } => {
                    return Ok(Some(node));
                }
                Step::Finished(reason) => return self.finished(reason).map(|()| None),
                Step::Initialized | Step::SolutionFound(_) => {}
            }
        }
    }

    /// Run until exhaustion and return every solution in discovery order.
    ///
    /// # Errors
    ///
    /// As [`Self::next_solution`].
    pub fn run_to_completion(&self) -> Result<Vec<Solution<S, A, V>>, SearchError> {
        while self.next_solution()?.is_some() {}
        Ok(self.shared.solutions.found())
    }

    fn finished(&self, reason: Termination) -> Result<(), SearchError> {
        match reason {
            Termination::Exhausted => Ok(()),
            Termination::TimedOut => Err(SearchError::TimedOut),
            Termination::Canceled => Err(SearchError::Canceled),
            Termination::Failed => Err(SearchError::Aborted {
                detail: self.shared.failure_summary(),
            }),
        }
    }

    /// Request cancellation. In-flight evaluations observe it through their
    /// [`crate::EvalContext`]; the next step returns
    /// `Finished(Termination::Canceled)`.
    pub fn cancel(&self) {
        if self.shared.stop(Termination::Canceled) {
            tracing::info!("search canceled");
        }
        self.finish(Termination::Canceled);
    }

    /// Make the node holding `state` the next one expanded.
    ///
    /// Returns `false` if no OPEN node holds `state`.
    pub fn select_node_for_next_expansion(&self, state: &S) -> bool {
        let mut selection = self.shared.selection.lock();
        let open = self.shared.open.lock();
        match open.find_by_state(state) {
            Some(id) => {
                tracing::debug!(node = id.0, "node pre-selected for expansion");
                *selection = Some(id);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> Receiver<GraphEvent<S, A, V>> {
        self.shared.events.subscribe()
    }

    /// Stays `Created` until the roots are labeled and on OPEN. Never waits
    /// for root evaluation.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.control.lock().lifecycle
    }

    #[must_use]
    pub fn open_snapshot(&self) -> Vec<(NodeId, V)> {
        self.shared.open.lock().snapshot()
    }

    #[must_use]
    pub fn open_len(&self) -> usize {
        self.shared.open.lock().len()
    }

    /// Largest OPEN size seen so far.
    #[must_use]
    pub fn open_high_water(&self) -> usize {
        self.shared.open.lock().high_water()
    }

    /// Best score among registered solutions. Never regresses.
    #[must_use]
    pub fn best_score(&self) -> Option<V> {
        self.shared.solutions.best_score()
    }

    /// Every solution registered so far, in discovery order.
    #[must_use]
    pub fn solutions(&self) -> Vec<Solution<S, A, V>> {
        self.shared.solutions.found()
    }

    /// Expansions begun, reopened states counted again.
    #[must_use]
    pub fn expanded_count(&self) -> u64 {
        self.shared.ledger.lock().expansions()
    }

    #[must_use]
    pub fn closed_count(&self) -> usize {
        self.shared.ledger.lock().closed_count()
    }

    /// Node records created, discarded candidates included.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.shared.registry.read().len()
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Copy of the indexed node for `state`.
    #[must_use]
    pub fn node(&self, state: &S) -> Option<SearchNode<S, A, V>> {
        let registry = self.shared.registry.read();
        let id = registry.lookup(state)?;
        registry.get(id).cloned()
    }

    #[must_use]
    pub fn label_of(&self, state: &S) -> Option<V> {
        let registry = self.shared.registry.read();
        registry.lookup(state).and_then(|id| registry.label(id))
    }

    #[must_use]
    pub fn node_annotations(&self, state: &S) -> Option<BTreeMap<String, serde_json::Value>> {
        self.node(state).map(|n| n.annotations)
    }

    /// Current root path to the indexed node for `state`.
    #[must_use]
    pub fn path_to(&self, state: &S) -> Option<SearchPath<S, A>> {
        let registry = self.shared.registry.read();
        registry.lookup(state).and_then(|id| registry.path(id).ok())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Run the `Created → Active` transition. Returns `None` when another
    /// caller completed it first and this step should go on to advance.
    fn start(&self) -> Option<Result<Step<S, A, V>, SearchError>> {
        let _starting = self.starting.lock();
        let armed = {
            let mut control = self.control.lock();
            match control.lifecycle {
                Lifecycle::Active => return None,
                Lifecycle::Inactive(reason) => return Some(Ok(Step::Finished(reason))),
                Lifecycle::Created => self.arm(&mut control),
            }
        };
        match armed.and_then(|()| self.seed_roots()) {
            Ok(()) => {
                let mut control = self.control.lock();
                if control.lifecycle == Lifecycle::Created {
                    control.lifecycle = Lifecycle::Active;
                }
                Some(Ok(Step::Initialized))
            }
            Err(error) => {
                if !error.is_interruption() {
                    self.shared.note_failure(&error);
                }
                self.finish(Termination::Failed);
                Some(Err(error))
            }
        }
    }

    /// Allocate the worker pool and arm the whole-run timer.
    fn arm(&self, control: &mut Control) -> Result<(), SearchError> {
        let shared = &self.shared;
        tracing::info!(
            workers = self.pool_size,
            discarding = ?shared.config.parent_discarding,
            timeout_ms = ?shared.config.timeout_ms,
            "search initializing"
        );
        if self.pool_size > 0 {
            control.pool = Some(
                WorkerPool::new(self.pool_size, "arbor-worker").map_err(SearchError::Spawn)?,
            );
        }
        if let Some(timeout) = shared.config.timeout() {
            let weak = Arc::downgrade(shared);
            let timer = RunTimer::arm(timeout, move || {
                if let Some(shared) = weak.upgrade() {
                    tracing::warn!(?timeout, "whole-run timeout fired");
                    shared.stop(Termination::TimedOut);
                }
            })
            .map_err(SearchError::Spawn)?;
            control.timer = Some(timer);
        }
        Ok(())
    }

    /// Generate, goal-test and label the roots, then put them on OPEN.
    fn seed_roots(&self) -> Result<(), SearchError> {
        let shared = &self.shared;
        let roots = match catch_unwind(AssertUnwindSafe(|| shared.graph.roots())) {
            Ok(Ok(roots)) => roots,
            Ok(Err(source)) => return Err(SearchError::RootGeneration(source)),
            Err(payload) => {
                return Err(SearchError::Panicked {
                    stage: PanicStage::RootGeneration,
                    message: panic_message(payload.as_ref()),
                })
            }
        };

        let mut ids = Vec::with_capacity(roots.len());
        for state in roots {
            let path = SearchPath::root(state.clone());
            let is_goal = shared.test_goal(&path)?;
            let id = shared.registry.write().insert_root(state.clone(), is_goal)?;
            shared.emit(|| GraphEvent::NodeAdded {
                parent: None,
                node: id,
                state: state.clone(),
                kind: if is_goal { NodeKind::Solution } else { NodeKind::Open },
            });
            let label = match shared.label_node(id, &path)? {
                LabelOutcome::Labeled(label) => label,
                LabelOutcome::Abandoned => return Err(self.interruption_error()),
                LabelOutcome::Pruned | LabelOutcome::TimedOut => {
                    return Err(SearchError::UnlabeledRoot {
                        state: format!("{state:?}"),
                    })
                }
            };
            if !shared.open.lock().insert(id, state, label.clone()) {
                return Err(SearchError::invariant(format!("root {id} already on OPEN")));
            }
            if is_goal && !shared.capabilities.reports_solutions {
                shared.register_goal(path, label);
            }
            ids.push(id);
        }
        tracing::info!(roots = ids.len(), "search initialized");
        shared.emit(|| GraphEvent::GraphInitialized { roots: ids });
        Ok(())
    }

    fn interruption_error(&self) -> SearchError {
        match self.shared.run.reason() {
            Some(Termination::TimedOut) => SearchError::TimedOut,
            _ => SearchError::Canceled,
        }
    }

    fn advance(&self) -> Result<Advance<S, A, V>, SearchError> {
        if let Some(reason) = self.shared.run.reason() {
            return Ok(Advance::Stop(reason));
        }
        if let Some(solution) = self.shared.solutions.pop_pending() {
            return Ok(Advance::Step(Step::SolutionFound(solution)));
        }
        match self.select()? {
            Selected::Node(claimed) => self.expand(claimed).map(Advance::Step),
            Selected::Solution(solution) => Ok(Advance::Step(Step::SolutionFound(solution))),
            Selected::Stop(reason) => Ok(Advance::Stop(reason)),
        }
    }

    /// Take the next node off OPEN, waiting for a pool slot first and for
    /// in-flight builders when OPEN is empty.
    ///
    /// The node is claimed in the ledger before OPEN is released, so no
    /// builder can put a second node for the same state on OPEN meanwhile.
    fn select(&self) -> Result<Selected<S, A, V>, SearchError> {
        let shared = &self.shared;
        let mut selection = shared.selection.lock();
        let mut jobs = shared.jobs.lock();
        if self.pool_size > 0 {
            while *jobs >= self.pool_size {
                if let Some(reason) = shared.run.reason() {
                    return Ok(Selected::Stop(reason));
                }
                tracing::trace!(jobs = *jobs, "waiting for a pool slot");
                shared.jobs_changed.wait(&mut jobs);
            }
        }
        loop {
            if let Some(reason) = shared.run.reason() {
                return Ok(Selected::Stop(reason));
            }
            {
                let mut open = shared.open.lock();
                let chosen = match selection.take() {
                    Some(id) if open.contains(id) => Some(id),
                    _ => open.peek_best(),
                };
                if let Some(id) = chosen {
                    open.remove(id);
                    let (state, is_goal) = {
                        let registry = shared.registry.read();
                        let node = registry.get(id).ok_or_else(|| {
                            SearchError::invariant(format!("selected unknown node {id}"))
                        })?;
                        (node.state.clone(), node.is_goal)
                    };
                    shared
                        .ledger
                        .lock()
                        .begin_expansion(&state, std::thread::current().id())?;
                    *jobs += 1;
                    tracing::debug!(node = id.0, open = open.len(), "node selected");
                    return Ok(Selected::Node(Claimed { id, state, is_goal }));
                }
            }
            if let Some(solution) = shared.solutions.pop_pending() {
                return Ok(Selected::Solution(solution));
            }
            if *jobs == 0 {
                tracing::debug!("OPEN exhausted with no work in flight");
                return Ok(Selected::Stop(Termination::Exhausted));
            }
            tracing::trace!(jobs = *jobs, "OPEN empty, waiting for builders");
            shared.jobs_changed.wait(&mut jobs);
        }
    }

    fn expand(&self, claimed: Claimed<S>) -> Result<Step<S, A, V>, SearchError> {
        let shared = &self.shared;
        let Claimed { id, state, is_goal } = claimed;
        let _claim = ClaimGuard::<S, A, V> { shared };
        shared.emit(|| GraphEvent::NodeTypeSwitched {
            node: id,
            kind: NodeKind::Expanding,
        });

        if is_goal {
            shared.ledger.lock().finish_expansion(&state)?;
            shared.emit(|| GraphEvent::NodeTypeSwitched {
                node: id,
                kind: NodeKind::Closed,
            });
            tracing::debug!(node = id.0, "goal node closed without expansion");
            return Ok(Step::GoalNodeClosed { node: id });
        }

        let successors = match catch_unwind(AssertUnwindSafe(|| shared.graph.successors(&state))) {
            Ok(Ok(successors)) => successors,
            Ok(Err(source)) => {
                shared.ledger.lock().abandon(&state);
                return Err(SearchError::SuccessorGeneration {
                    state: format!("{state:?}"),
                    source,
                });
            }
            Err(payload) => {
                shared.ledger.lock().abandon(&state);
                return Err(SearchError::Panicked {
                    stage: PanicStage::SuccessorGeneration,
                    message: panic_message(payload.as_ref()),
                });
            }
        };
        let count = successors.len();
        shared.emit(|| GraphEvent::SuccessorsComputed {
            node: id,
            successors: count,
        });
        let parent_path = Arc::new(shared.registry.read().path(id)?);
        shared.emit(|| GraphEvent::ExpansionSubmitted { node: id });
        if count == 0 {
            shared.emit(|| GraphEvent::ExpansionCompleted { node: id });
        }

        let tracker = Arc::new(ExpansionTracker::new(id, count));
        let pooled = self.pool_size > 0;
        for successor in successors {
            let builder = NodeBuilder::new(
                Arc::clone(shared),
                id,
                Arc::clone(&parent_path),
                successor,
                Arc::clone(&tracker),
                pooled,
            );
            if pooled {
                *shared.jobs.lock() += 1;
                let submitted = self
                    .control
                    .lock()
                    .pool
                    .as_ref()
                    .is_some_and(|pool| pool.submit(move || builder.run()));
                if !submitted {
                    *shared.jobs.lock() -= 1;
                    shared.jobs_changed.notify_all();
                    tracing::debug!(node = id.0, "pool closed, expansion cut short");
                    break;
                }
            } else {
                builder.run();
            }
        }

        shared.ledger.lock().finish_expansion(&state)?;
        shared.emit(|| GraphEvent::NodeTypeSwitched {
            node: id,
            kind: NodeKind::Closed,
        });
        if let Some(error) = shared.take_failure() {
            return Err(error);
        }
        tracing::debug!(node = id.0, successors = count, "expansion submitted");
        Ok(Step::ExpansionSubmitted {
            node: id,
            successors: count,
        })
    }

    /// Move to `Inactive` (once) and release resources. Returns the
    /// recorded termination reason, which may differ from `reason` if
    /// another one was recorded first.
    fn finish(&self, reason: Termination) -> Termination {
        self.shared.stop(reason);
        let reason = self.shared.run.reason().unwrap_or(reason);
        let mut control = self.control.lock();
        if let Lifecycle::Inactive(recorded) = control.lifecycle {
            return recorded;
        }
        control.lifecycle = Lifecycle::Inactive(reason);
        if let Some(mut timer) = control.timer.take() {
            timer.disarm();
        }
        if let Some(mut pool) = control.pool.take() {
            pool.shutdown();
            control.retired.push(pool);
        }
        tracing::info!(
            ?reason,
            expanded = self.shared.ledger.lock().expansions(),
            solutions = self.shared.solutions.count(),
            "search finished"
        );
        reason
    }
}

impl<S, A, V> Drop for BestFirst<S, A, V> {
    fn drop(&mut self) {
        // Workers exit once their queue drains; builders check the token first.
        self.shared.stop(Termination::Canceled);
        let control = self.control.get_mut();
        control.timer.take();
        if let Some(mut pool) = control.pool.take() {
            pool.shutdown();
        }
    }
}
