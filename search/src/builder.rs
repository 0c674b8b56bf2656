//! Node builder: the unit of expansion work.
//!
//! One builder runs per successor of an expanded node, inline on the
//! control thread or on a pool worker. It registers the child, runs the
//! goal test, labels the node, applies the discarding policy and registers
//! goal solutions. Goal nodes only reach OPEN by displacing a worse entry
//! for their state. A drop guard releases the job slot on every exit path,
//! panics included.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use crate::contract::{Label, SearchAction, SearchState, Successor};
use crate::error::{panic_message, PanicStage, SearchError};
use crate::evaluator::EvalError;
use crate::events::{GraphEvent, NodeKind};
use crate::interrupt::EvalContext;
use crate::node::{Insertion, NodeId, SearchPath};
use crate::policy::ParentDiscarding;
use crate::search::Shared;
use crate::solution::Solution;

/// Evaluations running this far past their deadline ignored the interruption.
const LATE_EVALUATION_GRACE: Duration = Duration::from_secs(1);

/// Counts down the builders of one expansion.
pub(crate) struct ExpansionTracker {
    node: NodeId,
    remaining: AtomicUsize,
}

impl ExpansionTracker {
    pub(crate) fn new(node: NodeId, builders: usize) -> Self {
        Self {
            node,
            remaining: AtomicUsize::new(builders),
        }
    }

    /// Returns `true` for the last builder.
    fn finish_one(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

/// What labeling produced.
pub(crate) enum LabelOutcome<V> {
    Labeled(V),
    /// No usable label: controlled prune, failure or panic.
    Pruned,
    /// Per-node timeout and no fallback label.
    TimedOut,
    /// The run stopped while evaluating.
    Abandoned,
}

pub(crate) struct NodeBuilder<S, A, V> {
    shared: Arc<Shared<S, A, V>>,
    parent: NodeId,
    parent_path: Arc<SearchPath<S, A>>,
    successor: Successor<S, A>,
    tracker: Arc<ExpansionTracker>,
    pooled: bool,
}

/// Releases the job slot and reports expansion completion on drop.
struct JobGuard<'a, S: SearchState, A: SearchAction, V: Label> {
    shared: &'a Shared<S, A, V>,
    tracker: &'a ExpansionTracker,
    pooled: bool,
}

impl<S: SearchState, A: SearchAction, V: Label> Drop for JobGuard<'_, S, A, V> {
    fn drop(&mut self) {
        if self.tracker.finish_one() {
            let node = self.tracker.node;
            self.shared
                .emit(|| GraphEvent::ExpansionCompleted { node });
        }
        let mut jobs = self.shared.jobs.lock();
        if self.pooled {
            *jobs = jobs.saturating_sub(1);
        }
        self.shared.jobs_changed.notify_all();
    }
}

impl<S: SearchState, A: SearchAction, V: Label> NodeBuilder<S, A, V> {
    pub(crate) fn new(
        shared: Arc<Shared<S, A, V>>,
        parent: NodeId,
        parent_path: Arc<SearchPath<S, A>>,
        successor: Successor<S, A>,
        tracker: Arc<ExpansionTracker>,
        pooled: bool,
    ) -> Self {
        Self {
            shared,
            parent,
            parent_path,
            successor,
            tracker,
            pooled,
        }
    }

    pub(crate) fn run(self) {
        let _guard = JobGuard {
            shared: &self.shared,
            tracker: &self.tracker,
            pooled: self.pooled,
        };
        if self.shared.run.is_stopped() {
            tracing::trace!(parent = self.parent.0, "run stopped, builder skipped");
            return;
        }
        if let Err(error) = self.build() {
            self.shared.fail(error);
        }
    }

    fn build(&self) -> Result<(), SearchError> {
        let shared = &self.shared;
        let Successor { action, state } = self.successor.clone();
        let path = self.parent_path.extended(action.clone(), state.clone());
        let is_goal = shared.test_goal(&path)?;
        let insertion = shared.registry.write().insert_child(
            self.parent,
            state.clone(),
            action,
            is_goal,
            shared.config.parent_discarding.allows_duplicates(),
        )?;
        let id = insertion.node();
        shared.emit(|| GraphEvent::NodeAdded {
            parent: Some(self.parent),
            node: id,
            state: state.clone(),
            kind: if is_goal { NodeKind::Solution } else { NodeKind::Open },
        });

        let label = match shared.label_node(id, &path)? {
            LabelOutcome::Labeled(label) => label,
            LabelOutcome::Pruned => {
                shared.emit(|| GraphEvent::NodeTypeSwitched {
                    node: id,
                    kind: NodeKind::Pruned,
                });
                return Ok(());
            }
            LabelOutcome::TimedOut => {
                shared.emit(|| GraphEvent::NodeTypeSwitched {
                    node: id,
                    kind: NodeKind::TimedOut,
                });
                return Ok(());
            }
            LabelOutcome::Abandoned => return Ok(()),
        };

        match insertion {
            Insertion::Fresh(_) if shared.config.parent_discarding == ParentDiscarding::None => {
                if is_goal {
                    tracing::trace!(node = id.0, "goal node kept off OPEN");
                } else if !shared.open.lock().insert(id, state, label.clone()) {
                    return Err(SearchError::invariant(format!("{id} already on OPEN")));
                }
            }
            _ => shared.integrate(id, &state, &label, is_goal)?,
        }

        if is_goal && !shared.capabilities.reports_solutions {
            shared.register_goal(path, label);
        }
        Ok(())
    }
}

impl<S: SearchState, A: SearchAction, V: Label> Shared<S, A, V> {
    /// Run the configured goal test with panic isolation.
    pub(crate) fn test_goal(&self, path: &SearchPath<S, A>) -> Result<bool, SearchError> {
        match catch_unwind(AssertUnwindSafe(|| self.goal.test(path))) {
            Ok(Ok(is_goal)) => Ok(is_goal),
            Ok(Err(source)) => Err(SearchError::GoalTest {
                state: format!("{:?}", path.head()),
                source,
            }),
            Err(payload) => Err(SearchError::Panicked {
                stage: PanicStage::GoalTest,
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Evaluate node `id` (whose path is `path`) and store label and
    /// annotations.
    ///
    /// Failures of the evaluator never propagate; they become prunes
    /// annotated with `f_error`. Only registry bookkeeping errors do.
    pub(crate) fn label_node(
        &self,
        id: NodeId,
        path: &SearchPath<S, A>,
    ) -> Result<LabelOutcome<V>, SearchError> {
        let budget = self.config.node_timeout();
        let ctx = EvalContext::new(Arc::clone(&self.run), budget);
        let started = Instant::now();
        let result = catch_unwind(AssertUnwindSafe(|| self.evaluator.evaluate(path, &ctx)));
        let elapsed = started.elapsed();

        let mut notes = ctx.take_annotations();
        notes.push((
            "f_time_ms".into(),
            json!(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)),
        ));
        if let Some(budget) = budget {
            if elapsed > budget + LATE_EVALUATION_GRACE {
                tracing::warn!(
                    node = id.0,
                    elapsed_ms = elapsed.as_millis(),
                    "evaluation ignored its deadline"
                );
            }
        }

        let late = ctx.deadline_passed();
        let outcome = match result {
            _ if self.run.is_stopped() => {
                notes.push(("f_error".into(), json!("interrupted")));
                LabelOutcome::Abandoned
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(node = id.0, %message, "evaluator panicked, node pruned");
                notes.push(("f_error".into(), json!(format!("panic: {message}"))));
                LabelOutcome::Pruned
            }
            Ok(Err(EvalError::Failed(message))) => {
                tracing::warn!(node = id.0, %message, "evaluation failed, node pruned");
                notes.push(("f_error".into(), json!(message)));
                LabelOutcome::Pruned
            }
            Ok(Ok(Some(label))) if !late => LabelOutcome::Labeled(label),
            Ok(Ok(None) | Err(EvalError::Prune)) if !late => {
                tracing::trace!(node = id.0, "node pruned by evaluator");
                LabelOutcome::Pruned
            }
            Ok(Ok(_) | Err(EvalError::Prune | EvalError::Interrupted)) => {
                notes.push(("f_error".into(), json!("timeout")));
                self.fallback_label(id, path, &mut notes)
            }
        };

        let mut registry = self.registry.write();
        for (key, value) in notes {
            registry.annotate(id, key, value)?;
        }
        if let LabelOutcome::Labeled(label) = &outcome {
            registry.set_label(id, label.clone())?;
        }
        Ok(outcome)
    }

    fn fallback_label(
        &self,
        id: NodeId,
        path: &SearchPath<S, A>,
        notes: &mut Vec<(String, serde_json::Value)>,
    ) -> LabelOutcome<V> {
        let Some(fallback) = &self.fallback else {
            tracing::warn!(node = id.0, "evaluation timed out, no fallback");
            return LabelOutcome::TimedOut;
        };
        let ctx = EvalContext::new(Arc::clone(&self.run), None);
        match catch_unwind(AssertUnwindSafe(|| fallback.evaluate(path, &ctx))) {
            Ok(Ok(Some(label))) => {
                tracing::debug!(node = id.0, "evaluation timed out, fallback label used");
                notes.extend(ctx.take_annotations());
                notes.push(("f_fallback".into(), json!(true)));
                LabelOutcome::Labeled(label)
            }
            _ => {
                tracing::warn!(node = id.0, "evaluation timed out, fallback gave no label");
                LabelOutcome::TimedOut
            }
        }
    }

    /// Apply the discarding policy to labeled node `id` holding `state`.
    ///
    /// `id` is either the indexed node of `state` or an unindexed candidate.
    /// The node that survives is on OPEN (or reopened) and indexed; a loser
    /// gets a `NodeRemoved` event. A goal node that meets no other entry
    /// for its state is indexed but stays off OPEN.
    pub(crate) fn integrate(
        &self,
        id: NodeId,
        state: &S,
        label: &V,
        is_goal: bool,
    ) -> Result<(), SearchError> {
        let mut open = self.open.lock();

        if let Some(old) = open.find_by_state(state) {
            let replace = open.label_of(old).is_some_and(|current| label < current);
            if replace {
                open.remove(old);
                open.insert(id, state.clone(), label.clone());
                self.registry.write().reindex(id)?;
                tracing::debug!(
                    node = id.0,
                    replaced = old.0,
                    "better duplicate replaced OPEN entry"
                );
                self.emit(|| GraphEvent::NodeRemoved { node: old });
            } else {
                tracing::trace!(node = id.0, kept = old.0, "duplicate discarded against OPEN");
                self.emit(|| GraphEvent::NodeRemoved { node: id });
            }
            return Ok(());
        }

        let mut ledger = self.ledger.lock();
        if ledger.is_closed(state) {
            if self.config.parent_discarding == ParentDiscarding::All {
                let mut registry = self.registry.write();
                let existing = registry.lookup(state).ok_or_else(|| {
                    SearchError::invariant(format!("closed {state:?} not indexed"))
                })?;
                let better = match registry.label(existing) {
                    Some(current) => *label < current,
                    None => true,
                };
                let old_parent = registry.get(existing).and_then(|n| n.parent);
                if existing != id && better && registry.reparent(existing, id)? {
                    ledger.reopen(state);
                    open.insert(existing, state.clone(), label.clone());
                    let new_parent = registry.get(existing).and_then(|n| n.parent);
                    tracing::debug!(
                        node = existing.0,
                        via = id.0,
                        "closed node reopened on a better path"
                    );
                    self.emit(|| GraphEvent::NodeParentSwitched {
                        node: existing,
                        old_parent,
                        new_parent,
                    });
                    self.emit(|| GraphEvent::NodeTypeSwitched {
                        node: existing,
                        kind: NodeKind::Open,
                    });
                    self.emit(|| GraphEvent::NodeRemoved { node: id });
                    return Ok(());
                }
            }
            tracing::trace!(node = id.0, "duplicate of a closed state discarded");
            self.emit(|| GraphEvent::NodeRemoved { node: id });
            return Ok(());
        }

        if ledger.is_expanding(state) {
            tracing::trace!(node = id.0, "duplicate of an expanding state discarded");
            self.emit(|| GraphEvent::NodeRemoved { node: id });
            return Ok(());
        }

        if is_goal {
            tracing::trace!(node = id.0, "goal node kept off OPEN");
        } else {
            open.insert(id, state.clone(), label.clone());
        }
        self.registry.write().reindex(id)?;
        Ok(())
    }

    pub(crate) fn register_goal(&self, path: SearchPath<S, A>, score: V) {
        let SearchPath { states, actions } = path;
        self.solutions.register(Solution::new(states, actions, score));
    }
}
