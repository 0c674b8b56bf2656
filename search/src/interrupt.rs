//! Cooperative interruption: the run token, per-evaluation contexts and
//! the whole-run timer.
//!
//! Nothing here preempts a thread. Evaluators observe interruption through
//! [`EvalContext::check`]; the driver observes it on every wake-up.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Serialize;

use crate::evaluator::EvalError;

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// OPEN empty and no expansion work in flight.
    Exhausted,
    /// The whole-run timeout fired.
    TimedOut,
    /// [`crate::BestFirst::cancel`] was called or the search was dropped.
    Canceled,
    /// A structural failure ended the search.
    Failed,
}

impl Termination {
    fn code(self) -> u8 {
        match self {
            Self::Exhausted => 1,
            Self::TimedOut => 2,
            Self::Canceled => 3,
            Self::Failed => 4,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Exhausted),
            2 => Some(Self::TimedOut),
            3 => Some(Self::Canceled),
            4 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Shared stop flag. The first reason recorded wins.
#[derive(Debug, Default)]
pub struct RunToken {
    state: AtomicU8,
}

impl RunToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `reason`. Returns `false` if the run was already stopped.
    pub fn stop(&self, reason: Termination) -> bool {
        self.state
            .compare_exchange(0, reason.code(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[must_use]
    pub fn reason(&self) -> Option<Termination> {
        Termination::from_code(self.state.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.load(Ordering::Acquire) != 0
    }
}

/// What interrupted an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// The per-node deadline passed or the whole run timed out.
    Timeout,
    /// The search stopped for any other reason.
    Canceled,
}

/// Handed to every [`crate::NodeEvaluator::evaluate`] call.
#[derive(Debug)]
pub struct EvalContext {
    run: Arc<RunToken>,
    deadline: Option<Instant>,
    annotations: Mutex<Vec<(String, serde_json::Value)>>,
}

impl EvalContext {
    /// Context bound to `run` with an optional per-node budget.
    #[must_use]
    pub fn new(run: Arc<RunToken>, budget: Option<Duration>) -> Self {
        Self {
            run,
            deadline: budget.map(|b| Instant::now() + b),
            annotations: Mutex::new(Vec::new()),
        }
    }

    /// Context that is never interrupted. For evaluating outside a search.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(Arc::new(RunToken::new()), None)
    }

    #[must_use]
    pub fn interruption(&self) -> Option<Interruption> {
        match self.run.reason() {
            Some(Termination::TimedOut) => return Some(Interruption::Timeout),
            Some(_) => return Some(Interruption::Canceled),
            None => {}
        }
        self.deadline_passed().then_some(Interruption::Timeout)
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.interruption().is_some()
    }

    /// Cooperative interruption point.
    ///
    /// # Errors
    ///
    /// [`EvalError::Interrupted`] once the deadline passed or the run stopped.
    pub fn check(&self) -> Result<(), EvalError> {
        if self.is_interrupted() {
            Err(EvalError::Interrupted)
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the per-node deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Attach a diagnostic value to the node being evaluated.
    pub fn annotate(&self, key: impl Into<String>, value: serde_json::Value) {
        self.annotations.lock().push((key.into(), value));
    }

    pub(crate) fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub(crate) fn take_annotations(&self) -> Vec<(String, serde_json::Value)> {
        std::mem::take(&mut *self.annotations.lock())
    }
}

/// Whole-run timer thread. Dropping or disarming it before the timeout
/// elapses cancels the callback.
pub(crate) struct RunTimer {
    disarm: Option<Sender<()>>,
}

impl RunTimer {
    pub(crate) fn arm(
        timeout: Duration,
        on_fire: impl FnOnce() + Send + 'static,
    ) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::bounded::<()>(0);
        std::thread::Builder::new()
            .name("arbor-timer".into())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(timeout) {
                    on_fire();
                }
            })?;
        Ok(Self { disarm: Some(tx) })
    }

    pub(crate) fn disarm(&mut self) {
        self.disarm.take();
    }
}

impl Drop for RunTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}
