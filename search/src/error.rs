//! Typed search errors.
//!
//! `SearchError` covers configuration failures and *structural* failures
//! of a running search (the supplied graph or goal test violated the
//! engine's contract). Prunes and evaluator failures never surface here;
//! they are recorded as node annotations instead.

use std::path::PathBuf;

use crate::contract::GraphError;

/// The collaborator call that panicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanicStage {
    RootGeneration,
    SuccessorGeneration,
    GoalTest,
    Evaluation,
}

impl PanicStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RootGeneration => "root_generation",
            Self::SuccessorGeneration => "successor_generation",
            Self::GoalTest => "goal_test",
            Self::Evaluation => "evaluation",
        }
    }
}

impl std::fmt::Display for PanicStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Rejected by [`crate::SearchConfig::validate`].
    #[error("invalid search configuration: {detail}")]
    InvalidConfig { detail: String },

    #[error("failed to read configuration {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Root generation failed.
    #[error("root generation failed: {0}")]
    RootGeneration(#[source] GraphError),

    /// The successor generator refused to expand a node.
    #[error("successor generation failed for {state}: {source}")]
    SuccessorGeneration {
        state: String,
        #[source]
        source: GraphError,
    },

    #[error("goal test failed for {state}: {source}")]
    GoalTest {
        state: String,
        #[source]
        source: GraphError,
    },

    /// Under `ParentDiscarding::None` the graph must be a tree.
    #[error("state {state} reached twice; the graph is not a tree")]
    StateReachedTwice { state: String },

    #[error("root {state} received no label")]
    UnlabeledRoot { state: String },

    #[error("invariant violated: {detail}")]
    InvariantViolation { detail: String },

    #[error("collaborator panicked during {stage}: {message}")]
    Panicked { stage: PanicStage, message: String },

    #[error("worker pool could not be started: {0}")]
    Spawn(#[source] std::io::Error),

    /// The whole-run timeout fired.
    #[error("search timed out")]
    TimedOut,

    #[error("search was canceled")]
    Canceled,

    /// The search already failed; the original error went to an earlier call.
    #[error("search aborted after an earlier failure: {detail}")]
    Aborted { detail: String },
}

impl SearchError {
    pub(crate) fn invariant(detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            detail: detail.into(),
        }
    }

    /// Whether this error ends the search because the run was stopped
    /// rather than because the graph misbehaved.
    #[must_use]
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::TimedOut | Self::Canceled)
    }
}

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
