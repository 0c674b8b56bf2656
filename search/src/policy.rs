//! Search configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Threads reserved for driving the search. The run timer sleeps in
/// `recv_timeout` and is not counted.
pub const CONTROL_THREADS: usize = 1;

/// How a re-reached state is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentDiscarding {
    /// The graph is a tree; a state reached twice aborts the search.
    #[default]
    None,
    /// Keep the better of two OPEN entries for the same state.
    Open,
    /// As `Open`, and reopen closed states when a strictly better path appears.
    All,
}

impl ParentDiscarding {
    /// Whether a re-reached state may create a candidate node.
    #[must_use]
    pub fn allows_duplicates(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Budgets and policies for one search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// CPU budget. Values up to [`CONTROL_THREADS`] mean synchronous
    /// expansion on the calling thread.
    pub cpus: usize,
    /// Whole-run timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Per-node evaluation budget in milliseconds.
    pub node_timeout_ms: Option<u64>,
    pub parent_discarding: ParentDiscarding,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cpus: 1,
            timeout_ms: None,
            node_timeout_ms: None,
            parent_discarding: ParentDiscarding::None,
        }
    }
}

impl SearchConfig {
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidConfig`] for a zero CPU budget or a
    /// zero timeout.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.cpus == 0 {
            return Err(SearchError::InvalidConfig {
                detail: "cpus must be at least 1".into(),
            });
        }
        if self.timeout_ms == Some(0) {
            return Err(SearchError::InvalidConfig {
                detail: "timeout_ms must be positive when set".into(),
            });
        }
        if self.node_timeout_ms == Some(0) {
            return Err(SearchError::InvalidConfig {
                detail: "node_timeout_ms must be positive when set".into(),
            });
        }
        Ok(())
    }

    /// Worker pool size; 0 means synchronous.
    #[must_use]
    pub fn worker_threads(&self) -> usize {
        self.cpus.saturating_sub(CONTROL_THREADS)
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_ms.map(Duration::from_millis)
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// [`SearchError::ConfigParse`] or [`SearchError::InvalidConfig`].
    pub fn from_json_str(text: &str) -> Result<Self, SearchError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// [`SearchError::ConfigIo`] if the file cannot be read, otherwise as
    /// [`Self::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SearchError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SearchError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}
