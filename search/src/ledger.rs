//! EXPANDING / CLOSED bookkeeping.
//!
//! A state is either untouched, expanding (owned by one thread), or closed.
//! `expanding ∩ closed = ∅` holds after every operation; the only way out
//! of `closed` is [`Ledger::reopen`].

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::thread::ThreadId;

use crate::error::SearchError;

pub struct Ledger<S> {
    expanding: HashMap<S, ThreadId>,
    closed: HashSet<S>,
    expansions: u64,
}

impl<S> Ledger<S>
where
    S: Clone + Eq + Hash + std::fmt::Debug,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            expanding: HashMap::new(),
            closed: HashSet::new(),
            expansions: 0,
        }
    }

    /// Claim `state` for expansion by `owner`.
    ///
    /// # Errors
    ///
    /// [`SearchError::InvariantViolation`] if the state is already closed
    /// or being expanded.
    pub fn begin_expansion(&mut self, state: &S, owner: ThreadId) -> Result<(), SearchError> {
        if self.closed.contains(state) {
            return Err(SearchError::invariant(format!(
                "{state:?} selected for expansion but already closed"
            )));
        }
        if let Some(other) = self.expanding.get(state) {
            return Err(SearchError::invariant(format!(
                "{state:?} selected for expansion while {other:?} expands it"
            )));
        }
        self.expanding.insert(state.clone(), owner);
        self.expansions += 1;
        Ok(())
    }

    /// Move `state` from expanding to closed.
    ///
    /// # Errors
    ///
    /// [`SearchError::InvariantViolation`] if the state was not expanding.
    pub fn finish_expansion(&mut self, state: &S) -> Result<(), SearchError> {
        if self.expanding.remove(state).is_none() {
            return Err(SearchError::invariant(format!(
                "{state:?} closed without being expanded"
            )));
        }
        self.closed.insert(state.clone());
        Ok(())
    }

    /// Drop an expansion claim without closing (successor generation failed).
    pub fn abandon(&mut self, state: &S) {
        self.expanding.remove(state);
    }

    /// Take `state` out of CLOSED so it can be expanded again.
    ///
    /// Returns `false` if it was not closed.
    pub fn reopen(&mut self, state: &S) -> bool {
        self.closed.remove(state)
    }

    #[must_use]
    pub fn is_closed(&self, state: &S) -> bool {
        self.closed.contains(state)
    }

    #[must_use]
    pub fn is_expanding(&self, state: &S) -> bool {
        self.expanding.contains_key(state)
    }

    /// Thread currently expanding `state`.
    #[must_use]
    pub fn owner(&self, state: &S) -> Option<ThreadId> {
        self.expanding.get(state).copied()
    }

    #[must_use]
    pub fn closed_count(&self) -> usize {
        self.closed.len()
    }

    #[must_use]
    pub fn expanding_count(&self) -> usize {
        self.expanding.len()
    }

    /// Total successful [`Self::begin_expansion`] calls, reopens included.
    #[must_use]
    pub fn expansions(&self) -> u64 {
        self.expansions
    }
}

impl<S> Default for Ledger<S>
where
    S: Clone + Eq + Hash + std::fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
