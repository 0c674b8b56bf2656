//! Drive a search to its end and summarize what happened.
//!
//! [`run`] subscribes to the event stream before the first step, steps the
//! driver until it reports [`Step::Finished`], and folds the driver's
//! counters and the observed events into a serializable [`RunReport`].

use std::collections::BTreeMap;
use std::time::Instant;

use crossbeam_channel::Receiver;
use serde::Serialize;

use arbor_search::{
    BestFirst, GraphEvent, Label, SearchAction, SearchError, SearchState, Step, Termination,
};

/// Buffered view of a search's event stream.
pub struct EventRecorder<S, A, V> {
    rx: Receiver<GraphEvent<S, A, V>>,
    seen: Vec<GraphEvent<S, A, V>>,
}

impl<S: SearchState, A: SearchAction, V: Label> EventRecorder<S, A, V> {
    /// Subscribe to `search`. Only events published afterwards are seen.
    #[must_use]
    pub fn attach(search: &BestFirst<S, A, V>) -> Self {
        Self {
            rx: search.subscribe(),
            seen: Vec::new(),
        }
    }

    /// Move every delivered event into the buffer and return the buffer.
    pub fn drain(&mut self) -> &[GraphEvent<S, A, V>] {
        self.seen.extend(self.rx.try_iter());
        &self.seen
    }

    /// Events delivered since the last call to `take_new`.
    pub fn take_new(&mut self) -> Vec<GraphEvent<S, A, V>> {
        let fresh: Vec<_> = self.rx.try_iter().collect();
        self.seen.extend(fresh.iter().cloned());
        fresh
    }

    /// Event counts keyed by event name.
    pub fn counts(&mut self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for event in self.drain() {
            *counts.entry(event.name()).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport<V> {
    pub termination: Termination,
    pub steps: u64,
    pub solutions: usize,
    pub best_score: Option<V>,
    pub expanded: u64,
    pub closed: usize,
    pub created: usize,
    pub open_high_water: usize,
    pub workers: usize,
    pub events: BTreeMap<&'static str, usize>,
    pub elapsed_ms: u64,
}

/// Step `search` until it finishes.
///
/// # Errors
///
/// The structural failure that ended the run, if any.
pub fn run<S, A, V>(search: &BestFirst<S, A, V>) -> Result<RunReport<V>, SearchError>
where
    S: SearchState,
    A: SearchAction,
    V: Label,
{
    let mut recorder = EventRecorder::attach(search);
    let started = Instant::now();
    let mut steps = 0_u64;
    let termination = loop {
        steps += 1;
        if let Step::Finished(reason) = search.step()? {
            break reason;
        }
    };
    let report = RunReport {
        termination,
        steps,
        solutions: search.solutions().len(),
        best_score: search.best_score(),
        expanded: search.expanded_count(),
        closed: search.closed_count(),
        created: search.created_count(),
        open_high_water: search.open_high_water(),
        workers: search.pool_size(),
        events: recorder.counts(),
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    tracing::info!(
        ?termination,
        steps,
        solutions = report.solutions,
        expanded = report.expanded,
        "harness run finished"
    );
    Ok(report)
}
