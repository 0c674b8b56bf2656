//! Arbor Search: concurrent, anytime best-first search over implicit graphs.
//!
//! The caller supplies the graph (roots + successors), a goal test and a
//! node evaluator; the engine explores nodes in label order and yields
//! complete root-to-goal paths one at a time. It can be driven one step at a
//! time ([`BestFirst::step`]) or asked for the next solution
//! ([`BestFirst::next_solution`]).
//!
//! # Module map
//!
//! ```text
//! contract   graph / goal-test collaborator traits
//! node       SearchNode arena + state → node registry
//! frontier   OPEN (best-first or focal selection)
//! ledger     EXPANDING / CLOSED bookkeeping
//! evaluator  node evaluator contract and adapters
//! interrupt  run token, per-node deadlines, run timer
//! builder    unit of expansion work (one per successor)
//! pool       bounded worker pool
//! search     the driver state machine
//! solution   solution records and registration
//! events     observer event stream
//! policy     configuration
//! error      error taxonomy
//! ```
//!
//! # Key types
//!
//! - [`BestFirst`]: the search driver
//! - [`SearchGraph`] / [`GoalTest`]: the graph being searched
//! - [`NodeEvaluator`]: pluggable f-function
//! - [`SearchConfig`]: worker budget, timeouts, discarding policy
//! - [`Step`]: one discrete event per driver step

#![forbid(unsafe_code)]

mod builder;
pub mod contract;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod frontier;
pub mod interrupt;
pub mod ledger;
pub mod node;
pub mod policy;
pub mod pool;
pub mod search;
pub mod solution;

pub use contract::{
    GoalTest, GraphError, Label, NodeGoalTester, PathGoalTester, SearchAction, SearchGraph,
    SearchState, Successor,
};
pub use error::{PanicStage, SearchError};
pub use evaluator::{
    AlternativeEvaluator, EvalError, EvaluatorCapabilities, FnEvaluator, NodeEvaluator,
};
pub use events::{GraphEvent, NodeKind};
pub use frontier::FocalPolicy;
pub use interrupt::{EvalContext, Termination};
pub use node::{NodeId, SearchNode, SearchPath};
pub use policy::{ParentDiscarding, SearchConfig};
pub use search::{BestFirst, BestFirstBuilder, Lifecycle, Step};
pub use solution::{Solution, SolutionSink};
