//! Shared helpers for arbor benchmark suites.

use std::sync::Arc;
use std::time::Duration;

use arbor_harness::evaluators::{Depth, Slow};
use arbor_harness::runner::{run, RunReport};
use arbor_harness::worlds::balanced_tree::{BalancedTree, TreeState};
use arbor_search::{BestFirst, NodeEvaluator, SearchConfig};

/// One benchmark configuration: a tree, a worker budget and an optional
/// per-node evaluation delay.
#[derive(Debug, Clone, Copy)]
pub struct Regime {
    pub name: &'static str,
    pub tree: BalancedTree,
    pub cpus: usize,
    pub eval_delay: Option<Duration>,
}

/// Regimes covering inline and pooled expansion, cheap and costly evaluation.
#[must_use]
pub fn regimes() -> Vec<Regime> {
    let wide = BalancedTree::new(4, 5);
    let costly = BalancedTree::new(3, 4);
    let delay = Some(Duration::from_micros(200));
    vec![
        Regime {
            name: "wide/inline",
            tree: wide,
            cpus: 1,
            eval_delay: None,
        },
        Regime {
            name: "wide/pooled4",
            tree: wide,
            cpus: 6,
            eval_delay: None,
        },
        Regime {
            name: "costly/inline",
            tree: costly,
            cpus: 1,
            eval_delay: delay,
        },
        Regime {
            name: "costly/pooled4",
            tree: costly,
            cpus: 6,
            eval_delay: delay,
        },
    ]
}

/// Run a regime to exhaustion.
///
/// # Panics
///
/// If the search fails; every regime is expected to exhaust its tree.
#[must_use]
pub fn run_regime(regime: &Regime) -> RunReport<usize> {
    let depth: Arc<dyn NodeEvaluator<TreeState, u32, usize>> = Arc::new(Depth);
    let evaluator: Arc<dyn NodeEvaluator<TreeState, u32, usize>> = match regime.eval_delay {
        Some(delay) => Arc::new(Slow::new(depth, delay)),
        None => depth,
    };
    let config = SearchConfig {
        cpus: regime.cpus,
        ..SearchConfig::default()
    };
    let search = BestFirst::new(Arc::new(regime.tree), regime.tree.goal(), evaluator, config)
        .expect("benchmark configuration is valid");
    let report = run(&search).expect("benchmark search completes");
    debug_assert_eq!(
        u64::try_from(report.solutions).unwrap_or(u64::MAX),
        regime.tree.leaf_count()
    );
    report
}
