//! Lock tests: several threads may step the same search. A caller that
//! finds OPEN empty while another caller is still generating successors
//! waits for that expansion instead of declaring the graph exhausted.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use arbor_harness::evaluators::Depth;
use arbor_harness::worlds::balanced_tree::{BalancedTree, TreeState};
use arbor_search::{BestFirst, GraphError, Lifecycle, SearchGraph, Step, Successor, Termination};
use lock_tests::{config, TreeEvaluator, TreeSearch};

/// A balanced tree whose successor generator takes its time.
struct Sluggish {
    tree: BalancedTree,
    delay: Duration,
}

impl SearchGraph<TreeState, u32> for Sluggish {
    fn roots(&self) -> Result<Vec<TreeState>, GraphError> {
        self.tree.roots()
    }

    fn successors(&self, state: &TreeState) -> Result<Vec<Successor<TreeState, u32>>, GraphError> {
        thread::sleep(self.delay);
        self.tree.successors(state)
    }
}

fn sluggish_search(cpus: usize) -> TreeSearch {
    let tree = BalancedTree::new(2, 2);
    let evaluator: TreeEvaluator = Arc::new(Depth);
    BestFirst::new(
        Arc::new(Sluggish {
            tree,
            delay: Duration::from_millis(300),
        }),
        tree.goal(),
        evaluator,
        config(cpus),
    )
    .unwrap()
}

fn second_caller_waits_for_the_first(cpus: usize) {
    let search = sluggish_search(cpus);
    assert!(matches!(search.step().unwrap(), Step::Initialized));

    let overlapping = thread::scope(|scope| {
        let first = scope.spawn(|| search.step());
        // The first caller is now inside the root's successor generator.
        thread::sleep(Duration::from_millis(50));
        let second = search.step();
        let first = first.join().unwrap();
        assert!(
            matches!(first, Ok(Step::ExpansionSubmitted { successors: 2, .. })),
            "got {first:?}"
        );
        second
    });
    assert!(
        !matches!(overlapping, Ok(Step::Finished(_))),
        "cpus={cpus}: search ended while the root was expanding: {overlapping:?}"
    );

    search.run_to_completion().unwrap();
    assert_eq!(search.solutions().len(), 4, "cpus={cpus}");
    assert_eq!(
        search.lifecycle(),
        Lifecycle::Inactive(Termination::Exhausted)
    );
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: overlapping step calls
// ---------------------------------------------------------------------------

#[test_log::test]
fn overlapping_steps_inline_find_every_goal() {
    second_caller_waits_for_the_first(1);
}

#[test_log::test]
fn overlapping_steps_pooled_find_every_goal() {
    second_caller_waits_for_the_first(4);
}
