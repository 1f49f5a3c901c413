//! # casetree — hierarchical, data-driven test trees
//!
//! Declare nested test cases as plain struct literals, build them into one
//! validated tree, and execute any case by path: setup hooks accumulate
//! from root to leaf, the nearest runner produces the response, and assert
//! hooks fire along the inherited chain. Cases may fan out over variants,
//! each as an independent named sub-run.
//!
//! ## Quick example
//!
//! ```rust
//! use std::sync::Arc;
//! use casetree::{Node, NullReporter, Reporter, Tree};
//!
//! let root: Arc<Node<i64, i64, ()>> = Arc::new(Node {
//!     id: "math".into(),
//!     setup: Some(Arc::new(|cx, _req, _v| (cx, 1))),
//!     run: Some(Arc::new(|_cx, req, _v| Ok(req * 2))),
//!     children: vec![Arc::new(Node {
//!         id: "plus ten".into(),
//!         setup: Some(Arc::new(|cx, req, _v| (cx, req + 10))),
//!         assert: Some(Arc::new(|t, _cx, _req, _v, result| {
//!             match result {
//!                 Ok(22) => {}
//!                 other => t.error(&format!("expected 22, got {other:?}")),
//!             }
//!         })),
//!         ..Node::default()
//!     })],
//!     ..Node::default()
//! });
//!
//! let tree = Tree::build(root, vec![]).unwrap();
//! let mut t = NullReporter::new();
//! tree.run_path(&mut t, &["math", "plus ten"]);
//! assert_eq!(t.result.failures, Vec::<String>::new());
//! ```
//!
//! ## Features
//!
//! - `googletest` — re-exports `googletest` matchers via
//!   `casetree::matchers` for use inside assert hooks

pub mod diagram;
pub mod node;
pub mod path;
pub mod report;
pub mod tree;

pub use diagram::DiagramNode;
pub use node::{AssertFn, Node, RunFn, SetupFn, TestContext};
pub use path::{NodePath, PanicError};
pub use report::{
    ConsoleReporter, FatalSignal, NullReporter, Reporter, RunConfig, RunResult, Status,
};
pub use tree::{BuildError, NodeId, ResolveError, Tree, TreeNode};

/// Re-export of the [`googletest`] crate. Available with the `googletest`
/// feature.
#[cfg(feature = "googletest")]
pub use googletest;

/// Composable matchers re-exported from [`googletest::prelude`].
#[cfg(feature = "googletest")]
pub mod matchers {
    pub use googletest::prelude::*;
}

/// Check if a case's tags match the `CASETREE_TAG_FILTER` env var.
///
/// Filter syntax:
/// - `integration` — matches if any tag equals "integration"
/// - `!slow` — matches if no tag equals "slow"
/// - `integration,smoke` — OR: matches if any tag matches any filter term
/// - `integration+fast` — AND: matches if tags include all filter terms
///
/// Returns `true` (run the case) if no filter is set.
pub fn check_tags(tags: &[&str]) -> bool {
    let filter = match std::env::var("CASETREE_TAG_FILTER") {
        Ok(f) if !f.is_empty() => f,
        _ => return true,
    };
    tags_match_filter(&filter, tags)
}

fn tags_match_filter(filter: &str, tags: &[&str]) -> bool {
    // AND filter: "a+b" means all must match
    if filter.contains('+') {
        return filter.split('+').all(|term| tags.contains(&term.trim()));
    }

    // OR filter: "a,b" means any must match
    filter.split(',').any(|term| {
        let term = term.trim();
        if let Some(negated) = term.strip_prefix('!') {
            !tags.contains(&negated)
        } else {
            tags.contains(&term)
        }
    })
}
