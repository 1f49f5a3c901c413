//! Path execution — setup accumulation, runner invocation with panic
//! isolation, and the inherited assertion chain.

use std::backtrace::Backtrace;
use std::fmt::Debug;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::node::{AssertFn, RunFn, TestContext};
use crate::report::{panic_message, Reporter};
use crate::tree::{NodeId, Tree};

/// A panic captured from a runner hook, carried through the assertion chain
/// as the error result. The engine never lets a runner panic escape; assert
/// hooks decide whether it constitutes a failure.
#[derive(Debug)]
pub struct PanicError {
    pub message: String,
    pub backtrace: Backtrace,
}

impl std::fmt::Display for PanicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

impl std::error::Error for PanicError {}

impl PanicError {
    fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        PanicError {
            message: panic_message(payload.as_ref()),
            backtrace: Backtrace::capture(),
        }
    }
}

/// The ordered root-to-leaf chain of nodes identifying one executable case.
///
/// Obtained from [`Tree::get_path`], [`Tree::get_node_path`] or
/// [`Tree::find_path`]; borrows the tree it resolves into.
///
/// [`Tree::get_path`]: crate::Tree::get_path
/// [`Tree::get_node_path`]: crate::Tree::get_node_path
/// [`Tree::find_path`]: crate::Tree::find_path
pub struct NodePath<'t, Q, R, C, V = ()> {
    pub(crate) tree: &'t Tree<Q, R, C, V>,
    pub(crate) nodes: Vec<NodeId>,
}

impl<'t, Q, R, C, V> std::fmt::Debug for NodePath<'t, Q, R, C, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodePath")
            .field("nodes", &self.nodes)
            .finish_non_exhaustive()
    }
}

impl<'t, Q, R, C, V> NodePath<'t, Q, R, C, V> {
    /// The ID chain from root to leaf.
    pub fn names(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .map(|&id| self.tree.node(id).id())
            .collect()
    }

    /// The effective runner: nearest node, leaf to root, that defines `run`.
    pub fn runner(&self) -> Option<&RunFn<Q, R, C, V>> {
        self.nodes
            .iter()
            .rev()
            .find_map(|&id| self.tree.node(id).run.as_ref())
    }

    /// The effective variant set: nearest node, leaf to root, with a
    /// non-empty `variants` list. Empty when no node declares variants.
    pub fn variants(&self) -> &[V] {
        self.nodes
            .iter()
            .rev()
            .map(|&id| self.tree.node(id).variants.as_slice())
            .find(|vs| !vs.is_empty())
            .unwrap_or(&[])
    }
}

impl<'t, Q, R, C, V> NodePath<'t, Q, R, C, V>
where
    Q: Default,
    C: TestContext,
    V: Default + Debug,
{
    /// Execute this path: once per variant of the effective variant set, or
    /// once with `V::default()` when no variants are declared anywhere on
    /// the path. Multiple variants run as named sub-tests; a single variant
    /// runs inline so the output path stays stable.
    pub fn run(&self, t: &mut dyn Reporter) {
        let variants = self.variants();
        if variants.is_empty() {
            let default = [V::default()];
            self.run_with_variants(t, &default);
        } else {
            self.run_with_variants(t, variants);
        }
    }

    pub(crate) fn run_with_variants(&self, t: &mut dyn Reporter, variants: &[V]) {
        let Some(&leaf) = self.nodes.last() else {
            t.error("node path is empty");
            return;
        };
        let Some(runner) = self.runner() else {
            t.error(&format!("missing runner: {}", self.tree.node(leaf).id()));
            return;
        };

        if variants.len() == 1 {
            self.run_once(t, runner, &variants[0]);
        } else {
            for variant in variants {
                t.run(&format!("{variant:?}"), &mut |t| {
                    self.run_once(t, runner, variant)
                });
            }
        }
    }

    fn run_once(&self, t: &mut dyn Reporter, runner: &RunFn<Q, R, C, V>, variant: &V) {
        let mut cx = C::default();
        cx.on_init(t);

        let mut req = Q::default();
        for &id in &self.nodes {
            if let Some(setup) = &self.tree.node(id).setup {
                (cx, req) = setup(cx, req, variant);
            }
        }

        // Only the runner call is isolated; setup/assert panics unwind to
        // the reporter's own grouping boundary.
        let result = match catch_unwind(AssertUnwindSafe(|| runner(&mut cx, &req, variant))) {
            Ok(res) => res,
            Err(payload) => Err(anyhow::Error::new(PanicError::from_payload(payload))),
        };

        // Collect asserts leaf to root. A node that does not inherit stops
        // the collection after contributing its own assert.
        let mut asserts: Vec<&AssertFn<Q, R, C, V>> = Vec::new();
        for &id in self.nodes.iter().rev() {
            let node = self.tree.node(id);
            if let Some(assert) = &node.assert {
                asserts.push(assert);
            }
            if !node.inherit_assert {
                break;
            }
        }

        // Ancestors assert before descendants.
        for assert in asserts.iter().rev() {
            assert(t, &cx, &req, variant, &result);
        }

        let leaf = self.tree.node(*self.nodes.last().expect("path checked non-empty"));
        if let Some(assert_self) = &leaf.assert_self {
            assert_self(t, &cx, &req, variant, &result);
        }
    }
}
