//! The declarative node model — one test definition in the hierarchy.

use std::sync::Arc;

use crate::report::Reporter;

/// Setup hook: receives the accumulated `(context, request)` pair and the
/// active variant, and returns the replacement pair for descendants.
pub type SetupFn<Q, C, V> = Arc<dyn Fn(C, Q, &V) -> (C, Q) + Send + Sync>;

/// Runner hook: produces a response from the final request, or an error.
pub type RunFn<Q, R, C, V> = Arc<dyn Fn(&mut C, &Q, &V) -> anyhow::Result<R> + Send + Sync>;

/// Assert hook: inspects the final `(context, request, variant, result)`
/// tuple and signals failures through the reporter. Return values are not
/// interpreted; a hook that stays silent passes.
pub type AssertFn<Q, R, C, V> =
    Arc<dyn Fn(&mut dyn Reporter, &C, &Q, &V, &anyhow::Result<R>) + Send + Sync>;

/// The testing context contract.
///
/// A fresh `C::default()` is created for every path execution. `on_init`
/// runs once, before any setup hook, and receives the reporter — use it to
/// log or fail fast when a required environment is missing.
pub trait TestContext: Default {
    fn on_init(&mut self, _t: &mut dyn Reporter) {}
}

impl TestContext for () {}

/// A node in the tree of testing cases.
///
/// Type parameters: `Q` request, `R` response, `C` testing context, `V`
/// variant value (defaults to `()` for trees without variants).
///
/// Nodes are written as struct literals and handed to [`Tree::build`]; the
/// tree deep-copies everything it is given, so the same `Arc`-shared
/// sub-structure may be reused across trees.
///
/// ```rust
/// use std::sync::Arc;
/// use casetree::Node;
///
/// let root: Arc<Node<u32, u32, ()>> = Arc::new(Node {
///     id: "root".into(),
///     run: Some(Arc::new(|_cx, req, _v| Ok(req * 2))),
///     ..Node::default()
/// });
/// ```
///
/// [`Tree::build`]: crate::Tree::build
pub struct Node<Q, R, C, V = ()> {
    /// Should be unique tree-wide. An empty ID means the node cannot be
    /// referenced by path or looked up later.
    pub id: String,
    /// Parent reference by ID, for detached nodes supplied in the flat
    /// build list. May be combined with `parent_node`; both must then
    /// resolve to the same node.
    pub parent_id: Option<String>,
    /// Parent reference by node identity, for detached nodes.
    pub parent_node: Option<Arc<Node<Q, R, C, V>>>,
    /// Whether ancestor assert hooks keep applying to this node's subtree.
    /// Defaults to `true`; `false` cuts the inherited chain off at this
    /// node (its own assert still fires).
    pub inherit_assert: bool,
    pub description: String,
    /// Grouping metadata; feeds tag filtering and the diagram export, never
    /// execution logic.
    pub tags: Vec<String>,
    /// Variant fan-out values. The nearest node on the path (leaf to root)
    /// with a non-empty list supplies the variants for the whole run.
    pub variants: Vec<V>,

    pub run: Option<RunFn<Q, R, C, V>>,
    pub setup: Option<SetupFn<Q, C, V>>,
    pub assert: Option<AssertFn<Q, R, C, V>>,
    /// Leaf-only hook that always runs last, after the full inherited
    /// assert chain, regardless of `inherit_assert`.
    pub assert_self: Option<AssertFn<Q, R, C, V>>,

    pub children: Vec<Arc<Node<Q, R, C, V>>>,
}

impl<Q, R, C, V> Default for Node<Q, R, C, V> {
    fn default() -> Self {
        Node {
            id: String::new(),
            parent_id: None,
            parent_node: None,
            inherit_assert: true,
            description: String::new(),
            tags: Vec::new(),
            variants: Vec::new(),
            run: None,
            setup: None,
            assert: None,
            assert_self: None,
            children: Vec::new(),
        }
    }
}

impl<Q, R, C, V: Clone> Clone for Node<Q, R, C, V> {
    fn clone(&self) -> Self {
        Node {
            id: self.id.clone(),
            parent_id: self.parent_id.clone(),
            parent_node: self.parent_node.clone(),
            inherit_assert: self.inherit_assert,
            description: self.description.clone(),
            tags: self.tags.clone(),
            variants: self.variants.clone(),
            run: self.run.clone(),
            setup: self.setup.clone(),
            assert: self.assert.clone(),
            assert_self: self.assert_self.clone(),
            children: self.children.clone(),
        }
    }
}
