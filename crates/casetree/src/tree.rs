//! Tree construction and case resolution.
//!
//! [`Tree::build`] turns a root node plus a flat list of detached nodes
//! into one validated, indexed tree. The tree deep-copies everything into
//! an internal arena, so mutating or reusing the caller's `Arc`s after the
//! build never affects it; a side table from the caller's node identity to
//! the internal copy lets [`Tree::run_node`] accept the original reference.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use thiserror::Error;

use crate::check_tags;
use crate::node::{AssertFn, Node, RunFn, SetupFn, TestContext};
use crate::path::NodePath;
use crate::report::{Reporter, RunConfig};

// ============================================================================
// Errors
// ============================================================================

/// A tree could not be constructed from the given nodes.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("duplicate node: {0}")]
    DuplicateId(String),
    #[error("missing parent for: {id}({description}), parent id: {parent_id}")]
    MissingParent {
        id: String,
        description: String,
        parent_id: String,
    },
    #[error("missing parent for: {id}({description})")]
    MissingParentNode { id: String, description: String },
    #[error("parent mismatch for: {id}({description}), parent id: {parent_id}, parent node: {parent_node_id}")]
    ParentMismatch {
        id: String,
        description: String,
        parent_id: String,
        parent_node_id: String,
    },
}

/// A path could not be resolved. Reported through the reporter's non-fatal
/// error method; sibling runs are unaffected.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid path")]
    InvalidPath,
    #[error("expecting root case: {expected}, actual: {actual}")]
    RootMismatch { expected: String, actual: String },
    #[error("case not found: {0}")]
    CaseNotFound(String),
    #[error("node not found: {0}")]
    NodeNotFound(String),
}

// ============================================================================
// Internal node storage
// ============================================================================

/// Index of a node in the tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// A tree-owned copy of one node. Exposed read-only via [`Tree::find_node`].
pub struct TreeNode<Q, R, C, V = ()> {
    pub(crate) id: String,
    pub(crate) description: String,
    pub(crate) tags: Vec<String>,
    pub(crate) inherit_assert: bool,
    pub(crate) variants: Vec<V>,
    pub(crate) run: Option<RunFn<Q, R, C, V>>,
    pub(crate) setup: Option<SetupFn<Q, C, V>>,
    pub(crate) assert: Option<AssertFn<Q, R, C, V>>,
    pub(crate) assert_self: Option<AssertFn<Q, R, C, V>>,
    pub(crate) children: Vec<NodeId>,
}

impl<Q, R, C, V> TreeNode<Q, R, C, V> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// A node is a discoverable case when it defines any assertion.
    fn is_case(&self) -> bool {
        self.assert.is_some() || self.assert_self.is_some()
    }
}

// ============================================================================
// Tree
// ============================================================================

/// The built, indexed, owned collection of nodes rooted at one root.
///
/// Indices are built once at construction and read-only afterward; the
/// engine never locks and never spawns work.
pub struct Tree<Q, R, C, V = ()> {
    arena: Vec<TreeNode<Q, R, C, V>>,
    root: NodeId,
    /// Parent edge per arena slot, for upward traversal. `None` for the
    /// root and for nodes not reachable from it.
    parent: Vec<Option<NodeId>>,
    /// Non-empty IDs reachable from the root.
    id_to_node: HashMap<String, NodeId>,
    /// Caller-side node identity to internal copy. Holds the original
    /// `Arc`s so the addresses stay valid as map keys.
    external: HashMap<usize, (Arc<Node<Q, R, C, V>>, NodeId)>,
}

impl<Q, R, C, V> Debug for Tree<Q, R, C, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree").finish_non_exhaustive()
    }
}

impl<Q, R, C, V: Clone> Tree<Q, R, C, V> {
    /// [`build`](Tree::build), converting any error into a panic. Intended
    /// for statically-known trees where a build failure is a programming
    /// mistake.
    pub fn must_build(root: Arc<Node<Q, R, C, V>>, nodes: Vec<Arc<Node<Q, R, C, V>>>) -> Self {
        match Self::build(root, nodes) {
            Ok(tree) => tree,
            Err(err) => panic!("{err}"),
        }
    }

    /// Build a tree from a root plus a flat list of additional nodes.
    ///
    /// Additional nodes attach under the root unless they declare a parent
    /// by ID or by node reference; declaring both requires them to agree.
    /// Duplicate non-empty IDs anywhere in the forest fail the build.
    pub fn build(
        root: Arc<Node<Q, R, C, V>>,
        nodes: Vec<Arc<Node<Q, R, C, V>>>,
    ) -> Result<Self, BuildError> {
        let mut arena = Vec::new();
        let mut external = HashMap::new();

        // Deep-copy the whole forest before touching structure.
        let root_id = copy_node(&root, &mut arena, &mut external);
        let detached: Vec<NodeId> = nodes
            .iter()
            .map(|node| copy_node(node, &mut arena, &mut external))
            .collect();

        // ID uniqueness across the whole forest, in declaration order.
        let mut ids: HashMap<String, NodeId> = HashMap::new();
        index_ids(&arena, root_id, &mut ids)?;
        for &top in &detached {
            index_ids(&arena, top, &mut ids)?;
        }

        // Attach detached nodes, in input order.
        for (node, &copy) in nodes.iter().zip(detached.iter()) {
            let parent = resolve_parent(node, root_id, &ids, &external)?;
            arena[parent.0].children.push(copy);
        }

        let len = arena.len();
        let mut tree = Tree {
            arena,
            root: root_id,
            parent: vec![None; len],
            id_to_node: HashMap::new(),
            external,
        };
        tree.init();
        Ok(tree)
    }

    fn init(&mut self) {
        let mut stack = vec![self.root];
        while let Some(at) = stack.pop() {
            let node = &self.arena[at.0];
            if !node.id.is_empty() {
                self.id_to_node.insert(node.id.clone(), at);
            }
            for &child in &node.children {
                self.parent[child.0] = Some(at);
                stack.push(child);
            }
        }
    }
}

fn copy_node<Q, R, C, V: Clone>(
    node: &Arc<Node<Q, R, C, V>>,
    arena: &mut Vec<TreeNode<Q, R, C, V>>,
    external: &mut HashMap<usize, (Arc<Node<Q, R, C, V>>, NodeId)>,
) -> NodeId {
    let children: Vec<NodeId> = node
        .children
        .iter()
        .map(|child| copy_node(child, arena, external))
        .collect();
    let slot = NodeId(arena.len());
    arena.push(TreeNode {
        id: node.id.clone(),
        description: node.description.clone(),
        tags: node.tags.clone(),
        inherit_assert: node.inherit_assert,
        variants: node.variants.clone(),
        run: node.run.clone(),
        setup: node.setup.clone(),
        assert: node.assert.clone(),
        assert_self: node.assert_self.clone(),
        children,
    });
    external.insert(Arc::as_ptr(node) as usize, (Arc::clone(node), slot));
    slot
}

fn index_ids<Q, R, C, V>(
    arena: &[TreeNode<Q, R, C, V>],
    at: NodeId,
    ids: &mut HashMap<String, NodeId>,
) -> Result<(), BuildError> {
    let node = &arena[at.0];
    if !node.id.is_empty() {
        if ids.contains_key(&node.id) {
            return Err(BuildError::DuplicateId(node.id.clone()));
        }
        ids.insert(node.id.clone(), at);
    }
    for &child in &node.children {
        index_ids(arena, child, ids)?;
    }
    Ok(())
}

fn resolve_parent<Q, R, C, V>(
    node: &Arc<Node<Q, R, C, V>>,
    root: NodeId,
    ids: &HashMap<String, NodeId>,
    external: &HashMap<usize, (Arc<Node<Q, R, C, V>>, NodeId)>,
) -> Result<NodeId, BuildError> {
    let by_id = match &node.parent_id {
        Some(parent_id) => Some(*ids.get(parent_id).ok_or_else(|| BuildError::MissingParent {
            id: node.id.clone(),
            description: node.description.clone(),
            parent_id: parent_id.clone(),
        })?),
        None => None,
    };
    let by_node = match &node.parent_node {
        Some(parent_node) => Some(
            external
                .get(&(Arc::as_ptr(parent_node) as usize))
                .ok_or_else(|| BuildError::MissingParentNode {
                    id: node.id.clone(),
                    description: node.description.clone(),
                })?
                .1,
        ),
        None => None,
    };

    match (by_id, by_node) {
        (None, None) => Ok(root),
        (Some(parent), None) => Ok(parent),
        (None, Some(parent)) => Ok(parent),
        (Some(a), Some(b)) if a == b => Ok(b),
        (Some(_), Some(_)) => Err(BuildError::ParentMismatch {
            id: node.id.clone(),
            description: node.description.clone(),
            parent_id: node.parent_id.clone().unwrap_or_default(),
            parent_node_id: node
                .parent_node
                .as_ref()
                .map(|n| n.id.clone())
                .unwrap_or_default(),
        }),
    }
}

// ============================================================================
// Resolution
// ============================================================================

impl<Q, R, C, V> Tree<Q, R, C, V> {
    pub(crate) fn node(&self, id: NodeId) -> &TreeNode<Q, R, C, V> {
        &self.arena[id.0]
    }

    pub(crate) fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> &TreeNode<Q, R, C, V> {
        self.node(self.root)
    }

    /// O(1) lookup by ID. Only nodes reachable from the root with a
    /// non-empty ID can be found.
    pub fn find_node(&self, id: &str) -> Option<&TreeNode<Q, R, C, V>> {
        self.id_to_node.get(id).map(|&at| self.node(at))
    }

    /// Resolve an ID to its root-to-node path.
    ///
    /// Panics on an empty or unknown ID: this entry point is for
    /// statically-known, generated call sites where a miss is a
    /// programming mistake. Use [`find_path`](Tree::find_path) for
    /// graceful resolution.
    pub fn get_path(&self, id: &str) -> NodePath<'_, Q, R, C, V> {
        if id.is_empty() {
            panic!("id is empty");
        }
        match self.id_to_node.get(id) {
            Some(&at) => self.path_to(at),
            None => panic!("node not found: {id}"),
        }
    }

    /// Resolve a caller-held node reference to its root-to-node path,
    /// through the identity table recorded at build time, falling back to
    /// lookup by the node's ID.
    ///
    /// Panics when the node is unknown to this tree;
    /// [`run_node`](Tree::run_node) reports instead of panicking.
    pub fn get_node_path(&self, node: &Arc<Node<Q, R, C, V>>) -> NodePath<'_, Q, R, C, V> {
        match self.resolve_node(node) {
            Some(at) => self.path_to(at),
            None => panic!("node not found: {}", node.id),
        }
    }

    /// Resolve a name chain (root ID first) to a path. Failures are
    /// descriptive and non-fatal, naming the partial path walked so far.
    pub fn find_path(&self, names: &[&str]) -> Result<NodePath<'_, Q, R, C, V>, ResolveError> {
        let Some((first, rest)) = names.split_first() else {
            return Err(ResolveError::InvalidPath);
        };
        let root = self.node(self.root);
        if root.id != *first {
            return Err(ResolveError::RootMismatch {
                expected: (*first).to_string(),
                actual: root.id.clone(),
            });
        }

        let mut path = vec![self.root];
        let mut at = self.root;
        for (i, name) in rest.iter().enumerate() {
            let found = self
                .node(at)
                .children
                .iter()
                .find(|&&child| self.node(child).id == *name);
            match found {
                Some(&child) => {
                    path.push(child);
                    at = child;
                }
                None => return Err(ResolveError::CaseNotFound(names[..i + 1].join("-"))),
            }
        }
        Ok(NodePath {
            tree: self,
            nodes: path,
        })
    }

    fn resolve_node(&self, node: &Arc<Node<Q, R, C, V>>) -> Option<NodeId> {
        self.external
            .get(&(Arc::as_ptr(node) as usize))
            .map(|entry| entry.1)
            .or_else(|| self.id_to_node.get(&node.id).copied())
    }

    fn path_to(&self, node: NodeId) -> NodePath<'_, Q, R, C, V> {
        let mut reversed = Vec::new();
        let mut at = node;
        while at != self.root {
            reversed.push(at);
            match self.parent[at.0] {
                Some(parent) => at = parent,
                None => panic!("missing parent: {}", self.node(at).id),
            }
        }
        reversed.push(self.root);
        reversed.reverse();
        NodePath {
            tree: self,
            nodes: reversed,
        }
    }

    /// All case paths (nodes defining an assertion), preorder.
    pub(crate) fn all_case_paths(&self) -> Vec<NodePath<'_, Q, R, C, V>> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.collect_cases(self.root, &mut prefix, &mut out);
        out
    }

    fn collect_cases<'t>(
        &'t self,
        at: NodeId,
        prefix: &mut Vec<NodeId>,
        out: &mut Vec<NodePath<'t, Q, R, C, V>>,
    ) {
        prefix.push(at);
        if self.node(at).is_case() {
            out.push(NodePath {
                tree: self,
                nodes: prefix.clone(),
            });
        }
        for &child in &self.node(at).children {
            self.collect_cases(child, prefix, out);
        }
        prefix.pop();
    }

    fn path_tags(&self, path: &NodePath<'_, Q, R, C, V>) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for &at in &path.nodes {
            for tag in &self.node(at).tags {
                if !tags.contains(tag) {
                    tags.push(tag.clone());
                }
            }
        }
        tags
    }
}

// ============================================================================
// Execution entry points
// ============================================================================

impl<Q, R, C, V> Tree<Q, R, C, V>
where
    Q: Default,
    C: TestContext,
    V: Default + Debug,
{
    /// Run every case in the tree, each as a named sub-test of `t` using
    /// the `/`-joined ID path.
    pub fn run(&self, t: &mut dyn Reporter) {
        self.run_with_config(t, &RunConfig::default());
    }

    /// [`run`](Tree::run) honoring a path filter, list mode, and the
    /// `CASETREE_TAG_FILTER` tag filter.
    pub fn run_with_config(&self, t: &mut dyn Reporter, config: &RunConfig) {
        for path in self.all_case_paths() {
            let name = path.names().join("/");
            if !config.matches(&name) {
                continue;
            }
            if config.list {
                t.log(&name);
                continue;
            }
            let tags = self.path_tags(&path);
            let tag_refs: Vec<&str> = tags.iter().map(String::as_str).collect();
            if !check_tags(&tag_refs) {
                t.run(&name, &mut |t| t.skip("excluded by tag filter"));
                continue;
            }
            t.run(&name, &mut |t| path.run(t));
        }
    }

    /// Run the single case identified by a caller-held node reference.
    /// An unknown node is reported through `t`, not panicked.
    pub fn run_node(&self, t: &mut dyn Reporter, node: &Arc<Node<Q, R, C, V>>) {
        match self.resolve_node(node) {
            Some(at) => self.path_to(at).run(t),
            None => t.error(&ResolveError::NodeNotFound(node.id.clone()).to_string()),
        }
    }

    /// Run the case identified by a name chain. Resolution failures are
    /// reported through `t`; sibling runs are unaffected.
    pub fn run_path(&self, t: &mut dyn Reporter, names: &[&str]) {
        match self.find_path(names) {
            Ok(path) => path.run(t),
            Err(err) => t.error(&err.to_string()),
        }
    }

    /// Run the case identified by a name chain against one forced variant,
    /// inline (no variant sub-grouping).
    pub fn run_path_variant(&self, t: &mut dyn Reporter, names: &[&str], variant: V) {
        match self.find_path(names) {
            Ok(path) => path.run_with_variants(t, std::slice::from_ref(&variant)),
            Err(err) => t.error(&err.to_string()),
        }
    }
}
