//! Module graph construction.
//!
//! Walks the host model once and produces a [`ModuleTree`]: a flattened copy
//! of its submodule hierarchy that only contains what should be visualized.
//!
//! # Rules
//!
//! - **Exclusion**: a node whose type name contains a banned substring, or
//!   equals one of the excluded type names, is dropped together with its whole
//!   subtree.
//! - **Flattening**: a child whose type name marks it as a transparent
//!   container does not become a node of its own. Its children are spliced
//!   into the parent's child list at the container's position, recursively.
//!
//! The tree is only needed to register observers. Its nodes live in a flat
//! arena and refer to their children by index.

use std::collections::VecDeque;

use log::{debug, trace};

use layertrace_core::identifier::LayerId;

use crate::{config::GraphConfig, host::ModelNode};

/// One kept submodule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerNode {
    id: LayerId,
    type_name: String,
    children: Vec<usize>,
}

impl LayerNode {
    /// Returns the host-issued id of this layer.
    pub fn id(&self) -> LayerId {
        self.id
    }

    /// Returns the fully qualified type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Returns true if no child survived exclusion and flattening.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Flattened submodule tree of a host model.
///
/// Node 0 is always the root.
#[derive(Debug, Clone)]
pub struct ModuleTree {
    nodes: Vec<LayerNode>,
}

impl ModuleTree {
    /// Builds the tree for `root`.
    ///
    /// Returns `None` when the root itself is excluded.
    pub fn build<M: ModelNode>(root: &M, config: &GraphConfig) -> Option<Self> {
        let filter = NodeFilter::new(config);
        let mut tree = Self { nodes: Vec::new() };

        tree.insert(root, &filter)?;

        debug!(nodes = tree.nodes.len(); "Module tree built");
        Some(tree)
    }

    /// Returns the root node.
    pub fn root(&self) -> &LayerNode {
        &self.nodes[0]
    }

    /// Returns the number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; an empty tree is never constructed.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the children of `node` in declaration order.
    pub fn children<'a>(&'a self, node: &'a LayerNode) -> impl Iterator<Item = &'a LayerNode> {
        node.children.iter().map(|&idx| &self.nodes[idx])
    }

    /// Iterates over all nodes breadth-first from the root.
    pub fn bfs(&self) -> impl Iterator<Item = &LayerNode> {
        let mut queue = VecDeque::from([0]);

        std::iter::from_fn(move || {
            let idx = queue.pop_front()?;
            let node = &self.nodes[idx];
            queue.extend(node.children.iter().copied());
            Some(node)
        })
    }

    /// Nodes that receive an observer, in breadth-first order.
    ///
    /// Containers are skipped: their own invocation wraps the invocations of
    /// their children and would report the same data twice.
    pub fn traced(&self) -> impl Iterator<Item = &LayerNode> {
        self.bfs().filter(|node| node.is_leaf())
    }

    fn insert<M: ModelNode>(&mut self, model: &M, filter: &NodeFilter<'_>) -> Option<usize> {
        if filter.is_excluded(model.type_name()) {
            trace!(type_name = model.type_name(); "Excluded subtree");
            return None;
        }

        let idx = self.nodes.len();
        self.nodes.push(LayerNode {
            id: model.layer_id(),
            type_name: model.type_name().to_string(),
            children: Vec::new(),
        });

        let mut children = Vec::new();
        self.collect_children(model, filter, &mut children);
        self.nodes[idx].children = children;

        Some(idx)
    }

    fn collect_children<M: ModelNode>(
        &mut self,
        parent: &M,
        filter: &NodeFilter<'_>,
        out: &mut Vec<usize>,
    ) {
        for child in parent.children() {
            if filter.is_excluded(child.type_name()) {
                trace!(type_name = child.type_name(); "Excluded subtree");
                continue;
            }

            if filter.is_transparent(child.type_name()) {
                trace!(type_name = child.type_name(); "Flattened container");
                self.collect_children(child, filter, out);
            } else if let Some(idx) = self.insert(child, filter) {
                out.push(idx);
            }
        }
    }
}

/// Lowercased view of a [`GraphConfig`].
struct NodeFilter<'a> {
    banned: Vec<String>,
    exclude: &'a [String],
    transparent: Vec<String>,
}

impl<'a> NodeFilter<'a> {
    fn new(config: &'a GraphConfig) -> Self {
        let lowered = |patterns: &[String]| patterns.iter().map(|p| p.to_lowercase()).collect();

        Self {
            banned: lowered(config.banned()),
            exclude: config.exclude(),
            transparent: lowered(config.transparent()),
        }
    }

    fn is_excluded(&self, type_name: &str) -> bool {
        let lowered = type_name.to_lowercase();
        self.banned.iter().any(|p| lowered.contains(p.as_str()))
            || self.exclude.iter().any(|name| name == type_name)
    }

    fn is_transparent(&self, type_name: &str) -> bool {
        let lowered = type_name.to_lowercase();
        self.transparent.iter().any(|p| lowered.contains(p.as_str()))
    }
}
