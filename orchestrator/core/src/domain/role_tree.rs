// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Role Tree
//!
//! Arena holding every [`RoleNode`] of one environment. Nodes refer to
//! each other through [`RoleId`] handles: `children` lists express
//! ownership, `parent` is a lookup-only back reference filled in by
//! [`RoleTree::link_children_to_parents`].
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Aggregate Root:** RoleTree
//! - **Lifecycle:** built and resolved single-threaded, then shared behind
//!   an `Arc` while leaf updates arrive concurrently (see
//!   [`aggregation`](crate::domain::aggregation)).
//!
//! # Structural invariants
//!
//! 1. Each reachable node has exactly one parent and the graph is acyclic.
//! 2. `path(n) = path(parent) + "." + name(n)`; the root path is its name.
//! 3. Variable layers of a node only add or override ancestor keys.

use crate::domain::channel::{Inbound, Outbound};
use crate::domain::constraint::Constraints;
use crate::domain::environment::EnvironmentContext;
use crate::domain::events::EventSink;
use crate::domain::role::{RoleId, RoleKind, RoleNode};
use crate::domain::state::State;
use crate::domain::status::Status;
use crate::domain::task::{TaskDescriptor, TaskRef};
use crate::domain::var_map::{LayeredVarMap, VarMap};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub const PATH_SEPARATOR: &str = ".";

pub struct RoleTree {
    nodes: Vec<RoleNode>,
    root: RoleId,
    context: EnvironmentContext,
    pub(crate) sink: Option<Arc<dyn EventSink>>,
    pub(crate) root_state: watch::Sender<State>,
    pub(crate) root_status: watch::Sender<Status>,
}

impl fmt::Debug for RoleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleTree")
            .field("root", &self.get_path(self.root))
            .field("nodes", &self.nodes.len())
            .field("environment_id", &self.context.environment_id)
            .finish()
    }
}

impl RoleTree {
    pub fn new(root: RoleNode) -> Self {
        let mut tree = Self::empty(EnvironmentContext::default());
        tree.root = tree.push(root);
        tree.root_state.send_replace(tree.nodes[0].state());
        tree.root_status.send_replace(tree.nodes[0].status());
        tree
    }

    fn empty(context: EnvironmentContext) -> Self {
        let (root_state, _) = watch::channel(State::Standby);
        let (root_status, _) = watch::channel(Status::Inactive);
        Self {
            nodes: Vec::new(),
            root: RoleId(0),
            context,
            sink: None,
            root_state,
            root_status,
        }
    }

    fn push(&mut self, node: RoleNode) -> RoleId {
        let id = RoleId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn root(&self) -> RoleId {
        self.root
    }

    pub fn node(&self, id: RoleId) -> &RoleNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: RoleId) -> &mut RoleNode {
        &mut self.nodes[id.0]
    }

    pub fn get(&self, id: RoleId) -> Option<&RoleNode> {
        self.nodes.get(id.0)
    }

    /// Number of arena slots, including detached templates and pruned nodes.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn context(&self) -> &EnvironmentContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut EnvironmentContext {
        &mut self.context
    }

    pub fn set_context(&mut self, context: EnvironmentContext) {
        self.context = context;
    }

    pub fn set_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = Some(sink);
    }

    pub fn subscribe_state(&self) -> watch::Receiver<State> {
        self.root_state.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.root_status.subscribe()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Append `node` as the last child of `parent`.
    pub fn add_child(&mut self, parent: RoleId, mut node: RoleNode) -> RoleId {
        node.parent = Some(parent);
        let id = self.push(node);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Store a node that is not (yet) part of the tree, e.g. an iterator
    /// template.
    pub fn add_detached(&mut self, node: RoleNode) -> RoleId {
        self.push(node)
    }

    pub fn set_parent(&mut self, child: RoleId, parent: RoleId) {
        self.nodes[child.0].parent = Some(parent);
    }

    pub(crate) fn set_children(&mut self, id: RoleId, children: Vec<RoleId>) {
        self.nodes[id.0].children = children;
    }

    /// One top-down pass setting every reachable node's parent handle.
    pub fn link_children_to_parents(&mut self) {
        let mut stack = vec![self.root];
        self.nodes[self.root.0].parent = None;
        while let Some(id) = stack.pop() {
            let children = self.nodes[id.0].children.clone();
            for child in children {
                self.nodes[child.0].parent = Some(id);
                stack.push(child);
            }
        }
    }

    /// Deep copy of `src` (and its iterator templates) within this arena.
    pub fn copy_subtree(&mut self, src: RoleId, parent: Option<RoleId>) -> RoleId {
        let mut node = self.nodes[src.0].detached_copy();
        node.parent = parent;
        let children = self.nodes[src.0].children.clone();
        let id = self.push(node);

        if let RoleKind::Iterator(it) = &self.nodes[src.0].kind {
            let template = it.template;
            let copied = self.copy_subtree(template, None);
            if let RoleKind::Iterator(it) = &mut self.nodes[id.0].kind {
                it.template = copied;
            }
        }
        for child in children {
            let copied = self.copy_subtree(child, Some(id));
            self.nodes[id.0].children.push(copied);
        }
        id
    }

    /// Deep copy of `src` from another tree into this arena.
    pub fn import_subtree(&mut self, source: &RoleTree, src: RoleId, parent: Option<RoleId>) -> RoleId {
        let src_node = source.node(src);
        let mut node = src_node.detached_copy();
        node.parent = parent;
        let id = self.push(node);

        if let RoleKind::Iterator(it) = &src_node.kind {
            let copied = self.import_subtree(source, it.template, None);
            if let RoleKind::Iterator(it) = &mut self.nodes[id.0].kind {
                it.template = copied;
            }
        }
        for &child in &src_node.children {
            let copied = self.import_subtree(source, child, Some(id));
            self.nodes[id.0].children.push(copied);
        }
        id
    }

    /// Full deep copy with fresh cells and independent variable layers.
    ///
    /// Only nodes reachable from the root are copied; the event sink is not
    /// carried over.
    pub fn copy(&self) -> RoleTree {
        let mut tree = RoleTree::empty(self.context.clone());
        tree.root = tree.import_subtree(self, self.root, None);
        let root = tree.node(tree.root);
        tree.root_state.send_replace(root.state());
        tree.root_status.send_replace(root.status());
        tree
    }

    // ========================================================================
    // Role contract
    // ========================================================================

    /// Direct children with iterator nodes replaced by their expansion.
    pub fn get_roles(&self, id: RoleId) -> Vec<RoleId> {
        let mut roles = Vec::with_capacity(self.nodes[id.0].children.len());
        for &child in &self.nodes[id.0].children {
            match &self.nodes[child.0].kind {
                RoleKind::Iterator(_) => roles.extend(self.get_roles(child)),
                _ => roles.push(child),
            }
        }
        roles
    }

    pub fn get_parent_role(&self, id: RoleId) -> Option<RoleId> {
        self.nodes[id.0].parent
    }

    pub fn get_name(&self, id: RoleId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn get_path(&self, id: RoleId) -> String {
        let mut names = Vec::new();
        for ancestor in self.ancestry(id) {
            names.push(self.nodes[ancestor.0].name.as_str());
        }
        names.reverse();
        names.join(PATH_SEPARATOR)
    }

    pub fn get_state(&self, id: RoleId) -> State {
        self.nodes[id.0].state()
    }

    pub fn get_status(&self, id: RoleId) -> Status {
        self.nodes[id.0].status()
    }

    pub fn get_root(&self, id: RoleId) -> RoleId {
        self.ancestry(id).last().unwrap_or(id)
    }

    /// `id` followed by each of its ancestors, bounded by the arena size so
    /// a malformed parent chain cannot loop forever.
    fn ancestry(&self, id: RoleId) -> impl Iterator<Item = RoleId> + '_ {
        let mut next = Some(id);
        let mut remaining = self.nodes.len();
        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let current = next?;
            next = self.nodes[current.0].parent;
            Some(current)
        })
    }

    pub fn set_task(&self, id: RoleId, task: TaskRef) {
        *self.nodes[id.0].task.write() = Some(task);
    }

    pub fn clear_task(&self, id: RoleId) -> Option<TaskRef> {
        self.nodes[id.0].task.write().take()
    }

    /// Own constraints merged over the whole ancestor chain.
    pub fn get_constraints(&self, id: RoleId) -> Constraints {
        let own = &self.nodes[id.0].constraints;
        match self.nodes[id.0].parent {
            Some(parent) => own.merge_parent(&self.get_constraints(parent)),
            None => own.clone(),
        }
    }

    /// Ancestors' outbound channels first, then this role's own.
    pub fn collect_outbound_channels(&self, id: RoleId) -> Vec<Outbound> {
        let mut channels = match self.nodes[id.0].parent {
            Some(parent) => self.collect_outbound_channels(parent),
            None => Vec::new(),
        };
        channels.extend(self.nodes[id.0].connect.iter().cloned());
        channels
    }

    /// This role's own inbound channels plus any global inbound channel
    /// declared by an ancestor.
    pub fn collect_inbound_channels(&self, id: RoleId) -> Vec<Inbound> {
        let mut channels: Vec<Inbound> = self.nodes[id.0].bind.clone();
        for ancestor in self.ancestry(id).skip(1) {
            channels.extend(
                self.nodes[ancestor.0]
                    .bind
                    .iter()
                    .filter(|ch| !ch.global.is_empty())
                    .cloned(),
            );
        }
        channels
    }

    /// Descriptors for every enabled Task role under `id` that has no task
    /// assigned yet.
    pub fn generate_task_descriptors(&self, id: RoleId) -> Vec<TaskDescriptor> {
        let mut descriptors = Vec::new();
        self.leaf_walk(id, |leaf, node| {
            if let RoleKind::Task(task) = &node.kind {
                if node.is_enabled() && node.task.read().is_none() {
                    descriptors.push(TaskDescriptor {
                        role: leaf,
                        role_path: self.get_path(leaf),
                        task_class_name: task.load.clone(),
                        constraints: self.get_constraints(leaf),
                    });
                }
            }
        });
        debug!(count = descriptors.len(), root = %self.get_path(id), "generated task descriptors");
        descriptors
    }

    // ========================================================================
    // Variable layers
    // ========================================================================

    fn layer_view<'a>(
        &'a self,
        id: RoleId,
        pick: fn(&RoleNode) -> &VarMap,
        outermost: &'a VarMap,
    ) -> LayeredVarMap<'a> {
        let mut layers: Vec<&'a VarMap> = self.ancestry(id).map(|a| pick(&self.nodes[a.0])).collect();
        layers.push(outermost);
        LayeredVarMap::from_layers(layers)
    }

    pub fn defaults_view(&self, id: RoleId) -> LayeredVarMap<'_> {
        self.layer_view(id, |n| &n.defaults, &self.context.defaults)
    }

    pub fn vars_view(&self, id: RoleId) -> LayeredVarMap<'_> {
        self.layer_view(id, |n| &n.vars, &self.context.vars)
    }

    pub fn user_vars_view(&self, id: RoleId) -> LayeredVarMap<'_> {
        self.layer_view(id, |n| &n.user_vars, &self.context.user_vars)
    }

    /// Every variable visible to `id`, flattened with precedence
    /// Locals > UserVars > Vars > Defaults.
    pub fn consolidated_var_stack(&self, id: RoleId) -> BTreeMap<String, String> {
        let mut stack = self.defaults_view(id).flattened();
        stack.extend(self.vars_view(id).flattened());
        stack.extend(self.user_vars_view(id).flattened());
        for (k, v) in self.nodes[id.0].locals.iter() {
            stack.insert(k.clone(), v.clone());
        }
        stack
    }

    // ========================================================================
    // Traversal & lookup
    // ========================================================================

    /// Pre-order depth-first traversal over `id` and all its descendants.
    pub fn walk<F>(&self, id: RoleId, mut visit: F)
    where
        F: FnMut(RoleId, &RoleNode),
    {
        self.walk_inner(id, &mut visit);
    }

    fn walk_inner<F>(&self, id: RoleId, visit: &mut F)
    where
        F: FnMut(RoleId, &RoleNode),
    {
        visit(id, &self.nodes[id.0]);
        for child in self.get_roles(id) {
            self.walk_inner(child, visit);
        }
    }

    /// Like [`walk`](Self::walk) but only calls `visit` on Task/Call leaves.
    pub fn leaf_walk<F>(&self, id: RoleId, mut visit: F)
    where
        F: FnMut(RoleId, &RoleNode),
    {
        self.walk(id, |rid, node| {
            if node.is_leaf() {
                visit(rid, node);
            }
        });
    }

    /// Every role whose path matches the glob `pattern`.
    pub fn glob_filter(&self, pattern: &str) -> Result<Vec<RoleId>, RoleTreeError> {
        let matcher = globset::GlobBuilder::new(pattern)
            .literal_separator(false)
            .build()
            .map_err(|e| RoleTreeError::InvalidGlob {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?
            .compile_matcher();

        let mut matches = Vec::new();
        self.walk(self.root, |id, _| {
            if matcher.is_match(self.get_path(id)) {
                matches.push(id);
            }
        });
        Ok(matches)
    }

    pub fn find_by_path(&self, path: &str) -> Option<RoleId> {
        let mut found = None;
        self.walk(self.root, |id, _| {
            if found.is_none() && self.get_path(id) == path {
                found = Some(id);
            }
        });
        found
    }

    /// Like [`find_by_path`](Self::find_by_path), failing with
    /// [`RoleTreeError::RoleNotFound`].
    pub fn get_role_by_path(&self, path: &str) -> Result<RoleId, RoleTreeError> {
        self.find_by_path(path)
            .ok_or_else(|| RoleTreeError::RoleNotFound(path.to_string()))
    }

    /// Paths of every reachable role in pre-order.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.walk(self.root, |id, _| paths.push(self.get_path(id)));
        paths
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RoleTreeError {
    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob { pattern: String, reason: String },

    #[error("role not found: {0}")]
    RoleNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constraint::Constraint;
    use crate::domain::role::{IteratorRange, IteratorRole};
    use crate::domain::task::Traits;

    fn task(name: &str) -> RoleNode {
        RoleNode::task(name, format!("class-{}", name), Traits::default())
    }

    fn sample() -> (RoleTree, RoleId, RoleId, RoleId) {
        let mut tree = RoleTree::new(RoleNode::aggregator("root"));
        let root = tree.root();
        let agg = tree.add_child(root, RoleNode::aggregator("agg"));
        let t1 = tree.add_child(agg, task("t1"));
        let t2 = tree.add_child(root, task("t2"));
        (tree, agg, t1, t2)
    }

    #[test]
    fn test_paths() {
        let (tree, agg, t1, t2) = sample();
        assert_eq!(tree.get_path(tree.root()), "root");
        assert_eq!(tree.get_path(agg), "root.agg");
        assert_eq!(tree.get_path(t1), "root.agg.t1");
        assert_eq!(tree.get_path(t2), "root.t2");
        assert_eq!(tree.get_root(t1), tree.root());

        assert_eq!(tree.get_role_by_path("root.agg.t1").unwrap(), t1);
        assert!(matches!(
            tree.get_role_by_path("root.t1"),
            Err(RoleTreeError::RoleNotFound(ref path)) if path == "root.t1"
        ));
    }

    #[test]
    fn test_link_children_to_parents() {
        let (mut tree, agg, t1, _) = sample();
        tree.node_mut(t1).parent = None;
        tree.link_children_to_parents();
        assert_eq!(tree.get_parent_role(t1), Some(agg));
    }

    #[test]
    fn test_constraints_merged_over_ancestors() {
        let (mut tree, agg, t1, _) = sample();
        let root = tree.root();
        tree.node_mut(root).constraints.push(Constraint::equals("zone", "a"));
        tree.node_mut(root).constraints.push(Constraint::equals("os", "linux"));
        tree.node_mut(agg).constraints.push(Constraint::equals("zone", "b"));
        tree.node_mut(t1).constraints.push(Constraint::equals("host", "flp1"));

        let cts = tree.get_constraints(t1);
        let rendered: Vec<_> = cts.iter().map(|c| (c.attribute.as_str(), c.value.as_str())).collect();
        assert_eq!(rendered, vec![("zone", "b"), ("os", "linux"), ("host", "flp1")]);
    }

    #[test]
    fn test_consolidated_var_stack_precedence() {
        let (mut tree, agg, t1, _) = sample();
        let root = tree.root();
        tree.context_mut().defaults.set("env_default", "ctx");
        tree.node_mut(root).defaults.set("a", "root-default");
        tree.node_mut(root).vars.set("a", "root-var");
        tree.node_mut(agg).user_vars.set("b", "agg-user");
        tree.node_mut(t1).defaults.set("b", "t1-default");
        tree.node_mut(t1).locals.set("b", "t1-local");

        let stack = tree.consolidated_var_stack(t1);
        assert_eq!(stack["a"], "root-var");
        assert_eq!(stack["b"], "t1-local");
        assert_eq!(stack["env_default"], "ctx");
        assert_eq!(stack.len(), 3);
    }

    #[test]
    fn test_walkers_and_glob() {
        let (tree, _, t1, t2) = sample();
        let mut all = Vec::new();
        tree.walk(tree.root(), |id, _| all.push(id));
        assert_eq!(all.len(), 4);

        let mut leaves = Vec::new();
        tree.leaf_walk(tree.root(), |id, _| leaves.push(id));
        assert_eq!(leaves, vec![t1, t2]);

        assert_eq!(tree.glob_filter("root.*.t1").unwrap(), vec![t1]);
        assert_eq!(tree.glob_filter("*t?").unwrap(), vec![t1, t2]);
        assert!(matches!(
            tree.glob_filter("root.[").unwrap_err(),
            RoleTreeError::InvalidGlob { .. }
        ));
    }

    #[test]
    fn test_descriptors_skip_deployed_and_disabled() {
        let (mut tree, _, t1, t2) = sample();
        let root = tree.root();
        let t3 = tree.add_child(root, task("t3").with_enabled("false"));
        tree.set_task(t2, TaskRef("task-2".into()));

        let descriptors = tree.generate_task_descriptors(root);
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].role, t1);
        assert_eq!(descriptors[0].task_class_name, "class-t1");
        assert!(descriptors.iter().all(|d| d.role != t3));
    }

    #[test]
    fn test_copy_is_independent() {
        let (tree, _, t1, _) = sample();
        let copy = tree.copy();
        assert_eq!(copy.paths(), tree.paths());

        let copied_t1 = copy.find_by_path("root.agg.t1").unwrap();
        copy.set_task(copied_t1, TaskRef("x".into()));
        assert!(tree.node(t1).assigned_task().is_none());
    }

    #[test]
    fn test_get_roles_flattens_iterators() {
        let mut tree = RoleTree::new(RoleNode::aggregator("root"));
        let root = tree.root();
        let template = tree.add_detached(task("t"));
        let iter = tree.add_child(
            root,
            RoleNode::new(
                "",
                RoleKind::Iterator(IteratorRole {
                    range: IteratorRange::For {
                        begin: "0".into(),
                        end: "1".into(),
                        var: "i".into(),
                    },
                    template,
                }),
            ),
        );
        let a = tree.add_child(iter, task("t-0"));
        let b = tree.add_child(iter, task("t-1"));
        let other = tree.add_child(root, task("other"));
        assert_eq!(tree.get_roles(root), vec![a, b, other]);

        let copy = tree.copy();
        assert_eq!(copy.get_roles(copy.root()).len(), 3);
    }

    #[test]
    fn test_collect_channels() {
        let (mut tree, agg, t1, _) = sample();
        let root = tree.root();
        let outbound: Outbound =
            serde_yaml::from_str("name: up\ntype: push\ntarget: x").unwrap();
        let own: Outbound = serde_yaml::from_str("name: own\ntype: pull\ntarget: y").unwrap();
        tree.node_mut(root).connect.push(outbound);
        tree.node_mut(t1).connect.push(own);
        let names: Vec<_> = tree
            .collect_outbound_channels(t1)
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(names, vec!["up", "own"]);

        let global: Inbound =
            serde_yaml::from_str("name: g\ntype: pub\nglobal: shared").unwrap();
        let local: Inbound = serde_yaml::from_str("name: l\ntype: pub").unwrap();
        tree.node_mut(agg).bind.push(global);
        tree.node_mut(agg).bind.push(local);
        let inbound = tree.collect_inbound_channels(t1);
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].name(), "g");
    }
}
