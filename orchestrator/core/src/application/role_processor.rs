// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Role Processor
//!
//! Expands and resolves a parsed role tree in place: every role runs the
//! staged template sequence, iterators are replaced by one copy of their
//! template per range value, include and translate roles splice in the
//! subworkflow they name, and disabled roles are dropped from their
//! parent.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Structural expansion and variable resolution of one
//!   environment's tree
//! - **Collaborators:**
//!   - Domain: RoleTree aggregate, WorkflowRepository, WorkflowTranslator,
//!     ConfigSource
//!   - Infrastructure: template sequence and expression engine
//!
//! # Flow (per role)
//!
//! 1. Run stages 0–5 against the role's variable stack; a role that
//!    resolves as disabled stops after stage 0 and is reported as such
//! 2. Copy locals into vars so children see them
//! 3. Task roles: qualify the task class through the repository
//! 4. Aggregators: expand iterator children, process every child, drop the
//!    disabled ones and reject siblings that resolved to the same name
//! 5. Include/translate roles: load the subworkflow, graft it onto the
//!    host, then continue as an aggregator with the new repository
//!
//! Processing is single-threaded and runs before the tree is shared.

use crate::domain::configuration::ConfigSource;
use crate::domain::repository::{RepositoryError, WorkflowRepository, WorkflowTranslator};
use crate::domain::role::{IteratorRange, RoleId, RoleKind, RoleNode};
use crate::domain::role_tree::RoleTree;
use crate::domain::channel::{Inbound, Outbound};
use crate::domain::constraint::Constraints;
use crate::domain::var_map::VarMap;
use crate::infrastructure::template::fields::{
    wrap_bind_fields, wrap_connect_fields, wrap_constraints, wrap_map_items, wrap_pointer,
};
use crate::infrastructure::template::{
    disabled_role_callback, execute, EvalContext, Fields, RolePaths, Stage, StagedTarget,
    TemplateError,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Outcome of processing one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    Enabled,
    Disabled,
}

#[derive(Debug, thiserror::Error)]
pub enum ExpansionError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("root role {0} resolved as disabled")]
    RootDisabled(String),

    #[error("duplicate role path {path}")]
    DuplicateRole { path: String },
}

// ============================================================================
// Staged target over one node of the arena
// ============================================================================

struct RoleCursor<'t> {
    tree: &'t mut RoleTree,
    id: RoleId,
}

impl StagedTarget for RoleCursor<'_> {
    fn path(&self) -> String {
        self.tree.get_path(self.id)
    }

    fn is_enabled(&self) -> bool {
        self.tree.node(self.id).is_enabled()
    }

    fn stack(&self, stage: Stage) -> BTreeMap<String, String> {
        let defaults = self.tree.defaults_view(self.id);
        let vars = self.tree.vars_view(self.id);
        let user_vars = self.tree.user_vars_view(self.id);

        // a layer is visible in full only once its own stage has run
        let mut stack = if stage > Stage::Defaults {
            defaults.flattened()
        } else {
            defaults.flattened_parent()
        };
        stack.extend(if stage > Stage::Vars {
            vars.flattened()
        } else {
            vars.flattened_parent()
        });
        stack.extend(if stage > Stage::UserVars {
            user_vars.flattened()
        } else {
            user_vars.flattened_parent()
        });
        for (k, v) in self.tree.node(self.id).locals.iter() {
            stack.insert(k.clone(), v.clone());
        }
        stack
    }

    fn role_paths(&self) -> RolePaths {
        let mut ancestors = Vec::new();
        let mut current = self.tree.get_parent_role(self.id);
        while let Some(id) = current {
            ancestors.push(self.tree.get_path(id));
            current = self.tree.get_parent_role(id);
        }
        RolePaths {
            this: self.tree.get_path(self.id),
            ancestors,
        }
    }

    fn fields(&mut self, stage: Stage) -> Fields<'_> {
        let node = self.tree.node_mut(self.id);
        match stage {
            Stage::Enabled => vec![wrap_pointer("enabled", &mut node.enabled)],
            Stage::Defaults => wrap_map_items(&mut node.defaults),
            Stage::Vars => wrap_map_items(&mut node.vars),
            Stage::UserVars => wrap_map_items(&mut node.user_vars),
            Stage::Identity => {
                let mut fields: Fields<'_> = vec![wrap_pointer("name", &mut node.name)];
                match &mut node.kind {
                    RoleKind::Task(task) => {
                        fields.push(wrap_pointer("task.load", &mut task.load));
                        fields.push(wrap_pointer("task.timeout", &mut task.traits.timeout));
                        fields.push(wrap_pointer("task.trigger", &mut task.traits.trigger));
                        fields.push(wrap_pointer("task.await", &mut task.traits.await_));
                    }
                    RoleKind::Call(call) => {
                        fields.push(wrap_pointer("call.func", &mut call.func));
                        fields.push(wrap_pointer("call.return", &mut call.return_var));
                        fields.push(wrap_pointer("call.timeout", &mut call.traits.timeout));
                        fields.push(wrap_pointer("call.trigger", &mut call.traits.trigger));
                        fields.push(wrap_pointer("call.await", &mut call.traits.await_));
                    }
                    RoleKind::Include(include) => {
                        fields.push(wrap_pointer("include", &mut include.include));
                    }
                    RoleKind::Translate(translate) => {
                        fields.push(wrap_pointer("translate", &mut translate.translate));
                    }
                    RoleKind::Aggregator | RoleKind::Iterator(_) => {}
                }
                fields
            }
            Stage::Wiring => {
                let mut fields = wrap_constraints(&mut node.constraints);
                fields.extend(wrap_bind_fields(&mut node.bind));
                fields.extend(wrap_connect_fields(&mut node.connect));
                fields.push(wrap_pointer("enabled", &mut node.enabled));
                fields
            }
        }
    }
}

/// Layers of an include host replaced by a graft, restored if the grafted
/// subtree fails to process.
struct HostSnapshot {
    defaults: VarMap,
    vars: VarMap,
    user_vars: VarMap,
    constraints: Constraints,
    bind: Vec<Inbound>,
    connect: Vec<Outbound>,
    children: Vec<RoleId>,
}

impl HostSnapshot {
    fn take(node: &RoleNode) -> Self {
        Self {
            defaults: node.defaults.clone(),
            vars: node.vars.clone(),
            user_vars: node.user_vars.clone(),
            constraints: node.constraints.clone(),
            bind: node.bind.clone(),
            connect: node.connect.clone(),
            children: node.children().to_vec(),
        }
    }

    fn restore(self, tree: &mut RoleTree, host: RoleId) {
        let node = tree.node_mut(host);
        node.defaults = self.defaults;
        node.vars = self.vars;
        node.user_vars = self.user_vars;
        node.constraints = self.constraints;
        node.bind = self.bind;
        node.connect = self.connect;
        tree.set_children(host, self.children);
    }
}

// ============================================================================
// Processor
// ============================================================================

#[derive(Clone, Copy, Default)]
pub struct RoleProcessor<'a> {
    config: Option<&'a dyn ConfigSource>,
    translator: Option<&'a dyn WorkflowTranslator>,
}

impl<'a> RoleProcessor<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: Option<&'a dyn ConfigSource>) -> Self {
        self.config = config;
        self
    }

    pub fn with_translator(mut self, translator: Option<&'a dyn WorkflowTranslator>) -> Self {
        self.translator = translator;
        self
    }

    /// Process the whole tree starting at its root.
    pub fn process_tree(
        &self,
        tree: &mut RoleTree,
        repository: &Arc<dyn WorkflowRepository>,
    ) -> Result<(), ExpansionError> {
        let root = tree.root();
        match self.process_role(tree, root, repository)? {
            Processed::Enabled => Ok(()),
            Processed::Disabled => Err(ExpansionError::RootDisabled(tree.get_path(root))),
        }
    }

    pub fn process_role(
        &self,
        tree: &mut RoleTree,
        id: RoleId,
        repository: &Arc<dyn WorkflowRepository>,
    ) -> Result<Processed, ExpansionError> {
        if let RoleKind::Iterator(_) = tree.node(id).kind {
            return Err(TemplateError::InvalidIteratorRange {
                path: tree.get_path(id),
                reason: "iterator roles can only be expanded by their parent".to_string(),
            }
            .into());
        }

        if self.resolve(tree, id)? == Processed::Disabled {
            return Ok(Processed::Disabled);
        }

        let kind = tree.node(id).kind.clone();
        match kind {
            RoleKind::Task(task) => {
                self.check_timeout(tree, id)?;
                let qualified = repository.resolve_task_class_identifier(&task.load);
                if let RoleKind::Task(t) = &mut tree.node_mut(id).kind {
                    t.load = qualified;
                }
                Ok(Processed::Enabled)
            }
            RoleKind::Call(_) => {
                self.check_timeout(tree, id)?;
                Ok(Processed::Enabled)
            }
            RoleKind::Aggregator => self.process_children(tree, id, repository),
            RoleKind::Include(include) => {
                let identifier = repository.resolve_subworkflow_template_identifier(&include.include);
                self.splice(tree, id, &identifier, repository)
            }
            RoleKind::Translate(translate) => {
                let translator = self.translator.ok_or_else(|| RepositoryError::Translation {
                    command: translate.translate.clone(),
                    reason: "no translator configured".to_string(),
                })?;
                let name = translator.translate(&translate.translate, repository.as_ref())?;
                let identifier = repository.resolve_subworkflow_template_identifier(&name);
                self.splice(tree, id, &identifier, repository)
            }
            RoleKind::Iterator(_) => Ok(Processed::Enabled),
        }
    }

    /// Run the stage sequence on one role, then publish its locals into vars.
    fn resolve(&self, tree: &mut RoleTree, id: RoleId) -> Result<Processed, TemplateError> {
        let mut cursor = RoleCursor { tree: &mut *tree, id };
        match execute(&mut cursor, self.config, disabled_role_callback) {
            Ok(()) => {}
            Err(TemplateError::RoleDisabled { path }) => {
                debug!(role = %path, "role disabled");
                let node = tree.node_mut(id);
                node.enabled = node.enabled.trim().to_string();
                return Ok(Processed::Disabled);
            }
            Err(e) => return Err(e),
        }

        let node = tree.node_mut(id);
        let locals = node.locals.clone();
        node.vars.extend_from(&locals);
        node.enabled = node.enabled.trim().to_string();
        trace!(role = %tree.get_path(id), "role resolved");
        Ok(Processed::Enabled)
    }

    fn check_timeout(&self, tree: &RoleTree, id: RoleId) -> Result<(), TemplateError> {
        if let Some(traits) = tree.node(id).kind.traits() {
            traits
                .timeout_duration()
                .map_err(|e| TemplateError::InvalidTimeout {
                    path: tree.get_path(id),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Expand iterators, process every child and keep the enabled ones.
    ///
    /// An aggregator whose children all resolve as disabled disables
    /// itself; one without children stays enabled.
    fn process_children(
        &self,
        tree: &mut RoleTree,
        id: RoleId,
        repository: &Arc<dyn WorkflowRepository>,
    ) -> Result<Processed, ExpansionError> {
        let original = tree.node(id).children().to_vec();
        let mut candidates = Vec::with_capacity(original.len());
        for child in original {
            if let RoleKind::Iterator(_) = tree.node(child).kind {
                candidates.extend(self.expand_iterator(tree, id, child)?);
            } else {
                candidates.push(child);
            }
        }

        let mut kept = Vec::with_capacity(candidates.len());
        for &child in &candidates {
            tree.set_parent(child, id);
            if self.process_role(tree, child, repository)? == Processed::Enabled {
                kept.push(child);
            }
        }

        let mut names = BTreeSet::new();
        for &child in &kept {
            if !names.insert(tree.get_name(child)) {
                return Err(ExpansionError::DuplicateRole {
                    path: tree.get_path(child),
                });
            }
        }

        let removed = candidates.len() - kept.len();
        if removed > 0 {
            debug!(role = %tree.get_path(id), removed, "dropped disabled children");
        }
        tree.set_children(id, kept);

        if !candidates.is_empty() && tree.node(id).children().is_empty() {
            debug!(role = %tree.get_path(id), "every child disabled, disabling aggregator");
            tree.node_mut(id).enabled = "false".to_string();
            return Ok(Processed::Disabled);
        }
        Ok(Processed::Enabled)
    }

    /// One copy of the iterator's template per range value, each with the
    /// range variable bound in its locals and parented to `parent`.
    fn expand_iterator(
        &self,
        tree: &mut RoleTree,
        parent: RoleId,
        iterator: RoleId,
    ) -> Result<Vec<RoleId>, ExpansionError> {
        let path = tree.get_path(iterator);
        let (range, template) = match &tree.node(iterator).kind {
            RoleKind::Iterator(it) => (it.range.clone(), it.template),
            _ => return Ok(vec![iterator]),
        };

        let stack = tree.consolidated_var_stack(parent);
        let ctx = EvalContext::new(&stack).with_config(self.config);
        let render = |field: &str, value: &str| {
            ctx.render(value).map_err(|source| TemplateError::Expression {
                path: path.clone(),
                field: field.to_string(),
                source,
            })
        };
        let invalid = |reason: String| TemplateError::InvalidIteratorRange {
            path: path.clone(),
            reason,
        };

        let values: Vec<String> = match &range {
            IteratorRange::Expr { range, .. } => {
                let rendered = render("for.range", range)?;
                serde_json::from_str(&rendered)
                    .map_err(|e| invalid(format!("'{}' is not a JSON list of strings: {}", rendered, e)))?
            }
            IteratorRange::For { begin, end, .. } => {
                let begin = render("for.begin", begin)?;
                let end = render("for.end", end)?;
                let b: i64 = begin
                    .trim()
                    .parse()
                    .map_err(|e| invalid(format!("begin '{}': {}", begin, e)))?;
                let e: i64 = end
                    .trim()
                    .parse()
                    .map_err(|err| invalid(format!("end '{}': {}", end, err)))?;
                (b..=e).map(|i| i.to_string()).collect()
            }
        };

        let var = range.var().to_string();
        let mut expanded = Vec::with_capacity(values.len());
        for value in values {
            let copy = tree.copy_subtree(template, Some(parent));
            tree.node_mut(copy).locals.set(var.clone(), value);
            expanded.push(copy);
        }
        debug!(iterator = %path, count = expanded.len(), "expanded iterator");
        Ok(expanded)
    }

    /// Load `identifier`, graft it onto `host` and process the result.
    ///
    /// The host keeps its name and parent; its own variable layers,
    /// constraints and channels sit beneath those of the subworkflow root.
    /// On failure the host is restored to its pre-graft contents.
    fn splice(
        &self,
        tree: &mut RoleTree,
        host: RoleId,
        identifier: &str,
        repository: &Arc<dyn WorkflowRepository>,
    ) -> Result<Processed, ExpansionError> {
        let host_path = tree.get_path(host);
        let loaded = repository.load_subworkflow(identifier, &host_path)?;
        let snapshot = HostSnapshot::take(tree.node(host));

        let sub = &loaded.tree;
        let sub_root = sub.node(sub.root());
        {
            let node = tree.node_mut(host);
            node.defaults.extend_from(&sub_root.defaults);
            node.vars.extend_from(&sub_root.vars);
            node.user_vars.extend_from(&sub_root.user_vars);
            node.constraints = sub_root.constraints.merge_parent(&node.constraints);
            node.bind.extend(sub_root.bind.iter().cloned());
            node.connect.extend(sub_root.connect.iter().cloned());
        }
        let children: Vec<RoleId> = sub_root
            .children()
            .iter()
            .map(|&child| tree.import_subtree(sub, child, Some(host)))
            .collect();
        tree.set_children(host, children);
        info!(role = %host_path, workflow = %identifier, "grafted subworkflow");

        let result = match self.resolve(tree, host) {
            Ok(Processed::Enabled) => self.process_children(tree, host, &loaded.repository),
            Ok(Processed::Disabled) => Ok(Processed::Disabled),
            Err(e) => Err(e.into()),
        };
        if result.is_err() {
            snapshot.restore(tree, host);
        }
        result
    }
}
