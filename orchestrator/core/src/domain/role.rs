// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Role Nodes
//!
//! A role is one node of an environment's control tree. Every variant
//! shares the same base (identity, parent handle, State/Status cells,
//! variable layers, constraints, channels); the variant-specific payload
//! lives in [`RoleKind`].
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Aggregate Root:** [`RoleTree`](crate::domain::role_tree::RoleTree)
//! - **Ownership:** children are owned top-down through the tree arena;
//!   `parent` is a non-owning [`RoleId`] handle used for lookups only.

use crate::domain::aggregation::{SafeState, SafeStatus};
use crate::domain::channel::{Inbound, Outbound};
use crate::domain::constraint::Constraints;
use crate::domain::state::State;
use crate::domain::status::Status;
use crate::domain::task::{TaskRef, Traits};
use crate::domain::var_map::VarMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of a role inside its tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleId(pub(crate) usize);

impl RoleId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Variants
// ============================================================================

/// Range specification of an iterator role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IteratorRange {
    /// Expression evaluating to a JSON list of strings.
    Expr { range: String, var: String },
    /// Inclusive numeric bounds.
    For { begin: String, end: String, var: String },
}

impl IteratorRange {
    pub fn var(&self) -> &str {
        match self {
            IteratorRange::Expr { var, .. } | IteratorRange::For { var, .. } => var,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IteratorRole {
    pub range: IteratorRange,
    /// Detached template subtree, copied once per range value.
    pub template: RoleId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRole {
    /// Task class identifier, resolved against the repository after stage 4.
    pub load: String,
    pub traits: Traits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRole {
    pub func: String,
    pub return_var: String,
    pub traits: Traits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeRole {
    pub include: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateRole {
    pub translate: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoleKind {
    Aggregator,
    Iterator(IteratorRole),
    Task(TaskRole),
    Call(CallRole),
    Include(IncludeRole),
    Translate(TranslateRole),
}

impl RoleKind {
    pub fn label(&self) -> &'static str {
        match self {
            RoleKind::Aggregator => "aggregator",
            RoleKind::Iterator(_) => "iterator",
            RoleKind::Task(_) => "task",
            RoleKind::Call(_) => "call",
            RoleKind::Include(_) => "include",
            RoleKind::Translate(_) => "translate",
        }
    }

    /// Task and Call roles are the authoritative sources of State/Status.
    pub fn is_leaf(&self) -> bool {
        matches!(self, RoleKind::Task(_) | RoleKind::Call(_))
    }

    pub fn traits(&self) -> Option<&Traits> {
        match self {
            RoleKind::Task(t) => Some(&t.traits),
            RoleKind::Call(c) => Some(&c.traits),
            _ => None,
        }
    }
}

// ============================================================================
// Node
// ============================================================================

/// One role of the tree.
#[derive(Debug)]
pub struct RoleNode {
    pub name: String,
    /// Templated; anything but `false` (after trimming) means enabled.
    pub enabled: String,
    pub kind: RoleKind,
    pub defaults: VarMap,
    pub vars: VarMap,
    pub user_vars: VarMap,
    /// Per-instance bindings, e.g. an iterator's range variable.
    pub locals: VarMap,
    pub constraints: Constraints,
    pub bind: Vec<Inbound>,
    pub connect: Vec<Outbound>,
    pub(crate) parent: Option<RoleId>,
    pub(crate) children: Vec<RoleId>,
    pub(crate) state: SafeState,
    pub(crate) status: SafeStatus,
    pub(crate) task: RwLock<Option<TaskRef>>,
}

impl RoleNode {
    pub fn new(name: impl Into<String>, kind: RoleKind) -> Self {
        let status = match kind {
            RoleKind::Call(_) => Status::Active,
            _ => Status::Inactive,
        };
        Self {
            name: name.into(),
            enabled: String::new(),
            kind,
            defaults: VarMap::new(),
            vars: VarMap::new(),
            user_vars: VarMap::new(),
            locals: VarMap::new(),
            constraints: Constraints::new(),
            bind: Vec::new(),
            connect: Vec::new(),
            parent: None,
            children: Vec::new(),
            state: SafeState::new(State::Standby),
            status: SafeStatus::new(status),
            task: RwLock::new(None),
        }
    }

    pub fn aggregator(name: impl Into<String>) -> Self {
        Self::new(name, RoleKind::Aggregator)
    }

    pub fn task(name: impl Into<String>, load: impl Into<String>, traits: Traits) -> Self {
        Self::new(
            name,
            RoleKind::Task(TaskRole {
                load: load.into(),
                traits,
            }),
        )
    }

    pub fn call(name: impl Into<String>, func: impl Into<String>, traits: Traits) -> Self {
        Self::new(
            name,
            RoleKind::Call(CallRole {
                func: func.into(),
                return_var: String::new(),
                traits,
            }),
        )
    }

    pub fn include(name: impl Into<String>, include: impl Into<String>) -> Self {
        Self::new(
            name,
            RoleKind::Include(IncludeRole {
                include: include.into(),
            }),
        )
    }

    pub fn translate(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(
            name,
            RoleKind::Translate(TranslateRole {
                translate: command.into(),
            }),
        )
    }

    pub fn with_enabled(mut self, enabled: impl Into<String>) -> Self {
        self.enabled = enabled.into();
        self
    }

    pub fn with_state(self, state: State) -> Self {
        self.state.set(state);
        self
    }

    pub fn with_status(self, status: Status) -> Self {
        self.status.set(status);
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.enabled.trim().eq_ignore_ascii_case("false")
    }

    /// Leaves honour their declared flag; every composite counts as critical.
    pub fn is_critical(&self) -> bool {
        self.kind.traits().map(|t| t.critical).unwrap_or(true)
    }

    pub fn is_leaf(&self) -> bool {
        self.kind.is_leaf()
    }

    pub fn parent(&self) -> Option<RoleId> {
        self.parent
    }

    /// Raw children, without iterator flattening.
    pub fn children(&self) -> &[RoleId] {
        &self.children
    }

    pub fn state(&self) -> State {
        self.state.get()
    }

    pub fn status(&self) -> Status {
        self.status.get()
    }

    pub fn assigned_task(&self) -> Option<TaskRef> {
        self.task.read().clone()
    }

    pub fn task_class(&self) -> Option<&str> {
        match &self.kind {
            RoleKind::Task(t) => Some(t.load.as_str()),
            _ => None,
        }
    }

    /// Copy of this node's own data with fresh cells and no links.
    ///
    /// Task roles restart from STANDBY/INACTIVE without a task; every other
    /// variant carries its current cell values over.
    pub(crate) fn detached_copy(&self) -> RoleNode {
        let (state, status) = match self.kind {
            RoleKind::Task(_) => (State::Standby, Status::Inactive),
            _ => (self.state.get(), self.status.get()),
        };
        RoleNode {
            name: self.name.clone(),
            enabled: self.enabled.clone(),
            kind: self.kind.clone(),
            defaults: self.defaults.clone(),
            vars: self.vars.clone(),
            user_vars: self.user_vars.clone(),
            locals: self.locals.clone(),
            constraints: self.constraints.clone(),
            bind: self.bind.clone(),
            connect: self.connect.clone(),
            parent: None,
            children: Vec::new(),
            state: SafeState::new(state),
            status: SafeStatus::new(status),
            task: RwLock::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_cells() {
        let task = RoleNode::task("t", "readout", Traits::default());
        assert_eq!(task.state(), State::Standby);
        assert_eq!(task.status(), Status::Inactive);

        let call = RoleNode::call("c", "odc.Configure()", Traits::default());
        assert_eq!(call.status(), Status::Active);
    }

    #[test]
    fn test_enabled_parsing() {
        assert!(RoleNode::aggregator("a").is_enabled());
        assert!(RoleNode::aggregator("a").with_enabled("true").is_enabled());
        assert!(!RoleNode::aggregator("a").with_enabled(" false ").is_enabled());
        assert!(!RoleNode::aggregator("a").with_enabled("FALSE").is_enabled());
    }

    #[test]
    fn test_critical_flag() {
        let traits = Traits::with_defaults(None, None, None, Some(false));
        assert!(!RoleNode::task("t", "x", traits).is_critical());
        assert!(RoleNode::aggregator("a").is_critical());
        assert!(RoleNode::include("i", "sub").is_critical());
    }

    #[test]
    fn test_detached_copy_resets_task_cells() {
        let node = RoleNode::task("t", "x", Traits::default()).with_state(State::Running);
        *node.task.write() = Some(TaskRef("abc".into()));
        let copy = node.detached_copy();
        assert_eq!(copy.state(), State::Standby);
        assert_eq!(copy.status(), Status::Inactive);
        assert!(copy.assigned_task().is_none());

        let agg = RoleNode::aggregator("a").with_state(State::Configured);
        assert_eq!(agg.detached_copy().state(), State::Configured);
    }
}
