// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Collaborator Interfaces
//!
//! Contracts the role tree needs from the outside world while it is being
//! expanded. Interfaces live in the domain layer; implementations live in
//! `crate::infrastructure::repositories` and `crate::infrastructure::translator`.
//!
//! | Trait | Used by | Implementations |
//! |-------|---------|----------------|
//! | `WorkflowRepository` | include/translate splicing, task class lookup | `LocalWorkflowRepository`, `InMemoryWorkflowRepository` |
//! | `WorkflowTranslator` | translate roles | `HashingTranslator` |
//!
//! Both are synchronous: expansion of one environment is single-threaded
//! and finishes before any leaf update is accepted.

use crate::domain::role_tree::RoleTree;
use sha1::{Digest, Sha1};
use std::sync::Arc;

/// A subworkflow loaded on behalf of an include role.
pub struct LoadedSubworkflow {
    /// Unresolved template tree of the subworkflow; its root is grafted
    /// onto the requesting role.
    pub tree: RoleTree,
    /// Repository context for includes nested inside the subworkflow.
    pub repository: Arc<dyn WorkflowRepository>,
}

impl std::fmt::Debug for LoadedSubworkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedSubworkflow")
            .field("tree", &self.tree)
            .finish_non_exhaustive()
    }
}

/// Source of workflow templates and task classes.
pub trait WorkflowRepository: Send + Sync {
    /// Turn a short include expression (e.g. `readout-dataflow`) into a
    /// fully qualified template identifier.
    fn resolve_subworkflow_template_identifier(&self, expr: &str) -> String;

    /// Load the template named by `identifier` for the role at
    /// `requesting_path`.
    fn load_subworkflow(
        &self,
        identifier: &str,
        requesting_path: &str,
    ) -> Result<LoadedSubworkflow, RepositoryError>;

    /// Fully qualified task class identifier for a `load:` value.
    fn resolve_task_class_identifier(&self, load: &str) -> String {
        load.to_string()
    }

    /// Names of every workflow template the repository holds.
    fn list_workflows(&self) -> Result<Vec<String>, RepositoryError>;

    /// Whether a workflow template with this name exists.
    fn has_workflow(&self, name: &str) -> bool {
        self.list_workflows()
            .map(|names| names.iter().any(|n| n == name))
            .unwrap_or(false)
    }
}

/// External step turning a translate role's command into a workflow
/// template the repository can load.
pub trait WorkflowTranslator: Send + Sync {
    fn translate(
        &self,
        command: &str,
        repository: &dyn WorkflowRepository,
    ) -> Result<String, RepositoryError>;
}

/// Name of the workflow generated for a translated command.
pub fn jit_workflow_name(command: &str) -> String {
    let digest = Sha1::digest(command.as_bytes());
    format!("jit-{}", hex::encode(digest))
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("workflow template '{0}' not found")]
    NotFound(String),

    #[error("failed to read workflow template '{identifier}': {reason}")]
    Io { identifier: String, reason: String },

    #[error("failed to parse workflow template '{identifier}': {reason}")]
    Parse { identifier: String, reason: String },

    #[error("translation of '{command}' failed: {reason}")]
    Translation { command: String, reason: String },
}
