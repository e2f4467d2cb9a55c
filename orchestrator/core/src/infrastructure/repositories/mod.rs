// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the [`WorkflowRepository`] port.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Locate and load workflow templates for include and
//!   translate roles
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **LocalWorkflowRepository** - directory holding `workflows/*.yaml`
//! - **InMemoryWorkflowRepository** - name → YAML source map, for tests and
//!   embedding; clones share storage
//!
//! Both hand out identifiers of the form `workflows/<name>`.

pub mod local;

pub use local::LocalWorkflowRepository;

use crate::domain::repository::{LoadedSubworkflow, RepositoryError, WorkflowRepository};
use crate::infrastructure::workflow_parser::WorkflowParser;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const WORKFLOWS_DIR: &str = "workflows";

/// Fully qualified identifier of the workflow named by `expr`.
///
/// Already qualified identifiers and a trailing `.yaml` are tolerated.
pub fn workflow_identifier(expr: &str) -> String {
    format!("{}/{}", WORKFLOWS_DIR, workflow_name(expr))
}

/// Bare workflow name of an identifier or include expression.
pub fn workflow_name(identifier: &str) -> &str {
    let trimmed = identifier.trim();
    let name = trimmed
        .strip_prefix(WORKFLOWS_DIR)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(trimmed);
    name.strip_suffix(".yaml").unwrap_or(name)
}

#[derive(Clone, Default)]
pub struct InMemoryWorkflowRepository {
    workflows: Arc<RwLock<BTreeMap<String, String>>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workflow(self, name: impl Into<String>, yaml: impl Into<String>) -> Self {
        self.insert(name, yaml);
        self
    }

    /// Store (or replace) the source of workflow `name`.
    pub fn insert(&self, name: impl Into<String>, yaml: impl Into<String>) {
        self.workflows.write().insert(name.into(), yaml.into());
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.workflows.write().remove(name)
    }

    pub fn len(&self) -> usize {
        self.workflows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.read().is_empty()
    }
}

impl std::fmt::Debug for InMemoryWorkflowRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryWorkflowRepository")
            .field("workflows", &self.workflows.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl WorkflowRepository for InMemoryWorkflowRepository {
    fn resolve_subworkflow_template_identifier(&self, expr: &str) -> String {
        workflow_identifier(expr)
    }

    fn load_subworkflow(
        &self,
        identifier: &str,
        requesting_path: &str,
    ) -> Result<LoadedSubworkflow, RepositoryError> {
        let name = workflow_name(identifier);
        let source = self
            .workflows
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(identifier.to_string()))?;

        let template = WorkflowParser::parse_yaml(&source).map_err(|e| RepositoryError::Parse {
            identifier: identifier.to_string(),
            reason: e.to_string(),
        })?;
        let root_name = template.name();
        if !root_name.contains("{{") && root_name != name {
            return Err(RepositoryError::Parse {
                identifier: identifier.to_string(),
                reason: format!("workflow name '{}' does not match '{}'", root_name, name),
            });
        }

        debug!(workflow = %identifier, role = %requesting_path, "loaded subworkflow from memory");
        Ok(LoadedSubworkflow {
            tree: template.tree,
            repository: Arc::new(self.clone()),
        })
    }

    fn list_workflows(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self.workflows.read().keys().cloned().collect())
    }

    fn has_workflow(&self, name: &str) -> bool {
        self.workflows.read().contains_key(workflow_name(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers() {
        assert_eq!(workflow_identifier("readout"), "workflows/readout");
        assert_eq!(workflow_identifier("workflows/readout"), "workflows/readout");
        assert_eq!(workflow_identifier(" readout.yaml "), "workflows/readout");
        assert_eq!(workflow_name("workflows/readout"), "readout");
        assert_eq!(workflow_name("workflowsX"), "workflowsX");
    }

    #[test]
    fn test_in_memory_load() {
        let repo = InMemoryWorkflowRepository::new()
            .with_workflow("sub", "name: sub\nroles:\n  - name: t\n    task:\n      load: x\n");
        assert!(repo.has_workflow("sub"));
        assert!(repo.has_workflow("workflows/sub"));
        assert_eq!(repo.list_workflows().unwrap(), vec!["sub".to_string()]);

        let id = repo.resolve_subworkflow_template_identifier("sub");
        let loaded = repo.load_subworkflow(&id, "root.inc").unwrap();
        assert_eq!(loaded.tree.paths(), vec!["sub", "sub.t"]);
        assert!(loaded.repository.has_workflow("sub"));
    }

    #[test]
    fn test_in_memory_errors() {
        let repo = InMemoryWorkflowRepository::new()
            .with_workflow("broken", "name: [")
            .with_workflow("renamed", "name: other\nroles: []\n");

        assert!(matches!(
            repo.load_subworkflow("workflows/missing", "r"),
            Err(RepositoryError::NotFound(_))
        ));
        assert!(matches!(
            repo.load_subworkflow("workflows/broken", "r"),
            Err(RepositoryError::Parse { .. })
        ));
        assert!(matches!(
            repo.load_subworkflow("workflows/renamed", "r"),
            Err(RepositoryError::Parse { .. })
        ));
    }

    #[test]
    fn test_clones_share_storage() {
        let repo = InMemoryWorkflowRepository::new();
        let clone = repo.clone();
        clone.insert("late", "name: late\nroles: []\n");
        assert!(repo.has_workflow("late"));
        assert_eq!(repo.len(), 1);
        assert!(repo.remove("late").is_some());
        assert!(clone.is_empty());
    }
}
