// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Local workflow repository: a directory with a `workflows/` folder of
//! `<name>.yaml` templates.

use super::{workflow_identifier, workflow_name, WORKFLOWS_DIR};
use crate::domain::repository::{LoadedSubworkflow, RepositoryError, WorkflowRepository};
use crate::infrastructure::workflow_parser::{WorkflowParseError, WorkflowParser};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

pub const TASKS_DIR: &str = "tasks";

#[derive(Debug, Clone)]
pub struct LocalWorkflowRepository {
    root: PathBuf,
    revision: Option<String>,
}

impl LocalWorkflowRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            revision: None,
        }
    }

    /// Tag task class identifiers with `@<revision>`.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        let revision = revision.into();
        self.revision = (!revision.trim().is_empty()).then_some(revision);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn workflow_path(&self, identifier: &str) -> PathBuf {
        self.root
            .join(WORKFLOWS_DIR)
            .join(format!("{}.yaml", workflow_name(identifier)))
    }
}

impl WorkflowRepository for LocalWorkflowRepository {
    fn resolve_subworkflow_template_identifier(&self, expr: &str) -> String {
        workflow_identifier(expr)
    }

    fn load_subworkflow(
        &self,
        identifier: &str,
        requesting_path: &str,
    ) -> Result<LoadedSubworkflow, RepositoryError> {
        let path = self.workflow_path(identifier);
        if !path.is_file() {
            return Err(RepositoryError::NotFound(identifier.to_string()));
        }

        let template = WorkflowParser::parse_file(&path).map_err(|e| match e {
            WorkflowParseError::IoError { error, .. } => RepositoryError::Io {
                identifier: identifier.to_string(),
                reason: error,
            },
            other => RepositoryError::Parse {
                identifier: identifier.to_string(),
                reason: other.to_string(),
            },
        })?;

        debug!(
            workflow = %identifier,
            role = %requesting_path,
            file = %path.display(),
            "loaded subworkflow"
        );
        Ok(LoadedSubworkflow {
            tree: template.tree,
            repository: Arc::new(self.clone()),
        })
    }

    fn resolve_task_class_identifier(&self, load: &str) -> String {
        let load = load.trim();
        let qualified = if load.contains('/') {
            load.to_string()
        } else {
            format!("{}/{}", TASKS_DIR, load)
        };
        match &self.revision {
            Some(rev) if !qualified.contains('@') => format!("{}@{}", qualified, rev),
            _ => qualified,
        }
    }

    fn list_workflows(&self) -> Result<Vec<String>, RepositoryError> {
        let dir = self.root.join(WORKFLOWS_DIR);
        let entries = fs::read_dir(&dir).map_err(|e| RepositoryError::Io {
            identifier: dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn has_workflow(&self, name: &str) -> bool {
        self.workflow_path(name).is_file()
    }
}
