// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Translator for `translate` roles.
//!
//! A translated command is addressed by a content hash (`jit-<sha1>`). If
//! the repository already holds a workflow under that name it is reused;
//! otherwise an optional generator produces the YAML source and stores it
//! in the attached in-memory repository.

use crate::domain::repository::{jit_workflow_name, RepositoryError, WorkflowRepository, WorkflowTranslator};
use crate::infrastructure::repositories::InMemoryWorkflowRepository;
use std::sync::Arc;
use tracing::{debug, info};

/// Produces the YAML source of workflow `name` for `command`.
pub type WorkflowGenerator = Arc<dyn Fn(&str, &str) -> Result<String, String> + Send + Sync>;

#[derive(Clone, Default)]
pub struct HashingTranslator {
    generator: Option<(WorkflowGenerator, InMemoryWorkflowRepository)>,
}

impl HashingTranslator {
    /// Only resolves commands whose workflow already exists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate missing workflows with `generator` and store them in `store`.
    pub fn with_generator(generator: WorkflowGenerator, store: InMemoryWorkflowRepository) -> Self {
        Self {
            generator: Some((generator, store)),
        }
    }
}

impl std::fmt::Debug for HashingTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashingTranslator")
            .field("generates", &self.generator.is_some())
            .finish()
    }
}

impl WorkflowTranslator for HashingTranslator {
    fn translate(&self, command: &str, repository: &dyn WorkflowRepository) -> Result<String, RepositoryError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(RepositoryError::Translation {
                command: command.to_string(),
                reason: "empty command".to_string(),
            });
        }

        let name = jit_workflow_name(command);
        if repository.has_workflow(&name) {
            debug!(workflow = %name, "reusing translated workflow");
            return Ok(name);
        }

        let (generator, store) = self.generator.as_ref().ok_or_else(|| RepositoryError::Translation {
            command: command.to_string(),
            reason: format!("no workflow '{}' and no generator configured", name),
        })?;
        let yaml = generator(&name, command).map_err(|reason| RepositoryError::Translation {
            command: command.to_string(),
            reason,
        })?;
        store.insert(name.clone(), yaml);
        info!(workflow = %name, "generated workflow for translated command");
        Ok(name)
    }
}
