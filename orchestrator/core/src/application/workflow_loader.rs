// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Load Workflow Use Case
//!
//! Turns a workflow template into the fully resolved role tree of one
//! environment.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Instantiate a per-environment copy of a template
//!   and drive it through expansion and resolution
//! - **Collaborators:**
//!   - Domain: RoleTree, EnvironmentContext, WorkflowRepository
//!   - Application: RoleProcessor
//!   - Infrastructure: EventBus (as the tree's event sink)
//!
//! # Flow
//!
//! 1. Fetch the template from the repository (or take a parsed one)
//! 2. Deep-copy it so the master template is never mutated
//! 3. Install the environment context as the outermost variable scope,
//!    with global defaults and vars from configuration beneath it
//! 4. Expand and resolve the copy with [`RoleProcessor`]
//! 5. Link parent handles, seed composite cells from their children and
//!    attach the event sink

use crate::application::role_processor::{ExpansionError, RoleProcessor};
use crate::domain::configuration::ConfigSource;
use crate::domain::environment::EnvironmentContext;
use crate::domain::events::EventSink;
use crate::domain::repository::{WorkflowRepository, WorkflowTranslator};
use crate::domain::role_tree::RoleTree;
use crate::domain::var_map::VarMap;
use std::sync::Arc;
use tracing::info;

pub struct WorkflowLoader {
    repository: Arc<dyn WorkflowRepository>,
    config: Option<Arc<dyn ConfigSource>>,
    translator: Option<Arc<dyn WorkflowTranslator>>,
    event_sink: Option<Arc<dyn EventSink>>,
    global_defaults: VarMap,
    global_vars: VarMap,
}

impl WorkflowLoader {
    pub fn new(repository: Arc<dyn WorkflowRepository>) -> Self {
        Self {
            repository,
            config: None,
            translator: None,
            event_sink: None,
            global_defaults: VarMap::new(),
            global_vars: VarMap::new(),
        }
    }

    pub fn with_config(mut self, config: Arc<dyn ConfigSource>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn WorkflowTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    /// Variables placed beneath every environment's own layers.
    pub fn with_globals(mut self, defaults: VarMap, vars: VarMap) -> Self {
        self.global_defaults = defaults;
        self.global_vars = vars;
        self
    }

    pub fn repository(&self) -> &Arc<dyn WorkflowRepository> {
        &self.repository
    }

    /// Load workflow `name` from the repository and instantiate it.
    pub fn load(&self, name: &str, context: EnvironmentContext) -> Result<RoleTree, ExpansionError> {
        let identifier = self.repository.resolve_subworkflow_template_identifier(name);
        let loaded = self.repository.load_subworkflow(&identifier, "")?;
        self.instantiate_with(&loaded.tree, context, &loaded.repository)
    }

    /// Instantiate an already parsed template against the loader's
    /// repository.
    pub fn instantiate(&self, template: &RoleTree, context: EnvironmentContext) -> Result<RoleTree, ExpansionError> {
        self.instantiate_with(template, context, &self.repository)
    }

    fn instantiate_with(
        &self,
        template: &RoleTree,
        context: EnvironmentContext,
        repository: &Arc<dyn WorkflowRepository>,
    ) -> Result<RoleTree, ExpansionError> {
        let mut tree = template.copy();
        tree.set_context(self.layer_context(context));

        RoleProcessor::new()
            .with_config(self.config.as_deref())
            .with_translator(self.translator.as_deref())
            .process_tree(&mut tree, repository)?;

        tree.link_children_to_parents();
        tree.refresh_aggregates();
        if let Some(sink) = &self.event_sink {
            tree.set_event_sink(sink.clone());
        }

        let root = tree.root();
        info!(
            environment_id = %tree.context().environment_id,
            workflow = %tree.get_name(root),
            roles = tree.paths().len(),
            "workflow loaded"
        );
        Ok(tree)
    }

    /// Global layers first, the context's own entries on top.
    fn layer_context(&self, mut context: EnvironmentContext) -> EnvironmentContext {
        let mut defaults = self.global_defaults.clone();
        defaults.extend_from(&context.defaults);
        let mut vars = self.global_vars.clone();
        vars.extend_from(&context.vars);
        context.defaults = defaults;
        context.vars = vars;
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::role::RoleKind;
    use crate::domain::state::State;
    use crate::infrastructure::repositories::InMemoryWorkflowRepository;
    use crate::infrastructure::workflow_parser::WorkflowParser;
    use uuid::Uuid;

    const ENV: &str = r#"
name: env
defaults:
  det: "{{ detector }}"
roles:
  - name: readout
    include: readout
  - name: stfb
    enabled: "{{ stfb_enabled }}"
    task:
      load: stfbuilder
"#;

    const READOUT: &str = r#"
name: readout
roles:
  - name: "r-{{ det }}"
    task:
      load: readout
"#;

    fn loader() -> WorkflowLoader {
        let repo = InMemoryWorkflowRepository::new()
            .with_workflow("env", ENV)
            .with_workflow("readout", READOUT);
        WorkflowLoader::new(Arc::new(repo))
            .with_globals(VarMap::from_iter([("detector", "its")]), VarMap::new())
    }

    fn context(stfb: &str) -> EnvironmentContext {
        EnvironmentContext::new(Uuid::new_v4())
            .with_user_vars(VarMap::from_iter([("stfb_enabled", stfb)]))
    }

    #[test]
    fn test_load_by_name() {
        let tree = loader().load("env", context("true")).unwrap();
        assert_eq!(
            tree.paths(),
            vec!["env", "env.readout", "env.readout.r-its", "env.stfb"]
        );
        assert_eq!(tree.get_state(tree.root()), State::Standby);
        let r = tree.find_by_path("env.readout.r-its").unwrap();
        assert_eq!(tree.get_parent_role(r), tree.find_by_path("env.readout"));
    }

    #[test]
    fn test_user_vars_disable_roles() {
        let tree = loader().load("env", context("false")).unwrap();
        assert!(tree.find_by_path("env.stfb").is_none());
    }

    #[test]
    fn test_instantiate_leaves_template_untouched() {
        let template = WorkflowParser::parse_yaml(ENV).unwrap().tree;
        let loader = loader();
        let a = loader.instantiate(&template, context("true")).unwrap();
        let b = loader
            .instantiate(
                &template,
                context("true").with_defaults(VarMap::from_iter([("detector", "tpc")])),
            )
            .unwrap();

        assert!(a.find_by_path("env.readout.r-its").is_some());
        assert!(b.find_by_path("env.readout.r-tpc").is_some());
        let include = template.find_by_path("env.readout").unwrap();
        assert!(matches!(template.node(include).kind, RoleKind::Include(_)));
        assert!(template.node(include).children().is_empty());
    }

    #[test]
    fn test_missing_workflow() {
        assert!(matches!(
            loader().load("nope", context("true")),
            Err(ExpansionError::Repository(_))
        ));
    }
}
