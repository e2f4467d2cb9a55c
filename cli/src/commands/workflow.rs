// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow command implementations
//!
//! Inspect workflow templates and the role trees they expand into.
//!
//! # Commands
//!
//! - `runctl workflow validate <file>` - Parse a template and report on it
//! - `runctl workflow expand <file>` - Expand, resolve and print the role tree
//! - `runctl workflow descriptors <file>` - Print task descriptors as JSON
//! - `runctl workflow vars <file> <path>` - Print a role's variable stack
//! - `runctl workflow list` - List templates of a repository

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use runctl_core::application::WorkflowLoader;
use runctl_core::domain::constraint::Constraints;
use runctl_core::domain::environment::EnvironmentContext;
use runctl_core::domain::repository::WorkflowRepository;
use runctl_core::domain::role::RoleKind;
use runctl_core::domain::role_tree::RoleTree;
use runctl_core::domain::run_control_config::RunControlConfig;
use runctl_core::domain::var_map::VarMap;
use runctl_core::infrastructure::repositories::WORKFLOWS_DIR;
use runctl_core::infrastructure::{
    HashingTranslator, InMemoryWorkflowRepository, LocalWorkflowRepository, StaticConfigSource,
    WorkflowParser,
};

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Parse a workflow template and report on it
    Validate {
        /// Path to workflow template YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Expand and resolve a workflow, then print its role tree
    Expand {
        #[command(flatten)]
        load: LoadArgs,

        /// Print JSON instead of an indented tree
        #[arg(long)]
        json: bool,
    },

    /// Print the task descriptors of an expanded workflow as JSON
    Descriptors {
        #[command(flatten)]
        load: LoadArgs,
    },

    /// Print the consolidated variable stack of one role
    Vars {
        #[command(flatten)]
        load: LoadArgs,

        /// Role path, e.g. readout-dataflow.host-flp001.readout
        #[arg(value_name = "PATH")]
        role: String,
    },

    /// List the workflow templates of a repository
    List {
        /// Template repository root (default: configuration)
        #[arg(long, value_name = "DIR")]
        repo: Option<PathBuf>,
    },
}

/// How to load and instantiate one workflow file.
#[derive(Args, Debug, Clone)]
pub struct LoadArgs {
    /// Path to workflow template YAML file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Template repository root; defaults to the configured repository,
    /// then to the directory holding the file's `workflows/` folder
    #[arg(long, value_name = "DIR")]
    pub repo: Option<PathBuf>,

    /// Revision appended to task class identifiers
    #[arg(long)]
    pub revision: Option<String>,

    /// User variable (key=value), may be repeated
    #[arg(long = "set", short = 's', value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// YAML file answering GetConfig/DetectorForHost/GetRuntimeConfig
    #[arg(long, value_name = "FILE")]
    pub config_source: Option<PathBuf>,
}

pub async fn handle_command(command: WorkflowCommand, config: &RunControlConfig) -> Result<()> {
    match command {
        WorkflowCommand::Validate { file } => validate_workflow(&file),
        WorkflowCommand::Expand { load, json } => {
            let tree = load_tree(&load, config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&expanded_roles(&tree))?);
            } else {
                print_tree(&tree);
            }
            Ok(())
        }
        WorkflowCommand::Descriptors { load } => {
            let tree = load_tree(&load, config)?;
            let descriptors = tree.generate_task_descriptors(tree.root());
            println!("{}", serde_json::to_string_pretty(&descriptors)?);
            Ok(())
        }
        WorkflowCommand::Vars { load, role } => {
            let tree = load_tree(&load, config)?;
            let id = tree.get_role_by_path(&role)?;
            for (k, v) in tree.consolidated_var_stack(id) {
                println!("{} = {}", k.bold(), v);
            }
            Ok(())
        }
        WorkflowCommand::List { repo } => {
            let root = repo
                .or_else(|| config.spec.workflows.repository_path.clone())
                .context("No repository given and none configured")?;
            for name in LocalWorkflowRepository::new(root).list_workflows()? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn validate_workflow(file: &Path) -> Result<()> {
    println!("{}", "📋 Validating workflow template...".cyan());
    println!("   File: {}", file.display());
    println!();

    let template = WorkflowParser::parse_file(file).context("Failed to parse workflow template")?;

    println!("{}", "✓ Workflow is valid!".green().bold());
    println!();
    println!("Workflow Details:");
    println!("  Name:        {}", template.name());
    println!("  Public:      {}", template.public);
    if let Some(description) = &template.description {
        println!("  Description: {}", description);
    }
    println!("  Roles:       {}", template.tree.paths().len());
    if !template.public_vars.is_empty() {
        println!("  Public variables:");
        for (name, var) in &template.public_vars {
            let label = if var.label.is_empty() { name.as_str() } else { var.label.as_str() };
            println!("    {} ({}) = {}", name, label, var.value);
        }
    }
    Ok(())
}

/// Parse, expand and resolve `args.file` into a fresh environment tree.
pub fn load_tree(args: &LoadArgs, config: &RunControlConfig) -> Result<RoleTree> {
    let template = WorkflowParser::parse_file(&args.file).context("Failed to parse workflow template")?;

    let mut loader = WorkflowLoader::new(repository_for(args, config))
        .with_translator(Arc::new(HashingTranslator::new()))
        .with_globals(config.global_defaults(), config.global_vars());
    if let Some(path) = &args.config_source {
        let source = StaticConfigSource::from_yaml_file(path)
            .with_context(|| format!("Failed to load configuration source {:?}", path))?;
        loader = loader.with_config(Arc::new(source));
    }

    let context = EnvironmentContext::new(Uuid::new_v4()).with_user_vars(parse_assignments(&args.set)?);
    debug!(workflow = %template.name(), file = %args.file.display(), user_vars = args.set.len(), "expanding workflow");
    loader
        .instantiate(&template.tree, context)
        .with_context(|| format!("Failed to expand workflow '{}'", template.name()))
}

/// Repository used for includes: explicit `--repo`, then configuration,
/// then the repository the file itself lives in.
fn repository_for(args: &LoadArgs, config: &RunControlConfig) -> Arc<dyn WorkflowRepository> {
    let root = args
        .repo
        .clone()
        .or_else(|| config.spec.workflows.repository_path.clone())
        .or_else(|| enclosing_repository(&args.file));
    let Some(root) = root else {
        return Arc::new(InMemoryWorkflowRepository::new());
    };

    let mut repo = LocalWorkflowRepository::new(root);
    if let Some(rev) = args
        .revision
        .clone()
        .or_else(|| config.spec.workflows.default_revision.clone())
    {
        repo = repo.with_revision(rev);
    }
    Arc::new(repo)
}

fn enclosing_repository(file: &Path) -> Option<PathBuf> {
    let dir = file.parent()?;
    if dir.file_name()? == WORKFLOWS_DIR {
        dir.parent().map(Path::to_path_buf)
    } else {
        None
    }
}

/// `key=value` pairs; the value may itself contain `=`.
pub fn parse_assignments(pairs: &[String]) -> Result<VarMap> {
    let mut vars = VarMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Invalid parameter format: '{}'. Expected 'key=value'", pair))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Invalid parameter format: '{}'. Empty key", pair);
        }
        vars.set(key, value);
    }
    Ok(vars)
}

#[derive(Debug, Serialize)]
struct ExpandedRole {
    path: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_class: Option<String>,
    critical: bool,
    state: String,
    status: String,
    #[serde(skip_serializing_if = "Constraints::is_empty")]
    constraints: Constraints,
}

fn expanded_roles(tree: &RoleTree) -> Vec<ExpandedRole> {
    let mut roles = Vec::new();
    tree.walk(tree.root(), |id, node| {
        roles.push(ExpandedRole {
            path: tree.get_path(id),
            kind: node.kind.label(),
            task_class: node.task_class().map(str::to_string),
            critical: node.is_critical(),
            state: node.state().to_string(),
            status: node.status().to_string(),
            constraints: tree.get_constraints(id),
        });
    });
    roles
}

fn print_tree(tree: &RoleTree) {
    tree.walk(tree.root(), |id, node| {
        let depth = tree.get_path(id).matches('.').count();
        let indent = "  ".repeat(depth);
        let detail = match &node.kind {
            RoleKind::Task(task) => format!(" → {}", task.load),
            RoleKind::Call(call) => format!(" → {}", call.func),
            _ => String::new(),
        };
        println!(
            "{}{} {}{}",
            indent,
            node.name.bold(),
            format!("[{}]", node.kind.label()).dimmed(),
            detail
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_assignments() {
        let vars = parse_assignments(&["a=1".to_string(), "b = x=y".to_string()]).unwrap();
        assert_eq!(vars.get("a"), Some("1"));
        assert_eq!(vars.get("b"), Some(" x=y"));
        assert!(parse_assignments(&["novalue".to_string()]).is_err());
        assert!(parse_assignments(&["=1".to_string()]).is_err());
    }

    #[test]
    fn test_load_tree_from_repository_layout() {
        let dir = tempfile::tempdir().unwrap();
        let workflows = dir.path().join(WORKFLOWS_DIR);
        fs::create_dir_all(&workflows).unwrap();
        fs::write(
            workflows.join("main.yaml"),
            "name: main\nroles:\n  - name: inc\n    include: sub\n  - name: t\n    enabled: \"{{ with_t }}\"\n    task:\n      load: worker\n",
        )
        .unwrap();
        fs::write(
            workflows.join("sub.yaml"),
            "name: sub\nroles:\n  - name: s\n    task:\n      load: sub-worker\n",
        )
        .unwrap();

        let args = LoadArgs {
            file: workflows.join("main.yaml"),
            repo: None,
            revision: Some("v2".to_string()),
            set: vec!["with_t=false".to_string()],
            config_source: None,
        };
        let tree = load_tree(&args, &RunControlConfig::default()).unwrap();
        assert_eq!(tree.paths(), vec!["main", "main.inc", "main.inc.s"]);

        let descriptors = tree.generate_task_descriptors(tree.root());
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].task_class_name, "tasks/sub-worker@v2");

        let roles = expanded_roles(&tree);
        assert_eq!(roles[1].kind, "include");
    }

    #[test]
    fn test_enclosing_repository() {
        assert_eq!(
            enclosing_repository(Path::new("/srv/repo/workflows/x.yaml")),
            Some(PathBuf::from("/srv/repo"))
        );
        assert_eq!(enclosing_repository(Path::new("/tmp/x.yaml")), None);
    }
}
