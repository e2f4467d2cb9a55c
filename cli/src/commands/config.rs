// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use runctl_core::domain::run_control_config::RunControlConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the manifest as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
    config: RunControlConfig,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(&config, config_override, paths, yaml),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
    }
}

fn show(
    config: &RunControlConfig,
    config_override: Option<PathBuf>,
    show_paths: bool,
    yaml: bool,
) -> Result<()> {
    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. RUNCTL_CONFIG_PATH: {}",
            std::env::var("RUNCTL_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./runctl-config.yaml");
        println!("  4. ~/.runctl/config.yaml");
        println!("  5. /etc/runctl/config.yaml");
        println!();
    }

    if yaml {
        print!("{}", config.to_yaml_string()?);
        return Ok(());
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    println!("{}", "Workflows:".bold());
    println!(
        "  Repository: {}",
        spec.workflows
            .repository_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!(
        "  Revision:   {}",
        spec.workflows.default_revision.as_deref().unwrap_or("(none)")
    );
    println!();

    println!("{}", "Control:".bold());
    println!("  Transition timeout: {:?}", spec.control.transition_timeout);
    println!("  Event capacity:     {}", spec.events.capacity);
    println!();

    println!("{}", "Observability:".bold());
    println!("  Log level:  {}", spec.observability.log_level);
    println!("  Log format: {}", spec.observability.log_format);

    if !spec.defaults.is_empty() || !spec.vars.is_empty() {
        println!();
        println!("{}", "Global variables:".bold());
        for (k, v) in &spec.defaults {
            println!("  {} = {} {}", k, v, "(default)".dimmed());
        }
        for (k, v) in &spec.vars {
            println!("  {} = {}", k, v);
        }
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = RunControlConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}
