// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Run Control Configuration Types
//
// Defines the configuration schema for a runctl control plane, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Workflow repository location and revision
// - Control transition timeouts
// - Event bus sizing and observability settings
// - Global variable layers placed beneath every environment

use crate::domain::var_map::VarMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "runctl/v1";
pub const KIND: &str = "RunControlConfig";

/// Top-level Kubernetes-style run control configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunControlConfig {
    /// API version (must be "runctl/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "RunControlConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: RunControlSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunControlSpec {
    #[serde(default)]
    pub workflows: WorkflowsConfig,

    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Lowest-precedence variables of every environment
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,

    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowsConfig {
    /// Root of a local template repository (holds `workflows/*.yaml`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_path: Option<PathBuf>,

    /// Revision appended to task class identifiers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_revision: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// How long a transition may take to settle at the root
    #[serde(default = "default_transition_timeout", with = "humantime_serde")]
    pub transition_timeout: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            transition_timeout: default_transition_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// Default value functions
fn default_transition_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_event_capacity() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for RunControlConfig {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "runctl".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                labels: None,
            },
            spec: RunControlSpec::default(),
        }
    }
}

impl RunControlConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. RUNCTL_CONFIG_PATH environment variable
    /// 2. ./runctl-config.yaml (working directory)
    /// 3. ~/.runctl/config.yaml (user home)
    /// 4. /etc/runctl/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("RUNCTL_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./runctl-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".runctl").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/runctl/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // An explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", path);
                Self::from_yaml_file(path)?
            }
            None => {
                tracing::debug!("No configuration file found in standard locations, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("RUNCTL_TRANSITION_TIMEOUT") {
            match humantime_serde::re::humantime::parse_duration(val.trim()) {
                Ok(timeout) => {
                    tracing::info!("Environment override: RUNCTL_TRANSITION_TIMEOUT={}", val);
                    self.spec.control.transition_timeout = timeout;
                }
                Err(e) => {
                    tracing::warn!(
                        "Invalid value for RUNCTL_TRANSITION_TIMEOUT: '{}' ({}). Ignoring.",
                        val,
                        e
                    );
                }
            }
        }

        if let Some(val) = lookup("RUNCTL_LOG_LEVEL") {
            tracing::info!("Environment override: RUNCTL_LOG_LEVEL={}", val);
            self.spec.observability.log_level = val;
        }

        if let Some(val) = lookup("RUNCTL_REPOSITORY_PATH") {
            tracing::info!("Environment override: RUNCTL_REPOSITORY_PATH={}", val);
            self.spec.workflows.repository_path = Some(PathBuf::from(val));
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.events.capacity == 0 {
            anyhow::bail!("spec.events.capacity must be greater than zero");
        }

        match self.spec.observability.log_format.as_str() {
            "compact" | "json" => {}
            other => anyhow::bail!("Invalid log_format: '{}'. Must be 'compact' or 'json'", other),
        }

        Ok(())
    }

    pub fn global_defaults(&self) -> VarMap {
        self.spec.defaults.clone().into()
    }

    pub fn global_vars(&self) -> VarMap {
        self.spec.vars.clone().into()
    }
}
