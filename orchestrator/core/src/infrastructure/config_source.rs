// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Static Configuration Source
//!
//! [`ConfigSource`] backed by in-memory tables, optionally loaded from a
//! YAML file:
//!
//! ```yaml
//! components:
//!   qc/any/any/tpc-config: '{"tasks": 4}'
//! detectors:
//!   flp001: TPC
//!   flp002: ITS
//! runtime:
//!   aliecs:
//!     default_timeout: 30s
//! ```
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Configuration lookups for template expressions

use crate::domain::configuration::{ConfigSource, ConfigSourceError};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

/// `component/segment/...`: at least two segments of word characters,
/// dots, dashes or `@`.
static CONFIG_PATH: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.\-@]+(/[A-Za-z0-9_.\-@]+)+$").ok());

fn is_valid_path(path: &str) -> bool {
    CONFIG_PATH
        .as_ref()
        .map(|re| re.is_match(path))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StaticConfigSource {
    components: BTreeMap<String, String>,
    detectors: BTreeMap<String, String>,
    runtime: BTreeMap<String, BTreeMap<String, String>>,
}

impl StaticConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn with_component(mut self, path: impl Into<String>, payload: impl Into<String>) -> Self {
        self.components.insert(path.into(), payload.into());
        self
    }

    pub fn with_detector(mut self, host: impl Into<String>, detector: impl Into<String>) -> Self {
        self.detectors.insert(host.into(), detector.into());
        self
    }

    pub fn with_runtime(
        mut self,
        component: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.runtime
            .entry(component.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }
}

impl ConfigSource for StaticConfigSource {
    fn get_config(&self, path: &str) -> Result<String, ConfigSourceError> {
        let path = path.trim().trim_matches('/');
        if !is_valid_path(path) {
            return Err(ConfigSourceError::InvalidQuery(path.to_string()));
        }
        self.components
            .get(path)
            .cloned()
            .ok_or_else(|| ConfigSourceError::NotFound(path.to_string()))
    }

    fn detector_for_host(&self, hostname: &str) -> Result<String, ConfigSourceError> {
        let host = hostname.trim();
        self.detectors
            .get(host)
            .or_else(|| host.split('.').next().and_then(|short| self.detectors.get(short)))
            .cloned()
            .ok_or_else(|| ConfigSourceError::NotFound(format!("detector for host {}", host)))
    }

    fn get_runtime_config(&self, component: &str, key: &str) -> Result<String, ConfigSourceError> {
        self.runtime
            .get(component)
            .and_then(|entries| entries.get(key))
            .cloned()
            .ok_or_else(|| ConfigSourceError::NotFound(format!("{}/{}", component, key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookups() {
        let source = StaticConfigSource::new()
            .with_component("qc/any/any/tpc", "{\"a\":1}")
            .with_detector("flp001", "TPC")
            .with_runtime("aliecs", "timeout", "30s");

        assert_eq!(source.get_config("qc/any/any/tpc").unwrap(), "{\"a\":1}");
        assert_eq!(source.get_config("/qc/any/any/tpc/").unwrap(), "{\"a\":1}");
        assert_eq!(source.detector_for_host("flp001.cern.ch").unwrap(), "TPC");
        assert_eq!(source.get_runtime_config("aliecs", "timeout").unwrap(), "30s");
    }

    #[test]
    fn test_failures() {
        let source = StaticConfigSource::new();
        assert!(matches!(source.get_config("qc"), Err(ConfigSourceError::InvalidQuery(_))));
        assert!(matches!(source.get_config("qc/a b"), Err(ConfigSourceError::InvalidQuery(_))));
        assert!(matches!(source.get_config("qc/any"), Err(ConfigSourceError::NotFound(_))));
        assert!(source.detector_for_host("nowhere").is_err());
        assert!(source.get_runtime_config("x", "y").is_err());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = "components:\n  readout/any/flp1: 'x=1'\ndetectors:\n  flp1: ITS\nruntime:\n  aliecs:\n    k: v\n";
        let source = StaticConfigSource::from_yaml_str(yaml).unwrap();
        assert_eq!(source.get_config("readout/any/flp1").unwrap(), "x=1");
        assert_eq!(source.detector_for_host("flp1").unwrap(), "ITS");
        assert_eq!(source.get_runtime_config("aliecs", "k").unwrap(), "v");
        assert_eq!(StaticConfigSource::from_yaml_str("").unwrap(), StaticConfigSource::default());
    }
}
