// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Configuration Source
//!
//! Key/value lookups available to template expressions (`GetConfig`,
//! `DetectorForHost`, `GetRuntimeConfig`). The source is injected into the
//! resolver; nothing reaches for a process-wide singleton.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Read-only configuration port used during variable resolution

/// Read-only configuration lookups. Failures never abort resolution: the
/// resolver renders them as an inline `{"error":"..."}` payload.
pub trait ConfigSource: Send + Sync {
    /// Component configuration payload at `path`, e.g. `qc/any/any/config`.
    fn get_config(&self, path: &str) -> Result<String, ConfigSourceError>;

    /// Detector owning `hostname`.
    fn detector_for_host(&self, hostname: &str) -> Result<String, ConfigSourceError>;

    /// Runtime entry `key` of `component`.
    fn get_runtime_config(&self, component: &str, key: &str) -> Result<String, ConfigSourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigSourceError {
    #[error("no configuration at '{0}'")]
    NotFound(String),

    #[error("invalid configuration query '{0}'")]
    InvalidQuery(String),

    #[error("configuration source unavailable: {0}")]
    Unavailable(String),
}

impl ConfigSourceError {
    /// Inline payload substituted for a failed lookup.
    pub fn to_payload(&self) -> String {
        serde_json::json!({ "error": self.to_string() }).to_string()
    }
}
