// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Inter-task Channels
//!
//! Inbound (`bind`) and outbound (`connect`) channel declarations used to
//! wire tasks together. Declarations are inherited: a role sees every
//! outbound channel declared by its ancestors followed by its own.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Channel value objects with document defaults

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub const DEFAULT_BUF_SIZE: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Push,
    Pull,
    Pub,
    Sub,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelType::Push => "push",
            ChannelType::Pull => "pull",
            ChannelType::Pub => "pub",
            ChannelType::Sub => "sub",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    #[default]
    Default,
    Zeromq,
    Nanomsg,
    Shmem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFormat {
    #[default]
    Tcp,
    Ipc,
}

/// Fields shared by inbound and outbound channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    #[serde(default = "default_buf_size", deserialize_with = "int_or_string")]
    pub snd_buf_size: i64,
    #[serde(default = "default_buf_size", deserialize_with = "int_or_string")]
    pub rcv_buf_size: i64,
    /// Kept as a string so it can carry a template expression.
    #[serde(default = "default_rate_logging", deserialize_with = "string_or_scalar")]
    pub rate_logging: String,
    #[serde(default)]
    pub transport: TransportType,
    #[serde(default, deserialize_with = "trimmed_string")]
    pub target: String,
}

/// A channel this role binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbound {
    #[serde(flatten)]
    pub channel: Channel,
    /// Non-empty when the channel is exposed to the whole environment
    /// under this name.
    #[serde(default)]
    pub global: String,
    /// Ignored when `target` is set to a static address.
    #[serde(default)]
    pub addressing: AddressFormat,
}

/// A channel this role connects to; `target` names the bound side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    #[serde(flatten)]
    pub channel: Channel,
}

impl Inbound {
    pub fn name(&self) -> &str {
        &self.channel.name
    }
}

impl Outbound {
    pub fn name(&self) -> &str {
        &self.channel.name
    }

    pub fn target(&self) -> &str {
        &self.channel.target
    }
}

fn default_buf_size() -> i64 {
    DEFAULT_BUF_SIZE
}

fn default_rate_logging() -> String {
    "0".to_string()
}

fn int_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    match value {
        serde_yaml::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("invalid buffer size {}", n))),
        serde_yaml::Value::String(s) if s.trim().is_empty() => Ok(DEFAULT_BUF_SIZE),
        serde_yaml::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid buffer size '{}': {}", s, e))),
        serde_yaml::Value::Null => Ok(DEFAULT_BUF_SIZE),
        other => Err(serde::de::Error::custom(format!(
            "invalid buffer size {:?}",
            other
        ))),
    }
}

fn string_or_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_yaml::Value::String(s) if s.is_empty() => default_rate_logging(),
        serde_yaml::Value::String(s) => s,
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        _ => default_rate_logging(),
    })
}

fn trimmed_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    Ok(s.map(|s| s.trim().to_string()).unwrap_or_default())
}
