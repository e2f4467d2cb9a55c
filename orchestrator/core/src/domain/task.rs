// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task and Call Traits
//!
//! Behavioural metadata shared by Task and Call roles, the trigger
//! expression grammar, and the `TaskDescriptor` contract handed to the
//! external scheduler.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Leaf-role metadata and scheduler contract

use crate::domain::constraint::Constraints;
use crate::domain::role::RoleId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Timeout applied to a triggered leaf when none is declared.
pub const DEFAULT_TRIGGERED_TIMEOUT: &str = "30s";
/// Timeout applied to an untriggered leaf when none is declared.
pub const DEFAULT_UNTRIGGERED_TIMEOUT: &str = "0s";

/// Trigger/await/timeout/critical metadata of a leaf role.
///
/// All string fields may carry template expressions until stage 4 of
/// resolution has run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traits {
    pub trigger: String,
    #[serde(rename = "await")]
    pub await_: String,
    pub timeout: String,
    pub critical: bool,
}

impl Traits {
    /// Apply document defaults: a triggered leaf waits on its own trigger
    /// for 30s unless told otherwise, an untriggered one has no timeout,
    /// and leaves are critical unless declared otherwise.
    pub fn with_defaults(
        trigger: Option<String>,
        await_: Option<String>,
        timeout: Option<String>,
        critical: Option<bool>,
    ) -> Self {
        let trigger = trigger.unwrap_or_default();
        let (await_, timeout) = if trigger.is_empty() {
            (
                await_.unwrap_or_default(),
                timeout.unwrap_or_else(|| DEFAULT_UNTRIGGERED_TIMEOUT.to_string()),
            )
        } else {
            (
                await_.unwrap_or_else(|| trigger.clone()),
                timeout.unwrap_or_else(|| DEFAULT_TRIGGERED_TIMEOUT.to_string()),
            )
        };
        Self {
            trigger,
            await_,
            timeout,
            critical: critical.unwrap_or(true),
        }
    }

    pub fn timeout_duration(&self) -> Result<Duration, TaskError> {
        let raw = self.timeout.trim();
        humantime_serde::re::humantime::parse_duration(raw).map_err(|e| {
            TaskError::InvalidTimeout {
                value: raw.to_string(),
                reason: e.to_string(),
            }
        })
    }

    pub fn trigger_expression(&self) -> Option<TriggerExpression> {
        if self.trigger.trim().is_empty() {
            return None;
        }
        Some(TriggerExpression::parse(self.trigger.trim()))
    }

    pub fn await_expression(&self) -> Option<TriggerExpression> {
        if self.await_.trim().is_empty() {
            return None;
        }
        Some(TriggerExpression::parse(self.await_.trim()))
    }
}

impl Default for Traits {
    fn default() -> Self {
        Self::with_defaults(None, None, None, None)
    }
}

/// A trigger point name plus an ordering weight, e.g. `before_CONFIGURE-10`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerExpression {
    pub name: String,
    pub weight: i32,
}

impl TriggerExpression {
    /// Split on the last `+` or `-`. A missing or unparsable weight is 0.
    pub fn parse(expr: &str) -> Self {
        match expr.rfind(['+', '-']) {
            Some(idx) => {
                let (name, weight) = expr.split_at(idx);
                let weight = weight.parse::<i32>().unwrap_or_else(|_| {
                    warn!(expression = %expr, "invalid trigger weight, defaulting to +0");
                    0
                });
                Self {
                    name: name.to_string(),
                    weight,
                }
            }
            None => Self {
                name: expr.to_string(),
                weight: 0,
            },
        }
    }
}

impl fmt::Display for TriggerExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:+}", self.name, self.weight)
    }
}

/// Identifier of a running task assigned to a Task role by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskRef(pub String);

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request handed to the scheduler for one undeployed Task role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDescriptor {
    #[serde(skip)]
    pub role: RoleId,
    pub role_path: String,
    pub task_class_name: String,
    pub constraints: Constraints,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("invalid timeout '{value}': {reason}")]
    InvalidTimeout { value: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_with_trigger() {
        let traits = Traits::with_defaults(Some("before_CONFIGURE".into()), None, None, None);
        assert_eq!(traits.await_, "before_CONFIGURE");
        assert_eq!(traits.timeout, "30s");
        assert!(traits.critical);
        assert_eq!(traits.timeout_duration().unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn test_defaults_without_trigger() {
        let traits = Traits::with_defaults(None, None, None, Some(false));
        assert_eq!(traits.await_, "");
        assert_eq!(traits.timeout, "0s");
        assert!(!traits.critical);
        assert_eq!(traits.timeout_duration().unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_explicit_values_win() {
        let traits = Traits::with_defaults(
            Some("enter_RUNNING".into()),
            Some("leave_RUNNING".into()),
            Some("2m".into()),
            Some(true),
        );
        assert_eq!(traits.await_, "leave_RUNNING");
        assert_eq!(traits.timeout_duration().unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn test_invalid_timeout() {
        let traits = Traits::with_defaults(None, None, Some("soon".into()), None);
        assert!(matches!(
            traits.timeout_duration(),
            Err(TaskError::InvalidTimeout { .. })
        ));
    }

    #[test]
    fn test_trigger_expression_parse() {
        assert_eq!(
            TriggerExpression::parse("before_CONFIGURE-10"),
            TriggerExpression { name: "before_CONFIGURE".into(), weight: -10 }
        );
        assert_eq!(
            TriggerExpression::parse("after_START_ACTIVITY+5"),
            TriggerExpression { name: "after_START_ACTIVITY".into(), weight: 5 }
        );
        assert_eq!(
            TriggerExpression::parse("enter_RUNNING"),
            TriggerExpression { name: "enter_RUNNING".into(), weight: 0 }
        );
        assert_eq!(
            TriggerExpression::parse("leave_RUNNING-x"),
            TriggerExpression { name: "leave_RUNNING".into(), weight: 0 }
        );
        assert_eq!(TriggerExpression::parse("a-3").to_string(), "a-3");
    }
}
