// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Environment Context and Control Operations
//!
//! An environment is one running instance of a workflow. Its
//! [`EnvironmentContext`] sits above the root role: it supplies the
//! environment identity and the outermost variable layers every role
//! inherits from. [`EnvironmentOperation`] enumerates the externally
//! triggered transitions and which root States they are legal from.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Root parent of the role tree and the control-surface FSM

use crate::domain::state::State;
use crate::domain::var_map::VarMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Outermost scope of a role tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentContext {
    pub environment_id: Uuid,
    pub run_number: Option<u32>,
    pub defaults: VarMap,
    pub vars: VarMap,
    pub user_vars: VarMap,
}

impl EnvironmentContext {
    pub fn new(environment_id: Uuid) -> Self {
        Self {
            environment_id,
            ..Default::default()
        }
    }

    pub fn with_user_vars(mut self, user_vars: VarMap) -> Self {
        self.user_vars = user_vars;
        self
    }

    pub fn with_defaults(mut self, defaults: VarMap) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_vars(mut self, vars: VarMap) -> Self {
        self.vars = vars;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnvironmentOperation {
    Configure,
    StartActivity,
    StopActivity,
    Reset,
    Exit,
}

impl EnvironmentOperation {
    pub const ALL: [EnvironmentOperation; 5] = [
        EnvironmentOperation::Configure,
        EnvironmentOperation::StartActivity,
        EnvironmentOperation::StopActivity,
        EnvironmentOperation::Reset,
        EnvironmentOperation::Exit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentOperation::Configure => "CONFIGURE",
            EnvironmentOperation::StartActivity => "START_ACTIVITY",
            EnvironmentOperation::StopActivity => "STOP_ACTIVITY",
            EnvironmentOperation::Reset => "RESET",
            EnvironmentOperation::Exit => "EXIT",
        }
    }

    /// State the root settles in once the operation completes.
    pub fn target_state(&self) -> State {
        match self {
            EnvironmentOperation::Configure => State::Configured,
            EnvironmentOperation::StartActivity => State::Running,
            EnvironmentOperation::StopActivity => State::Configured,
            EnvironmentOperation::Reset => State::Standby,
            EnvironmentOperation::Exit => State::Done,
        }
    }

    /// Root State the operation may be issued from.
    pub fn source_state(&self) -> State {
        match self {
            EnvironmentOperation::Configure => State::Standby,
            EnvironmentOperation::StartActivity => State::Configured,
            EnvironmentOperation::StopActivity => State::Running,
            EnvironmentOperation::Reset => State::Configured,
            EnvironmentOperation::Exit => State::Standby,
        }
    }

    pub fn is_legal_from(&self, current: State) -> bool {
        self.source_state() == current
    }

    /// Operations that may be issued from `current`.
    pub fn available_from(current: State) -> Vec<EnvironmentOperation> {
        Self::ALL
            .iter()
            .copied()
            .filter(|op| op.is_legal_from(current))
            .collect()
    }
}

impl fmt::Display for EnvironmentOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown environment operation '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets() {
        assert_eq!(EnvironmentOperation::Configure.target_state(), State::Configured);
        assert_eq!(EnvironmentOperation::StartActivity.target_state(), State::Running);
        assert_eq!(EnvironmentOperation::StopActivity.target_state(), State::Configured);
        assert_eq!(EnvironmentOperation::Reset.target_state(), State::Standby);
        assert_eq!(EnvironmentOperation::Exit.target_state(), State::Done);
    }

    #[test]
    fn test_exit_only_from_standby() {
        assert!(EnvironmentOperation::Exit.is_legal_from(State::Standby));
        assert!(!EnvironmentOperation::Exit.is_legal_from(State::Configured));
        assert!(!EnvironmentOperation::Exit.is_legal_from(State::Running));
    }

    #[test]
    fn test_available_from() {
        assert_eq!(
            EnvironmentOperation::available_from(State::Configured),
            vec![EnvironmentOperation::StartActivity, EnvironmentOperation::Reset]
        );
        assert!(EnvironmentOperation::available_from(State::Error).is_empty());
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "start_activity".parse::<EnvironmentOperation>().unwrap(),
            EnvironmentOperation::StartActivity
        );
        assert!("GO_ERROR".parse::<EnvironmentOperation>().is_err());
    }
}
