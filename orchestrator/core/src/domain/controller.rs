// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Task controller port: the scheduler side that carries control
//! operations to running tasks. Results come back asynchronously through
//! [`RoleTree::update_state`](crate::domain::role_tree::RoleTree::update_state).

use crate::domain::environment::EnvironmentOperation;
use crate::domain::role::RoleId;
use crate::domain::task::TaskRef;
use async_trait::async_trait;

/// One leaf's share of an environment transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    pub role: RoleId,
    pub path: String,
    /// Running task bound to the role, if any.
    pub task: Option<TaskRef>,
    pub operation: EnvironmentOperation,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ControllerError(pub String);

#[async_trait]
pub trait TaskController: Send + Sync {
    /// Accept the request; returning does not mean the task has reached
    /// the target state.
    async fn request_transition(&self, request: TransitionRequest) -> Result<(), ControllerError>;
}
