// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::environment::EnvironmentOperation;
use crate::domain::state::State;
use crate::domain::status::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Emitted whenever a role's State or Status cell settles on a new value.
///
/// Exactly one of `state`/`status` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleEvent {
    pub environment_id: Uuid,
    pub name: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    pub timestamp: DateTime<Utc>,
}

impl RoleEvent {
    pub fn state_changed(
        environment_id: Uuid,
        name: impl Into<String>,
        path: impl Into<String>,
        state: State,
    ) -> Self {
        Self {
            environment_id,
            name: name.into(),
            path: path.into(),
            state: Some(state),
            status: None,
            timestamp: Utc::now(),
        }
    }

    pub fn status_changed(
        environment_id: Uuid,
        name: impl Into<String>,
        path: impl Into<String>,
        status: Status,
    ) -> Self {
        Self {
            environment_id,
            name: name.into(),
            path: path.into(),
            state: None,
            status: Some(status),
            timestamp: Utc::now(),
        }
    }
}

/// Control-surface transitions of a whole environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EnvironmentEvent {
    TransitionStarted {
        environment_id: Uuid,
        operation: EnvironmentOperation,
        from: State,
        started_at: DateTime<Utc>,
    },
    TransitionCompleted {
        environment_id: Uuid,
        operation: EnvironmentOperation,
        state: State,
        completed_at: DateTime<Utc>,
    },
    TransitionFailed {
        environment_id: Uuid,
        operation: EnvironmentOperation,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

/// Fire-and-forget destination for role and environment events.
///
/// Implementations must not block: the tree calls `send_role_event` while
/// propagating leaf updates.
pub trait EventSink: Send + Sync {
    fn send_role_event(&self, event: RoleEvent);

    fn send_environment_event(&self, _event: EnvironmentEvent) {}
}
