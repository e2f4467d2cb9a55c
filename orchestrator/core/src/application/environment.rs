// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Environment Control Use Case
//!
//! Drives a loaded environment through the control-surface operations
//! (CONFIGURE, START_ACTIVITY, STOP_ACTIVITY, RESET, EXIT).
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Check legality, fan requests out to the leaves and
//!   wait for the aggregated root State
//! - **Collaborators:**
//!   - Domain: RoleTree (read-only after loading), TaskController port,
//!     EventSink
//!
//! # Flow
//!
//! 1. Reject the operation unless the root is in its source State
//! 2. Subscribe to the root State before anything is sent
//! 3. Send one request per enabled Task/Call leaf, concurrently
//! 4. Wait until the root settles in the operation's target State, bounded
//!    by the transition timeout

use crate::domain::controller::{TaskController, TransitionRequest};
use crate::domain::environment::EnvironmentOperation;
use crate::domain::events::{EnvironmentEvent, EventSink};
use crate::domain::role_tree::RoleTree;
use crate::domain::state::State;
use crate::domain::status::Status;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("{op} is not allowed from {current}")]
    IllegalTransition {
        op: EnvironmentOperation,
        current: State,
    },

    #[error("controller rejected {path}: {message}")]
    Controller { path: String, message: String },

    #[error("{op} timed out waiting for {target}, environment is {current}")]
    Timeout {
        op: EnvironmentOperation,
        target: State,
        current: State,
    },
}

pub struct Environment {
    tree: Arc<RoleTree>,
    controller: Arc<dyn TaskController>,
    sink: Option<Arc<dyn EventSink>>,
    transition_timeout: Duration,
}

impl Environment {
    pub fn new(tree: Arc<RoleTree>, controller: Arc<dyn TaskController>) -> Self {
        Self {
            tree,
            controller,
            sink: None,
            transition_timeout: DEFAULT_TRANSITION_TIMEOUT,
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_transition_timeout(mut self, timeout: Duration) -> Self {
        self.transition_timeout = timeout;
        self
    }

    pub fn id(&self) -> Uuid {
        self.tree.context().environment_id
    }

    pub fn tree(&self) -> &Arc<RoleTree> {
        &self.tree
    }

    pub fn current_state(&self) -> State {
        self.tree.get_state(self.tree.root())
    }

    pub fn current_status(&self) -> Status {
        self.tree.get_status(self.tree.root())
    }

    pub fn available_operations(&self) -> Vec<EnvironmentOperation> {
        EnvironmentOperation::available_from(self.current_state())
    }

    /// Run `op` to completion and return the State the root settled in.
    pub async fn transition(&self, op: EnvironmentOperation) -> Result<State, EnvironmentError> {
        let current = self.current_state();
        if !op.is_legal_from(current) {
            warn!(environment_id = %self.id(), op = %op, state = %current, "illegal transition");
            return Err(EnvironmentError::IllegalTransition { op, current });
        }

        let target = op.target_state();
        let mut root_state = self.tree.subscribe_state();
        self.emit(EnvironmentEvent::TransitionStarted {
            environment_id: self.id(),
            operation: op,
            from: current,
            started_at: Utc::now(),
        });

        let mut requests = Vec::new();
        self.tree.leaf_walk(self.tree.root(), |id, node| {
            if node.is_enabled() {
                requests.push(TransitionRequest {
                    role: id,
                    path: self.tree.get_path(id),
                    task: node.assigned_task(),
                    operation: op,
                });
            }
        });
        info!(environment_id = %self.id(), op = %op, leaves = requests.len(), "transition requested");

        let results = join_all(requests.into_iter().map(|request| {
            let controller = self.controller.clone();
            async move {
                let path = request.path.clone();
                controller.request_transition(request).await.map_err(|e| (path, e))
            }
        }))
        .await;
        if let Some((path, e)) = results.into_iter().find_map(Result::err) {
            error!(environment_id = %self.id(), role = %path, error = %e, "controller error");
            let err = EnvironmentError::Controller {
                path,
                message: e.to_string(),
            };
            self.fail(op, &err);
            return Err(err);
        }

        let settled = tokio::time::timeout(self.transition_timeout, root_state.wait_for(|s| *s == target)).await;
        match settled {
            Ok(Ok(_)) => {
                info!(environment_id = %self.id(), op = %op, state = %target, "transition completed");
                self.emit(EnvironmentEvent::TransitionCompleted {
                    environment_id: self.id(),
                    operation: op,
                    state: target,
                    completed_at: Utc::now(),
                });
                Ok(target)
            }
            _ => {
                let err = EnvironmentError::Timeout {
                    op,
                    target,
                    current: self.current_state(),
                };
                warn!(environment_id = %self.id(), error = %err, "transition did not settle");
                self.fail(op, &err);
                Err(err)
            }
        }
    }

    fn fail(&self, op: EnvironmentOperation, err: &EnvironmentError) {
        self.emit(EnvironmentEvent::TransitionFailed {
            environment_id: self.id(),
            operation: op,
            reason: err.to_string(),
            failed_at: Utc::now(),
        });
    }

    fn emit(&self, event: EnvironmentEvent) {
        if let Some(sink) = &self.sink {
            sink.send_environment_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::controller::ControllerError;
    use crate::domain::role::RoleNode;
    use crate::domain::task::Traits;
    use crate::infrastructure::event_bus::{DomainEvent, EventBus};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Applies every request's target State to the leaf shortly after
    /// accepting it.
    struct Scheduler {
        tree: Arc<RoleTree>,
        seen: Mutex<Vec<String>>,
        reject: Option<&'static str>,
        stall: bool,
    }

    impl Scheduler {
        fn new(tree: Arc<RoleTree>) -> Self {
            Self {
                tree,
                seen: Mutex::new(Vec::new()),
                reject: None,
                stall: false,
            }
        }
    }

    #[async_trait]
    impl TaskController for Scheduler {
        async fn request_transition(&self, request: TransitionRequest) -> Result<(), ControllerError> {
            self.seen.lock().push(request.path.clone());
            if self.reject == Some(request.path.as_str()) {
                return Err(ControllerError("task unreachable".to_string()));
            }
            if !self.stall {
                let tree = self.tree.clone();
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    tree.update_state(request.role, request.operation.target_state());
                });
            }
            Ok(())
        }
    }

    fn tree() -> Arc<RoleTree> {
        let mut tree = RoleTree::new(RoleNode::aggregator("env"));
        let root = tree.root();
        tree.add_child(root, RoleNode::task("a", "ta", Traits::default()));
        tree.add_child(root, RoleNode::task("b", "tb", Traits::default()));
        tree.refresh_aggregates();
        Arc::new(tree)
    }

    #[tokio::test]
    async fn test_configure_and_start() {
        let tree = tree();
        let scheduler = Arc::new(Scheduler::new(tree.clone()));
        let env = Environment::new(tree, scheduler.clone());

        assert_eq!(env.transition(EnvironmentOperation::Configure).await.unwrap(), State::Configured);
        assert_eq!(env.transition(EnvironmentOperation::StartActivity).await.unwrap(), State::Running);
        assert_eq!(env.current_state(), State::Running);

        let seen = scheduler.seen.lock().clone();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen.iter().filter(|p| *p == "env.a").count(), 2);
    }

    #[test]
    fn test_illegal_transition() {
        let tree = tree();
        let env = Environment::new(tree.clone(), Arc::new(Scheduler::new(tree)));
        assert!(matches!(
            tokio_test::block_on(env.transition(EnvironmentOperation::StartActivity)),
            Err(EnvironmentError::IllegalTransition { current: State::Standby, .. })
        ));
        assert_eq!(
            env.available_operations(),
            vec![EnvironmentOperation::Configure, EnvironmentOperation::Exit]
        );
    }

    #[tokio::test]
    async fn test_controller_error_is_reported() {
        let tree = tree();
        let mut scheduler = Scheduler::new(tree.clone());
        scheduler.reject = Some("env.b");
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let env = Environment::new(tree, Arc::new(scheduler)).with_event_sink(Arc::new(bus.clone()));

        match env.transition(EnvironmentOperation::Configure).await {
            Err(EnvironmentError::Controller { path, message }) => {
                assert_eq!(path, "env.b");
                assert_eq!(message, "task unreachable");
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            rx.recv().await.unwrap(),
            DomainEvent::Environment(EnvironmentEvent::TransitionStarted { .. })
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            DomainEvent::Environment(EnvironmentEvent::TransitionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let tree = tree();
        let mut scheduler = Scheduler::new(tree.clone());
        scheduler.stall = true;
        let env = Environment::new(tree, Arc::new(scheduler)).with_transition_timeout(Duration::from_millis(20));

        match env.transition(EnvironmentOperation::Configure).await {
            Err(EnvironmentError::Timeout { target, current, .. }) => {
                assert_eq!(target, State::Configured);
                assert_eq!(current, State::Standby);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
