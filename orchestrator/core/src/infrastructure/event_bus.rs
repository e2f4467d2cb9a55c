// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Event Bus Implementation - Pub/Sub for Role and Environment Events
//
// In-memory event streaming on tokio broadcast channels. The bus is the
// default EventSink handed to role trees: publishing never blocks, slow
// subscribers lag and lose the oldest events.

use crate::domain::events::{EnvironmentEvent, EventSink, RoleEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use uuid::Uuid;

pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Unified domain event type for the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Role(RoleEvent),
    Environment(EnvironmentEvent),
}

impl DomainEvent {
    pub fn environment_id(&self) -> Uuid {
        match self {
            DomainEvent::Role(e) => e.environment_id,
            DomainEvent::Environment(
                EnvironmentEvent::TransitionStarted { environment_id, .. }
                | EnvironmentEvent::TransitionCompleted { environment_id, .. }
                | EnvironmentEvent::TransitionFailed { environment_id, .. },
            ) => *environment_id,
        }
    }
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Capacity is the number of buffered events before the oldest are
    /// dropped for lagging receivers.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }

    pub fn publish_role_event(&self, event: RoleEvent) {
        self.publish(DomainEvent::Role(event));
    }

    pub fn publish_environment_event(&self, event: EnvironmentEvent) {
        self.publish(DomainEvent::Environment(event));
    }

    fn publish(&self, event: DomainEvent) {
        trace!(?event, "publishing event");

        // send() only fails when nobody is subscribed
        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            environment_id: None,
        }
    }

    /// Subscribe to the events of a single environment.
    pub fn subscribe_environment(&self, environment_id: Uuid) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            environment_id: Some(environment_id),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventSink for EventBus {
    fn send_role_event(&self, event: RoleEvent) {
        self.publish_role_event(event);
    }

    fn send_environment_event(&self, event: EnvironmentEvent) {
        self.publish_environment_event(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for domain events, optionally filtered by environment
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    environment_id: Option<Uuid>,
}

impl EventReceiver {
    /// Receive the next matching event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive a matching event without waiting
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        loop {
            let event = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => EventBusError::Empty,
                broadcast::error::TryRecvError::Closed => EventBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    fn matches(&self, event: &DomainEvent) -> bool {
        self.environment_id
            .map(|id| event.environment_id() == id)
            .unwrap_or(true)
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
