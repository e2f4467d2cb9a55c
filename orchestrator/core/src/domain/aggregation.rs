// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! State/Status Aggregation
//!
//! Task and Call roles are the only authoritative sources of State and
//! Status. Every other role derives its cells from its critical children:
//! a leaf update overwrites the leaf cell and then walks up the parent
//! chain, merging the new value into each ancestor until an ancestor's
//! value stops changing.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Concurrent, lock-per-node propagation of leaf updates
//!
//! # Locking
//!
//! Each cell has its own mutex. A composite holds its own cell lock while
//! it reads the live cells of its children, and releases it before the
//! merge moves on to the parent. A child lock is therefore never held while
//! a parent lock is acquired, so concurrent updates from different leaves
//! cannot deadlock.
//!
//! # Precedence
//!
//! ERROR dominates MIXED. An incoming MIXED only forces a composite that
//! is not already in ERROR; otherwise the composite recomputes from its
//! children and stays in ERROR while any critical child still is.
//!
//! Status has a single forcing value, UNDEFINED. A composite with children
//! otherwise always recomputes from its critical children, whatever its
//! previous value. The pairwise combine with the previous INACTIVE or
//! ACTIVE value only applies to a composite without children.

use crate::domain::events::RoleEvent;
use crate::domain::role::RoleId;
use crate::domain::role_tree::RoleTree;
use crate::domain::state::State;
use crate::domain::status::Status;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, trace};

// ============================================================================
// Cells
// ============================================================================

#[derive(Debug)]
pub struct SafeState {
    inner: Mutex<State>,
}

impl SafeState {
    pub fn new(state: State) -> Self {
        Self {
            inner: Mutex::new(state),
        }
    }

    pub fn get(&self) -> State {
        *self.inner.lock()
    }

    pub fn set(&self, state: State) {
        *self.inner.lock() = state;
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.lock()
    }
}

#[derive(Debug)]
pub struct SafeStatus {
    inner: Mutex<Status>,
}

impl SafeStatus {
    pub fn new(status: Status) -> Self {
        Self {
            inner: Mutex::new(status),
        }
    }

    pub fn get(&self) -> Status {
        *self.inner.lock()
    }

    pub fn set(&self, status: Status) {
        *self.inner.lock() = status;
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Status> {
        self.inner.lock()
    }
}

// ============================================================================
// Propagation
// ============================================================================

impl RoleTree {
    /// Report a new State for `id`.
    ///
    /// On a Task or Call role the value overwrites the cell; on any other
    /// role it is merged as if it came from a critical child.
    pub fn update_state(&self, id: RoleId, state: State) {
        let node = self.node(id);
        if !node.is_leaf() {
            if let Some(merged) = self.merge_state(id, state, true) {
                self.propagate_state(id, merged);
            }
            return;
        }

        {
            let mut cell = node.state.lock();
            if *cell == state {
                return;
            }
            *cell = state;
        }
        trace!(role = %self.get_path(id), state = %state, "leaf state updated");
        self.emit_state(id, state);

        // A non-critical leaf entering ERROR must not disturb its ancestors.
        if node.is_critical() || state != State::Error {
            self.propagate_state(id, state);
        }
    }

    /// Report a new Status for `id`. Leaves always overwrite and propagate.
    pub fn update_status(&self, id: RoleId, status: Status) {
        let node = self.node(id);
        if !node.is_leaf() {
            if let Some(merged) = self.merge_status(id, status, true) {
                self.propagate_status(id, merged);
            }
            return;
        }

        let changed = {
            let mut cell = node.status.lock();
            let changed = *cell != status;
            *cell = status;
            changed
        };
        if changed {
            trace!(role = %self.get_path(id), status = %status, "leaf status updated");
            self.emit_status(id, status);
        }
        self.propagate_status(id, status);
    }

    fn propagate_state(&self, from: RoleId, state: State) {
        let mut current = from;
        let mut value = state;
        loop {
            let Some(parent) = self.parent_for_propagation(current) else {
                return;
            };
            let critical = self.node(current).is_critical();
            match self.merge_state(parent, value, critical) {
                Some(merged) => {
                    current = parent;
                    value = merged;
                }
                None => return,
            }
        }
    }

    fn propagate_status(&self, from: RoleId, status: Status) {
        let mut current = from;
        let mut value = status;
        loop {
            let Some(parent) = self.parent_for_propagation(current) else {
                return;
            };
            let critical = self.node(current).is_critical();
            match self.merge_status(parent, value, critical) {
                Some(merged) => {
                    current = parent;
                    value = merged;
                }
                None => return,
            }
        }
    }

    fn parent_for_propagation(&self, id: RoleId) -> Option<RoleId> {
        let parent = self.node(id).parent();
        if parent.is_none() && id != self.root() {
            error!(
                role = %self.get_path(id),
                "role has no parent during propagation, the tree is not linked"
            );
            debug_assert!(false, "unlinked role {} during propagation", id);
        }
        parent
    }

    /// Merge `incoming` into a composite. Returns the new value when the
    /// cell changed.
    fn merge_state(&self, id: RoleId, incoming: State, sender_critical: bool) -> Option<State> {
        let node = self.node(id);
        let merged = {
            let mut cell = node.state.lock();
            let current = *cell;
            if current == incoming {
                return None;
            }
            // an incoming MIXED does not force a role already in ERROR
            let forced = sender_critical
                && incoming.is_forcing()
                && !(incoming == State::Mixed && current == State::Error);
            let next = if forced {
                incoming
            } else {
                self.aggregate_children_state(id)
            };
            if next == current {
                return None;
            }
            *cell = next;
            next
        };
        debug!(role = %self.get_path(id), state = %merged, "aggregated state changed");
        self.emit_state(id, merged);
        Some(merged)
    }

    fn merge_status(&self, id: RoleId, incoming: Status, sender_critical: bool) -> Option<Status> {
        let node = self.node(id);
        let merged = {
            let mut cell = node.status.lock();
            let current = *cell;
            if current == incoming {
                return None;
            }
            let next = if incoming == Status::Undefined && sender_critical {
                Status::Undefined
            } else if !node.children().is_empty() {
                self.aggregate_children_status(id)
            } else if matches!(current, Status::Inactive | Status::Active) {
                current.x(incoming)
            } else {
                incoming
            };
            if next == current {
                return None;
            }
            *cell = next;
            next
        };
        debug!(role = %self.get_path(id), status = %merged, "aggregated status changed");
        self.emit_status(id, merged);
        Some(merged)
    }

    /// Combined State of the critical children of `id`, INVARIANT if none.
    pub fn aggregate_children_state(&self, id: RoleId) -> State {
        State::aggregate(
            self.get_roles(id)
                .into_iter()
                .map(|child| self.node(child))
                .filter(|child| child.is_critical())
                .map(|child| child.state()),
        )
    }

    /// Combined Status of the critical children of `id`, INVARIANT if none.
    pub fn aggregate_children_status(&self, id: RoleId) -> Status {
        Status::aggregate(
            self.get_roles(id)
                .into_iter()
                .map(|child| self.node(child))
                .filter(|child| child.is_critical())
                .map(|child| child.status()),
        )
    }

    /// Recompute every composite bottom-up from its children's current
    /// cells. Used once a tree has been built or copied, before any leaf
    /// update arrives.
    pub fn refresh_aggregates(&self) {
        self.refresh_node(self.root());
    }

    fn refresh_node(&self, id: RoleId) {
        let children = self.get_roles(id);
        for &child in &children {
            self.refresh_node(child);
        }
        let node = self.node(id);
        if node.is_leaf() || children.is_empty() {
            return;
        }

        let state = self.aggregate_children_state(id);
        let state_changed = {
            let mut cell = node.state.lock();
            std::mem::replace(&mut *cell, state) != state
        };
        if state_changed {
            self.emit_state(id, state);
        }

        let status = self.aggregate_children_status(id);
        let status_changed = {
            let mut cell = node.status.lock();
            std::mem::replace(&mut *cell, status) != status
        };
        if status_changed {
            self.emit_status(id, status);
        }
    }

    fn emit_state(&self, id: RoleId, state: State) {
        if id == self.root() {
            self.root_state.send_replace(state);
        }
        if let Some(sink) = &self.sink {
            sink.send_role_event(RoleEvent::state_changed(
                self.context().environment_id,
                self.get_name(id),
                self.get_path(id),
                state,
            ));
        }
    }

    fn emit_status(&self, id: RoleId, status: Status) {
        if id == self.root() {
            self.root_status.send_replace(status);
        }
        if let Some(sink) = &self.sink {
            sink.send_role_event(RoleEvent::status_changed(
                self.context().environment_id,
                self.get_name(id),
                self.get_path(id),
                status,
            ));
        }
    }
}
