// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Operational State
//!
//! The lifecycle FSM value carried by every role, and the pairwise combine
//! rule used to aggregate the States of sibling roles.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Value object for role State and its aggregation algebra

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operational state of a role or task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Unknown,
    #[default]
    Standby,
    Configured,
    Running,
    Error,
    Done,
    Mixed,
    Invariant,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Unknown => "UNKNOWN",
            State::Standby => "STANDBY",
            State::Configured => "CONFIGURED",
            State::Running => "RUNNING",
            State::Error => "ERROR",
            State::Done => "DONE",
            State::Mixed => "MIXED",
            State::Invariant => "INVARIANT",
        }
    }

    /// Pairwise combine.
    ///
    /// Equal values combine to themselves, ERROR wins over everything,
    /// INVARIANT is the identity and any other mismatch yields MIXED.
    pub fn x(self, other: State) -> State {
        if self == other {
            return self;
        }
        match (self, other) {
            (State::Error, _) | (_, State::Error) => State::Error,
            (State::Invariant, s) | (s, State::Invariant) => s,
            _ => State::Mixed,
        }
    }

    /// Whether a composite role stores this value directly instead of
    /// recomputing from its children.
    pub fn is_forcing(&self) -> bool {
        matches!(self, State::Error | State::Mixed)
    }

    /// Combine a sequence of child states.
    ///
    /// An empty sequence is INVARIANT. ERROR short-circuits; MIXED does not,
    /// so a later ERROR still dominates regardless of child order.
    pub fn aggregate<I>(states: I) -> State
    where
        I: IntoIterator<Item = State>,
    {
        let mut acc = State::Invariant;
        for s in states {
            acc = acc.x(s);
            if acc == State::Error {
                break;
            }
        }
        acc
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = std::convert::Infallible;

    /// Unrecognised names map to UNKNOWN.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "STANDBY" => State::Standby,
            "CONFIGURED" => State::Configured,
            "RUNNING" => State::Running,
            "ERROR" => State::Error,
            "DONE" => State::Done,
            "MIXED" => State::Mixed,
            "INVARIANT" => State::Invariant,
            _ => State::Unknown,
        })
    }
}
