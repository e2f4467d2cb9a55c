// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for runctl CLI

pub mod config;
pub mod workflow;

pub use self::config::ConfigCommand;
pub use self::workflow::WorkflowCommand;
