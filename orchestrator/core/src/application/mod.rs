// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod role_processor;
pub mod workflow_loader;
pub mod environment;

// Re-export use cases for convenience
pub use environment::{Environment, EnvironmentError};
pub use role_processor::{ExpansionError, Processed, RoleProcessor};
pub use workflow_loader::WorkflowLoader;
