// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod template;
pub mod workflow_parser;
pub mod repositories;
pub mod translator;
pub mod config_source;
pub mod event_bus;

pub use config_source::StaticConfigSource;
pub use event_bus::{DomainEvent, EventBus, EventBusError, EventReceiver};
pub use repositories::{InMemoryWorkflowRepository, LocalWorkflowRepository};
pub use translator::{HashingTranslator, WorkflowGenerator};
pub use workflow_parser::{WorkflowParseError, WorkflowParser, WorkflowTemplate};
