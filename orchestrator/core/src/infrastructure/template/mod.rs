// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Template
//!
//! Variable resolution for workflow templates: the `{{ }}` expression
//! language, field accessors and the staged resolution sequence.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Resolve templated role fields into final strings

pub mod expression;
pub mod fields;
pub mod lexer;
pub mod sequence;

pub use expression::{EvalContext, ExpressionError, RolePaths};
pub use fields::{Field, Fields};
pub use sequence::{disabled_role_callback, execute, null_callback, Stage, StagedTarget};

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Not a failure: the role resolved itself as disabled and the
    /// remaining stages were skipped.
    #[error("role {path} disabled")]
    RoleDisabled { path: String },

    #[error("template error in role {path} ({field}): {source}")]
    Expression {
        path: String,
        field: String,
        #[source]
        source: ExpressionError,
    },

    #[error("invalid iterator range in role {path}: {reason}")]
    InvalidIteratorRange { path: String, reason: String },

    #[error("invalid timeout in role {path}: {reason}")]
    InvalidTimeout { path: String, reason: String },
}

impl TemplateError {
    pub fn is_role_disabled(&self) -> bool {
        matches!(self, TemplateError::RoleDisabled { .. })
    }
}
