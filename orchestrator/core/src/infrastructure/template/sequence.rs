// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Staged resolution
//!
//! A role's templated fields are resolved in six ordered stages. Each
//! stage sees a different slice of the variable stack, so that defaults
//! can only reference what the parent already resolved, vars can reference
//! defaults, and so on:
//!
//! | Stage      | Fields                                         | Own layers visible        |
//! |------------|------------------------------------------------|---------------------------|
//! | `Enabled`  | `enabled`                                      | locals                    |
//! | `Defaults` | defaults entries                               | locals                    |
//! | `Vars`     | vars entries                                   | locals, defaults          |
//! | `UserVars` | user vars entries                              | locals, defaults, vars    |
//! | `Identity` | name, task class, call target, traits, include | all                       |
//! | `Wiring`   | constraints, bind/connect, `enabled` again     | all + `this`/`parent`/`up`|
//!
//! All fields of one stage are resolved against the stack captured before
//! the stage starts.

use super::expression::{EvalContext, RolePaths};
use super::fields::Fields;
use super::TemplateError;
use crate::domain::configuration::ConfigSource;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Enabled,
    Defaults,
    Vars,
    UserVars,
    Identity,
    Wiring,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Enabled,
        Stage::Defaults,
        Stage::Vars,
        Stage::UserVars,
        Stage::Identity,
        Stage::Wiring,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "STAGE{}", self.index())
    }
}

/// Something with staged templated fields, typically one role of a tree.
pub trait StagedTarget {
    fn path(&self) -> String;

    fn is_enabled(&self) -> bool;

    /// Flattened variables visible while resolving `stage`.
    fn stack(&self, stage: Stage) -> BTreeMap<String, String>;

    fn role_paths(&self) -> RolePaths;

    /// Mutable handles over the fields resolved at `stage`.
    fn fields(&mut self, stage: Stage) -> Fields<'_>;
}

/// Runs after every stage; an error stops the sequence.
pub type StageCallback = fn(Stage, &dyn StagedTarget) -> Result<(), TemplateError>;

pub fn null_callback(_: Stage, _: &dyn StagedTarget) -> Result<(), TemplateError> {
    Ok(())
}

/// Stop with [`TemplateError::RoleDisabled`] once `enabled` resolves to
/// false, either up front or after the wiring stage re-evaluates it.
pub fn disabled_role_callback(stage: Stage, target: &dyn StagedTarget) -> Result<(), TemplateError> {
    if matches!(stage, Stage::Enabled | Stage::Wiring) && !target.is_enabled() {
        return Err(TemplateError::RoleDisabled { path: target.path() });
    }
    Ok(())
}

/// Resolve every stage of `target` in order.
pub fn execute(
    target: &mut dyn StagedTarget,
    config: Option<&dyn ConfigSource>,
    on_stage: StageCallback,
) -> Result<(), TemplateError> {
    for stage in Stage::ALL {
        let stack = target.stack(stage);
        let role_paths = (stage == Stage::Wiring).then(|| target.role_paths());
        let path = target.path();

        let ctx = EvalContext::new(&stack)
            .with_config(config)
            .with_role(role_paths.as_ref());
        let mut fields = target.fields(stage);
        trace!(role = %path, stage = %stage, fields = fields.len(), "resolving stage");
        execute_fields(&mut fields, &ctx, &path)?;
        drop(fields);

        if let Err(e) = on_stage(stage, &*target) {
            if !e.is_role_disabled() {
                warn!(role = %path, stage = %stage, error = %e, "template processing error");
            }
            return Err(e);
        }
    }
    Ok(())
}

/// Render every field against `ctx`, writing results back in place.
pub fn execute_fields(fields: &mut Fields<'_>, ctx: &EvalContext<'_>, path: &str) -> Result<(), TemplateError> {
    for field in fields.iter_mut() {
        if !field.get().contains("{{") {
            continue;
        }
        let rendered = ctx.render(field.get()).map_err(|source| TemplateError::Expression {
            path: path.to_string(),
            field: field.label(),
            source,
        })?;
        field.set(rendered);
    }
    Ok(())
}
