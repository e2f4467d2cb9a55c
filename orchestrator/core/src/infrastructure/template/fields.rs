// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Field accessors
//!
//! Uniform get/set handles over the templated strings of a role, so one
//! resolution loop can rewrite plain fields, map entries and constraint
//! values alike.

use crate::domain::channel::{Inbound, Outbound};
use crate::domain::constraint::{Constraint, Constraints};
use crate::domain::var_map::VarMap;

pub trait Field {
    fn get(&self) -> &str;
    fn set(&mut self, value: String);

    /// Short label used in diagnostics.
    fn label(&self) -> String;
}

pub type Fields<'a> = Vec<Box<dyn Field + 'a>>;

pub struct PointerField<'a> {
    label: &'static str,
    value: &'a mut String,
}

impl Field for PointerField<'_> {
    fn get(&self) -> &str {
        self.value
    }

    fn set(&mut self, value: String) {
        *self.value = value;
    }

    fn label(&self) -> String {
        self.label.to_string()
    }
}

pub struct MapItemField<'a> {
    key: String,
    value: &'a mut String,
}

impl Field for MapItemField<'_> {
    fn get(&self) -> &str {
        self.value
    }

    fn set(&mut self, value: String) {
        *self.value = value;
    }

    fn label(&self) -> String {
        format!("var '{}'", self.key)
    }
}

/// Only the constraint value is templated; the attribute is a literal key.
pub struct ConstraintField<'a>(&'a mut Constraint);

impl Field for ConstraintField<'_> {
    fn get(&self) -> &str {
        &self.0.value
    }

    fn set(&mut self, value: String) {
        self.0.value = value;
    }

    fn label(&self) -> String {
        format!("constraint '{}'", self.0.attribute)
    }
}

pub fn wrap_pointer<'a>(label: &'static str, value: &'a mut String) -> Box<dyn Field + 'a> {
    Box::new(PointerField { label, value })
}

pub fn wrap_map_items(map: &mut VarMap) -> Fields<'_> {
    map.raw_mut()
        .iter_mut()
        .map(|(key, value)| {
            Box::new(MapItemField {
                key: key.clone(),
                value,
            }) as Box<dyn Field + '_>
        })
        .collect()
}

pub fn wrap_constraints(constraints: &mut Constraints) -> Fields<'_> {
    constraints
        .iter_mut()
        .map(|c| Box::new(ConstraintField(c)) as Box<dyn Field + '_>)
        .collect()
}

/// Name, global name, target and rate logging of every inbound channel.
pub fn wrap_bind_fields(bind: &mut [Inbound]) -> Fields<'_> {
    let mut fields: Fields<'_> = Vec::new();
    for inbound in bind {
        fields.push(wrap_pointer("bind.name", &mut inbound.channel.name));
        fields.push(wrap_pointer("bind.global", &mut inbound.global));
        fields.push(wrap_pointer("bind.target", &mut inbound.channel.target));
        fields.push(wrap_pointer("bind.rateLogging", &mut inbound.channel.rate_logging));
    }
    fields
}

/// Name, target and rate logging of every outbound channel.
pub fn wrap_connect_fields(connect: &mut [Outbound]) -> Fields<'_> {
    let mut fields: Fields<'_> = Vec::new();
    for outbound in connect {
        fields.push(wrap_pointer("connect.name", &mut outbound.channel.name));
        fields.push(wrap_pointer("connect.target", &mut outbound.channel.target));
        fields.push(wrap_pointer("connect.rateLogging", &mut outbound.channel.rate_logging));
    }
    fields
}
