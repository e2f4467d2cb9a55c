// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Placement Constraints
//!
//! Ordered `(attribute, operator, value)` predicates attached to roles.
//! A role's effective constraints are its own merged over its ancestors':
//! an entry for an attribute already constrained by an ancestor replaces
//! it in place, anything else is appended.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Constraint value objects and override-by-attribute merge

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    Equals,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Equals => f.write_str("EQUALS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub attribute: String,
    pub value: String,
    #[serde(default)]
    pub operator: Operator,
}

impl Constraint {
    pub fn equals(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
            operator: Operator::Equals,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ATTR:'{}' {} '{}'", self.attribute, self.operator, self.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Constraints(Vec<Constraint>);

impl Constraints {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, constraint: Constraint) {
        self.0.push(constraint);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Constraint> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Constraint> {
        self.0.iter_mut()
    }

    pub fn get(&self, attribute: &str) -> Option<&Constraint> {
        self.0.iter().find(|c| c.attribute == attribute)
    }

    /// Merge these (child) constraints over `parent`.
    ///
    /// The result starts as a copy of the parent list; each child entry
    /// replaces the parent entry with the same attribute at its original
    /// position, or is appended when the attribute is new.
    pub fn merge_parent(&self, parent: &Constraints) -> Constraints {
        let mut merged = parent.0.clone();
        for ct in &self.0 {
            match merged.iter_mut().find(|p| p.attribute == ct.attribute) {
                Some(existing) => *existing = ct.clone(),
                None => merged.push(ct.clone()),
            }
        }
        Constraints(merged)
    }
}

impl From<Vec<Constraint>> for Constraints {
    fn from(v: Vec<Constraint>) -> Self {
        Self(v)
    }
}

impl IntoIterator for Constraints {
    type Item = Constraint;
    type IntoIter = std::vec::IntoIter<Constraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for Constraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", parts.join("; "))
    }
}
