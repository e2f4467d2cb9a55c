// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Deployment Status
//!
//! Deployment-lifecycle value of a role and the product table used to
//! aggregate sibling statuses.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Value object for role Status and its aggregation algebra

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Undefined,
    #[default]
    Inactive,
    Partial,
    Active,
    Undeployable,
    Invariant,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Undefined => "UNDEFINED",
            Status::Inactive => "INACTIVE",
            Status::Partial => "PARTIAL",
            Status::Active => "ACTIVE",
            Status::Undeployable => "UNDEPLOYABLE",
            Status::Invariant => "INVARIANT",
        }
    }

    /// Pairwise combine following the status product table.
    ///
    /// | x            | UNDEFINED | INACTIVE     | PARTIAL      | ACTIVE       | UNDEPLOYABLE | INVARIANT    |
    /// |--------------|-----------|--------------|--------------|--------------|--------------|--------------|
    /// | UNDEFINED    | UNDEFINED | UNDEFINED    | UNDEFINED    | UNDEFINED    | UNDEFINED    | UNDEFINED    |
    /// | INACTIVE     | UNDEFINED | INACTIVE     | PARTIAL      | PARTIAL      | UNDEPLOYABLE | INACTIVE     |
    /// | PARTIAL      | UNDEFINED | PARTIAL      | PARTIAL      | PARTIAL      | UNDEPLOYABLE | PARTIAL      |
    /// | ACTIVE       | UNDEFINED | PARTIAL      | PARTIAL      | ACTIVE       | UNDEPLOYABLE | ACTIVE       |
    /// | UNDEPLOYABLE | UNDEFINED | UNDEPLOYABLE | UNDEPLOYABLE | UNDEPLOYABLE | UNDEPLOYABLE | UNDEPLOYABLE |
    /// | INVARIANT    | UNDEFINED | INACTIVE     | PARTIAL      | ACTIVE       | UNDEPLOYABLE | INVARIANT    |
    pub fn x(self, other: Status) -> Status {
        use Status::*;
        match (self, other) {
            (Undefined, _) | (_, Undefined) => Undefined,
            (Undeployable, _) | (_, Undeployable) => Undeployable,
            (Invariant, s) | (s, Invariant) => s,
            (a, b) if a == b => a,
            _ => Partial,
        }
    }

    /// Combine a sequence of child statuses, starting from INVARIANT and
    /// stopping early on UNDEFINED.
    pub fn aggregate<I>(statuses: I) -> Status
    where
        I: IntoIterator<Item = Status>,
    {
        let mut acc = Status::Invariant;
        for s in statuses {
            acc = acc.x(s);
            if acc == Status::Undefined {
                break;
            }
        }
        acc
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "INACTIVE" => Status::Inactive,
            "PARTIAL" => Status::Partial,
            "ACTIVE" => Status::Active,
            "UNDEPLOYABLE" => Status::Undeployable,
            "INVARIANT" => Status::Invariant,
            _ => Status::Undefined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Status::*;

    #[test]
    fn test_product_table() {
        let cases = [
            (Undefined, Active, Undefined),
            (Inactive, Undefined, Undefined),
            (Inactive, Active, Partial),
            (Active, Inactive, Partial),
            (Partial, Active, Partial),
            (Partial, Inactive, Partial),
            (Partial, Partial, Partial),
            (Active, Active, Active),
            (Inactive, Inactive, Inactive),
            (Undeployable, Active, Undeployable),
            (Invariant, Undeployable, Undeployable),
            (Undeployable, Undefined, Undefined),
            (Invariant, Active, Active),
            (Inactive, Invariant, Inactive),
            (Invariant, Invariant, Invariant),
        ];
        for (a, b, expected) in cases {
            assert_eq!(a.x(b), expected, "{} x {}", a, b);
            assert_eq!(b.x(a), expected, "{} x {}", b, a);
        }
    }

    #[test]
    fn test_aggregate() {
        assert_eq!(Status::aggregate(Vec::new()), Invariant);
        assert_eq!(Status::aggregate([Active, Active]), Active);
        assert_eq!(Status::aggregate([Active, Inactive, Active]), Partial);
        assert_eq!(Status::aggregate([Active, Undefined, Undeployable]), Undefined);
        assert_eq!(Status::aggregate([Undeployable, Active]), Undeployable);
    }

    #[test]
    fn test_unknown_string_is_undefined() {
        assert_eq!("whatever".parse::<Status>().unwrap(), Undefined);
        assert_eq!("active".parse::<Status>().unwrap(), Active);
    }
}
