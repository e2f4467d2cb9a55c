// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! runctl core
//!
//! Role tree, staged variable resolution and State/Status aggregation for
//! the runctl control plane.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Expand workflow templates into per-environment role trees
//!   and keep their aggregated State/Status consistent

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
