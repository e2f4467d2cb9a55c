// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Role tree aggregate, its value objects and the ports it talks through.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure model of roles, variables, constraints, channels and
//!   the State/Status algebra

pub mod state;
pub mod status;
pub mod var_map;
pub mod constraint;
pub mod channel;
pub mod task;
pub mod role;
pub mod role_tree;
pub mod aggregation;
pub mod environment;
pub mod events;
pub mod controller;
pub mod repository;
pub mod configuration;
pub mod run_control_config;
