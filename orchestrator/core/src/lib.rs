// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Legion core
//!
//! Domain types and host adapters for the minion-swarm scale harness.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Everything the fleet orchestrator drives: identity
//!   allocation, config materialization, credentials, process supervision and
//!   the control-plane event monitor

pub mod domain;
pub mod infrastructure;

pub use domain::*;
