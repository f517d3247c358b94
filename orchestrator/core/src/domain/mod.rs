// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Fleet domain types.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Fleet description, identities, shared acceptance state and
//!   the seams (`ProcessSupervisor`, `RemoteCommands`) adapters implement

pub mod acceptance;
pub mod cleanup;
pub mod events;
pub mod fleet_spec;
pub mod identity;
pub mod process;
pub mod remote;
