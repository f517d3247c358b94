// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Legion CLI

pub mod args;
pub mod plan;
pub mod run;
pub mod sweep;

pub use self::args::FleetArgs;
pub use self::sweep::SweepArgs;
