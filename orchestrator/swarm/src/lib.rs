// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `legion-swarm`: Fleet Orchestration
//!
//! Drives a fleet of simulated workers (and optionally a local control plane)
//! from allocation through launch, acceptance gating, idle and teardown.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `IdentityPhase` lifecycle, `FleetMember` |
//! | [`application`] | Application | `Deployment`, `WorkerFleet`, `ControlPlaneInstance`, `FleetOrchestrator` |
//!
//! ## Key Concepts
//!
//! - **Deployment**: one independently startable and stoppable part of a run.
//!   A run is an ordered list of deployments; shutdown walks it in reverse.
//! - **Wait-gate**: a polling wait on the shared acceptance sets, written only
//!   by the event monitor.
//! - **Teardown**: every cleanup step is attempted and recorded in a
//!   `CleanupReport`; a final sweep always runs, on the interrupt path and on
//!   the abort path.

pub mod application;
pub mod domain;

pub use domain::*;
