// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Member Lifecycle
//!
//! Every launched process (worker or control plane) moves through
//! [`IdentityPhase`] under the rules of [`IdentityPhase::can_transition_to`]:
//!
//! ```text
//! Allocated → ConfigWritten → [CredentialsProvisioned] → Launched
//!   → [AwaitingAcceptance → Accepted
//!       → [AwaitingLegionAcceptance → LegionAccepted
//!          → AwaitingCacheConfirm → CacheConfirmed]]
//!   → Running → Signaled → Terminated → CleanedUp
//! ```
//!
//! Any launched phase may jump to `Signaled` (an interrupt can land at any
//! wait-gate). Members that never launched go straight to `CleanedUp`.

use legion_core::domain::identity::WorkerIdentity;
use legion_core::domain::process::ProcessHandle;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityPhase {
    Allocated,
    ConfigWritten,
    CredentialsProvisioned,
    Launched,
    AwaitingAcceptance,
    Accepted,
    AwaitingLegionAcceptance,
    LegionAccepted,
    AwaitingCacheConfirm,
    CacheConfirmed,
    Running,
    Signaled,
    Terminated,
    CleanedUp,
}

impl IdentityPhase {
    /// Whether a process has been started for this member.
    pub fn is_launched(&self) -> bool {
        use IdentityPhase::*;
        matches!(
            self,
            Launched
                | AwaitingAcceptance
                | Accepted
                | AwaitingLegionAcceptance
                | LegionAccepted
                | AwaitingCacheConfirm
                | CacheConfirmed
                | Running
        )
    }

    pub fn can_transition_to(&self, next: IdentityPhase) -> bool {
        use IdentityPhase::*;
        if next == Signaled {
            return self.is_launched();
        }
        match (self, next) {
            (Allocated, ConfigWritten) => true,
            (ConfigWritten, CredentialsProvisioned | Launched) => true,
            (CredentialsProvisioned, Launched) => true,
            (Launched, AwaitingAcceptance | Running) => true,
            (AwaitingAcceptance, Accepted) => true,
            (Accepted, AwaitingLegionAcceptance | Running) => true,
            (AwaitingLegionAcceptance, LegionAccepted) => true,
            (LegionAccepted, AwaitingCacheConfirm) => true,
            (AwaitingCacheConfirm, CacheConfirmed) => true,
            (CacheConfirmed, Running) => true,
            (Signaled, Terminated) => true,
            (Terminated, CleanedUp) => true,
            (Allocated | ConfigWritten | CredentialsProvisioned, CleanedUp) => true,
            _ => false,
        }
    }
}

impl fmt::Display for IdentityPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{label}: invalid phase transition {from} -> {to}")]
pub struct PhaseError {
    pub label: String,
    pub from: IdentityPhase,
    pub to: IdentityPhase,
}

/// Current phase of one member, advanced only along legal transitions.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    label: String,
    phase: IdentityPhase,
}

impl Lifecycle {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            phase: IdentityPhase::Allocated,
        }
    }

    pub fn phase(&self) -> IdentityPhase {
        self.phase
    }

    pub fn advance(&mut self, next: IdentityPhase) -> Result<(), PhaseError> {
        if !self.phase.can_transition_to(next) {
            return Err(PhaseError {
                label: self.label.clone(),
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }
}

/// One worker identity and its process.
#[derive(Debug, Clone)]
pub struct FleetMember {
    pub identity: WorkerIdentity,
    pub lifecycle: Lifecycle,
    pub handle: Option<ProcessHandle>,
}

impl FleetMember {
    pub fn new(identity: WorkerIdentity) -> Self {
        Self {
            lifecycle: Lifecycle::new(identity.id.clone()),
            identity,
            handle: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn phase(&self) -> IdentityPhase {
        self.lifecycle.phase()
    }

    pub fn snapshot(&self) -> MemberSnapshot {
        MemberSnapshot {
            label: self.identity.id.clone(),
            phase: self.phase(),
            pid: self.handle.as_ref().and_then(|h| h.spawn_pid),
        }
    }
}

/// Point-in-time view of a member for status output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub label: String,
    pub phase: IdentityPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}
