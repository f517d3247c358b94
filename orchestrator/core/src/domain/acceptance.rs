// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Shared Acceptance State and Wait-Gates
//!
//! The event monitor is the only writer of [`AcceptanceState`]; the
//! orchestrator only reads it, through [`wait_for`]. Both sets map an identity
//! id to the moment it was first seen. Entries are never removed during a run,
//! and inserting an id that is already present changes nothing.
//!
//! Gates poll with a fixed interval rather than waiting on a notification.
//! Without a timeout a gate can stall forever, so every gate logs its
//! progress periodically.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

/// Which of the two shared sets a gate watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceSet {
    /// Identity saw its registration acknowledged
    Accepted,
    /// Identity completed a cache-warm round-trip
    Cached,
}

impl fmt::Display for AcceptanceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptanceSet::Accepted => f.write_str("accepted"),
            AcceptanceSet::Cached => f.write_str("cached"),
        }
    }
}

/// The "accepted" and "cached" sets shared between monitor and orchestrator.
#[derive(Debug, Default)]
pub struct AcceptanceState {
    accepted: RwLock<HashMap<String, DateTime<Utc>>>,
    cached: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl AcceptanceState {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, set: AcceptanceSet) -> &RwLock<HashMap<String, DateTime<Utc>>> {
        match set {
            AcceptanceSet::Accepted => &self.accepted,
            AcceptanceSet::Cached => &self.cached,
        }
    }

    /// Record `id` in `set`. Returns `true` only on the first insert.
    pub fn mark(&self, set: AcceptanceSet, id: &str) -> bool {
        let mut entries = self.set(set).write();
        if entries.contains_key(id) {
            return false;
        }
        entries.insert(id.to_string(), Utc::now());
        true
    }

    pub fn mark_accepted(&self, id: &str) -> bool {
        self.mark(AcceptanceSet::Accepted, id)
    }

    pub fn mark_cached(&self, id: &str) -> bool {
        self.mark(AcceptanceSet::Cached, id)
    }

    pub fn contains(&self, set: AcceptanceSet, id: &str) -> bool {
        self.set(set).read().contains_key(id)
    }

    /// When `id` first appeared in `set`.
    pub fn first_seen(&self, set: AcceptanceSet, id: &str) -> Option<DateTime<Utc>> {
        self.set(set).read().get(id).copied()
    }

    /// Ids from `required` that are not yet present in `set`.
    pub fn missing(&self, set: AcceptanceSet, required: &[String]) -> Vec<String> {
        let entries = self.set(set).read();
        required
            .iter()
            .filter(|id| !entries.contains_key(id.as_str()))
            .cloned()
            .collect()
    }

    pub fn count(&self, set: AcceptanceSet) -> usize {
        self.set(set).read().len()
    }
}

/// Polling behaviour of every wait-gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatePolicy {
    /// How often a gate re-checks the shared set
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Give up after this long; `None` waits forever
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// How often a waiting gate reports that it is still waiting
    #[serde(default = "default_progress_interval", with = "humantime_serde")]
    pub progress_interval: Duration,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            timeout: None,
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_progress_interval() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("timed out after {waited:?} waiting for {set} ids: {}", .missing.join(", "))]
    TimedOut {
        set: AcceptanceSet,
        missing: Vec<String>,
        waited: Duration,
    },
}

/// Block until every id in `required` is present in `set`.
///
/// Returns how long the gate waited. Presence is checked per id, so
/// duplicate inserts of one id can never satisfy a gate that still lacks a
/// different one.
pub async fn wait_for(
    state: &AcceptanceState,
    set: AcceptanceSet,
    required: &[String],
    policy: &GatePolicy,
) -> Result<Duration, GateError> {
    let started = Instant::now();
    let mut last_report = started;

    loop {
        let missing = state.missing(set, required);
        if missing.is_empty() {
            let waited = started.elapsed();
            debug!(%set, ids = required.len(), ?waited, "Wait-gate satisfied");
            return Ok(waited);
        }

        let waited = started.elapsed();
        if let Some(timeout) = policy.timeout {
            if waited >= timeout {
                return Err(GateError::TimedOut {
                    set,
                    missing,
                    waited,
                });
            }
        }

        if last_report.elapsed() >= policy.progress_interval {
            info!(
                %set,
                missing = %missing.join(", "),
                waited_secs = waited.as_secs(),
                "Still waiting"
            );
            last_report = Instant::now();
        }

        tokio::time::sleep(policy.poll_interval).await;
    }
}
