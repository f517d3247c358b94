// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cleanup accounting.
//!
//! Teardown attempts every step and records what failed instead of stopping at
//! the first error. A [`CleanupReport`] is the accumulated outcome.

use std::fmt;
use tracing::warn;

/// One teardown step that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    /// Step name, e.g. `terminate` or `remove-workspace`
    pub step: String,
    /// What the step acted on (identity id, path, pattern)
    pub target: String,
    pub error: String,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.step, self.target, self.error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    attempted: usize,
    failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one step. Failures are logged and kept.
    pub fn record<E: fmt::Display>(
        &mut self,
        step: &str,
        target: impl Into<String>,
        result: Result<(), E>,
    ) {
        self.attempted += 1;
        if let Err(e) = result {
            let failure = CleanupFailure {
                step: step.to_string(),
                target: target.into(),
                error: e.to_string(),
            };
            warn!(step = %failure.step, subject = %failure.target, error = %failure.error, "Cleanup step failed");
            self.failures.push(failure);
        }
    }

    pub fn merge(&mut self, other: CleanupReport) {
        self.attempted += other.attempted;
        self.failures.extend(other.failures);
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn failures(&self) -> &[CleanupFailure] {
        &self.failures
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
