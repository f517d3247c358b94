// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Fleet Orchestrator
//!
//! Runs an ordered list of deployments:
//!
//! 1. Prepare every deployment (configs, credentials), then start them in order
//! 2. Idle until the cancellation token fires
//! 3. Shut the deployments down in reverse order
//! 4. Final teardown: sweep-kill stray worker (and control-plane) processes,
//!    then remove the workspace root unless the run keeps it
//!
//! Steps 3 and 4 run on every path: after an interrupt during the idle wait,
//! after an interrupt during startup, and after a startup error. Status
//! changes are published on a watch channel.

use legion_core::domain::acceptance::AcceptanceSet;
use legion_core::domain::cleanup::CleanupReport;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{remove_tree, ControlPlaneInstance, Deployment, FleetContext, FleetError, WorkerFleet};
use crate::domain::member::MemberSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FleetStatus {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

/// Outcome of a run that shut down without a startup error.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Final phase of every member, control plane first
    pub members: Vec<MemberSnapshot>,
    pub cleanup: CleanupReport,
    /// The interrupt arrived before every deployment had started
    pub interrupted_startup: bool,
    pub elapsed: Duration,
}

pub struct FleetOrchestrator {
    ctx: FleetContext,
    deployments: Vec<Box<dyn Deployment>>,
    status: watch::Sender<FleetStatus>,
}

impl FleetOrchestrator {
    pub fn new(ctx: FleetContext, deployments: Vec<Box<dyn Deployment>>) -> Self {
        let (status, _) = watch::channel(FleetStatus::Starting);
        Self {
            ctx,
            deployments,
            status,
        }
    }

    /// The standard run: a control plane when `master_too` is set, then the
    /// worker fleet.
    pub fn for_context(ctx: FleetContext) -> Self {
        let mut deployments: Vec<Box<dyn Deployment>> = Vec::new();
        if ctx.spec.master_too {
            deployments.push(Box::new(ControlPlaneInstance::new()));
        }
        deployments.push(Box::new(WorkerFleet::allocate(&ctx)));
        Self::new(ctx, deployments)
    }

    pub fn status(&self) -> watch::Receiver<FleetStatus> {
        self.status.subscribe()
    }

    pub fn snapshot(&self) -> Vec<MemberSnapshot> {
        self.deployments.iter().flat_map(|d| d.snapshot()).collect()
    }

    fn set_status(&self, status: FleetStatus) {
        debug!(?status, "Fleet status");
        self.status.send_replace(status);
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<RunSummary, FleetError> {
        let started_at = Instant::now();
        self.set_status(FleetStatus::Starting);
        info!(
            root = %self.ctx.layout.root().display(),
            workers = self.ctx.spec.minions,
            control_plane = self.ctx.spec.master_too,
            "Starting fleet"
        );

        let startup = {
            let ctx = &self.ctx;
            let deployments = &mut self.deployments;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = start_all(ctx, deployments) => Some(result),
            }
        };

        let mut interrupted_startup = false;
        let mut startup_error = None;
        match startup {
            Some(Ok(())) => {
                self.set_status(FleetStatus::Running);
                info!(elapsed = ?started_at.elapsed(), "Fleet running, waiting for interrupt");
                self.idle(&cancel).await;
                info!("Interrupt received, shutting down");
            }
            Some(Err(e)) => {
                error!(error = %e, "Fleet startup failed");
                startup_error = Some(e);
            }
            None => {
                warn!("Interrupted during startup, shutting down");
                interrupted_startup = true;
            }
        }

        self.set_status(FleetStatus::ShuttingDown);
        let mut cleanup = CleanupReport::new();
        for deployment in self.deployments.iter_mut().rev() {
            info!(deployment = deployment.name(), "Shutting down");
            cleanup.merge(deployment.shutdown(&self.ctx).await);
        }
        cleanup.merge(self.final_teardown().await);

        if cleanup.is_clean() {
            info!(steps = cleanup.attempted(), "Teardown complete");
        } else {
            warn!(
                steps = cleanup.attempted(),
                failures = cleanup.failures().len(),
                "Teardown finished with failures"
            );
        }

        let summary = RunSummary {
            members: self.snapshot(),
            cleanup,
            interrupted_startup,
            elapsed: started_at.elapsed(),
        };
        self.set_status(FleetStatus::Stopped);

        match startup_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    async fn idle(&self, cancel: &CancellationToken) {
        let interval = self.ctx.spec.idle_interval;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {
                    debug!(accepted = self.ctx.acceptance.count(AcceptanceSet::Accepted), "Fleet idle");
                }
            }
        }
    }

    async fn final_teardown(&self) -> CleanupReport {
        let mut report = CleanupReport::new();
        let spec = &self.ctx.spec;

        let mut patterns = vec![spec.binaries.minion_pattern()];
        if spec.master_too {
            patterns.push(spec.binaries.master_pattern());
        }
        for pattern in patterns {
            let result = self.ctx.supervisor.sweep_kill(&pattern).await;
            if let Ok(killed) = &result {
                debug!(pattern = %pattern, killed, "Sweep finished");
            }
            report.record("sweep", pattern.as_str(), result.map(|_| ()));
        }

        let root = self.ctx.layout.root();
        if spec.no_clean {
            info!(root = %root.display(), "Keeping workspace");
        } else {
            report.record("remove-root", root.display().to_string(), remove_tree(root));
        }
        report
    }
}

async fn start_all(
    ctx: &FleetContext,
    deployments: &mut [Box<dyn Deployment>],
) -> Result<(), FleetError> {
    for deployment in deployments.iter_mut() {
        debug!(deployment = deployment.name(), "Preparing");
        deployment.prepare(ctx).await?;
    }
    for deployment in deployments.iter_mut() {
        info!(deployment = deployment.name(), "Starting");
        deployment.start(ctx).await?;
    }
    Ok(())
}
