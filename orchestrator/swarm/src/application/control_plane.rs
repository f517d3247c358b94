// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Local control-plane deployment: one process, no acceptance gate.

use async_trait::async_trait;
use legion_core::domain::cleanup::CleanupReport;
use legion_core::domain::process::LaunchSpec;
use tracing::{info, warn};

use super::{remove_tree, Deployment, FleetContext, FleetError};
use crate::domain::member::{IdentityPhase, Lifecycle, MemberSnapshot};
use legion_core::domain::process::ProcessHandle;

const LABEL: &str = "master";

pub struct ControlPlaneInstance {
    lifecycle: Lifecycle,
    handle: Option<ProcessHandle>,
}

impl ControlPlaneInstance {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(LABEL),
            handle: None,
        }
    }

    pub fn phase(&self) -> IdentityPhase {
        self.lifecycle.phase()
    }

    fn advance_logged(&mut self, next: IdentityPhase) {
        if let Err(e) = self.lifecycle.advance(next) {
            warn!(error = %e, "Skipping phase transition");
        }
    }
}

impl Default for ControlPlaneInstance {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Deployment for ControlPlaneInstance {
    fn name(&self) -> &str {
        "control-plane"
    }

    async fn prepare(&mut self, ctx: &FleetContext) -> Result<(), FleetError> {
        let path = ctx.materializer.write_master(&ctx.layout)?;
        self.lifecycle.advance(IdentityPhase::ConfigWritten)?;
        info!(config = %path.display(), "Control-plane config written");
        Ok(())
    }

    async fn start(&mut self, ctx: &FleetContext) -> Result<(), FleetError> {
        let spec = LaunchSpec::daemon(
            LABEL,
            &ctx.spec.binaries.master,
            &ctx.layout.master_dir(),
            &ctx.layout.master_pid_file(),
            ctx.spec.foreground,
        );
        let handle = ctx.supervisor.launch(spec).await?;
        self.handle = Some(handle);
        self.lifecycle.advance(IdentityPhase::Launched)?;
        self.lifecycle.advance(IdentityPhase::Running)?;
        info!("Control plane started");
        Ok(())
    }

    async fn shutdown(&mut self, ctx: &FleetContext) -> CleanupReport {
        let mut report = CleanupReport::new();

        if self.phase().is_launched() {
            self.advance_logged(IdentityPhase::Signaled);
            if let Some(handle) = &self.handle {
                let result = ctx.supervisor.terminate(handle).await.map(|_| ());
                report.record("terminate", LABEL, result);
            }
            self.advance_logged(IdentityPhase::Terminated);
        }

        if !ctx.spec.no_clean {
            report.record("remove-workspace", LABEL, remove_tree(&ctx.layout.master_dir()));
        }
        if self.phase() != IdentityPhase::CleanedUp {
            self.advance_logged(IdentityPhase::CleanedUp);
        }

        info!("Control plane stopped");
        report
    }

    fn snapshot(&self) -> Vec<MemberSnapshot> {
        vec![MemberSnapshot {
            label: LABEL.to_string(),
            phase: self.phase(),
            pid: self.handle.as_ref().and_then(|h| h.spawn_pid),
        }]
    }
}
