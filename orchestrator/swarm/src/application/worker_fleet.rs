// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Worker Fleet Deployment
//!
//! # Flow
//!
//! 1. `prepare`: for every identity in allocation order, write its config and
//!    (zeromq) copy in the shared credentials
//! 2. `start`: for every identity in allocation order
//!    - launch its process
//!    - gate on its id in "accepted" (unless acceptance waiting is off)
//!    - legion round when enabled: register fakes, gate on every fake id,
//!      warm the cache, gate on the id in "cached", sleep `legion_start_delay`
//!    - sleep `start_delay` before the next identity
//! 3. `shutdown`: terminate every launched identity and remove its workspace
//!    unless the run keeps it

use async_trait::async_trait;
use legion_core::domain::acceptance::{wait_for, AcceptanceSet};
use legion_core::domain::cleanup::CleanupReport;
use legion_core::domain::identity::{IdentityAllocator, WorkerIdentity};
use legion_core::domain::process::LaunchSpec;
use tracing::{debug, info, warn};

use super::{remove_tree, Deployment, FleetContext, FleetError};
use crate::domain::member::{FleetMember, IdentityPhase, MemberSnapshot};

pub struct WorkerFleet {
    members: Vec<FleetMember>,
}

impl WorkerFleet {
    pub fn new(identities: Vec<WorkerIdentity>) -> Self {
        Self {
            members: identities.into_iter().map(FleetMember::new).collect(),
        }
    }

    /// Allocate the fleet's identities under the context's workspace root.
    pub fn allocate(ctx: &FleetContext) -> Self {
        let identities = IdentityAllocator::from_spec(&ctx.spec).allocate(&ctx.spec, ctx.layout.root());
        Self::new(identities)
    }

    async fn prepare_member(member: &mut FleetMember, ctx: &FleetContext) -> Result<(), FleetError> {
        ctx.materializer.write_minion(&member.identity)?;
        member.lifecycle.advance(IdentityPhase::ConfigWritten)?;

        if let Some(credentials) = &ctx.credentials {
            credentials.provision(&mut member.identity).await?;
            member.lifecycle.advance(IdentityPhase::CredentialsProvisioned)?;
        }
        Ok(())
    }

    async fn start_member(member: &mut FleetMember, ctx: &FleetContext) -> Result<(), FleetError> {
        let spec = &ctx.spec;
        let id = member.identity.id.clone();

        let launch = LaunchSpec::daemon(
            id.clone(),
            &spec.binaries.minion,
            member.identity.config_dir(),
            &member.identity.pid_file(),
            spec.foreground,
        );
        member.handle = Some(ctx.supervisor.launch(launch).await?);
        member.lifecycle.advance(IdentityPhase::Launched)?;
        info!(id = %id, "Worker launched");

        if spec.wait_for_acceptance {
            member.lifecycle.advance(IdentityPhase::AwaitingAcceptance)?;
            let waited = wait_for(
                &ctx.acceptance,
                AcceptanceSet::Accepted,
                std::slice::from_ref(&id),
                &spec.gate,
            )
            .await?;
            member.lifecycle.advance(IdentityPhase::Accepted)?;
            let accepted_at = ctx.acceptance.first_seen(AcceptanceSet::Accepted, &id);
            debug!(id = %id, ?waited, ?accepted_at, "Worker accepted");

            if spec.legion_enabled() {
                Self::legion_round(member, ctx).await?;
            }
        }

        member.lifecycle.advance(IdentityPhase::Running)?;
        Ok(())
    }

    async fn legion_round(member: &mut FleetMember, ctx: &FleetContext) -> Result<(), FleetError> {
        let spec = &ctx.spec;
        let id = member.identity.id.clone();
        let fakes = member.identity.fake_ids(spec.legion_fakes);

        ctx.remote.register_fakes(&id).await?;
        member.lifecycle.advance(IdentityPhase::AwaitingLegionAcceptance)?;
        wait_for(&ctx.acceptance, AcceptanceSet::Accepted, &fakes, &spec.gate).await?;
        member.lifecycle.advance(IdentityPhase::LegionAccepted)?;
        info!(id = %id, fakes = fakes.len(), "Legion identities accepted");

        ctx.remote.warm_cache(&id).await?;
        member.lifecycle.advance(IdentityPhase::AwaitingCacheConfirm)?;
        wait_for(
            &ctx.acceptance,
            AcceptanceSet::Cached,
            std::slice::from_ref(&id),
            &spec.gate,
        )
        .await?;
        member.lifecycle.advance(IdentityPhase::CacheConfirmed)?;
        info!(id = %id, "Legion cache warmed");

        if !spec.legion_start_delay.is_zero() {
            tokio::time::sleep(spec.legion_start_delay).await;
        }
        Ok(())
    }

    async fn stop_member(member: &mut FleetMember, ctx: &FleetContext, report: &mut CleanupReport) {
        let id = member.identity.id.clone();

        if member.phase().is_launched() {
            advance_logged(member, IdentityPhase::Signaled);
            if let Some(handle) = &member.handle {
                let result = ctx.supervisor.terminate(handle).await;
                if let Ok(outcome) = &result {
                    debug!(id = %id, ?outcome, "Worker terminated");
                }
                report.record("terminate", id.as_str(), result.map(|_| ()));
            }
            advance_logged(member, IdentityPhase::Terminated);
        }

        if !ctx.spec.no_clean {
            report.record("remove-workspace", id.as_str(), remove_tree(&member.identity.workspace));
        }
        if member.phase() != IdentityPhase::CleanedUp {
            advance_logged(member, IdentityPhase::CleanedUp);
        }
    }
}

fn advance_logged(member: &mut FleetMember, next: IdentityPhase) {
    if let Err(e) = member.lifecycle.advance(next) {
        warn!(error = %e, "Skipping phase transition");
    }
}

#[async_trait]
impl Deployment for WorkerFleet {
    fn name(&self) -> &str {
        "workers"
    }

    async fn prepare(&mut self, ctx: &FleetContext) -> Result<(), FleetError> {
        for member in self.members.iter_mut() {
            Self::prepare_member(member, ctx).await?;
        }
        info!(count = self.members.len(), transport = %ctx.spec.transport, "Worker configs prepared");
        Ok(())
    }

    async fn start(&mut self, ctx: &FleetContext) -> Result<(), FleetError> {
        let total = self.members.len();
        for (n, member) in self.members.iter_mut().enumerate() {
            Self::start_member(member, ctx).await?;
            info!(id = %member.id(), started = n + 1, total, "Worker running");

            if n + 1 < total && !ctx.spec.start_delay.is_zero() {
                tokio::time::sleep(ctx.spec.start_delay).await;
            }
        }
        info!(total, "All workers started");
        Ok(())
    }

    async fn shutdown(&mut self, ctx: &FleetContext) -> CleanupReport {
        let mut report = CleanupReport::new();
        let launched = self.members.iter().filter(|m| m.phase().is_launched()).count();
        info!(launched, "Shutting down workers");

        for member in self.members.iter_mut() {
            Self::stop_member(member, ctx, &mut report).await;
        }
        report
    }

    fn snapshot(&self) -> Vec<MemberSnapshot> {
        self.members.iter().map(FleetMember::snapshot).collect()
    }
}
