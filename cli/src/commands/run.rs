// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `legion run` - start the fleet and hold it until Ctrl+C or SIGTERM

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use legion_core::domain::acceptance::AcceptanceState;
use legion_core::domain::fleet_spec::FleetSpec;
use legion_core::infrastructure::{
    CommandEventFeed, EventMonitor, LocalProcessSupervisor, SaltCommandClient, SaltKeyGenerator,
    WorkspaceLayout,
};
use legion_swarm::application::{FleetContext, FleetOrchestrator, RunSummary};

use super::FleetArgs;

pub async fn execute(args: FleetArgs) -> Result<()> {
    let spec = args.to_spec()?;
    preflight(&spec)?;

    let layout = WorkspaceLayout::create(spec.temp_dir.as_deref(), spec.root_dir.as_deref())?;
    let acceptance = Arc::new(AcceptanceState::new());

    let supervisor = Arc::new(LocalProcessSupervisor::new(spec.pid_authority));
    let remote = Arc::new(
        SaltCommandClient::new(spec.binaries.cli.clone(), spec.remote_timeout)
            .with_cache_function(spec.cache_function.clone()),
    );
    let keys = Arc::new(SaltKeyGenerator::new(spec.binaries.key.clone(), spec.user.clone()));

    let monitor_cancel = CancellationToken::new();
    let monitor = spec.wait_for_acceptance.then(|| {
        let feed = CommandEventFeed::new(spec.binaries.event_command.clone(), spec.monitor_idle);
        EventMonitor::new(acceptance.clone(), spec.monitor_idle, spec.cache_function.clone())
            .spawn(feed, monitor_cancel.clone())
    });

    let no_clean = spec.no_clean;
    let ctx = match FleetContext::new(spec, layout.clone(), acceptance, supervisor, remote, keys) {
        Ok(ctx) => ctx,
        Err(e) => {
            monitor_cancel.cancel();
            if !no_clean {
                if let Err(remove) = std::fs::remove_dir_all(layout.root()) {
                    warn!(error = %remove, "Failed to remove workspace root");
                }
            }
            return Err(e).context("Failed to prepare fleet");
        }
    };

    let cancel = CancellationToken::new();
    let listener = tokio::spawn(cancel_on_signal(cancel.clone()));

    let outcome = FleetOrchestrator::for_context(ctx).run(cancel).await;

    listener.abort();
    monitor_cancel.cancel();
    if let Some(monitor) = monitor {
        if let Err(e) = monitor.await {
            warn!(error = %e, "Event monitor task failed");
        }
    }

    let summary = outcome.context("Fleet run failed")?;
    print_summary(&summary);
    Ok(())
}

/// Check that every external program this run will call is on the PATH.
fn preflight(spec: &FleetSpec) -> Result<()> {
    let mut required = vec![("minion", spec.binaries.minion.as_str())];
    if spec.transport.requires_credentials() {
        required.push(("key tool", spec.binaries.key.as_str()));
    }
    if spec.legion_enabled() {
        required.push(("remote-call client", spec.binaries.cli.as_str()));
    }
    if spec.master_too {
        required.push(("master", spec.binaries.master.as_str()));
    }
    if spec.wait_for_acceptance {
        if let Some(program) = spec.binaries.event_command.first() {
            required.push(("event feed", program.as_str()));
        }
    }

    let missing: Vec<String> = required
        .into_iter()
        .filter(|(_, program)| which::which(program).is_err())
        .map(|(role, program)| format!("{} ({})", program, role))
        .collect();

    if !missing.is_empty() {
        bail!("Required programs not found on PATH: {}", missing.join(", "));
    }
    Ok(())
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Interrupt received");
    cancel.cancel();
}

fn print_summary(summary: &RunSummary) {
    println!();
    if summary.interrupted_startup {
        println!("{}", "Fleet interrupted during startup".yellow().bold());
    } else {
        println!("{}", "Fleet stopped".green().bold());
    }
    println!("  Members: {}", summary.members.len());
    println!("  Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!("  Teardown steps: {}", summary.cleanup.attempted());

    if summary.cleanup.is_clean() {
        println!("  Teardown: {}", "clean".green());
    } else {
        println!(
            "  Teardown: {}",
            format!("{} failed", summary.cleanup.failures().len()).red()
        );
        for failure in summary.cleanup.failures() {
            println!("    {} {}", "✗".red(), failure);
        }
    }
}
