// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `legion sweep` - kill minion (and master) processes a crashed run left behind

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use legion_core::domain::fleet_spec::ControlPlaneBinaries;
use legion_core::domain::process::{PidAuthority, ProcessSupervisor};
use legion_core::infrastructure::LocalProcessSupervisor;

#[derive(Debug, Clone, Args)]
pub struct SweepArgs {
    /// Minion binary whose processes are killed
    #[arg(long, env = "LEGION_MINION_BIN", default_value = "salt-minion")]
    pub minion_bin: String,

    /// Also kill master processes
    #[arg(short = 'M', long = "master-too")]
    pub master_too: bool,

    /// Master binary whose processes are killed with --master-too
    #[arg(long, env = "LEGION_MASTER_BIN", default_value = "salt-master")]
    pub master_bin: String,
}

impl SweepArgs {
    pub fn patterns(&self) -> Vec<String> {
        let binaries = ControlPlaneBinaries {
            minion: self.minion_bin.clone(),
            master: self.master_bin.clone(),
            ..Default::default()
        };
        let mut patterns = vec![binaries.minion_pattern()];
        if self.master_too {
            patterns.push(binaries.master_pattern());
        }
        patterns
    }
}

pub async fn execute(args: SweepArgs) -> Result<()> {
    let supervisor = LocalProcessSupervisor::new(PidAuthority::default());

    for pattern in args.patterns() {
        let killed = supervisor
            .sweep_kill(&pattern)
            .await
            .with_context(|| format!("Failed to sweep '{}'", pattern))?;
        if killed == 0 {
            println!("  {} no '{}' processes", "·".dimmed(), pattern);
        } else {
            println!("  {} killed {} '{}' processes", "✓".green(), killed, pattern);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(master_too: bool) -> SweepArgs {
        SweepArgs {
            minion_bin: "/usr/bin/salt-minion".to_string(),
            master_too,
            master_bin: "salt-master".to_string(),
        }
    }

    #[test]
    fn test_patterns_use_binary_file_name() {
        assert_eq!(args(false).patterns(), vec!["salt-minion"]);
    }

    #[test]
    fn test_master_too_adds_master_pattern() {
        assert_eq!(args(true).patterns(), vec!["salt-minion", "salt-master"]);
    }
}
