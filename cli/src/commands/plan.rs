// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `legion plan` - resolve flags into a spec and allocate identities without
//! creating, launching or deleting anything.

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use legion_core::domain::fleet_spec::FleetSpec;
use legion_core::domain::identity::{IdentityAllocator, WorkerIdentity};

use super::FleetArgs;

/// Everything a run of the same flags would start with.
#[derive(Debug, Serialize)]
pub struct FleetPlan {
    pub spec: FleetSpec,
    /// The workspace root; a fresh scratch directory is shown as a pattern
    pub workspace: PathBuf,
    pub identities: Vec<WorkerIdentity>,
}

impl FleetPlan {
    pub fn resolve(spec: FleetSpec) -> Self {
        let workspace = match (&spec.temp_dir, &spec.root_dir) {
            (Some(dir), _) => dir.clone(),
            (None, Some(root_dir)) => root_dir.join("tmp").join("mswarm-root*.d"),
            (None, None) => std::env::temp_dir().join("mswarm-root*.d"),
        };
        let identities = IdentityAllocator::from_spec(&spec).allocate(&spec, &workspace);
        Self {
            spec,
            workspace,
            identities,
        }
    }
}

pub fn execute(args: FleetArgs) -> Result<()> {
    let plan = FleetPlan::resolve(args.to_spec()?);

    println!("{}", "Fleet plan:".bold());
    println!(
        "  {} minions, prefix '{}', transport {}, master {}",
        plan.identities.len(),
        plan.spec.name,
        plan.spec.transport,
        plan.spec.master
    );
    if plan.spec.master_too {
        println!("  Local master: {}", "yes".green());
    }
    if plan.spec.legion_enabled() {
        println!("  Legion: {} fake identities per minion", plan.spec.legion_fakes);
    }
    println!();

    let yaml = serde_yaml::to_string(&plan).context("Failed to render fleet plan")?;
    println!("{}", yaml);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_plan_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("fleet");
        let spec = FleetSpec {
            minions: 12,
            temp_dir: Some(root.clone()),
            ..Default::default()
        };

        let plan = FleetPlan::resolve(spec);
        assert_eq!(plan.identities.len(), 12);
        assert_eq!(plan.identities[0].id, "ms-01");
        assert_eq!(plan.identities[11].workspace, root.join("ms-12"));
        assert!(!root.exists());
    }

    #[test]
    fn test_plan_under_root_dir() {
        let spec = FleetSpec {
            minions: 1,
            root_dir: Some(PathBuf::from("/srv/legion")),
            ..Default::default()
        };
        let plan = FleetPlan::resolve(spec);
        assert_eq!(plan.workspace, Path::new("/srv/legion/tmp/mswarm-root*.d"));
    }

    #[test]
    fn test_plan_renders_as_yaml() {
        let plan = FleetPlan::resolve(FleetSpec {
            minions: 2,
            ..Default::default()
        });
        let yaml = serde_yaml::to_string(&plan).unwrap();
        assert!(yaml.contains("id: ms-1"));
        assert!(yaml.contains("id: ms-2"));
        assert!(yaml.contains("legion: true"));
    }
}
