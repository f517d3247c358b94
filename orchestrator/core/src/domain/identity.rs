// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Worker Identities
//!
//! [`IdentityAllocator`] turns a [`FleetSpec`] into `minions` distinct
//! [`WorkerIdentity`] records. The OS-family and version grains come from a
//! generator seeded with `FleetSpec::seed`, so two runs with the same seed and
//! flags hand out the same grains in the same order. Machine ids and UUIDs are
//! drawn from an unseeded source and differ between runs.

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::domain::fleet_spec::FleetSpec;

/// OS families a randomized identity may claim.
pub const OS_FAMILIES: &[&str] = &[
    "Arch", "Ubuntu", "Debian", "CentOS", "Fedora", "Gentoo", "AIX", "Solaris",
];

/// Versions a randomized identity may claim.
pub const VERSIONS: &[&str] = &["2014.1.6", "2014.7.4", "2015.5.5", "2015.8.0"];

/// One simulated worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    /// Stable id, `{prefix}-{zero-padded index}`
    pub id: String,

    /// Zero-based allocation index
    pub index: usize,

    /// Per-identity workspace directory
    pub workspace: PathBuf,

    /// Grains the worker reports about itself
    pub grains: BTreeMap<String, Value>,

    /// Per-identity credential directory, once provisioned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pki_dir: Option<PathBuf>,
}

impl WorkerIdentity {
    /// Config directory passed to the worker with `-c`.
    pub fn config_dir(&self) -> &Path {
        &self.workspace
    }

    pub fn config_path(&self) -> PathBuf {
        self.workspace.join("minion")
    }

    pub fn pid_file(&self) -> PathBuf {
        self.workspace.join(format!("{}.pid", self.id))
    }

    pub fn log_file(&self) -> PathBuf {
        self.workspace.join("minion.log")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.workspace.join("cache")
    }

    /// Ids of the synthetic identities this worker registers.
    pub fn fake_ids(&self, fakes: u32) -> Vec<String> {
        (0..fakes).map(|n| format!("{}_{}", self.id, n)).collect()
    }
}

/// Deterministic identity generator.
#[derive(Debug, Clone)]
pub struct IdentityAllocator {
    seed: u64,
}

impl IdentityAllocator {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn from_spec(spec: &FleetSpec) -> Self {
        Self::new(spec.seed)
    }

    /// Width of the zero-padded index: the digit length of `count`.
    pub fn index_width(count: usize) -> usize {
        count.to_string().len()
    }

    pub fn identity_id(prefix: &str, index: usize, width: usize) -> String {
        format!("{}-{:0width$}", prefix, index + 1, width = width)
    }

    /// Produce exactly `spec.minions` identities rooted under `root`.
    pub fn allocate(&self, spec: &FleetSpec, root: &Path) -> Vec<WorkerIdentity> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let width = Self::index_width(spec.minions);

        (0..spec.minions)
            .map(|index| {
                let id = Self::identity_id(&spec.name, index, width);
                let grains = self.draw_grains(spec, &mut rng);
                WorkerIdentity {
                    workspace: root.join(&id),
                    id,
                    index,
                    grains,
                    pki_dir: None,
                }
            })
            .collect()
    }

    fn draw_grains(&self, spec: &FleetSpec, rng: &mut StdRng) -> BTreeMap<String, Value> {
        let mut grains = BTreeMap::new();
        grains.insert("legion".to_string(), Value::Bool(true));

        // Draw order (os, then version) is part of the reproducibility contract.
        if spec.randomize.os {
            if let Some(os) = OS_FAMILIES.choose(rng) {
                grains.insert("os".to_string(), Value::String(os.to_string()));
            }
        }
        if spec.randomize.version {
            if let Some(version) = VERSIONS.choose(rng) {
                grains.insert("saltversion".to_string(), Value::String(version.to_string()));
            }
        }
        if spec.randomize.machine_id {
            grains.insert(
                "machine_id".to_string(),
                Value::String(Uuid::new_v4().simple().to_string()),
            );
        }
        if spec.randomize.uuid {
            grains.insert("uuid".to_string(), Value::String(Uuid::new_v4().to_string()));
        }

        grains
    }
}
