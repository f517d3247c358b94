// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Fleet Specification - the immutable description of one harness run
//
// Defines everything the orchestrator needs to know before the first identity
// is allocated:
// - Fleet sizing (worker count, legion fakes per worker, id prefix)
// - Control-plane endpoint and transport
// - Which grains are randomized per identity
// - Workspace placement (temp dir, root dir override, keep-on-exit)
// - Timing knobs for launches, wait-gates and the event monitor
// - External binaries the harness shells out to

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::acceptance::GatePolicy;
use crate::domain::process::PidAuthority;

/// Transport the workers use to reach the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Persistent-socket transport; every worker needs its own copy of the
    /// shared key pair.
    #[default]
    Zeromq,
    Tcp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Zeromq => "zeromq",
            Transport::Tcp => "tcp",
        }
    }

    /// Whether identities on this transport receive per-identity credentials.
    pub fn requires_credentials(&self) -> bool {
        matches!(self, Transport::Zeromq)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grain dimensions that are randomized per identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomGrains {
    /// Seeded draw from the OS family pool
    #[serde(default)]
    pub os: bool,

    /// Seeded draw from the version pool
    #[serde(default)]
    pub version: bool,

    /// Unseeded, unique per identity
    #[serde(default)]
    pub machine_id: bool,

    /// Unseeded, unique per identity
    #[serde(default)]
    pub uuid: bool,
}

/// External programs the harness launches or calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPlaneBinaries {
    /// Worker agent binary
    #[serde(default = "default_minion_bin")]
    pub minion: String,

    /// Control-plane binary (only used with `master_too`)
    #[serde(default = "default_master_bin")]
    pub master: String,

    /// Key generation tool for the shared credential directory
    #[serde(default = "default_key_bin")]
    pub key: String,

    /// Remote-call client used for the legion extension functions
    #[serde(default = "default_cli_bin")]
    pub cli: String,

    /// Command (program followed by arguments) streaming control-plane events
    #[serde(default = "default_event_command")]
    pub event_command: Vec<String>,
}

impl Default for ControlPlaneBinaries {
    fn default() -> Self {
        Self {
            minion: default_minion_bin(),
            master: default_master_bin(),
            key: default_key_bin(),
            cli: default_cli_bin(),
            event_command: default_event_command(),
        }
    }
}

impl ControlPlaneBinaries {
    /// Sweep pattern matching stray worker processes.
    pub fn minion_pattern(&self) -> String {
        process_pattern(&self.minion)
    }

    /// Sweep pattern matching a stray control-plane process.
    pub fn master_pattern(&self) -> String {
        process_pattern(&self.master)
    }
}

fn process_pattern(binary: &str) -> String {
    Path::new(binary)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(binary)
        .to_string()
}

/// The complete description of a fleet run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSpec {
    /// Number of worker identities to launch
    #[serde(default = "default_minions")]
    pub minions: usize,

    /// Synthetic identities each worker registers through `legion.keys`
    #[serde(default)]
    pub legion_fakes: u32,

    /// Identity id prefix
    #[serde(default = "default_name")]
    pub name: String,

    /// Control-plane address written into every worker config
    #[serde(default = "default_master")]
    pub master: String,

    #[serde(default)]
    pub transport: Transport,

    #[serde(default)]
    pub randomize: RandomGrains,

    /// Seed for the deterministic grain draws
    #[serde(default)]
    pub seed: u64,

    /// Account written into configs and used for key generation
    #[serde(default = "default_user")]
    pub user: String,

    /// Launch a local control plane before the workers
    #[serde(default)]
    pub master_too: bool,

    /// Keep the workspace tree on exit
    #[serde(default)]
    pub no_clean: bool,

    /// Run worker processes attached to the terminal
    #[serde(default)]
    pub foreground: bool,

    /// Directory holding base `minion` / `master` templates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,

    /// Overrides the workers' `root_dir`; also hosts the scratch workspace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,

    /// Fixed workspace root instead of a fresh scratch directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Modules to keep enabled; every other module in `modules_dir` is disabled
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keep_modules: Vec<String>,

    /// Directory listing the worker's available modules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules_dir: Option<PathBuf>,

    /// Issue `legion.keys` / `legion.cache` as workers come up
    #[serde(default)]
    pub run_modules: bool,

    /// Gate each launch on the identity being accepted
    #[serde(default = "default_true")]
    pub wait_for_acceptance: bool,

    /// Delay between identity launches
    #[serde(default, with = "humantime_serde")]
    pub start_delay: Duration,

    /// Delay after each legion registration round
    #[serde(default, with = "humantime_serde")]
    pub legion_start_delay: Duration,

    #[serde(default)]
    pub gate: GatePolicy,

    /// Wake interval of the idle wait once the fleet is running
    #[serde(default = "default_idle_interval", with = "humantime_serde")]
    pub idle_interval: Duration,

    /// Event monitor sleep when the feed has nothing ready
    #[serde(default = "default_monitor_idle", with = "humantime_serde")]
    pub monitor_idle: Duration,

    #[serde(default)]
    pub pid_authority: PidAuthority,

    /// Timeout for each remote extension call
    #[serde(default = "default_remote_timeout", with = "humantime_serde")]
    pub remote_timeout: Duration,

    /// Function whose returns mark an identity as cache-warm
    #[serde(default = "default_cache_function")]
    pub cache_function: String,

    #[serde(default)]
    pub binaries: ControlPlaneBinaries,
}

impl Default for FleetSpec {
    fn default() -> Self {
        Self {
            minions: default_minions(),
            legion_fakes: 0,
            name: default_name(),
            master: default_master(),
            transport: Transport::default(),
            randomize: RandomGrains::default(),
            seed: 0,
            user: default_user(),
            master_too: false,
            no_clean: false,
            foreground: false,
            config_dir: None,
            root_dir: None,
            temp_dir: None,
            keep_modules: Vec::new(),
            modules_dir: None,
            run_modules: false,
            wait_for_acceptance: true,
            start_delay: Duration::ZERO,
            legion_start_delay: Duration::ZERO,
            gate: GatePolicy::default(),
            idle_interval: default_idle_interval(),
            monitor_idle: default_monitor_idle(),
            pid_authority: PidAuthority::default(),
            remote_timeout: default_remote_timeout(),
            cache_function: default_cache_function(),
            binaries: ControlPlaneBinaries::default(),
        }
    }
}

/// Reasons a [`FleetSpec`] is rejected before anything touches the disk.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("identity prefix cannot be empty")]
    EmptyName,

    #[error("identity prefix '{0}' must not contain path separators")]
    InvalidName(String),

    #[error("control-plane address cannot be empty")]
    EmptyMaster,

    #[error("--keep-modules requires --modules-dir to list the available modules")]
    MissingModulesDir,

    #[error("--run-modules needs acceptance gating; drop --no-wait")]
    LegionWithoutGating,

    #[error("gate poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("event command cannot be empty")]
    EmptyEventCommand,
}

impl FleetSpec {
    /// Whether the legion registration / cache-warm round runs per worker.
    pub fn legion_enabled(&self) -> bool {
        self.legion_fakes > 0 && self.run_modules
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.is_empty() {
            return Err(SpecError::EmptyName);
        }
        if self.name.contains('/') || self.name.contains('\\') {
            return Err(SpecError::InvalidName(self.name.clone()));
        }
        if self.master.is_empty() {
            return Err(SpecError::EmptyMaster);
        }
        if !self.keep_modules.is_empty() && self.modules_dir.is_none() {
            return Err(SpecError::MissingModulesDir);
        }
        if self.legion_enabled() && !self.wait_for_acceptance {
            return Err(SpecError::LegionWithoutGating);
        }
        if self.gate.poll_interval.is_zero() {
            return Err(SpecError::ZeroPollInterval);
        }
        if self.binaries.event_command.is_empty() {
            return Err(SpecError::EmptyEventCommand);
        }
        Ok(())
    }

    /// Parse a spec from YAML; absent fields take their defaults
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// Name of the account running the harness.
pub fn current_user() -> String {
    #[cfg(unix)]
    {
        if let Ok(Some(user)) = nix::unistd::User::from_uid(nix::unistd::geteuid()) {
            return user.name;
        }
    }

    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "root".to_string())
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_minions() -> usize {
    5
}

fn default_name() -> String {
    "ms".to_string()
}

fn default_master() -> String {
    "salt".to_string()
}

fn default_user() -> String {
    current_user()
}

fn default_idle_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_monitor_idle() -> Duration {
    Duration::from_millis(100)
}

fn default_remote_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_cache_function() -> String {
    "legion.cache".to_string()
}

fn default_minion_bin() -> String {
    "salt-minion".to_string()
}

fn default_master_bin() -> String {
    "salt-master".to_string()
}

fn default_key_bin() -> String {
    "salt-key".to_string()
}

fn default_cli_bin() -> String {
    "salt".to_string()
}

fn default_event_command() -> Vec<String> {
    vec![
        "salt-run".to_string(),
        "state.event".to_string(),
        "pretty=False".to_string(),
    ]
}
