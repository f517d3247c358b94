// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Fleet flags shared by `run` and `plan`
//!
//! Every flag overrides the corresponding field of the base spec: the YAML
//! file given with `--spec`, or the built-in defaults. Switches only ever
//! turn a behavior on.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use legion_core::domain::fleet_spec::{FleetSpec, Transport};
use legion_core::domain::process::PidAuthority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Zeromq,
    Tcp,
}

impl From<TransportArg> for Transport {
    fn from(value: TransportArg) -> Self {
        match value {
            TransportArg::Zeromq => Transport::Zeromq,
            TransportArg::Tcp => Transport::Tcp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PidAuthorityArg {
    PidFile,
    Spawn,
    PidFileOrSpawn,
}

impl From<PidAuthorityArg> for PidAuthority {
    fn from(value: PidAuthorityArg) -> Self {
        match value {
            PidAuthorityArg::PidFile => PidAuthority::PidFile,
            PidAuthorityArg::Spawn => PidAuthority::Spawn,
            PidAuthorityArg::PidFileOrSpawn => PidAuthority::PidFileOrSpawn,
        }
    }
}

#[derive(Debug, Clone, Default, Args)]
pub struct FleetArgs {
    /// Base fleet spec (YAML); flags override its fields
    #[arg(long, env = "LEGION_SPEC", value_name = "FILE")]
    pub spec: Option<PathBuf>,

    /// Number of minions to start [default: 5]
    #[arg(short = 'm', long)]
    pub minions: Option<usize>,

    /// Fake identities each minion registers through legion.keys
    #[arg(short = 'l', long)]
    pub legion: Option<u32>,

    /// Also start a local master
    #[arg(short = 'M', long = "master-too")]
    pub master_too: bool,

    /// Location of the master this swarm serves [default: salt]
    #[arg(long, env = "LEGION_MASTER")]
    pub master: Option<String>,

    /// Minion id prefix [default: ms]
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Each minion claims a random OS
    #[arg(long)]
    pub rand_os: bool,

    /// Each minion claims a random version
    #[arg(long)]
    pub rand_ver: bool,

    /// Each minion gets a unique machine id
    #[arg(long)]
    pub rand_machine_id: bool,

    /// Each minion gets a unique uuid
    #[arg(long)]
    pub rand_uuid: bool,

    /// Seed for the OS and version draws [default: 0]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Modules to keep enabled; every other module is disabled
    #[arg(short = 'k', long, value_delimiter = ',', value_name = "MODULES")]
    pub keep_modules: Vec<String>,

    /// Directory listing the minion's available modules
    #[arg(long, env = "LEGION_MODULES_DIR", value_name = "DIR")]
    pub modules_dir: Option<PathBuf>,

    /// Run minions in the foreground
    #[arg(short = 'f', long)]
    pub foreground: bool,

    /// Place the workspace here instead of a fresh temp directory
    #[arg(long, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Keep the workspace on exit
    #[arg(long)]
    pub no_clean: bool,

    /// Override the minion root_dir config
    #[arg(long, value_name = "DIR")]
    pub root_dir: Option<PathBuf>,

    /// Transport the minions use [default: zeromq]
    #[arg(long, value_enum)]
    pub transport: Option<TransportArg>,

    /// Seconds to wait between minion starts
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    pub start_delay: Option<Duration>,

    /// Seconds to wait after each legion registration round
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    pub legion_start_delay: Option<Duration>,

    /// Directory with base `minion` and `master` configs
    #[arg(short = 'c', long, env = "LEGION_CONFIG_DIR", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// User to run the minions as
    #[arg(short = 'u', long)]
    pub user: Option<String>,

    /// Call legion.keys and legion.cache as minions start
    #[arg(long)]
    pub run_modules: bool,

    /// Start the next minion without waiting for acceptance
    #[arg(long)]
    pub no_wait: bool,

    /// Fail when a wait-gate is not satisfied within this many seconds
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    pub gate_timeout: Option<Duration>,

    /// Which pid a shutdown signals
    #[arg(long, value_enum)]
    pub pid_authority: Option<PidAuthorityArg>,

    /// Timeout for legion.keys / legion.cache calls, in seconds
    #[arg(long, value_name = "SECS", value_parser = parse_seconds)]
    pub remote_timeout: Option<Duration>,
}

impl FleetArgs {
    /// Resolve the base spec, apply the flags and validate the result.
    pub fn to_spec(&self) -> Result<FleetSpec> {
        let mut spec = match &self.spec {
            Some(path) => {
                let yaml = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read fleet spec {:?}", path))?;
                FleetSpec::from_yaml_str(&yaml)
                    .with_context(|| format!("Failed to parse fleet spec {:?}", path))?
            }
            None => FleetSpec::default(),
        };

        if let Some(minions) = self.minions {
            spec.minions = minions;
        }
        if let Some(legion) = self.legion {
            spec.legion_fakes = legion;
        }
        if let Some(master) = &self.master {
            spec.master = master.clone();
        }
        if let Some(name) = &self.name {
            spec.name = name.clone();
        }
        if let Some(seed) = self.seed {
            spec.seed = seed;
        }
        if let Some(user) = &self.user {
            spec.user = user.clone();
        }
        if let Some(transport) = self.transport {
            spec.transport = transport.into();
        }
        if let Some(authority) = self.pid_authority {
            spec.pid_authority = authority.into();
        }

        spec.master_too |= self.master_too;
        spec.randomize.os |= self.rand_os;
        spec.randomize.version |= self.rand_ver;
        spec.randomize.machine_id |= self.rand_machine_id;
        spec.randomize.uuid |= self.rand_uuid;
        spec.foreground |= self.foreground;
        spec.no_clean |= self.no_clean;
        spec.run_modules |= self.run_modules;
        if self.no_wait {
            spec.wait_for_acceptance = false;
        }

        if !self.keep_modules.is_empty() {
            spec.keep_modules = self
                .keep_modules
                .iter()
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .collect();
        }
        if let Some(dir) = &self.modules_dir {
            spec.modules_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.temp_dir {
            spec.temp_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.root_dir {
            spec.root_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.config_dir {
            spec.config_dir = Some(dir.clone());
        }

        if let Some(delay) = self.start_delay {
            spec.start_delay = delay;
        }
        if let Some(delay) = self.legion_start_delay {
            spec.legion_start_delay = delay;
        }
        if let Some(timeout) = self.gate_timeout {
            spec.gate.timeout = Some(timeout);
        }
        if let Some(timeout) = self.remote_timeout {
            spec.remote_timeout = timeout;
        }

        spec.validate().context("Invalid fleet configuration")?;
        Ok(spec)
    }
}

/// Parse non-negative fractional seconds, e.g. `0.25`.
pub fn parse_seconds(value: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", value))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("'{}' must be a non-negative number of seconds", value));
    }
    Ok(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        fleet: FleetArgs,
    }

    fn parse(args: &[&str]) -> FleetArgs {
        let mut argv = vec!["legion"];
        argv.extend_from_slice(args);
        Harness::try_parse_from(argv).unwrap().fleet
    }

    #[test]
    fn test_no_flags_gives_defaults() {
        let spec = parse(&["-u", "legion"]).to_spec().unwrap();
        let defaults = FleetSpec::default();
        assert_eq!(spec.minions, defaults.minions);
        assert_eq!(spec.name, "ms");
        assert_eq!(spec.transport, Transport::Zeromq);
        assert!(spec.wait_for_acceptance);
        assert_eq!(spec.user, "legion");
    }

    #[test]
    fn test_harness_flags() {
        let spec = parse(&[
            "-m", "40", "-l", "3", "-M", "--master", "10.1.1.1", "-n", "load", "--rand-os",
            "--rand-uuid", "--transport", "tcp", "--start-delay", "0.5", "--run-modules",
            "-k", "test,state", "--modules-dir", "/opt/modules", "--no-clean",
        ])
        .to_spec()
        .unwrap();

        assert_eq!(spec.minions, 40);
        assert_eq!(spec.legion_fakes, 3);
        assert!(spec.master_too);
        assert_eq!(spec.master, "10.1.1.1");
        assert_eq!(spec.name, "load");
        assert!(spec.randomize.os && spec.randomize.uuid);
        assert!(!spec.randomize.version);
        assert_eq!(spec.transport, Transport::Tcp);
        assert_eq!(spec.start_delay, Duration::from_millis(500));
        assert!(spec.legion_enabled());
        assert_eq!(spec.keep_modules, vec!["test", "state"]);
        assert!(spec.no_clean);
    }

    #[test]
    fn test_keep_modules_without_dir_is_rejected() {
        let err = parse(&["-k", "test"]).to_spec().unwrap_err();
        assert!(format!("{:#}", err).contains("--modules-dir"));
    }

    #[test]
    fn test_flags_override_spec_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.yaml");
        std::fs::write(&path, "minions: 12\nname: base\ngate:\n  timeout: 30s\n").unwrap();

        let spec = parse(&["--spec", path.to_str().unwrap(), "-n", "flag"])
            .to_spec()
            .unwrap();
        assert_eq!(spec.minions, 12);
        assert_eq!(spec.name, "flag");
        assert_eq!(spec.gate.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("1.5").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_seconds("0").unwrap(), Duration::ZERO);
        assert!(parse_seconds("-1").is_err());
        assert!(parse_seconds("soon").is_err());
        assert!(parse_seconds("inf").is_err());
    }
}
