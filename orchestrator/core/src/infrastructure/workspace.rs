// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workspace root placement and the paths laid out beneath it.
//!
//! ```text
//! <root>/pki/{minion.pem, minion.pub}          shared credentials (zeromq)
//! <root>/<id>/{minion, pki/, cache/, minion.log, <id>.pid}
//! <root>/master/{master, master.log, master.pid}
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

const SCRATCH_PREFIX: &str = "mswarm-root";
const SCRATCH_SUFFIX: &str = ".d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    /// Wrap an existing root without touching the filesystem.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve and create the workspace root.
    ///
    /// A `temp_dir` is used as-is (made absolute). Otherwise a fresh
    /// `mswarm-root*.d` directory is created under `<root_dir>/tmp`, or under
    /// the system temp directory when no root dir is set.
    pub fn create(temp_dir: Option<&Path>, root_dir: Option<&Path>) -> Result<Self> {
        let root = match temp_dir {
            Some(dir) => {
                let dir = std::path::absolute(dir)
                    .with_context(|| format!("Failed to resolve workspace dir {:?}", dir))?;
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("Failed to create workspace dir {:?}", dir))?;
                dir
            }
            None => {
                let parent = match root_dir {
                    Some(root_dir) => root_dir.join("tmp"),
                    None => std::env::temp_dir(),
                };
                std::fs::create_dir_all(&parent)
                    .with_context(|| format!("Failed to create scratch parent {:?}", parent))?;
                tempfile::Builder::new()
                    .prefix(SCRATCH_PREFIX)
                    .suffix(SCRATCH_SUFFIX)
                    .tempdir_in(&parent)
                    .with_context(|| format!("Failed to create scratch workspace in {:?}", parent))?
                    .keep()
            }
        };

        info!(root = %root.display(), "Workspace root ready");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn shared_pki_dir(&self) -> PathBuf {
        self.root.join("pki")
    }

    pub fn master_dir(&self) -> PathBuf {
        self.root.join("master")
    }

    pub fn master_config_path(&self) -> PathBuf {
        self.master_dir().join("master")
    }

    pub fn master_pid_file(&self) -> PathBuf {
        self.master_dir().join("master.pid")
    }

    pub fn master_log_file(&self) -> PathBuf {
        self.master_dir().join("master.log")
    }
}
