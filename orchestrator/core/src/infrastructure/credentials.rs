// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Credential Provisioning
//!
//! Every zeromq identity authenticates with the same key pair. The pair is
//! generated once per run into `<root>/pki` (or reused when both artifacts
//! already exist there) and copied into each identity's own `pki/` directory.
//! Concurrent callers of [`CredentialProvisioner::ensure_shared_credentials`]
//! share a single generation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::domain::identity::WorkerIdentity;

/// File names of the shared key pair.
pub const CREDENTIAL_FILES: [&str; 2] = ["minion.pem", "minion.pub"];

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Failed to run key generator '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Key generator exited with {status}: {stderr}")]
    GeneratorFailed { status: String, stderr: String },

    #[error("Key generator did not produce {path:?}")]
    MissingArtifact { path: PathBuf },

    #[error("Failed to create credential directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy credentials to {path:?}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Produces the shared key pair inside a directory.
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    async fn generate(&self, dir: &Path) -> Result<(), CredentialError>;
}

/// Generates keys with the control plane's key tool:
/// `<key> -c <dir> --gen-keys minion --gen-keys-dir <dir> --log-file <dir>/keys.log --user <user>`
#[derive(Debug, Clone)]
pub struct SaltKeyGenerator {
    program: String,
    user: String,
}

impl SaltKeyGenerator {
    pub fn new(program: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            user: user.into(),
        }
    }

    pub fn args(&self, dir: &Path) -> Vec<String> {
        let dir_arg = dir.display().to_string();
        vec![
            "-c".to_string(),
            dir_arg.clone(),
            "--gen-keys".to_string(),
            "minion".to_string(),
            "--gen-keys-dir".to_string(),
            dir_arg,
            "--log-file".to_string(),
            dir.join("keys.log").display().to_string(),
            "--user".to_string(),
            self.user.clone(),
        ]
    }
}

#[async_trait]
impl KeyGenerator for SaltKeyGenerator {
    async fn generate(&self, dir: &Path) -> Result<(), CredentialError> {
        let output = Command::new(&self.program)
            .args(self.args(dir))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CredentialError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CredentialError::GeneratorFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

pub struct CredentialProvisioner {
    shared_dir: PathBuf,
    generator: Arc<dyn KeyGenerator>,
    ready: OnceCell<PathBuf>,
}

impl CredentialProvisioner {
    pub fn new(shared_dir: impl Into<PathBuf>, generator: Arc<dyn KeyGenerator>) -> Self {
        Self {
            shared_dir: shared_dir.into(),
            generator,
            ready: OnceCell::new(),
        }
    }

    pub fn shared_dir(&self) -> &Path {
        &self.shared_dir
    }

    fn artifacts_present(dir: &Path) -> bool {
        CREDENTIAL_FILES.iter().all(|name| dir.join(name).is_file())
    }

    /// Make sure the shared key pair exists, generating it at most once.
    ///
    /// A failed generation leaves the cell empty, so a later call retries.
    pub async fn ensure_shared_credentials(&self) -> Result<&Path, CredentialError> {
        let dir = self
            .ready
            .get_or_try_init(|| async {
                let dir = self.shared_dir.clone();
                if Self::artifacts_present(&dir) {
                    debug!(dir = %dir.display(), "Reusing shared credentials");
                    return Ok(dir);
                }

                std::fs::create_dir_all(&dir).map_err(|source| CredentialError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;
                self.generator.generate(&dir).await?;

                for name in CREDENTIAL_FILES {
                    let path = dir.join(name);
                    if !path.is_file() {
                        return Err(CredentialError::MissingArtifact { path });
                    }
                }
                info!(dir = %dir.display(), "Generated shared credentials");
                Ok(dir)
            })
            .await?;
        Ok(dir.as_path())
    }

    /// Copy the shared pair into `<workspace>/pki` and record it on the identity.
    pub async fn provision(&self, identity: &mut WorkerIdentity) -> Result<(), CredentialError> {
        let shared = self.ensure_shared_credentials().await?.to_path_buf();
        let target = identity.workspace.join("pki");

        std::fs::create_dir_all(&target).map_err(|source| CredentialError::CreateDir {
            path: target.clone(),
            source,
        })?;
        for name in CREDENTIAL_FILES {
            let dest = target.join(name);
            std::fs::copy(shared.join(name), &dest)
                .map_err(|source| CredentialError::Copy { path: dest, source })?;
        }

        debug!(id = %identity.id, pki_dir = %target.display(), "Provisioned credentials");
        identity.pki_dir = Some(target);
        Ok(())
    }
}
