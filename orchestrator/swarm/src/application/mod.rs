// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Fleet application layer
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Sequences deployments through prepare, start and shutdown
//!
//! A run is composed of [`Deployment`]s sharing one [`FleetContext`]:
//! an optional [`ControlPlaneInstance`] followed by the [`WorkerFleet`].

pub mod control_plane;
pub mod orchestrator;
pub mod worker_fleet;

pub use control_plane::ControlPlaneInstance;
pub use orchestrator::{FleetOrchestrator, FleetStatus, RunSummary};
pub use worker_fleet::WorkerFleet;

use async_trait::async_trait;
use legion_core::domain::acceptance::{AcceptanceState, GateError};
use legion_core::domain::cleanup::CleanupReport;
use legion_core::domain::fleet_spec::{FleetSpec, SpecError};
use legion_core::domain::process::{ProcessError, ProcessSupervisor};
use legion_core::domain::remote::{RemoteCallError, RemoteCommands};
use legion_core::infrastructure::config_materializer::{ConfigMaterializer, MaterializeError};
use legion_core::infrastructure::credentials::{CredentialError, CredentialProvisioner, KeyGenerator};
use legion_core::infrastructure::workspace::WorkspaceLayout;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::member::{MemberSnapshot, PhaseError};

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Invalid fleet spec: {0}")]
    Spec(#[from] SpecError),

    #[error("Config materialization failed: {0}")]
    Materialize(#[from] MaterializeError),

    #[error("Credential provisioning failed: {0}")]
    Credentials(#[from] CredentialError),

    #[error("Process launch failed: {0}")]
    Process(#[from] ProcessError),

    #[error("Wait-gate failed: {0}")]
    Gate(#[from] GateError),

    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteCallError),

    #[error(transparent)]
    Phase(#[from] PhaseError),
}

/// Everything a deployment needs, shared by every deployment of a run.
#[derive(Clone)]
pub struct FleetContext {
    pub spec: Arc<FleetSpec>,
    pub layout: WorkspaceLayout,
    /// Written by the event monitor, read by wait-gates
    pub acceptance: Arc<AcceptanceState>,
    pub supervisor: Arc<dyn ProcessSupervisor>,
    pub remote: Arc<dyn RemoteCommands>,
    pub materializer: Arc<ConfigMaterializer>,
    /// Present when the transport needs per-identity credentials
    pub credentials: Option<Arc<CredentialProvisioner>>,
}

impl FleetContext {
    /// Validate `spec` and wire up the shared collaborators.
    pub fn new(
        spec: FleetSpec,
        layout: WorkspaceLayout,
        acceptance: Arc<AcceptanceState>,
        supervisor: Arc<dyn ProcessSupervisor>,
        remote: Arc<dyn RemoteCommands>,
        key_generator: Arc<dyn KeyGenerator>,
    ) -> Result<Self, FleetError> {
        spec.validate()?;
        let materializer = ConfigMaterializer::from_spec(&spec)?;
        let credentials = spec
            .transport
            .requires_credentials()
            .then(|| Arc::new(CredentialProvisioner::new(layout.shared_pki_dir(), key_generator)));

        Ok(Self {
            spec: Arc::new(spec),
            layout,
            acceptance,
            supervisor,
            remote,
            materializer: Arc::new(materializer),
            credentials,
        })
    }
}

/// One independently startable part of a fleet run.
#[async_trait]
pub trait Deployment: Send + Sync {
    fn name(&self) -> &str;

    /// Write configs and credentials. Launches nothing.
    async fn prepare(&mut self, ctx: &FleetContext) -> Result<(), FleetError>;

    /// Launch processes and pass their gates.
    async fn start(&mut self, ctx: &FleetContext) -> Result<(), FleetError>;

    /// Terminate whatever was launched and clean up. Never fails; every step
    /// is attempted and recorded.
    async fn shutdown(&mut self, ctx: &FleetContext) -> CleanupReport;

    fn snapshot(&self) -> Vec<MemberSnapshot>;
}

/// Remove a directory tree; a tree that is already gone counts as removed.
pub(crate) fn remove_tree(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
