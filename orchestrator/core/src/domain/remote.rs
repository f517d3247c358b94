// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Registers a worker's fake identities with the control plane.
pub const REGISTER_FAKES_FUNCTION: &str = "legion.keys";

/// Compiles grains and pillar on the control plane for a worker's fakes.
pub const WARM_CACHE_FUNCTION: &str = "legion.cache";

#[derive(Debug, Error)]
pub enum RemoteCallError {
    #[error("{function} on {target} timed out after {timeout:?}")]
    Timeout {
        function: String,
        target: String,
        timeout: Duration,
    },

    #[error("{function} on {target} failed to authenticate with the control plane: {detail}")]
    AuthenticationFailed {
        function: String,
        target: String,
        detail: String,
    },

    #[error("{function} on {target} failed: {detail}")]
    CommandFailed {
        function: String,
        target: String,
        detail: String,
    },

    #[error("Failed to run remote-call client '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl RemoteCallError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RemoteCallError::Timeout { .. })
    }
}

/// The legion extension calls issued against a freshly accepted worker.
#[async_trait]
pub trait RemoteCommands: Send + Sync {
    /// Ask `minion_id` to register its fake identities.
    async fn register_fakes(&self, minion_id: &str) -> Result<(), RemoteCallError>;

    /// Ask `minion_id` to warm the control plane's cache for its fakes.
    async fn warm_cache(&self, minion_id: &str) -> Result<(), RemoteCallError>;
}
