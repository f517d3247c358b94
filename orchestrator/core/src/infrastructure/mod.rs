// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod config_materializer;
pub mod credentials;
#[cfg(any(test, feature = "test-support"))]
pub mod event_bus;
pub mod event_feed;
pub mod event_monitor;
pub mod process_supervisor;
pub mod remote_client;
pub mod workspace;

pub use config_materializer::{ConfigMaterializer, MaterializeError};
pub use credentials::{CredentialError, CredentialProvisioner, KeyGenerator, SaltKeyGenerator};
#[cfg(any(test, feature = "test-support"))]
pub use event_bus::{BusEventFeed, EventBus};
pub use event_feed::{CommandEventFeed, EventFeed, EventFeedError};
pub use event_monitor::EventMonitor;
pub use process_supervisor::LocalProcessSupervisor;
pub use remote_client::SaltCommandClient;
pub use workspace::WorkspaceLayout;
