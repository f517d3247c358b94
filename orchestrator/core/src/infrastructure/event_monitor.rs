// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Background task that turns control-plane events into acceptance state.
//!
//! The monitor is the sole writer of [`AcceptanceState`]. It polls its feed,
//! sleeps `idle` whenever nothing is ready, and keeps going through transient
//! feed errors. It stops when the feed reports [`EventFeedError::Closed`] or
//! its cancellation token fires.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::acceptance::{AcceptanceSet, AcceptanceState};
use crate::domain::events::{ControlPlaneEvent, FleetSignal};
use crate::infrastructure::event_feed::{EventFeed, EventFeedError};

pub struct EventMonitor {
    state: Arc<AcceptanceState>,
    idle: Duration,
    cache_function: String,
}

impl EventMonitor {
    pub fn new(state: Arc<AcceptanceState>, idle: Duration, cache_function: impl Into<String>) -> Self {
        Self {
            state,
            idle,
            cache_function: cache_function.into(),
        }
    }

    /// Classify one event and record it.
    pub fn apply(&self, event: &ControlPlaneEvent) -> FleetSignal {
        let signal = FleetSignal::classify(&event.data, &self.cache_function);
        match &signal {
            FleetSignal::Accepted(id) => {
                if self.state.mark_accepted(id) {
                    info!(id = %id, "Identity accepted by control plane");
                }
            }
            FleetSignal::CacheReturned(id) => {
                if self.state.mark_cached(id) {
                    info!(id = %id, "Identity cache warmed");
                }
            }
            FleetSignal::Ignored => {}
        }
        signal
    }

    /// Run on a background task until the feed closes or `cancel` fires.
    pub fn spawn<F>(self, feed: F, cancel: CancellationToken) -> JoinHandle<()>
    where
        F: EventFeed + 'static,
    {
        tokio::spawn(async move { self.run(feed, cancel).await })
    }

    pub async fn run<F: EventFeed>(self, mut feed: F, cancel: CancellationToken) {
        info!(idle = ?self.idle, "Event monitor started");

        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = feed.poll_event() => polled,
            };

            let idle = match polled {
                Ok(Some(event)) => {
                    debug!(tag = %event.tag, "Control-plane event");
                    self.apply(&event);
                    false
                }
                Ok(None) => true,
                Err(EventFeedError::Closed) => {
                    info!("Event feed closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Event feed error, retrying");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.idle) => {}
                }
            }
        }

        info!(
            accepted = self.state.count(AcceptanceSet::Accepted),
            cached = self.state.count(AcceptanceSet::Cached),
            "Event monitor stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::acceptance::{wait_for, GatePolicy};
    use crate::infrastructure::event_bus::EventBus;
    use async_trait::async_trait;
    use serde_json::json;

    const CACHE: &str = "legion.cache";

    fn monitor(state: &Arc<AcceptanceState>) -> EventMonitor {
        EventMonitor::new(state.clone(), Duration::from_millis(5), CACHE)
    }

    #[test]
    fn test_apply_marks_sets() {
        let state = Arc::new(AcceptanceState::new());
        let monitor = monitor(&state);

        let signal = monitor.apply(&ControlPlaneEvent::new("salt/auth", json!({"id": "ms-1", "act": "pend"})));
        assert_eq!(signal, FleetSignal::Accepted("ms-1".to_string()));
        assert!(state.contains(AcceptanceSet::Accepted, "ms-1"));

        monitor.apply(&ControlPlaneEvent::new(
            "salt/job/1/ret/ms-1",
            json!({"id": "ms-1", "fun": CACHE, "return": true}),
        ));
        assert!(state.contains(AcceptanceSet::Cached, "ms-1"));

        monitor.apply(&ControlPlaneEvent::new(
            "salt/job/2/ret/ms-2",
            json!({"id": "ms-2", "fun": "test.ping", "return": true}),
        ));
        assert!(!state.contains(AcceptanceSet::Cached, "ms-2"));
        assert!(!state.contains(AcceptanceSet::Accepted, "ms-2"));
    }

    #[tokio::test]
    async fn test_monitor_feeds_gate() {
        let state = Arc::new(AcceptanceState::new());
        let bus = EventBus::new(64);
        let cancel = CancellationToken::new();
        let handle = monitor(&state).spawn(bus.feed(), cancel.clone());

        let required = vec!["ms-1".to_string(), "ms-2".to_string()];
        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(ControlPlaneEvent::new("salt/auth", json!({"id": "ms-2", "act": "accept"})));
            publisher.publish(ControlPlaneEvent::new("salt/auth", json!({"id": "ms-1", "act": "accept"})));
        });

        let policy = GatePolicy {
            poll_interval: Duration::from_millis(5),
            timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        wait_for(&state, AcceptanceSet::Accepted, &required, &policy)
            .await
            .unwrap();

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_monitor_stops_when_feed_closes() {
        let state = Arc::new(AcceptanceState::new());
        let bus = EventBus::new(8);
        let feed = bus.feed();
        bus.publish(ControlPlaneEvent::new("salt/auth", json!({"id": "ms-1", "act": "accept"})));
        drop(bus);

        monitor(&state).run(feed, CancellationToken::new()).await;
        assert!(state.contains(AcceptanceSet::Accepted, "ms-1"));
    }

    struct FlakyFeed {
        polls: usize,
    }

    #[async_trait]
    impl EventFeed for FlakyFeed {
        async fn poll_event(&mut self) -> Result<Option<ControlPlaneEvent>, EventFeedError> {
            self.polls += 1;
            match self.polls {
                1 => Err(EventFeedError::Disconnected("stream ended".to_string())),
                2 => Ok(Some(ControlPlaneEvent::new("salt/auth", json!({"id": "ms-9", "act": "accept"})))),
                _ => Err(EventFeedError::Closed),
            }
        }
    }

    #[tokio::test]
    async fn test_monitor_survives_disconnect() {
        let state = Arc::new(AcceptanceState::new());
        monitor(&state)
            .run(FlakyFeed { polls: 0 }, CancellationToken::new())
            .await;
        assert!(state.contains(AcceptanceSet::Accepted, "ms-9"));
    }
}
