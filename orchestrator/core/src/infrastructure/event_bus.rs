// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - in-process source of control-plane events
//
// Uses a tokio broadcast channel. A feed that falls behind loses the oldest
// events. Built for tests and embedders (`test-support` feature) that drive
// the event monitor without a live control plane.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use crate::domain::events::ControlPlaneEvent;
use crate::infrastructure::event_feed::{EventFeed, EventFeedError};

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ControlPlaneEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish an event to every feed
    pub fn publish(&self, event: ControlPlaneEvent) {
        debug!(tag = %event.tag, "Publishing event");
        if self.sender.send(event).is_err() {
            debug!("No feeds listening to event");
        }
    }

    /// Subscribe as an [`EventFeed`]; only events published afterwards are seen.
    pub fn feed(&self) -> BusEventFeed {
        BusEventFeed {
            receiver: self.sender.subscribe(),
        }
    }
}

pub struct BusEventFeed {
    receiver: broadcast::Receiver<ControlPlaneEvent>,
}

#[async_trait]
impl EventFeed for BusEventFeed {
    async fn poll_event(&mut self) -> Result<Option<ControlPlaneEvent>, EventFeedError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            // the next poll resumes at the oldest retained event
            Err(TryRecvError::Lagged(n)) => {
                warn!("Event feed lagged by {} events", n);
                Ok(None)
            }
            Err(TryRecvError::Closed) => Err(EventFeedError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_every_feed_sees_published_events() {
        let event_bus = EventBus::new(10);
        let mut a = event_bus.feed();
        let mut b = event_bus.feed();

        event_bus.publish(ControlPlaneEvent::new("salt/auth", json!({"id": "ms-1", "act": "accept"})));

        let received = a.poll_event().await.unwrap().unwrap();
        assert_eq!(received.tag, "salt/auth");
        assert_eq!(received.data["id"], "ms-1");
        assert!(b.poll_event().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_feed_empty_lagged_closed() {
        let event_bus = EventBus::new(2);
        let mut feed = event_bus.feed();

        assert!(feed.poll_event().await.unwrap().is_none());

        for n in 0..4 {
            event_bus.publish(ControlPlaneEvent::new("t", json!({ "n": n })));
        }
        // the first poll reports the lag, then the two retained events follow
        assert!(feed.poll_event().await.unwrap().is_none());
        assert_eq!(feed.poll_event().await.unwrap().unwrap().data["n"], 2);
        assert_eq!(feed.poll_event().await.unwrap().unwrap().data["n"], 3);

        drop(event_bus);
        assert!(matches!(feed.poll_event().await, Err(EventFeedError::Closed)));
    }
}
