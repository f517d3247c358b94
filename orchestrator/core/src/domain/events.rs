// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One event as published on the control plane's event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPlaneEvent {
    /// Bus tag, e.g. `salt/auth` or `salt/job/<jid>/ret/<id>`
    #[serde(default)]
    pub tag: String,

    /// Event payload
    pub data: Value,
}

impl ControlPlaneEvent {
    pub fn new(tag: impl Into<String>, data: Value) -> Self {
        Self {
            tag: tag.into(),
            data,
        }
    }
}

/// What an event means for the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetSignal {
    /// The control plane acted on an identity's registration
    Accepted(String),
    /// An identity returned from the cache-warm function
    CacheReturned(String),
    Ignored,
}

impl FleetSignal {
    /// Classify an event payload.
    ///
    /// An `act` field marks an authentication action for `id`. A payload with
    /// `return` and `fun == cache_function` is the return of a cache-warm call
    /// made by `id`. Anything else, including payloads without a string `id`,
    /// is ignored.
    pub fn classify(data: &Value, cache_function: &str) -> Self {
        let Some(fields) = data.as_object() else {
            return FleetSignal::Ignored;
        };
        let Some(id) = fields.get("id").and_then(Value::as_str) else {
            return FleetSignal::Ignored;
        };

        if fields.contains_key("act") {
            return FleetSignal::Accepted(id.to_string());
        }

        let is_cache_return = fields.contains_key("return")
            && fields.get("fun").and_then(Value::as_str) == Some(cache_function);
        if is_cache_return {
            return FleetSignal::CacheReturned(id.to_string());
        }

        FleetSignal::Ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CACHE: &str = "legion.cache";

    #[test]
    fn test_auth_action_is_acceptance() {
        let data = json!({"id": "ms-1", "act": "accept", "result": true});
        assert_eq!(
            FleetSignal::classify(&data, CACHE),
            FleetSignal::Accepted("ms-1".to_string())
        );

        // pending keys are still an auth action carrying the id
        let data = json!({"id": "ms-1_0", "act": "pend"});
        assert_eq!(
            FleetSignal::classify(&data, CACHE),
            FleetSignal::Accepted("ms-1_0".to_string())
        );
    }

    #[test]
    fn test_cache_return() {
        let data = json!({"id": "ms-1", "fun": "legion.cache", "return": null, "jid": "1"});
        assert_eq!(
            FleetSignal::classify(&data, CACHE),
            FleetSignal::CacheReturned("ms-1".to_string())
        );
    }

    #[test]
    fn test_other_returns_are_ignored() {
        let data = json!({"id": "ms-1", "fun": "test.ping", "return": true});
        assert_eq!(FleetSignal::classify(&data, CACHE), FleetSignal::Ignored);

        // a cache job publication without a return is not a completion
        let data = json!({"id": "ms-1", "fun": "legion.cache"});
        assert_eq!(FleetSignal::classify(&data, CACHE), FleetSignal::Ignored);
    }

    #[test]
    fn test_malformed_payloads_are_ignored() {
        assert_eq!(FleetSignal::classify(&json!("text"), CACHE), FleetSignal::Ignored);
        assert_eq!(FleetSignal::classify(&json!({"act": "accept"}), CACHE), FleetSignal::Ignored);
        assert_eq!(
            FleetSignal::classify(&json!({"id": 7, "act": "accept"}), CACHE),
            FleetSignal::Ignored
        );
    }
}
