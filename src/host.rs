// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Interfaces to the home automation host.
//!
//! The scheduler core only needs three things from its host: reading an
//! entity's current state, being told when an entity's state changes, and
//! calling a service. [`crate::hass`] implements them against Home
//! Assistant's REST API.

use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::broadcast;

/// One outbound service invocation, e.g. `light.turn_on`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: serde_json::Value,
}

impl ServiceCall {
    pub fn new(domain: &str, service: &str, data: serde_json::Value) -> Self {
        Self {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
        }
    }
}

/// An entity changed state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChanged {
    pub entity_id: String,
    pub state: Option<String>,
}

/// Reads the current raw state of an entity.
pub trait StateReader: Send + Sync + 'static {
    /// `None` when the entity doesn't exist or couldn't be read.
    fn state(&self, entity_id: &str) -> impl Future<Output = Option<String>> + Send;
}

/// Publishes state changes.
pub trait StateWatcher: Send + Sync + 'static {
    fn subscribe(&self) -> broadcast::Receiver<StateChanged>;
}

/// Issues service calls. Fire-and-forget: errors are for logging only.
pub trait ServiceCaller: Send + Sync + 'static {
    fn call(&self, call: &ServiceCall) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Everything a scheduler needs from the host.
pub trait Host: StateReader + StateWatcher + ServiceCaller {}

impl<T: StateReader + StateWatcher + ServiceCaller> Host for T {}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory host recording every service call with the (tokio) time
    /// elapsed since creation.
    pub(crate) struct FakeHost {
        states: Mutex<HashMap<String, String>>,
        calls: Mutex<Vec<(Duration, ServiceCall)>>,
        failing: Mutex<HashSet<String>>,
        changes: broadcast::Sender<StateChanged>,
        start: tokio::time::Instant,
    }

    impl FakeHost {
        pub(crate) fn new() -> Self {
            let (changes, _) = broadcast::channel(64);
            Self {
                states: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                failing: Mutex::new(HashSet::new()),
                changes,
                start: tokio::time::Instant::now(),
            }
        }

        /// Set a state and notify subscribers.
        pub(crate) fn set_state(&self, entity_id: &str, state: &str) {
            self.states
                .lock()
                .unwrap()
                .insert(entity_id.to_string(), state.to_string());
            let _ = self.changes.send(StateChanged {
                entity_id: entity_id.to_string(),
                state: Some(state.to_string()),
            });
        }

        /// Make every call to `domain.service` fail.
        pub(crate) fn fail_service(&self, domain: &str, service: &str) {
            self.failing
                .lock()
                .unwrap()
                .insert(format!("{domain}.{service}"));
        }

        pub(crate) fn calls(&self) -> Vec<ServiceCall> {
            self.calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
        }

        pub(crate) fn timed_calls(&self) -> Vec<(Duration, ServiceCall)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl StateReader for FakeHost {
        async fn state(&self, entity_id: &str) -> Option<String> {
            self.states.lock().unwrap().get(entity_id).cloned()
        }
    }

    impl StateWatcher for FakeHost {
        fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
            self.changes.subscribe()
        }
    }

    impl ServiceCaller for FakeHost {
        async fn call(&self, call: &ServiceCall) -> anyhow::Result<()> {
            let elapsed = tokio::time::Instant::now() - self.start;
            self.calls.lock().unwrap().push((elapsed, call.clone()));
            let key = format!("{}.{}", call.domain, call.service);
            if self.failing.lock().unwrap().contains(&key) {
                anyhow::bail!("service {key} failed");
            }
            Ok(())
        }
    }
}
