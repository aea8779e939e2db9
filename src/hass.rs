// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Home Assistant REST adapter.
//!
//! Implements the [`crate::host`] traits over `/api/states` and
//! `/api/services`. State changes are discovered by polling the full state
//! list and diffing it against the previous poll.

use crate::config::HomeAssistantConfig;
use crate::host::{ServiceCall, ServiceCaller, StateChanged, StateReader, StateWatcher};
use anyhow::Context;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Capacity of the state change channel.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
struct EntityState {
    entity_id: String,
    state: String,
}

pub struct HassClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
    changes: broadcast::Sender<StateChanged>,
}

impl HassClient {
    pub fn new(config: &HomeAssistantConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = Url::parse(&config.url)
            .with_context(|| format!("Invalid Home Assistant URL '{}'", config.url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Home Assistant URL '{}' cannot be a base URL", config.url);
        }
        let token = config.resolve_token();
        if token.is_none() {
            log::warn!("No Home Assistant token configured, requests will be unauthenticated");
        }
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            base_url,
            token,
            changes,
        })
    }

    /// Base URL extended by `segments`, each percent-encoded as one path
    /// segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Raw state of one entity, `None` on 404.
    pub async fn fetch_state(&self, entity_id: &str) -> anyhow::Result<Option<String>> {
        let url = self.url(&["api", "states", entity_id]);
        let response = self.authorized(self.client.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let entity = response
            .error_for_status()?
            .json::<EntityState>()
            .await
            .with_context(|| format!("Error reading state of {entity_id}"))?;
        Ok(Some(entity.state))
    }

    /// Every entity's raw state, keyed by entity id.
    pub async fn fetch_states(&self) -> anyhow::Result<HashMap<String, String>> {
        let response = self
            .authorized(self.client.get(self.url(&["api", "states"])))
            .send()
            .await?
            .error_for_status()?;

        let states = response
            .json::<Vec<EntityState>>()
            .await
            .context("Error getting all states")?;
        Ok(states.into_iter().map(|e| (e.entity_id, e.state)).collect())
    }

    /// Poll `/api/states` every `interval` and broadcast what changed.
    /// The first successful poll only seeds the baseline.
    pub fn spawn_state_poller(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut known: Option<HashMap<String, String>> = None;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let current = match self.fetch_states().await {
                    Ok(states) => states,
                    Err(e) => {
                        log::warn!("State poll failed: {e:#}");
                        continue;
                    }
                };

                if let Some(previous) = &known {
                    for change in diff_states(previous, &current) {
                        log::debug!("{} -> {:?}", change.entity_id, change.state);
                        // No receivers just means no scheduler is listening.
                        let _ = self.changes.send(change);
                    }
                } else {
                    log::info!("Tracking {} entity state(s)", current.len());
                }
                known = Some(current);
            }
            log::debug!("State poller stopped");
        })
    }
}

/// Entities whose state differs between two polls. Removed entities are
/// reported with no state.
pub fn diff_states(
    previous: &HashMap<String, String>,
    current: &HashMap<String, String>,
) -> Vec<StateChanged> {
    let mut changes: Vec<StateChanged> = current
        .iter()
        .filter(|(id, state)| previous.get(*id) != Some(*state))
        .map(|(id, state)| StateChanged {
            entity_id: id.clone(),
            state: Some(state.clone()),
        })
        .collect();

    changes.extend(
        previous
            .keys()
            .filter(|id| !current.contains_key(*id))
            .map(|id| StateChanged {
                entity_id: id.clone(),
                state: None,
            }),
    );
    changes.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
    changes
}

impl StateReader for HassClient {
    async fn state(&self, entity_id: &str) -> Option<String> {
        match self.fetch_state(entity_id).await {
            Ok(state) => state,
            Err(e) => {
                log::warn!("Failed to read {entity_id}: {e:#}");
                None
            }
        }
    }
}

impl StateWatcher for HassClient {
    fn subscribe(&self) -> broadcast::Receiver<StateChanged> {
        self.changes.subscribe()
    }
}

impl ServiceCaller for HassClient {
    async fn call(&self, call: &ServiceCall) -> anyhow::Result<()> {
        let url = self.url(&["api", "services", &call.domain, &call.service]);
        log::debug!("Calling {}.{}: {}", call.domain, call.service, call.data);

        self.authorized(self.client.post(url))
            .json(&call.data)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("{}.{} rejected", call.domain, call.service))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn states(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_diff_reports_changed_added_and_removed() {
        let before = states(&[("sensor.a", "1"), ("sensor.b", "2"), ("sensor.gone", "x")]);
        let after = states(&[("sensor.a", "1"), ("sensor.b", "3"), ("sensor.new", "on")]);

        let changes = diff_states(&before, &after);
        assert_eq!(
            changes,
            [
                StateChanged {
                    entity_id: "sensor.b".to_string(),
                    state: Some("3".to_string()),
                },
                StateChanged {
                    entity_id: "sensor.gone".to_string(),
                    state: None,
                },
                StateChanged {
                    entity_id: "sensor.new".to_string(),
                    state: Some("on".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_diff_of_identical_polls_is_empty() {
        let s = states(&[("sensor.a", "1")]);
        assert!(diff_states(&s, &s).is_empty());
    }

    fn client(url: &str) -> HassClient {
        let config = HomeAssistantConfig {
            url: url.to_string(),
            token: Some("t".to_string()),
            ..HomeAssistantConfig::default()
        };
        HassClient::new(&config).unwrap()
    }

    #[test]
    fn test_urls_ignore_trailing_slash() {
        assert_eq!(
            client("http://ha.lan:8123/").url(&["api", "states", "light.desk"]).as_str(),
            "http://ha.lan:8123/api/states/light.desk"
        );
        assert_eq!(
            client("http://ha.lan:8123").url(&["api", "services", "light", "turn_on"]).as_str(),
            "http://ha.lan:8123/api/services/light/turn_on"
        );
        assert_eq!(
            client("http://ha.lan/hass/").url(&["api", "states"]).as_str(),
            "http://ha.lan/hass/api/states"
        );
    }

    #[test]
    fn test_entity_id_cannot_escape_its_segment() {
        let url = client("http://ha.lan:8123").url(&["api", "states", "light.x/../../config?a=1"]);
        assert_eq!(url.path(), "/api/states/light.x%2F..%2F..%2Fconfig%3Fa=1");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_rejects_unusable_base_url() {
        let config = HomeAssistantConfig {
            url: "not a url".to_string(),
            ..HomeAssistantConfig::default()
        };
        assert!(HassClient::new(&config).is_err());
    }

    #[test]
    fn test_entity_state_payload() {
        let e: EntityState = serde_json::from_str(
            r#"{"entity_id": "sensor.t", "state": "21.5", "attributes": {"unit_of_measurement": "°C"}}"#,
        )
        .unwrap();
        assert_eq!(e.state, "21.5");
    }
}
