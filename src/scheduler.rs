// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Per-target scheduler: configuration, evaluation and the driver that
//! decides when to evaluate.
//!
//! A running scheduler has two trigger sources:
//!
//! - a timer waking on multiples of `update_interval` since local midnight
//! - one state listener per entity used as an entity X axis
//!
//! Both spawn an evaluation against the configuration snapshot current at
//! trigger time. Stopping trips a cancellation token that every pending
//! wake, listener and in-flight evaluation observes before acting.

use crate::actuation::{self, Domain};
use crate::clock::{self, Clock};
use crate::graph::{self, Graph, XSource};
use crate::host::{Host, ServiceCall, StateChanged};
use crate::xsource;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default seconds between periodic evaluations.
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 300;

/// Minimum change in scheduled value that counts as a "next change".
pub const PREVIEW_CHANGE_THRESHOLD: f64 = 0.05;

const SECS_PER_WEEK: u64 = 7 * 86_400;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Persisted configuration of one scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulerConfig {
    pub name: String,
    pub target_entity: String,
    pub domain: Domain,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between clock-aligned evaluations.
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
    /// Editor layout hint.
    #[serde(default = "default_graphs_per_row")]
    pub graphs_per_row: u32,
    #[serde(default)]
    pub graphs: Vec<Graph>,
}

impl SchedulerConfig {
    /// A fresh scheduler for `target_entity` with one flat, all-week graph.
    pub fn new(name: &str, target_entity: &str) -> Self {
        Self {
            name: name.to_string(),
            target_entity: target_entity.to_string(),
            domain: Domain::of_entity(target_entity),
            enabled: true,
            update_interval: DEFAULT_UPDATE_INTERVAL_SECS,
            graphs_per_row: default_graphs_per_row(),
            graphs: vec![Graph::default()],
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.target_entity.is_empty() {
            return Err("target_entity must not be empty".to_string());
        }
        if self.update_interval == 0 {
            return Err("update_interval must be at least 1 second".to_string());
        }
        if self.graphs.is_empty() {
            return Err("At least one graph is required".to_string());
        }
        self.graphs.iter().try_for_each(Graph::validate)
    }

    /// Distinct entities driving entity-based X axes.
    pub fn watched_entities(&self) -> BTreeSet<String> {
        self.graphs
            .iter()
            .filter_map(|g| match g.x_source() {
                XSource::Entity { entity_id, .. } => Some(entity_id.to_string()),
                _ => None,
            })
            .collect()
    }
}

/// Partial update of a [`SchedulerConfig`]; `None` leaves a field alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphs_per_row: Option<u32>,
    /// Replaces the whole graph list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphs: Option<Vec<Graph>>,
}

impl ConfigPatch {
    pub fn apply_to(self, config: &mut SchedulerConfig) {
        if let Some(v) = self.name {
            config.name = v;
        }
        if let Some(v) = self.target_entity {
            config.target_entity = v;
        }
        if let Some(v) = self.domain {
            config.domain = v;
        }
        if let Some(v) = self.update_interval {
            config.update_interval = v;
        }
        if let Some(v) = self.enabled {
            config.enabled = v;
        }
        if let Some(v) = self.graphs_per_row {
            config.graphs_per_row = v;
        }
        if let Some(v) = self.graphs {
            config.graphs = v;
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// What one evaluation cycle did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Outcome {
    Applied {
        graph_id: String,
        x: f64,
        ratio: f64,
        value: f64,
        calls: Vec<ServiceCall>,
        failed: usize,
    },
    Disabled,
    NoActiveGraph {
        weekday: u8,
    },
    XUnavailable {
        graph_id: String,
    },
    UnknownDomain {
        domain: String,
    },
    Cancelled,
}

/// Run one evaluation of `config` at `now` and issue the resulting calls.
///
/// Never fails: every problem becomes an [`Outcome`]. Calls are skipped once
/// `cancel` is tripped.
pub async fn evaluate<H: Host>(
    config: &SchedulerConfig,
    host: &H,
    now: NaiveDateTime,
    cancel: &CancellationToken,
) -> Outcome {
    let target = &config.target_entity;
    if !config.enabled {
        log::debug!("Scheduler {target}: disabled, skipping evaluation");
        return Outcome::Disabled;
    }

    let weekday = clock::weekday_from_sunday(&now);
    let Some(active) = graph::select(&config.graphs, weekday) else {
        log::debug!("Scheduler {target}: no graph for weekday {weekday}, skipping");
        return Outcome::NoActiveGraph { weekday };
    };

    let Some(x) = xsource::resolve(active, now, host).await else {
        return Outcome::XUnavailable {
            graph_id: active.id.clone(),
        };
    };

    let ratio = active.ratio_at(x);
    let value = active.denormalize(ratio);
    log::debug!(
        "Scheduler {target}: graph={} x={x:.3} ratio={ratio:.3} value={value:.3} ({}..{})",
        active.label,
        active.min_y,
        active.max_y
    );

    let Some(calls) = actuation::plan(&config.domain, active.attribute.as_deref(), target, value)
    else {
        log::warn!("Scheduler {target}: unknown domain '{}'", config.domain);
        return Outcome::UnknownDomain {
            domain: config.domain.to_string(),
        };
    };

    let mut failed = 0;
    for call in &calls {
        if cancel.is_cancelled() {
            log::debug!("Scheduler {target}: stopped, dropping remaining calls");
            return Outcome::Cancelled;
        }
        if let Err(e) = host.call(call).await {
            failed += 1;
            log::error!(
                "Scheduler {target}: {}.{} failed: {e:#}",
                call.domain,
                call.service
            );
        }
    }

    Outcome::Applied {
        graph_id: active.id.clone(),
        x,
        ratio,
        value,
        calls,
        failed,
    }
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// Scheduled value now and at the next change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preview {
    pub current: Option<f64>,
    pub next: Option<NextChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextChange {
    pub at: NaiveDateTime,
    pub value: f64,
}

/// Scheduled value of a time-based graph at `at`, `None` when the active
/// graph is missing or entity-driven.
fn time_value_at(config: &SchedulerConfig, at: NaiveDateTime) -> Option<f64> {
    let active = graph::select(&config.graphs, clock::weekday_from_sunday(&at))?;
    if active.x_source() != XSource::TimeOfDay {
        return None;
    }
    Some(active.denormalize(active.ratio_at(xsource::time_of_day_x(at))))
}

/// Walk aligned boundaries for up to a week and report the first one whose
/// scheduled value differs from the current one.
pub fn preview(config: &SchedulerConfig, now: NaiveDateTime) -> Preview {
    let Some(current) = time_value_at(config, now) else {
        return Preview {
            current: None,
            next: None,
        };
    };

    let interval = config.update_interval.max(1);
    let mut at = now;
    let mut next = None;
    for _ in 0..SECS_PER_WEEK.div_ceil(interval) {
        at = clock::next_aligned_boundary(at, interval);
        match time_value_at(config, at) {
            Some(value) if (value - current).abs() > PREVIEW_CHANGE_THRESHOLD => {
                next = Some(NextChange { at, value });
                break;
            }
            _ => {}
        }
    }

    Preview {
        current: Some(current),
        next,
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

enum Driver {
    Stopped,
    Running {
        cancel: CancellationToken,
        tasks: Vec<JoinHandle<()>>,
    },
}

/// A live scheduler: its current configuration snapshot and driver.
pub struct Scheduler<H> {
    config: Arc<SchedulerConfig>,
    host: Arc<H>,
    clock: Arc<dyn Clock>,
    driver: Driver,
}

impl<H> Scheduler<H> {
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        matches!(self.driver, Driver::Running { .. })
    }

    /// Cancel the timer, detach listeners and silence in-flight evaluations.
    /// Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Driver::Running { cancel, tasks } =
            std::mem::replace(&mut self.driver, Driver::Stopped)
        {
            cancel.cancel();
            for task in tasks {
                task.abort();
            }
            log::info!("Scheduler {} stopped", self.config.target_entity);
        }
    }
}

impl<H: Host> Scheduler<H> {
    /// Create a stopped scheduler.
    pub fn new(config: SchedulerConfig, host: Arc<H>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: Arc::new(config),
            host,
            clock,
            driver: Driver::Stopped,
        }
    }

    /// Arm the triggers and evaluate once right away. Restarts a running
    /// driver. Must be called inside a tokio runtime.
    pub fn start(&mut self) {
        self.stop();
        if !self.config.enabled {
            log::debug!("Scheduler {} is disabled, not starting", self.config.target_entity);
            return;
        }

        let cancel = CancellationToken::new();
        let trigger = Trigger {
            config: Arc::clone(&self.config),
            host: Arc::clone(&self.host),
            clock: Arc::clone(&self.clock),
            cancel: cancel.clone(),
        };

        let watched = self.config.watched_entities();
        let mut tasks = Vec::with_capacity(watched.len() + 1);
        // Subscribe before returning so no change after start() is missed.
        for entity_id in watched {
            let rx = self.host.subscribe();
            tasks.push(tokio::spawn(trigger.clone().listen(entity_id, rx)));
        }
        tasks.push(tokio::spawn(trigger.run_timer()));

        log::info!(
            "Scheduler {} started (every {}s, {} listener(s))",
            self.config.target_entity,
            self.config.update_interval,
            tasks.len() - 1
        );
        self.driver = Driver::Running { cancel, tasks };
    }

    /// Swap in a new configuration and re-arm against it.
    pub fn reconfigure(&mut self, config: SchedulerConfig) {
        self.stop();
        self.config = Arc::new(config);
        if self.config.enabled {
            self.start();
        }
    }

    /// One evaluation against the current snapshot, outside the timer.
    pub fn apply_now(&self) -> impl Future<Output = Outcome> + Send + use<H> {
        let config = Arc::clone(&self.config);
        let host = Arc::clone(&self.host);
        let now = self.clock.now();
        let cancel = match &self.driver {
            Driver::Running { cancel, .. } => cancel.child_token(),
            Driver::Stopped => CancellationToken::new(),
        };
        async move { evaluate(&config, host.as_ref(), now, &cancel).await }
    }

    pub fn preview(&self) -> Preview {
        preview(&self.config, self.clock.now())
    }
}

impl<H> Drop for Scheduler<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything a trigger task needs, cloned per task.
struct Trigger<H> {
    config: Arc<SchedulerConfig>,
    host: Arc<H>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl<H> Clone for Trigger<H> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            host: Arc::clone(&self.host),
            clock: Arc::clone(&self.clock),
            cancel: self.cancel.clone(),
        }
    }
}

impl<H: Host> Trigger<H> {
    fn spawn_evaluation(&self, reason: &'static str) {
        if self.cancel.is_cancelled() {
            return;
        }
        let config = Arc::clone(&self.config);
        let host = Arc::clone(&self.host);
        let cancel = self.cancel.clone();
        let now = self.clock.now();
        log::debug!("Scheduler {}: {reason} evaluation", config.target_entity);
        tokio::spawn(async move {
            evaluate(&config, host.as_ref(), now, &cancel).await;
        });
    }

    async fn run_timer(self) {
        let interval = self.config.update_interval;
        self.spawn_evaluation("initial");

        let mut last_wake: Option<NaiveDateTime> = None;
        loop {
            let now = self.clock.now();
            // Never re-fire a boundary when the wall clock lags the timer.
            let from = last_wake.map_or(now, |w| w.max(now));
            let wake = clock::next_aligned_boundary(from, interval);
            let delay = (wake - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            last_wake = Some(wake);
            self.spawn_evaluation("periodic");
        }
    }

    async fn listen(self, entity_id: String, mut rx: broadcast::Receiver<StateChanged>) {
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(change) if change.entity_id == entity_id => {
                    self.spawn_evaluation("state change");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => {
                    log::warn!("Listener for {entity_id} lagged by {n} event(s)");
                    self.spawn_evaluation("lagged state change");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_update_interval() -> u64 {
    DEFAULT_UPDATE_INTERVAL_SECS
}

fn default_graphs_per_row() -> u32 {
    1
}
