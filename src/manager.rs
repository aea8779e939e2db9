// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Owner of all live schedulers.
//!
//! Every mutation goes through [`SchedulerManager`]: it swaps scheduler
//! configurations, starts and stops drivers and persists the result.
//! Schedulers are never handed out, only their configurations.

use crate::clock::Clock;
use crate::host::Host;
use crate::scheduler::{ConfigPatch, Outcome, Preview, Scheduler, SchedulerConfig};
use crate::store::{SchedulerMap, SchedulerStore};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

pub struct SchedulerManager<H, S> {
    schedulers: BTreeMap<String, Scheduler<H>>,
    host: Arc<H>,
    clock: Arc<dyn Clock>,
    store: S,
}

impl<H: Host, S: SchedulerStore> SchedulerManager<H, S> {
    pub fn new(host: Arc<H>, clock: Arc<dyn Clock>, store: S) -> Self {
        Self {
            schedulers: BTreeMap::new(),
            host,
            clock,
            store,
        }
    }

    /// Load persisted schedulers and start the enabled ones.
    pub fn restore(&mut self) -> anyhow::Result<usize> {
        let map = self.store.load()?;
        for (id, config) in map {
            if let Err(e) = config.validate() {
                log::warn!("Scheduler {id}: stored config is invalid ({e}), loading anyway");
            }
            self.install(id, config);
        }
        Ok(self.schedulers.len())
    }

    /// Register a scheduler with default settings for `entity_id`.
    pub fn create(&mut self, name: &str, entity_id: &str) -> anyhow::Result<()> {
        if name.is_empty() || entity_id.is_empty() {
            anyhow::bail!("create requires a name and an entity id");
        }
        if self.schedulers.contains_key(entity_id) {
            anyhow::bail!("Scheduler for {entity_id} already exists");
        }

        self.install(entity_id.to_string(), SchedulerConfig::new(name, entity_id));
        log::info!("Created scheduler '{name}' for {entity_id}");
        self.persist()
    }

    /// Apply a partial update, creating the scheduler if it doesn't exist.
    ///
    /// An invalid result is rejected and the running scheduler is left as is.
    pub fn set_config(&mut self, id: &str, patch: ConfigPatch) -> anyhow::Result<()> {
        let mut config = match self.schedulers.get(id) {
            Some(existing) => existing.config().clone(),
            None => SchedulerConfig::new(patch.name.as_deref().unwrap_or(id), id),
        };
        patch.apply_to(&mut config);
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid config for {id}: {e}"))?;

        match self.schedulers.get_mut(id) {
            Some(scheduler) => scheduler.reconfigure(config),
            None => self.install(id.to_string(), config),
        }
        log::info!("Updated scheduler config for {id}");
        self.persist()
    }

    /// Turn a scheduler on or off. Only turning on validates, so a stored
    /// config that no longer validates can always be switched off.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> anyhow::Result<()> {
        let Some(scheduler) = self.schedulers.get_mut(id) else {
            anyhow::bail!("Unknown scheduler: {id}");
        };
        let mut config = scheduler.config().clone();
        config.enabled = enabled;
        if enabled {
            config
                .validate()
                .map_err(|e| anyhow::anyhow!("Invalid config for {id}: {e}"))?;
        }

        scheduler.reconfigure(config);
        log::info!("Turned {} scheduler {id}", if enabled { "on" } else { "off" });
        self.persist()
    }

    /// Stop and discard a scheduler.
    pub fn delete(&mut self, id: &str) -> anyhow::Result<()> {
        let Some(mut scheduler) = self.schedulers.remove(id) else {
            anyhow::bail!("Scheduler not found: {id}");
        };
        scheduler.stop();
        drop(scheduler);
        log::info!("Deleted scheduler {id}");
        self.persist()
    }

    /// One immediate evaluation. The returned future doesn't borrow the
    /// manager, so callers can release their lock before awaiting it.
    pub fn apply_now(
        &self,
        id: &str,
    ) -> anyhow::Result<impl Future<Output = Outcome> + Send + use<H, S>> {
        let scheduler = self
            .schedulers
            .get(id)
            .ok_or_else(|| anyhow::anyhow!("Unknown scheduler: {id}"))?;
        Ok(scheduler.apply_now())
    }

    pub fn preview(&self, id: &str) -> anyhow::Result<Preview> {
        self.schedulers
            .get(id)
            .map(Scheduler::preview)
            .ok_or_else(|| anyhow::anyhow!("Unknown scheduler: {id}"))
    }

    /// All configurations, as stored.
    pub fn list(&self) -> SchedulerMap {
        self.schedulers
            .iter()
            .map(|(id, s)| (id.clone(), s.config().clone()))
            .collect()
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.schedulers.get(id).is_some_and(Scheduler::is_running)
    }

    /// Stop every driver; configurations stay loaded.
    pub fn shutdown(&mut self) {
        for scheduler in self.schedulers.values_mut() {
            scheduler.stop();
        }
        log::info!("Stopped {} scheduler(s)", self.schedulers.len());
    }

    fn install(&mut self, id: String, config: SchedulerConfig) {
        let mut scheduler = Scheduler::new(config, Arc::clone(&self.host), Arc::clone(&self.clock));
        scheduler.start();
        self.schedulers.insert(id, scheduler);
    }

    fn persist(&self) -> anyhow::Result<()> {
        self.store.save(&self.list()).inspect_err(|e| {
            log::error!("Failed to save schedulers: {e:#}");
        })
    }
}
