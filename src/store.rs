// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Persistence of scheduler definitions.
//!
//! The daemon keeps schedulers in a single JSON document keyed by scheduler
//! id. Writes go to a temporary file that is then renamed over the target.

use crate::scheduler::SchedulerConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Document version written by this build.
pub const STORE_VERSION: u32 = 2;

/// Schedulers keyed by id (the entity id they were created for).
pub type SchedulerMap = BTreeMap<String, SchedulerConfig>;

/// Loads and saves the full scheduler map.
pub trait SchedulerStore: Send {
    fn load(&self) -> anyhow::Result<SchedulerMap>;
    fn save(&self, schedulers: &SchedulerMap) -> anyhow::Result<()>;
}

impl<T: SchedulerStore + Sync> SchedulerStore for Arc<T> {
    fn load(&self) -> anyhow::Result<SchedulerMap> {
        self.as_ref().load()
    }

    fn save(&self, schedulers: &SchedulerMap) -> anyhow::Result<()> {
        self.as_ref().save(schedulers)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    #[serde(default)]
    schedulers: SchedulerMap,
}

/// JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SchedulerStore for JsonFileStore {
    fn load(&self) -> anyhow::Result<SchedulerMap> {
        if !self.path.exists() {
            log::info!("No scheduler store at {}, starting empty", self.path.display());
            return Ok(SchedulerMap::new());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let doc: StoreDocument = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        if doc.version != STORE_VERSION {
            log::warn!(
                "Scheduler store {} has version {}, expected {STORE_VERSION}",
                self.path.display(),
                doc.version
            );
        }

        log::info!(
            "Loaded {} scheduler(s) from {}",
            doc.schedulers.len(),
            self.path.display()
        );
        Ok(doc.schedulers)
    }

    fn save(&self, schedulers: &SchedulerMap) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let doc = StoreDocument {
            version: STORE_VERSION,
            schedulers: schedulers.clone(),
        };
        let contents = serde_json::to_string_pretty(&doc)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        log::debug!("Saved {} scheduler(s) to {}", schedulers.len(), self.path.display());
        Ok(())
    }
}

/// Keeps everything in memory; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<SchedulerMap>,
}

impl SchedulerStore for MemoryStore {
    fn load(&self) -> anyhow::Result<SchedulerMap> {
        let map = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        Ok(map.clone())
    }

    fn save(&self, schedulers: &SchedulerMap) -> anyhow::Result<()> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))?;
        *map = schedulers.clone();
        Ok(())
    }
}
