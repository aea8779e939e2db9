// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Client-daemon protocol over Unix domain sockets.
//!
//! Messages are newline-delimited JSON. The client sends a [`Request`]
//! and the daemon replies with a [`Response`].

use crate::scheduler::{ConfigPatch, Outcome, Preview};
use crate::store::SchedulerMap;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requests (client -> daemon)
// ---------------------------------------------------------------------------

/// Schedulers are addressed by the entity id they were created for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Create a scheduler with default settings.
    #[serde(rename = "create_scheduler")]
    CreateScheduler { name: String, entity_id: String },

    /// Update (or create) a scheduler's configuration.
    #[serde(rename = "set_config")]
    SetConfig {
        entity_id: String,
        #[serde(default)]
        patch: ConfigPatch,
    },

    #[serde(rename = "delete_scheduler")]
    DeleteScheduler { entity_id: String },

    /// Evaluate once, immediately.
    #[serde(rename = "apply_now")]
    ApplyNow { entity_id: String },

    #[serde(rename = "list_schedulers")]
    ListSchedulers,

    #[serde(rename = "turn_on")]
    TurnOn { entity_id: String },

    #[serde(rename = "turn_off")]
    TurnOff { entity_id: String },

    /// Current scheduled value and the next significant change.
    #[serde(rename = "preview")]
    Preview { entity_id: String },
}

// ---------------------------------------------------------------------------
// Responses (daemon -> client)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// All scheduler configurations.
    #[serde(rename = "schedulers")]
    Schedulers { schedulers: SchedulerMap },

    /// Result of an immediate evaluation.
    #[serde(rename = "applied")]
    Applied { outcome: Outcome },

    #[serde(rename = "preview")]
    Preview { preview: Preview },

    /// Operation succeeded.
    #[serde(rename = "ok")]
    Ok { message: String },

    /// Operation failed.
    #[serde(rename = "error")]
    Error { message: String },
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Encode a message as a newline-delimited JSON string.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    let mut s = serde_json::to_string(msg)?;
    s.push('\n');
    Ok(s)
}

/// Decode a message from a JSON string (newline-trimmed).
pub fn decode<'a, T: Deserialize<'a>>(s: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(s.trim())
}
