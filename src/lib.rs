// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Curve-driven scheduling of Home Assistant entities.
//!
//! A scheduler owns a set of weekday-filtered graphs. On every clock-aligned
//! tick (and whenever a graph's input sensor changes) it evaluates the active
//! graph and drives its target entity through service calls.

pub mod actuation;
pub mod clock;
pub mod config;
pub mod curve;
pub mod graph;
pub mod hass;
pub mod host;
pub mod manager;
pub mod protocol;
pub mod scheduler;
pub mod store;
pub mod xsource;
