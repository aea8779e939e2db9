// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Graph definitions and weekday selection.
//!
//! A graph is one curve together with its Y range, X-axis source and the
//! weekdays on which it applies. A scheduler holds an ordered list of
//! graphs; for any weekday the first graph listing it is the active one.

use crate::curve::{self, CurvePoint, InterpolationMode};
use serde::{Deserialize, Serialize};

/// Minutes in a day, the span of a time-based X axis.
pub const MINUTES_PER_DAY: f64 = 1440.0;

/// Where a graph reads its X value from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum XAxisType {
    /// Minutes since local midnight.
    #[default]
    Time,
    /// Live numeric state of another entity.
    Entity,
}

/// Resolved X source of a graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum XSource<'a> {
    TimeOfDay,
    Entity {
        entity_id: &'a str,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// Entity axis without an entity configured.
    Missing,
}

/// One curve of a scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Graph {
    pub id: String,
    #[serde(default = "default_label")]
    pub label: String,
    /// 0 = Sunday .. 6 = Saturday
    #[serde(default = "all_weekdays")]
    pub weekdays: Vec<u8>,
    /// Sub-target of the domain, e.g. `color_temp` for a light.
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub mode: InterpolationMode,
    #[serde(default = "default_min_y")]
    pub min_y: f64,
    #[serde(default = "default_max_y")]
    pub max_y: f64,
    #[serde(default)]
    pub x_snap: Option<f64>,
    #[serde(default)]
    pub y_snap: Option<f64>,
    /// Drop straight to the minimum instead of easing into it.
    #[serde(default)]
    pub step_to_zero: bool,
    #[serde(default)]
    pub x_axis_type: XAxisType,
    #[serde(default)]
    pub x_axis_entity: Option<String>,
    #[serde(default)]
    pub x_axis_min: Option<f64>,
    #[serde(default)]
    pub x_axis_max: Option<f64>,
    #[serde(default)]
    pub x_axis_unit: Option<String>,
    #[serde(default = "default_points")]
    pub points: Vec<CurvePoint>,
}

impl Graph {
    /// Normalized curve output at `x`.
    pub fn ratio_at(&self, x: f64) -> f64 {
        curve::ratio(
            &self.points,
            self.mode,
            x,
            self.min_y,
            self.max_y,
            self.step_to_zero,
        )
    }

    /// Map a ratio back into this graph's Y range.
    pub fn denormalize(&self, ratio: f64) -> f64 {
        self.min_y + ratio * (self.max_y - self.min_y)
    }

    pub fn x_source(&self) -> XSource<'_> {
        match self.x_axis_type {
            XAxisType::Time => XSource::TimeOfDay,
            XAxisType::Entity => match self.x_axis_entity.as_deref() {
                Some(id) if !id.is_empty() => XSource::Entity {
                    entity_id: id,
                    min: self.x_axis_min,
                    max: self.x_axis_max,
                },
                _ => XSource::Missing,
            },
        }
    }

    pub fn applies_on(&self, weekday: u8) -> bool {
        self.weekdays.contains(&weekday)
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(day) = self.weekdays.iter().find(|d| **d > 6) {
            return Err(format!("Graph '{}': weekday {day} is out of range 0-6", self.id));
        }
        if !self.min_y.is_finite() || !self.max_y.is_finite() {
            return Err(format!("Graph '{}': Y range must be finite", self.id));
        }
        if self.points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(format!("Graph '{}': points must be finite", self.id));
        }
        if self.x_source() == XSource::Missing {
            return Err(format!(
                "Graph '{}': entity X axis requires x_axis_entity",
                self.id
            ));
        }
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self {
            id: "graph_1".to_string(),
            label: default_label(),
            weekdays: all_weekdays(),
            attribute: None,
            mode: InterpolationMode::Linear,
            min_y: default_min_y(),
            max_y: default_max_y(),
            x_snap: None,
            y_snap: Some(0.0),
            step_to_zero: false,
            x_axis_type: XAxisType::Time,
            x_axis_entity: None,
            x_axis_min: None,
            x_axis_max: None,
            x_axis_unit: None,
            points: default_points(),
        }
    }
}

/// Pick the active graph for `weekday`: the first one listing it.
pub fn select(graphs: &[Graph], weekday: u8) -> Option<&Graph> {
    graphs.iter().find(|g| g.applies_on(weekday))
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

fn default_label() -> String {
    "Schedule 1".to_string()
}

fn all_weekdays() -> Vec<u8> {
    (0..=6).collect()
}

fn default_min_y() -> f64 {
    0.0
}

fn default_max_y() -> f64 {
    100.0
}

fn default_points() -> Vec<CurvePoint> {
    vec![CurvePoint::new(0.0, 0.0), CurvePoint::new(MINUTES_PER_DAY, 0.0)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(id: &str, weekdays: &[u8]) -> Graph {
        Graph {
            id: id.to_string(),
            weekdays: weekdays.to_vec(),
            ..Graph::default()
        }
    }

    #[test]
    fn test_select_weekday_vs_weekend() {
        let graphs = vec![graph("weekday", &[1, 2, 3, 4, 5]), graph("weekend", &[0, 6])];
        assert_eq!(select(&graphs, 6).map(|g| g.id.as_str()), Some("weekend"));
        assert_eq!(select(&graphs, 1).map(|g| g.id.as_str()), Some("weekday"));
        assert_eq!(select(&graphs, 0).map(|g| g.id.as_str()), Some("weekend"));
    }

    #[test]
    fn test_select_first_match_shadows_later() {
        let graphs = vec![graph("a", &[3]), graph("b", &[3, 4])];
        assert_eq!(select(&graphs, 3).map(|g| g.id.as_str()), Some("a"));
        assert_eq!(select(&graphs, 4).map(|g| g.id.as_str()), Some("b"));
    }

    #[test]
    fn test_select_no_match() {
        let graphs = vec![graph("a", &[1])];
        assert!(select(&graphs, 2).is_none());
        assert!(select(&[], 2).is_none());
    }

    #[test]
    fn test_sparse_record_gets_defaults() {
        let g: Graph = serde_json::from_str(r#"{"id": "g"}"#).unwrap();
        assert_eq!(g.weekdays, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(g.mode, InterpolationMode::Linear);
        assert_eq!((g.min_y, g.max_y), (0.0, 100.0));
        assert_eq!(g.x_source(), XSource::TimeOfDay);
        assert_eq!(g.points.len(), 2);
    }

    #[test]
    fn test_entity_axis_source() {
        let g: Graph = serde_json::from_str(
            r#"{"id": "g", "x_axis_type": "entity", "x_axis_entity": "sensor.outdoor",
                "x_axis_min": -10, "x_axis_max": 30, "mode": "smooth"}"#,
        )
        .unwrap();
        assert_eq!(
            g.x_source(),
            XSource::Entity {
                entity_id: "sensor.outdoor",
                min: Some(-10.0),
                max: Some(30.0)
            }
        );
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_graphs() {
        assert!(graph("bad", &[7]).validate().is_err());

        let missing_entity = Graph {
            x_axis_type: XAxisType::Entity,
            ..Graph::default()
        };
        assert_eq!(missing_entity.x_source(), XSource::Missing);
        assert!(missing_entity.validate().is_err());
    }

    #[test]
    fn test_denormalize_into_range() {
        let g = Graph {
            min_y: 2700.0,
            max_y: 6500.0,
            ..Graph::default()
        };
        assert_eq!(g.denormalize(0.0), 2700.0);
        assert_eq!(g.denormalize(0.5), 4600.0);
        assert_eq!(g.denormalize(1.0), 6500.0);
    }
}
