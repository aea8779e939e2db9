// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Resolves the X value a graph is evaluated at.

use crate::clock;
use crate::graph::{Graph, XSource};
use crate::host::StateReader;
use chrono::NaiveDateTime;

/// Added to the time of day so a query taken right at a scheduled boundary
/// lands on or after it.
pub const BOUNDARY_EPSILON_MINUTES: f64 = 1e-3;

/// X for a time-based graph: minutes since midnight plus the boundary epsilon.
pub fn time_of_day_x(now: NaiveDateTime) -> f64 {
    clock::minutes_of_day(now) + BOUNDARY_EPSILON_MINUTES
}

/// Parse an entity state as a number. Host placeholders such as
/// `unavailable` and `unknown` are not numbers.
pub fn parse_numeric_state(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Clamp `value` into the axis bounds. A missing bound doesn't clamp.
pub fn clamp_to_axis(value: f64, min: Option<f64>, max: Option<f64>) -> f64 {
    let value = min.map_or(value, |lo| value.max(lo));
    max.map_or(value, |hi| value.min(hi))
}

/// Current X value for `graph`, or `None` when its input is unavailable.
pub async fn resolve<S: StateReader>(
    graph: &Graph,
    now: NaiveDateTime,
    states: &S,
) -> Option<f64> {
    match graph.x_source() {
        XSource::TimeOfDay => Some(time_of_day_x(now)),
        XSource::Entity {
            entity_id,
            min,
            max,
        } => {
            let Some(raw) = states.state(entity_id).await else {
                log::warn!("Graph {}: X entity {entity_id} is unavailable", graph.id);
                return None;
            };
            let Some(value) = parse_numeric_state(&raw) else {
                log::warn!(
                    "Graph {}: X entity {entity_id} state '{raw}' is not numeric",
                    graph.id
                );
                return None;
            };
            Some(clamp_to_axis(value, min, max))
        }
        XSource::Missing => {
            log::warn!("Graph {}: entity X axis has no entity configured", graph.id);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::at;
    use crate::graph::XAxisType;
    use crate::host::testing::FakeHost;

    fn entity_graph() -> Graph {
        Graph {
            x_axis_type: XAxisType::Entity,
            x_axis_entity: Some("sensor.outdoor".to_string()),
            x_axis_min: Some(-10.0),
            x_axis_max: Some(30.0),
            ..Graph::default()
        }
    }

    #[test]
    fn test_parse_numeric_state() {
        assert_eq!(parse_numeric_state("21.5"), Some(21.5));
        assert_eq!(parse_numeric_state(" -3 "), Some(-3.0));
        assert_eq!(parse_numeric_state("unavailable"), None);
        assert_eq!(parse_numeric_state("unknown"), None);
        assert_eq!(parse_numeric_state("NaN"), None);
        assert_eq!(parse_numeric_state("inf"), None);
    }

    #[test]
    fn test_clamp_to_axis() {
        assert_eq!(clamp_to_axis(45.0, Some(-10.0), Some(30.0)), 30.0);
        assert_eq!(clamp_to_axis(-20.0, Some(-10.0), Some(30.0)), -10.0);
        assert_eq!(clamp_to_axis(12.0, Some(-10.0), Some(30.0)), 12.0);
        assert_eq!(clamp_to_axis(99.0, None, Some(30.0)), 30.0);
        assert_eq!(clamp_to_axis(-99.0, None, Some(30.0)), -99.0);
    }

    #[test]
    fn test_time_query_lands_past_boundary() {
        let x = time_of_day_x(at((2026, 3, 4), (6, 0, 0)));
        assert!(x > 360.0 && x < 360.01);
    }

    #[tokio::test]
    async fn test_resolve_time_graph() {
        let host = FakeHost::new();
        let x = resolve(&Graph::default(), at((2026, 3, 4), (1, 30, 0)), &host).await;
        assert_eq!(x, Some(90.0 + BOUNDARY_EPSILON_MINUTES));
    }

    #[tokio::test]
    async fn test_resolve_entity_graph_clamps() {
        let host = FakeHost::new();
        let now = at((2026, 3, 4), (1, 30, 0));
        let g = entity_graph();

        assert_eq!(resolve(&g, now, &host).await, None);

        host.set_state("sensor.outdoor", "unavailable");
        assert_eq!(resolve(&g, now, &host).await, None);

        host.set_state("sensor.outdoor", "41.2");
        assert_eq!(resolve(&g, now, &host).await, Some(30.0));

        host.set_state("sensor.outdoor", "4.5");
        assert_eq!(resolve(&g, now, &host).await, Some(4.5));
    }
}
