// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Curve points and interpolation.
//!
//! A curve maps an X value (minute of day, or a sensor reading) to a
//! normalized ratio in `[0, 1]` relative to the owning graph's Y range.
//! Everything here is pure and synchronous.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Share of a segment, measured from its left point, during which a curve
/// leaving the floor is held at the floor when `step_to_min` is set.
pub const STEP_TO_MIN_RISE_GUARD: f64 = 0.01;

/// A single control point on a curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CurvePoint {
    /// Minute of day for time axes, raw reading for entity axes.
    #[serde(alias = "time")]
    pub x: f64,
    /// Output value in the graph's Y units.
    #[serde(alias = "value")]
    pub y: f64,
}

impl CurvePoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// How values are interpolated between two adjacent points.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMode {
    #[default]
    Linear,
    /// Cosine easing, flat at both ends of every segment.
    Smooth,
    /// Hold the left value, jump at the right point.
    Step,
}

/// Map `y` into `[0, 1]` relative to `[min_y, max_y]`.
///
/// A degenerate range yields `0.0`.
pub fn normalize(y: f64, min_y: f64, max_y: f64) -> f64 {
    if max_y == min_y {
        return 0.0;
    }
    (y - min_y) / (max_y - min_y)
}

/// Compute the normalized curve output at `x`.
///
/// - Fewer than 2 points: `0.0`
/// - Before the first point: the last point's value (wraps over midnight)
/// - At or after the last point: the last point's value
/// - Otherwise: interpolated inside the first segment containing `x`
///
/// The result is always clamped to `[0, 1]`.
pub fn ratio(
    points: &[CurvePoint],
    mode: InterpolationMode,
    x: f64,
    min_y: f64,
    max_y: f64,
    step_to_min: bool,
) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    // Stable: points sharing an x keep their declared order.
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x));

    let first = sorted[0];
    let last = sorted[sorted.len() - 1];

    let raw = if x < first.x || x >= last.x {
        normalize(last.y, min_y, max_y)
    } else {
        sorted
            .windows(2)
            .find(|w| w[0].x <= x && x <= w[1].x)
            .map(|w| segment(w[0], w[1], mode, x, min_y, max_y, step_to_min))
            .unwrap_or_else(|| normalize(last.y, min_y, max_y))
    };

    raw.clamp(0.0, 1.0)
}

fn segment(
    p1: CurvePoint,
    p2: CurvePoint,
    mode: InterpolationMode,
    x: f64,
    min_y: f64,
    max_y: f64,
    step_to_min: bool,
) -> f64 {
    let y1 = normalize(p1.y, min_y, max_y);
    if p1.x == p2.x {
        return y1;
    }
    let y2 = normalize(p2.y, min_y, max_y);
    let t = (x - p1.x) / (p2.x - p1.x);

    if mode == InterpolationMode::Step {
        return if x < p2.x { y1 } else { y2 };
    }

    if step_to_min {
        if p2.y == min_y {
            return if x < p2.x { y1 } else { 0.0 };
        }
        if p1.y == min_y && t < STEP_TO_MIN_RISE_GUARD {
            return 0.0;
        }
    }

    match mode {
        InterpolationMode::Smooth => y1 + (y2 - y1) * (1.0 - (t * PI).cos()) / 2.0,
        _ => y1 + (y2 - y1) * t,
    }
}
