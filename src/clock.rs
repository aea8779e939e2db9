// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Wall-clock access and day arithmetic.
//!
//! Schedules are defined against local civil time: minutes since midnight
//! and a Sunday-first weekday. Periodic wakes land on multiples of the
//! update interval counted from local midnight.

use chrono::{Datelike, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The system's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Fractional minutes since midnight.
pub fn minutes_of_day(now: NaiveDateTime) -> f64 {
    let t = now.time();
    f64::from(t.hour()) * 60.0
        + f64::from(t.minute())
        + f64::from(t.second()) / 60.0
        + f64::from(t.nanosecond()) / 60_000_000_000.0
}

/// Weekday with 0 = Sunday .. 6 = Saturday.
pub fn weekday_from_sunday<D: Datelike>(date: &D) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Smallest multiple of `interval_secs` since local midnight that is strictly
/// after `now`. Past the end of the day this is the next midnight.
pub fn next_aligned_boundary(now: NaiveDateTime, interval_secs: u64) -> NaiveDateTime {
    let midnight = now.date().and_time(NaiveTime::MIN);
    let step = i64::try_from(interval_secs.max(1))
        .unwrap_or(i64::MAX / 1000)
        .saturating_mul(1000);
    let elapsed = (now - midnight).num_milliseconds();
    let next = (elapsed / step + 1).saturating_mul(step);

    if next >= MILLIS_PER_DAY {
        midnight + TimeDelta::days(1)
    } else {
        midnight + TimeDelta::milliseconds(next)
    }
}

/// Clock pinned to a start time that advances with tokio's (possibly
/// paused) timer.
#[cfg(test)]
pub(crate) struct AnchoredClock {
    base: NaiveDateTime,
    start: tokio::time::Instant,
}

#[cfg(test)]
impl AnchoredClock {
    pub(crate) fn new(base: NaiveDateTime) -> Self {
        Self {
            base,
            start: tokio::time::Instant::now(),
        }
    }
}

#[cfg(test)]
impl Clock for AnchoredClock {
    fn now(&self) -> NaiveDateTime {
        let elapsed = tokio::time::Instant::now() - self.start;
        self.base + TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::zero())
    }
}

#[cfg(test)]
pub(crate) fn at(date: (i32, u32, u32), hms: (u32, u32, u32)) -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(date.0, date.1, date.2)
        .and_then(|d| d.and_hms_opt(hms.0, hms.1, hms.2))
        .expect("valid test timestamp")
}
