//! # Schedule Evaluation
//!
//! Decides whether a rule is active at a given instant. Two schedule kinds
//! beyond always-on: recurring weekly time windows and 5-field cron
//! expressions, both evaluated in the rule's own timezone.
//!
//! ## Fail Closed
//!
//! Malformed input — wrong cron field count, unparsable numbers, a zero or
//! negative step, an unknown timezone name — never panics and never
//! activates a rule. The malformed value is logged and treated as inactive.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::rule::{Rule, Schedule, TimeWindow};

/// Whether `rule` is active at `now` according to its schedule.
///
/// The `enabled` flag is a separate concern handled by the matcher; this
/// only evaluates the schedule.
pub fn is_active(rule: &Rule, now: DateTime<Utc>) -> bool {
    match &rule.schedule {
        Schedule::Always => true,
        Schedule::TimeWindows { windows } => windows.iter().any(|w| window_matches(w, now)),
        Schedule::Cron { expr, timezone } => cron_matches(expr, timezone.as_deref(), now),
    }
}

/// Whether a single weekly window covers `now` in the window's timezone.
///
/// Bounds are inclusive. A window whose end precedes its start wraps past
/// midnight on the window's day: `minutes >= start || minutes <= end`.
pub fn window_matches(window: &TimeWindow, now: DateTime<Utc>) -> bool {
    let Some(tz) = resolve_timezone(window.timezone.as_deref()) else {
        return false;
    };
    let local = now.with_timezone(&tz);
    if local.weekday().num_days_from_sunday() != u32::from(window.day_of_week) {
        return false;
    }
    let minutes = local.hour() * 60 + local.minute();
    let start = u32::from(window.start_hour) * 60 + u32::from(window.start_minute);
    let end = u32::from(window.end_hour) * 60 + u32::from(window.end_minute);
    if end < start {
        minutes >= start || minutes <= end
    } else {
        minutes >= start && minutes <= end
    }
}

/// Whether a 5-field cron expression matches `now` in `timezone`.
///
/// Fields: minute (0-59), hour (0-23), day-of-month (1-31), month (1-12),
/// day-of-week (0=Sunday..6). Per-field grammar: `*`, literal, `a-b`,
/// comma lists, `*/n` (matches values divisible by `n`), `a-b/n`, and
/// `a/n` (range from `a` to the field maximum).
pub fn cron_matches(expr: &str, timezone: Option<&str>, now: DateTime<Utc>) -> bool {
    let Some(tz) = resolve_timezone(timezone) else {
        return false;
    };
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        warn!(expr, "cron expression must have 5 fields, treating as inactive");
        return false;
    }
    let local = now.with_timezone(&tz);
    field_matches(fields[0], local.minute(), 59)
        && field_matches(fields[1], local.hour(), 23)
        && field_matches(fields[2], local.day(), 31)
        && field_matches(fields[3], local.month(), 12)
        && field_matches(fields[4], local.weekday().num_days_from_sunday(), 6)
}

/// Evaluate one cron field against a clock value. `max` is the inclusive
/// field maximum, used as the open end of `a/n` specs.
fn field_matches(spec: &str, value: u32, max: u32) -> bool {
    if spec == "*" {
        return true;
    }
    if spec.contains(',') {
        return spec.split(',').any(|part| field_matches(part, value, max));
    }
    if let Some((range, step)) = spec.split_once('/') {
        let Ok(step) = step.parse::<u32>() else {
            return false;
        };
        if step == 0 {
            return false;
        }
        if range == "*" {
            return value % step == 0;
        }
        if let Some((a, b)) = range.split_once('-') {
            let (Ok(a), Ok(b)) = (a.parse::<u32>(), b.parse::<u32>()) else {
                return false;
            };
            return value >= a && value <= b && (value - a) % step == 0;
        }
        let Ok(a) = range.parse::<u32>() else {
            return false;
        };
        return value >= a && value <= max && (value - a) % step == 0;
    }
    if let Some((a, b)) = spec.split_once('-') {
        let (Ok(a), Ok(b)) = (a.parse::<u32>(), b.parse::<u32>()) else {
            return false;
        };
        return value >= a && value <= b;
    }
    spec.parse::<u32>().map_or(false, |n| n == value)
}

fn resolve_timezone(name: Option<&str>) -> Option<Tz> {
    match name {
        None => Some(Tz::UTC),
        Some(s) => match s.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(_) => {
                warn!(timezone = s, "unknown timezone, treating schedule as inactive");
                None
            }
        },
    }
}
