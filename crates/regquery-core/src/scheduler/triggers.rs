//! Scheduler triggers - time rules that decide when a job fires
//!
//! Three trigger models are supported:
//! - Interval: repeating at a fixed period from a start date
//! - Cron: calendar fields (year .. second), optionally jittered
//! - Date: a single absolute instant
//!
//! [`TriggerFactory`] validates kind-specific params before anything else
//! touches a descriptor.

mod cron;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use rand::Rng;
use serde_json::Value;

use super::types::{Result, ScheduleKind, ScheduleParams, SchedulerError};

pub use cron::{CronField, CronTrigger};

/// Keys accepted by interval schedules
pub const INTERVAL_KEYS: &[&str] = &[
    "weeks",
    "days",
    "hours",
    "minutes",
    "seconds",
    "start_date",
    "end_date",
    "timezone",
];

/// Keys accepted by cron schedules
pub const CRON_KEYS: &[&str] = &[
    "year",
    "month",
    "day",
    "week",
    "day_of_week",
    "hour",
    "minute",
    "second",
    "start_date",
    "end_date",
    "timezone",
    "jitter",
];

/// Longest accepted interval period: 100 years
pub const MAX_INTERVAL_SECS: f64 = 100.0 * 365.0 * 86_400.0;

/// Longest accepted cron jitter: one day
pub const MAX_JITTER_SECS: u64 = 86_400;

/// Concrete time rule evaluated by a backend
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Fixed period
    Interval(IntervalTrigger),
    /// Calendar fields
    Cron(CronTrigger),
    /// Single instant
    Date(DateTrigger),
}

impl Trigger {
    /// Schedule kind this trigger was built from
    pub fn kind(&self) -> ScheduleKind {
        match self {
            Trigger::Interval(_) => ScheduleKind::Interval,
            Trigger::Cron(_) => ScheduleKind::Cron,
            Trigger::Date(_) => ScheduleKind::Date,
        }
    }

    /// Next fire time after `previous` (or the first one when `None`)
    ///
    /// Returns `None` once the trigger is exhausted. Deterministic: jitter
    /// is applied separately by [`Trigger::apply_jitter`].
    pub fn next_fire_time(
        &self,
        previous: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Interval(interval) => interval.next_fire_time(previous, now),
            Trigger::Cron(cron) => cron.next_fire_time(previous, now),
            Trigger::Date(date) => date.next_fire_time(previous),
        }
    }

    /// Delay a computed fire time by the trigger's random jitter, if any
    pub fn apply_jitter(&self, fire_time: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Trigger::Cron(cron) => {
                let Some(max_millis) = cron
                    .jitter
                    .filter(|jitter| *jitter > 0)
                    .and_then(|jitter| jitter.checked_mul(1000))
                    .and_then(|millis| i64::try_from(millis).ok())
                else {
                    return fire_time;
                };
                let millis = rand::thread_rng().gen_range(0..=max_millis);
                Duration::try_milliseconds(millis)
                    .and_then(|delay| fire_time.checked_add_signed(delay))
                    .unwrap_or(fire_time)
            }
            _ => fire_time,
        }
    }
}

/// Interval-based trigger
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalTrigger {
    /// Period between firings
    pub interval: Duration,
    /// First fire time
    pub start_date: DateTime<Utc>,
    /// No firings after this instant
    pub end_date: Option<DateTime<Utc>>,
}

impl IntervalTrigger {
    fn next_fire_time(
        &self,
        previous: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let next = match previous {
            // Missed periods collapse into the first period after `now`.
            Some(prev) => self.advance(prev, now, true)?,
            None if now <= self.start_date => self.start_date,
            None => self.advance(self.start_date, now, false)?,
        };

        match self.end_date {
            Some(end) if next > end => None,
            _ => Some(next),
        }
    }

    /// Smallest `base + k * interval` (k >= 1 when `strict`) not before `now`,
    /// `None` past the representable date range
    fn advance(
        &self,
        base: DateTime<Utc>,
        now: DateTime<Utc>,
        strict: bool,
    ) -> Option<DateTime<Utc>> {
        let period = self.interval.num_milliseconds().max(1);
        let elapsed = (now - base).num_milliseconds();
        let periods = if elapsed < 0 {
            i64::from(strict)
        } else if strict {
            elapsed / period + 1
        } else {
            (elapsed + period - 1) / period
        };
        periods
            .checked_mul(period)
            .and_then(Duration::try_milliseconds)
            .and_then(|offset| base.checked_add_signed(offset))
    }
}

/// One-shot trigger
#[derive(Debug, Clone, PartialEq)]
pub struct DateTrigger {
    /// Execution time (UTC)
    pub run_time: DateTime<Utc>,
}

impl DateTrigger {
    fn next_fire_time(&self, previous: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        match previous {
            None => Some(self.run_time),
            Some(_) => None,
        }
    }
}

/// Validates schedule params and builds the matching [`Trigger`]
pub struct TriggerFactory;

impl TriggerFactory {
    /// Build a trigger from a schedule kind name as stored or configured
    pub fn build_named(kind: &str, params: &ScheduleParams) -> Result<Trigger> {
        Self::build(kind.parse()?, params)
    }

    /// Build a trigger, failing before any side effect on invalid params
    pub fn build(kind: ScheduleKind, params: &ScheduleParams) -> Result<Trigger> {
        Self::build_at(kind, params, Utc::now())
    }

    /// Build a trigger as of `now` (defaults such as interval start depend on it)
    pub fn build_at(
        kind: ScheduleKind,
        params: &ScheduleParams,
        now: DateTime<Utc>,
    ) -> Result<Trigger> {
        match kind {
            ScheduleKind::Interval => {
                reject_unknown_keys(kind, params, INTERVAL_KEYS)?;
                Ok(Trigger::Interval(build_interval(params, now)?))
            }
            ScheduleKind::Cron => {
                reject_unknown_keys(kind, params, CRON_KEYS)?;
                Ok(Trigger::Cron(CronTrigger::from_params(params)?))
            }
            ScheduleKind::Date => {
                let tz = timezone_param(params)?;
                let run_time = param(params, "run_time").ok_or(SchedulerError::MissingParam {
                    kind,
                    key: "run_time",
                })?;
                Ok(Trigger::Date(DateTrigger {
                    run_time: parse_timestamp("run_time", run_time, &tz)?,
                }))
            }
        }
    }
}

fn reject_unknown_keys(
    kind: ScheduleKind,
    params: &ScheduleParams,
    allowed: &[&str],
) -> Result<()> {
    let mut invalid: Vec<String> = params
        .keys()
        .filter(|key| !allowed.contains(&key.as_str()))
        .cloned()
        .collect();

    if invalid.is_empty() {
        return Ok(());
    }
    invalid.sort();
    Err(SchedulerError::InvalidParams {
        kind,
        keys: invalid,
    })
}

fn build_interval(params: &ScheduleParams, now: DateTime<Utc>) -> Result<IntervalTrigger> {
    let tz = timezone_param(params)?;

    let mut seconds = 0.0;
    for (key, unit) in [
        ("weeks", 604_800.0),
        ("days", 86_400.0),
        ("hours", 3_600.0),
        ("minutes", 60.0),
        ("seconds", 1.0),
    ] {
        if let Some(value) = param(params, key) {
            seconds += number_param(key, value)? * unit;
        }
    }

    if seconds > MAX_INTERVAL_SECS {
        return Err(invalid(
            "interval",
            format!("period of {} seconds exceeds {} seconds", seconds, MAX_INTERVAL_SECS),
        ));
    }
    // A zero period would spin the backend; clamp to one second.
    let millis = match (seconds * 1000.0).round() as i64 {
        0 => 1000,
        millis => millis,
    };
    let interval = Duration::try_milliseconds(millis)
        .ok_or_else(|| invalid("interval", "period out of range"))?;

    let start_date = match param(params, "start_date") {
        Some(value) => parse_timestamp("start_date", value, &tz)?,
        None => now
            .checked_add_signed(interval)
            .ok_or_else(|| invalid("interval", "first fire time out of range"))?,
    };
    let end_date = param(params, "end_date")
        .map(|value| parse_timestamp("end_date", value, &tz))
        .transpose()?;

    Ok(IntervalTrigger {
        interval,
        start_date,
        end_date,
    })
}

/// Param value, treating JSON `null` as absent
pub(super) fn param<'a>(params: &'a ScheduleParams, key: &str) -> Option<&'a Value> {
    params.get(key).filter(|value| !value.is_null())
}

fn number_param(key: &str, value: &Value) -> Result<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| invalid(key, format!("expected a number, got {}", value)))?;

    if number < 0.0 || !number.is_finite() {
        return Err(invalid(key, "must be a non-negative number"));
    }
    Ok(number)
}

pub(super) fn timezone_param(params: &ScheduleParams) -> Result<FixedOffset> {
    match param(params, "timezone") {
        Some(Value::String(name)) => parse_timezone(name),
        Some(other) => Err(invalid("timezone", format!("expected a string, got {}", other))),
        None => Ok(utc_offset()),
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Parse `UTC`/`Z`/`GMT` or a fixed `±HH:MM` offset
pub fn parse_timezone(name: &str) -> Result<FixedOffset> {
    let trimmed = name.trim();
    if matches!(
        trimmed.to_ascii_uppercase().as_str(),
        "UTC" | "Z" | "GMT" | "ETC/UTC"
    ) {
        return Ok(utc_offset());
    }

    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'+') => (1, &trimmed[1..]),
        Some(b'-') => (-1, &trimmed[1..]),
        _ => return Err(invalid("timezone", format!("unsupported timezone '{}'", name))),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().ok(), Some(0)),
        4 => (digits[..2].parse::<i32>().ok(), digits[2..].parse::<i32>().ok()),
        _ => (None, None),
    };

    match (hours, minutes) {
        (Some(h), Some(m)) if h <= 23 && m <= 59 => {
            FixedOffset::east_opt(sign * (h * 3600 + m * 60))
                .ok_or_else(|| invalid("timezone", format!("offset out of range '{}'", name)))
        }
        _ => Err(invalid("timezone", format!("unsupported timezone '{}'", name))),
    }
}

/// Parse an RFC 3339 string, a naive date/datetime in `tz`, or unix seconds
pub fn parse_timestamp(key: &str, value: &Value, tz: &FixedOffset) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            let naive = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                .ok_or_else(|| invalid(key, format!("unparseable timestamp '{}'", s)))?;
            tz.from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| invalid(key, format!("ambiguous local time '{}'", s)))
        }
        Value::Number(n) => n
            .as_f64()
            .and_then(|secs| DateTime::from_timestamp_millis((secs * 1000.0) as i64))
            .ok_or_else(|| invalid(key, format!("timestamp out of range: {}", n))),
        other => Err(invalid(
            key,
            format!("expected a timestamp string or unix seconds, got {}", other),
        )),
    }
}

pub(super) fn invalid(key: &str, message: impl Into<String>) -> SchedulerError {
    SchedulerError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}
