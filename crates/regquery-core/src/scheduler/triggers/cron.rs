//! Cron trigger: calendar field matching
//!
//! Each of the eight fields (year .. second) holds a comma-separated list of
//! expressions: `*`, `*/n`, `a`, `a/n`, `a-b`, `a-b/n`. Months accept
//! `jan`..`dec`, weekdays `mon`..`sun` (0 = Monday), and `day` accepts `last`.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};
use serde_json::Value;

use super::{invalid, param, parse_timestamp, timezone_param, MAX_JITTER_SECS};
use crate::scheduler::types::{Result, ScheduleParams};

const FIELD_NAMES: [&str; 8] = [
    "year",
    "month",
    "day",
    "week",
    "day_of_week",
    "hour",
    "minute",
    "second",
];

const MAX_YEAR: i32 = 9999;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const WEEKDAY_NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Value used for an omitted field less significant than every given one
fn default_expression(name: &str) -> &'static str {
    match name {
        "month" | "day" => "1",
        "hour" | "minute" | "second" => "0",
        _ => "*",
    }
}

fn bounds(name: &str) -> (u32, u32) {
    match name {
        "year" => (1970, MAX_YEAR as u32),
        "month" => (1, 12),
        "day" => (1, 31),
        "week" => (1, 53),
        "day_of_week" => (0, 6),
        "hour" => (0, 23),
        _ => (0, 59),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FieldExpr {
    All { step: u32 },
    Range { first: u32, last: u32, step: u32 },
    LastDay,
}

/// One parsed cron field
#[derive(Debug, Clone, PartialEq)]
pub struct CronField {
    name: &'static str,
    min: u32,
    max: u32,
    expression: String,
    exprs: Vec<FieldExpr>,
    is_default: bool,
}

impl CronField {
    /// Parse `expression` for the field called `name`
    pub fn parse(name: &'static str, expression: &str) -> Result<Self> {
        let (min, max) = bounds(name);
        let exprs = expression
            .split(',')
            .map(|token| parse_expr(name, min, max, token))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name,
            min,
            max,
            expression: expression.to_string(),
            exprs,
            is_default: false,
        })
    }

    /// Field name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Source expression
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether the field was filled in rather than given
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// Whether `value` satisfies the field; `last_day` resolves `last`
    pub fn matches(&self, value: u32, last_day: u32) -> bool {
        self.exprs.iter().any(|expr| match *expr {
            FieldExpr::All { step } => {
                value >= self.min && value <= self.max && (value - self.min) % step == 0
            }
            FieldExpr::Range { first, last, step } => {
                value >= first && value <= last && (value - first) % step == 0
            }
            FieldExpr::LastDay => value == last_day,
        })
    }

    fn next_match(&self, value: u32) -> Option<u32> {
        (value.max(self.min)..=self.max).find(|v| self.matches(*v, 0))
    }
}

fn parse_expr(name: &'static str, min: u32, max: u32, token: &str) -> Result<FieldExpr> {
    let token = token.trim().to_ascii_lowercase();
    if token == "last" {
        return if name == "day" {
            Ok(FieldExpr::LastDay)
        } else {
            Err(invalid(name, "'last' is only valid for the day field"))
        };
    }

    let (range, step) = match token.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .trim()
                .parse()
                .map_err(|_| invalid(name, format!("invalid step in '{}'", token)))?;
            if step == 0 {
                return Err(invalid(name, format!("step must be positive in '{}'", token)));
            }
            (range.trim(), Some(step))
        }
        None => (token.as_str(), None),
    };

    let (first, last) = if range == "*" {
        return Ok(FieldExpr::All {
            step: step.unwrap_or(1),
        });
    } else if let Some((a, b)) = range.split_once('-') {
        (parse_value(name, a)?, parse_value(name, b)?)
    } else {
        let value = parse_value(name, range)?;
        match step {
            Some(_) => (value, max),
            None => (value, value),
        }
    };

    if first < min || last > max || first > last {
        return Err(invalid(
            name,
            format!("'{}' is outside {}..={}", token, min, max),
        ));
    }

    Ok(FieldExpr::Range {
        first,
        last,
        step: step.unwrap_or(1),
    })
}

fn parse_value(name: &str, raw: &str) -> Result<u32> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<u32>() {
        return Ok(value);
    }

    let names: &[&str] = match name {
        "month" => &MONTH_NAMES,
        "day_of_week" => &WEEKDAY_NAMES,
        _ => &[],
    };
    let offset = if name == "month" { 1 } else { 0 };
    names
        .iter()
        .position(|candidate| *candidate == raw)
        .map(|index| index as u32 + offset)
        .ok_or_else(|| invalid(name, format!("unrecognized value '{}'", raw)))
}

fn field_expression(name: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(invalid(
            name,
            format!("expected a string or number, got {}", other),
        )),
    }
}

/// Cron-based trigger
#[derive(Debug, Clone, PartialEq)]
pub struct CronTrigger {
    /// Fields in significance order: year, month, day, week, day_of_week,
    /// hour, minute, second
    pub fields: Vec<CronField>,
    /// Zone the fields are evaluated in
    pub timezone: FixedOffset,
    /// No firings before this instant
    pub start_date: Option<DateTime<Utc>>,
    /// No firings after this instant
    pub end_date: Option<DateTime<Utc>>,
    /// Maximum random delay added to each fire time, in seconds
    pub jitter: Option<u64>,
}

impl CronTrigger {
    pub(super) fn from_params(params: &ScheduleParams) -> Result<Self> {
        let timezone = timezone_param(params)?;

        let mut remaining = FIELD_NAMES
            .iter()
            .filter(|name| param(params, name).is_some())
            .count();
        let mut assign_defaults = false;
        let mut fields = Vec::with_capacity(FIELD_NAMES.len());

        for name in FIELD_NAMES {
            let field = match param(params, name) {
                Some(value) => {
                    remaining -= 1;
                    assign_defaults = remaining == 0;
                    CronField::parse(name, &field_expression(name, value)?)?
                }
                None => {
                    let expression = if assign_defaults {
                        default_expression(name)
                    } else {
                        "*"
                    };
                    let mut field = CronField::parse(name, expression)?;
                    field.is_default = true;
                    field
                }
            };
            fields.push(field);
        }

        let start_date = param(params, "start_date")
            .map(|value| parse_timestamp("start_date", value, &timezone))
            .transpose()?;
        let end_date = param(params, "end_date")
            .map(|value| parse_timestamp("end_date", value, &timezone))
            .transpose()?;
        let jitter = param(params, "jitter")
            .map(|value| {
                value
                    .as_u64()
                    .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                    .ok_or_else(|| invalid("jitter", "expected a non-negative integer"))
                    .and_then(|jitter| {
                        if jitter > MAX_JITTER_SECS {
                            Err(invalid(
                                "jitter",
                                format!("must be at most {} seconds", MAX_JITTER_SECS),
                            ))
                        } else {
                            Ok(jitter)
                        }
                    })
            })
            .transpose()?;

        Ok(Self {
            fields,
            timezone,
            start_date,
            end_date,
            jitter,
        })
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&CronField> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub(super) fn next_fire_time(
        &self,
        previous: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let mut start = match previous {
            Some(prev) => (prev + Duration::seconds(1)).max(now),
            None => now,
        };
        if let Some(start_date) = self.start_date {
            start = start.max(start_date);
        }
        if start.nanosecond() > 0 {
            start = start.with_nanosecond(0)? + Duration::seconds(1);
        }

        let local = start.with_timezone(&self.timezone).naive_local();
        let found = self.search(local)?;
        let next = self
            .timezone
            .from_local_datetime(&found)
            .single()?
            .with_timezone(&Utc);

        match self.end_date {
            Some(end) if next > end => None,
            _ => Some(next),
        }
    }

    fn search(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        let [year, month, _, _, _, hour, minute, second] = self.fields.as_slice() else {
            return None;
        };
        let mut t = from;

        loop {
            if t.year() > MAX_YEAR {
                return None;
            }

            let y = year.next_match(t.year() as u32)?;
            if y != t.year() as u32 {
                t = start_of_year(y as i32)?;
                continue;
            }

            match month.next_match(t.month()) {
                None => {
                    t = start_of_year(t.year() + 1)?;
                    continue;
                }
                Some(m) if m != t.month() => {
                    t = NaiveDate::from_ymd_opt(t.year(), m, 1)?.and_hms_opt(0, 0, 0)?;
                    continue;
                }
                Some(_) => {}
            }

            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }

            match hour.next_match(t.hour()) {
                None => {
                    t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                    continue;
                }
                Some(h) if h != t.hour() => {
                    t = t.date().and_hms_opt(h, 0, 0)?;
                    continue;
                }
                Some(_) => {}
            }

            match minute.next_match(t.minute()) {
                None => {
                    t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                    continue;
                }
                Some(m) if m != t.minute() => {
                    t = t.date().and_hms_opt(t.hour(), m, 0)?;
                    continue;
                }
                Some(_) => {}
            }

            match second.next_match(t.second()) {
                None => {
                    t = t.date().and_hms_opt(t.hour(), t.minute(), 0)? + Duration::minutes(1);
                    continue;
                }
                Some(s) if s != t.second() => {
                    t = t.date().and_hms_opt(t.hour(), t.minute(), s)?;
                    continue;
                }
                Some(_) => return Some(t),
            }
        }
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let [_, _, day, week, day_of_week, ..] = self.fields.as_slice() else {
            return false;
        };
        day.matches(date.day(), last_day_of_month(date))
            && week.matches(date.iso_week().week(), 0)
            && day_of_week.matches(date.weekday().num_days_from_monday(), 0)
    }
}

fn start_of_year(year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)
}

fn last_day_of_month(date: NaiveDate) -> u32 {
    let (year, month) = match date.month() {
        12 => (date.year() + 1, 1),
        m => (date.year(), m + 1),
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}
