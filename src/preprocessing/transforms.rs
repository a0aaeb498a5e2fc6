use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::data::Value;

static NUMERIC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)(?:-(\d+))?(\+)?").expect("numeric pattern is valid")
});

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Wall-clock form written for the effective start date before it is read back.
pub const EFFECTIVE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// A parsed timestamp: its local wall-clock reading and, when present, the UTC instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedTimestamp {
    pub local: NaiveDateTime,
    pub instant: Option<DateTime<Utc>>,
}

pub fn parse_timestamp(raw: &str) -> Option<ParsedTimestamp> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(ParsedTimestamp {
            local: dt.naive_local(),
            instant: Some(dt.with_timezone(&Utc)),
        });
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(ParsedTimestamp {
                local: dt.naive_local(),
                instant: Some(dt.with_timezone(&Utc)),
            });
        }
    }

    let (body, is_utc) = match raw.strip_suffix("UTC").or_else(|| raw.strip_suffix('Z')) {
        Some(body) => (body.trim_end(), true),
        None => (raw, false),
    };
    let local = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(body, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(body, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;

    Some(ParsedTimestamp {
        local,
        instant: is_utc.then(|| Utc.from_utc_datetime(&local)),
    })
}

/// Converts the submission timestamp to UTC. Offset-free readings are taken as UTC.
pub fn normalize_submitted(value: &Value) -> Value {
    match value {
        Value::Timestamp(ts) => Value::Timestamp(*ts),
        Value::Text(raw) => parse_timestamp(raw).map_or(Value::Missing, |p| {
            Value::Timestamp(p.instant.unwrap_or_else(|| Utc.from_utc_datetime(&p.local)))
        }),
        _ => Value::Missing,
    }
}

/// Formats the effective start date through [`EFFECTIVE_DATE_FORMAT`] and parses it back,
/// so its wall-clock reading is relabelled as UTC and any offset is discarded.
pub fn normalize_effective(value: &Value) -> Value {
    let local = match value {
        Value::Timestamp(ts) => ts.naive_utc(),
        Value::Text(raw) => match parse_timestamp(raw) {
            Some(p) => p.local,
            None => return Value::Missing,
        },
        _ => return Value::Missing,
    };

    let rendered = local.format(EFFECTIVE_DATE_FORMAT).to_string();
    parse_timestamp(&rendered)
        .and_then(|p| p.instant)
        .map_or(Value::Missing, Value::Timestamp)
}

/// Whole days from `submitted` to `effective`, floored like a timedelta's `days`.
pub fn day_difference(effective: DateTime<Utc>, submitted: DateTime<Utc>) -> i64 {
    let delta: Duration = effective - submitted;
    delta.num_milliseconds().div_euclid(86_400_000)
}

/// Representative value of strings such as `"10-20"`, `"5+"` or `"7"`.
///
/// A `+` suffix yields the leading integer, a range yields the midpoint, and a bare
/// integer yields itself. Non-strings, empty strings and unmatched text yield `None`.
pub fn extract_numeric(value: &Value) -> Option<f64> {
    let text = value.as_text()?;
    let caps = NUMERIC_PATTERN.captures(text)?;

    let first: f64 = caps.get(1)?.as_str().parse::<u64>().ok()? as f64;
    if caps.get(3).is_some() {
        return Some(first);
    }
    let second = match caps.get(2) {
        Some(m) => m.as_str().parse::<u64>().ok()? as f64,
        None => first,
    };
    Some((first + second) / 2.0)
}

/// `low`/`medium`/`high` to 1/2/3, missing to 0. Other text is treated as missing.
pub fn map_intensity(value: &Value) -> Value {
    match value {
        Value::Missing => Value::Number(0.0),
        Value::Number(v) if v.is_nan() => Value::Number(0.0),
        Value::Number(v) => Value::Number(*v),
        Value::Text(level) => match level.as_str() {
            "low" => Value::Number(1.0),
            "medium" => Value::Number(2.0),
            "high" => Value::Number(3.0),
            _ => Value::Missing,
        },
        Value::Timestamp(_) => Value::Missing,
    }
}

/// Conversion label as a class number: `0`/`1`, booleans, or integral numbers.
pub fn parse_label(value: &Value) -> Option<f64> {
    match value {
        Value::Number(v) if v.is_finite() && v.fract() == 0.0 => Some(*v),
        Value::Text(raw) => {
            let raw = raw.trim();
            if raw.eq_ignore_ascii_case("true") {
                Some(1.0)
            } else if raw.eq_ignore_ascii_case("false") {
                Some(0.0)
            } else {
                raw.parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite() && v.fract() == 0.0)
            }
        }
        _ => None,
    }
}
