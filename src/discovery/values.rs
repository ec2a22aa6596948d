//! Lenient readers for the loosely typed scalar fields of the API.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde_json::Value;

/// Parse a free-form percentage such as `"87.5%"`, `" 4.0 % "` or `"100"`.
///
/// Returns `None` for anything that is not a finite number once the
/// trailing percent sign is removed.
pub fn parse_percent(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim_end();
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Number or numeric string.
pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Number or percentage string.
pub fn percent(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => parse_percent(s),
        other => number(other),
    }
}

/// Like [`number`], but an unparseable value is logged. `null` is simply absent.
pub fn number_field(value: Option<&Value>, what: &str) -> Option<f64> {
    let value = value.filter(|v| !v.is_null())?;
    let parsed = number(value);
    if parsed.is_none() {
        log::warn!("ignoring non-numeric {}: {}", what, value);
    }
    parsed
}

/// Like [`percent`], but an unparseable value is logged. `null` is simply absent.
pub fn percent_field(value: Option<&Value>, what: &str) -> Option<f64> {
    let value = value.filter(|v| !v.is_null())?;
    let parsed = percent(value);
    if parsed.is_none() {
        log::warn!("ignoring unparseable percentage {}: {}", what, value);
    }
    parsed
}

/// Identifier from a string or an integer; empty strings are no identifier.
pub fn id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.is_u64() || n.is_i64() => Some(n.to_string()),
        _ => None,
    }
}

/// Integer flag from a number or a numeric string.
pub fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Parse station timestamps such as `2026-02-10 22:39:29 UTC+01:00`.
///
/// Timestamps without an offset are taken as UTC.
pub fn timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    let (local, offset) = match s.trim().split_once(" UTC") {
        Some((local, offset)) if offset.trim().is_empty() => (local, FixedOffset::east_opt(0)?),
        Some((local, offset)) => (local, offset.trim().parse::<FixedOffset>().ok()?),
        None => (s.trim(), FixedOffset::east_opt(0)?),
    };
    NaiveDateTime::parse_from_str(local.trim(), "%Y-%m-%d %H:%M:%S")
        .ok()?
        .and_local_timezone(offset)
        .single()
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn percent_strings() {
        let cases = [
            ("87.5%", 87.5),
            ("4.0%", 4.0),
            (" 100 % ", 100.0),
            ("0%", 0.0),
            ("12", 12.0),
            ("-3.25%", -3.25),
        ];
        for (input, expected) in cases.iter() {
            let parsed = parse_percent(input).unwrap();
            assert!((parsed - expected).abs() < 1e-9, "{} -> {}", input, parsed);
        }
    }

    #[test]
    fn formatted_percentages_parse_back() {
        for i in 0..=1000 {
            let value = i as f64 / 10.0;
            let parsed = parse_percent(&format!("{}%", value)).unwrap();
            assert!((parsed - value).abs() < 1e-9);
        }
    }

    #[test]
    fn garbage_percent_is_absent() {
        for input in ["", "%", "n/a", "abc%", "NaN%", "inf", "87.5%%", "--"].iter() {
            assert_eq!(None, parse_percent(input), "{:?}", input);
        }
        assert_eq!(None, percent(&json!(null)));
        assert_eq!(None, percent(&json!({"value": 3})));
        assert_eq!(None, percent_field(Some(&json!("unknown")), "test value"));
        assert_eq!(None, percent_field(None, "test value"));
    }

    #[test]
    fn numbers_and_ids() {
        assert_eq!(Some(-420.0), number(&json!("-420")));
        assert_eq!(Some(6000.0), number(&json!(6000)));
        assert_eq!(None, number(&json!("6 kW")));
        assert_eq!(Some(String::from("1001")), id(&json!(1001)));
        assert_eq!(Some(String::from("abc")), id(&json!(" abc ")));
        assert_eq!(None, id(&json!("")));
        assert_eq!(None, id(&json!(1.5)));
        assert_eq!(Some(1), integer(&json!("1")));
        assert_eq!(Some(0), integer(&json!(0)));
    }

    #[test]
    fn station_timestamps() {
        let parsed = timestamp("2026-02-10 22:39:29 UTC+01:00").unwrap();
        assert_eq!("2026-02-10T22:39:29+01:00", parsed.to_rfc3339());

        let parsed = timestamp("2026-02-10 22:39:29").unwrap();
        assert_eq!("2026-02-10T22:39:29+00:00", parsed.to_rfc3339());

        assert_eq!(None, timestamp("yesterday"));
    }
}
