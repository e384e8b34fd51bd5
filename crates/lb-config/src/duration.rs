//! Duration strings in the `1h2m3.5s` notation used by the peer timers.

use std::time::Duration;
use thiserror::Error;

/// Errors produced while parsing a duration string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("invalid duration {0:?}")]
    Invalid(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {1:?} in duration {0:?}")]
    UnknownUnit(String, String),
}

fn unit_nanos(unit: &str) -> Option<f64> {
    Some(match unit {
        "ns" => 1.0,
        "us" | "µs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60e9,
        "h" => 3600e9,
        _ => return None,
    })
}

/// Parses a non-negative duration such as `90s`, `1m30s` or `250ms`.
///
/// A bare `0` is accepted. Signs are rejected since no timer may be negative.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() || s.starts_with(['-', '+']) {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let mut total_nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(DurationError::Invalid(input.to_string()));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|_| DurationError::Invalid(input.to_string()))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        if unit_len == 0 {
            return Err(DurationError::MissingUnit(input.to_string()));
        }
        let unit = &rest[..unit_len];
        let nanos = unit_nanos(unit)
            .ok_or_else(|| DurationError::UnknownUnit(input.to_string(), unit.to_string()))?;
        total_nanos += value * nanos;
        rest = &rest[unit_len..];
    }

    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Formats a duration the way the FRR agent expects (`90s`, `1500ms`).
pub fn format_duration(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}
