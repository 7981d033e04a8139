//! Field decoders: raw substrings to typed values.
//!
//! All functions are pure; the current time is passed in by the caller so the
//! day/month disambiguation can be exercised without a real clock.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::errors::DecodeError;

pub const FEET_TO_METERS: f64 = 0.3048;
/// Nautical knots to m/s
pub const KNOTS_TO_MS: f64 = 1852.0 / 3600.0;
/// Half turns per minute to degrees per second
pub const HPM_TO_DEGS: f64 = 180.0 / 60.0;

/// Timestamps further than this in the future are assumed to belong to the previous day
pub const MAX_FUTURE_SKEW_SECONDS: i64 = 300;

/// Routing information between the origin and the position block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub destto: String,
    pub path: Vec<String>,
    pub receiver: String,
    pub relayer: Option<String>,
}

/// Decode `DEST,PATH...,RECEIVER`.
///
/// Three tokens is a direct message, four tokens a relayed one where the
/// token after the destination carries a trailing `*`.
pub fn parse_route(routing: &str) -> Result<Route, DecodeError> {
    let fields: Vec<&str> = routing.split(',').collect();

    let relayer = match fields.len() {
        3 => None,
        4 => Some(fields[1].trim_end_matches('*').to_string()),
        _ => return Err(DecodeError::HeaderFormat(routing.to_string())),
    };

    let path = fields[1..fields.len() - 1]
        .iter()
        .map(|f| f.trim_end_matches('*').to_string())
        .collect();

    Ok(Route {
        destto: fields[0].to_string(),
        path,
        receiver: fields[fields.len() - 1].to_string(),
        relayer,
    })
}

/// Decode a 6 digit timestamp with its kind suffix.
///
/// `h` (and `/`) mean HHMMSS on the current UTC day, `z` means DDHHMM in the
/// current UTC month. Either way a result more than five minutes ahead of
/// `now` is moved back one day (or month). This is a best-effort guess, not
/// network time.
pub fn parse_timestamp(
    digits: &str,
    kind: char,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, DecodeError> {
    match kind {
        'h' | '/' => resolve_time_of_day(digits, now),
        'z' => resolve_day_hour_minute(digits, now),
        other => Err(DecodeError::Timestamp(format!("{}{}", digits, other))),
    }
}

pub fn resolve_time_of_day(hms: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, DecodeError> {
    let [hour, minute, second] = split_pairs(hms)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)
        .ok_or_else(|| DecodeError::Timestamp(hms.to_string()))?;

    let mut full = now.date_naive().and_time(time).and_utc();
    if (full - now).num_seconds() > MAX_FUTURE_SKEW_SECONDS {
        full -= Duration::days(1);
    }
    Ok(full)
}

pub fn resolve_day_hour_minute(
    dhm: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, DecodeError> {
    let [day, hour, minute] = split_pairs(dhm)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| DecodeError::Timestamp(dhm.to_string()))?;

    let (year, month) = (now.year(), now.month());
    let candidate = NaiveDate::from_ymd_opt(year, month, day)
        .map(|date| Utc.from_utc_datetime(&date.and_time(time)))
        .filter(|ts| (*ts - now).num_seconds() <= MAX_FUTURE_SKEW_SECONDS);

    if let Some(ts) = candidate {
        return Ok(ts);
    }

    let (year, month) = if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    };
    NaiveDate::from_ymd_opt(year, month, day)
        .map(|date| Utc.from_utc_datetime(&date.and_time(time)))
        .ok_or_else(|| DecodeError::Timestamp(dhm.to_string()))
}

fn split_pairs(digits: &str) -> Result<[u32; 3], DecodeError> {
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::Timestamp(digits.to_string()));
    }
    let pair = |i: usize| -> u32 { digits[i..i + 2].parse().unwrap_or_default() };
    Ok([pair(0), pair(2), pair(4)])
}

/// Decode a `DDMM.mmH` latitude or `DDDMM.mmH` longitude to signed decimal degrees
pub fn parse_coordinate(raw: &str) -> Result<f64, DecodeError> {
    let invalid = || DecodeError::Coordinate(raw.to_string());

    let hemisphere = raw.chars().last().ok_or_else(invalid)?;
    let (degree_width, limit) = match hemisphere {
        'N' | 'S' => (2, 90.0),
        'E' | 'W' => (3, 180.0),
        _ => return Err(invalid()),
    };

    let body = &raw[..raw.len() - 1];
    if body.len() <= degree_width || !body.is_ascii() {
        return Err(invalid());
    }

    let degrees: u32 = body[..degree_width].parse().map_err(|_| invalid())?;
    let minutes: f64 = body[degree_width..].parse().map_err(|_| invalid())?;
    if !(0.0..60.0).contains(&minutes) {
        return Err(invalid());
    }

    let value = degrees as f64 + minutes / 60.0;
    if value > limit {
        return Err(invalid());
    }
    Ok(match hemisphere {
        'S' | 'W' => -value,
        _ => value,
    })
}

/// Add a third decimal of minute precision, moving away from zero
pub fn refine_coordinate(existing: f64, digit: u8) -> f64 {
    let delta = digit as f64 / 60000.0;
    if existing < 0.0 {
        existing - delta
    } else {
        existing + delta
    }
}

/// Decode the course/speed pair. `000/000` means no data.
///
/// Returns heading in degrees and ground speed in m/s.
pub fn parse_heading_speed(heading: &str, speed: &str) -> Result<Option<(u16, f64)>, DecodeError> {
    let heading: u16 = heading
        .parse()
        .map_err(|_| DecodeError::field("heading", heading))?;
    let speed: u16 = speed
        .parse()
        .map_err(|_| DecodeError::field("ground speed", speed))?;

    if heading > 360 {
        return Err(DecodeError::field("heading", heading.to_string()));
    }
    if heading == 0 && speed == 0 {
        return Ok(None);
    }
    // 360 is north
    Ok(Some((heading % 360, speed as f64 * KNOTS_TO_MS)))
}

/// Decode altitude in feet to meters
pub fn parse_altitude(feet: &str) -> Result<f64, DecodeError> {
    let feet: i32 = feet
        .parse()
        .map_err(|_| DecodeError::field("altitude", feet))?;
    Ok(feet as f64 * FEET_TO_METERS)
}
