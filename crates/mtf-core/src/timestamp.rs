//! Millisecond timestamps and their ISO-8601 rendering.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{CoreError, Result};

/// Render `ms` since the epoch as RFC 3339 in UTC (`+00:00` offset).
pub fn to_iso(ms: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(ms) {
        Some(dt) => dt.to_rfc3339(),
        None => ms.to_string(),
    }
}

/// Parse an ISO-8601 datetime. Inputs without an offset are taken as UTC;
/// a bare date means midnight UTC.
pub fn parse_datetime(value: &str) -> Result<i64> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }
    Err(CoreError::invalid(format!("invalid datetime format: {value}")))
}

/// Serde adapter: `i64` ms on the Rust side, ISO string on the wire. Integer
/// milliseconds are accepted on input as well.
pub mod iso_ms {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Millis(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(ms: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_iso(*ms))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Millis(ms) => Ok(ms),
            Repr::Text(s) => super::parse_datetime(&s).map_err(serde::de::Error::custom),
        }
    }
}
