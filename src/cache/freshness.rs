// Freshness stamps for versioned cache keys.
// Normalizes every accepted timestamp representation to epoch milliseconds.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

use crate::error::{CacheError, Result};

/// The last-modified marker of the data a key points at.
///
/// Two stamps describing the same instant normalize to the same number, no
/// matter how the caller spelled them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreshnessStamp {
    /// Milliseconds since the Unix epoch.
    EpochMillis(i64),
    /// A textual timestamp, parsed on normalization.
    Text(String),
    /// An already-parsed instant.
    Instant(DateTime<Utc>),
}

impl FreshnessStamp {
    /// Normalize to milliseconds since the Unix epoch.
    pub fn to_epoch_millis(&self) -> Result<i64> {
        match self {
            FreshnessStamp::EpochMillis(millis) => Ok(*millis),
            FreshnessStamp::Instant(at) => Ok(at.timestamp_millis()),
            FreshnessStamp::Text(text) => parse_text(text),
        }
    }
}

fn parse_text(raw: &str) -> Result<i64> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(CacheError::invalid("freshness stamp is empty"));
    }

    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.chars().all(|c| c.is_ascii_digit()) {
        return text
            .parse::<i64>()
            .map_err(|e| CacheError::invalid(format!("freshness stamp `{raw}`: {e}")));
    }

    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(at.timestamp_millis());
    }
    // HTTP-date, e.g. a `Last-Modified` response header.
    if let Ok(at) = DateTime::parse_from_rfc2822(text) {
        return Ok(at.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp_millis());
        }
    }

    Err(CacheError::invalid(format!(
        "freshness stamp `{raw}` is not a recognized timestamp"
    )))
}

impl From<i64> for FreshnessStamp {
    fn from(millis: i64) -> Self {
        FreshnessStamp::EpochMillis(millis)
    }
}

impl From<&str> for FreshnessStamp {
    fn from(text: &str) -> Self {
        FreshnessStamp::Text(text.to_string())
    }
}

impl From<String> for FreshnessStamp {
    fn from(text: String) -> Self {
        FreshnessStamp::Text(text)
    }
}

impl From<DateTime<Utc>> for FreshnessStamp {
    fn from(at: DateTime<Utc>) -> Self {
        FreshnessStamp::Instant(at)
    }
}

impl From<DateTime<FixedOffset>> for FreshnessStamp {
    fn from(at: DateTime<FixedOffset>) -> Self {
        FreshnessStamp::Instant(at.with_timezone(&Utc))
    }
}

impl From<SystemTime> for FreshnessStamp {
    fn from(at: SystemTime) -> Self {
        let millis = match at.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_millis()).unwrap_or(i64::MAX),
            Err(before) => -i64::try_from(before.duration().as_millis()).unwrap_or(i64::MAX),
        };
        FreshnessStamp::EpochMillis(millis)
    }
}
