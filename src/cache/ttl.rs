// TTL policy for persistent cache entries.
// Turns a requested lifetime into an absolute expiry and evaluates expiry at read/sweep time.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Time-to-live requested for a single write.
///
/// Signed on purpose: a zero or negative TTL yields an entry that is already
/// expired when written. There is no global default; a write without a TTL
/// never expires. The SQLite store keeps millisecond precision and rounds a
/// positive TTL up to the next millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ttl(TimeDelta);

impl Ttl {
    pub const ZERO: Ttl = Ttl(TimeDelta::zero());

    pub fn seconds(secs: i64) -> Self {
        Ttl(TimeDelta::try_seconds(secs).unwrap_or_else(|| saturated(secs)))
    }

    pub fn minutes(mins: i64) -> Self {
        Self::seconds(mins.saturating_mul(60))
    }

    pub fn hours(hours: i64) -> Self {
        Self::seconds(hours.saturating_mul(3600))
    }

    pub fn days(days: i64) -> Self {
        Self::seconds(days.saturating_mul(86_400))
    }

    pub fn millis(millis: i64) -> Self {
        Ttl(TimeDelta::try_milliseconds(millis).unwrap_or_else(|| saturated(millis)))
    }

    pub fn as_delta(&self) -> TimeDelta {
        self.0
    }

    /// Absolute expiry for an entry written at `now`.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.0).unwrap_or(if self.0 < TimeDelta::zero() {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
    }
}

fn saturated(sign: i64) -> TimeDelta {
    if sign < 0 {
        TimeDelta::MIN
    } else {
        TimeDelta::MAX
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl(TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX))
    }
}

/// Expiry to store for a write at `now`. `None` means the entry never expires.
pub fn expiry_for(now: DateTime<Utc>, ttl: Option<Ttl>) -> Option<DateTime<Utc>> {
    ttl.map(|ttl| ttl.expiry_from(now))
}

/// An entry is expired once its expiry is at or before `now`.
pub fn is_expired(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expiry, Some(at) if at <= now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(text: &str) -> DateTime<Utc> {
        text.parse().unwrap()
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let now = at("2024-01-01T00:00:00Z");
        let expiry = expiry_for(now, None);
        assert_eq!(expiry, None);
        assert!(!is_expired(expiry, DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn test_zero_and_negative_ttl_expire_immediately() {
        let now = at("2024-01-01T00:00:00Z");
        for ttl in [Ttl::ZERO, Ttl::seconds(-30), Ttl::millis(-1)] {
            let expiry = expiry_for(now, Some(ttl));
            assert!(is_expired(expiry, now), "{ttl:?}");
        }
    }

    #[test]
    fn test_positive_ttl_expires_at_boundary() {
        let now = at("2024-01-01T00:00:00Z");
        let expiry = expiry_for(now, Some(Ttl::minutes(5)));
        assert_eq!(expiry, Some(at("2024-01-01T00:05:00Z")));
        assert!(!is_expired(expiry, at("2024-01-01T00:04:59Z")));
        assert!(is_expired(expiry, at("2024-01-01T00:05:00Z")));
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let now = at("2024-01-01T00:00:00Z");
        assert_eq!(Ttl::seconds(i64::MAX).expiry_from(now), DateTime::<Utc>::MAX_UTC);
        assert_eq!(Ttl::days(i64::MIN).expiry_from(now), DateTime::<Utc>::MIN_UTC);
        assert_eq!(Ttl::from(Duration::MAX).expiry_from(now), DateTime::<Utc>::MAX_UTC);
    }
}
