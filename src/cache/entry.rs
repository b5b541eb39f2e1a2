//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, Instant};

use crate::clock::saturating_deadline;

// == Cache Entry ==
/// A stored value with its absolute expiration time.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    /// The stored value
    pub value: V,
    /// Instant at which the entry stops being served
    pub expires_at: Instant,
}

impl<V> Entry<V> {
    // == Constructor ==
    /// Creates an entry that expires `ttl` after `now`; an unrepresentable
    /// expiry is clamped far into the future.
    pub fn new(value: V, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: saturating_deadline(now, ttl),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is expired once `now >= expires_at`, so a
    /// fully elapsed TTL is never served.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    // == Time To Live ==
    /// Returns the time left before expiry, zero once expired.
    pub fn ttl_remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_not_expired_before_ttl() {
        let now = Instant::now();
        let entry = Entry::new("value", now, Duration::from_secs(60));

        assert_eq!(entry.value, "value");
        assert!(!entry.is_expired(now));
        assert!(!entry.is_expired(now + Duration::from_secs(59)));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = Instant::now();
        let entry = Entry::new(1, now, Duration::from_secs(10));

        assert!(!entry.is_expired(now + Duration::from_secs(10) - Duration::from_nanos(1)));
        assert!(entry.is_expired(now + Duration::from_secs(10)));
    }

    #[test]
    fn test_zero_ttl_is_immediately_expired() {
        let now = Instant::now();
        let entry = Entry::new(1, now, Duration::ZERO);
        assert!(entry.is_expired(now));
    }

    #[test]
    fn test_max_ttl_does_not_overflow() {
        let now = Instant::now();
        let entry = Entry::new(1, now, Duration::MAX);
        assert!(!entry.is_expired(now + Duration::from_secs(86_400 * 365)));
    }

    #[test]
    fn test_ttl_remaining() {
        let now = Instant::now();
        let entry = Entry::new((), now, Duration::from_secs(10));

        assert_eq!(entry.ttl_remaining(now), Duration::from_secs(10));
        assert_eq!(
            entry.ttl_remaining(now + Duration::from_secs(4)),
            Duration::from_secs(6)
        );
        assert_eq!(
            entry.ttl_remaining(now + Duration::from_secs(20)),
            Duration::ZERO
        );
    }
}
