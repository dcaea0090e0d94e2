//! Timestamped, TTL-bound cache entries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use nutrilog_core::Timestamp;

/// A cached value with its creation and expiry instants.
///
/// Entries are immutable once stored; refreshing a key replaces the whole
/// entry. `expires_at >= stored_at` always holds, and a TTL too large to
/// represent saturates to the latest representable instant. A zero TTL
/// yields an entry that is expired from the moment it is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    value: T,
    stored_at: Timestamp,
    expires_at: Timestamp,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, stored_at: Timestamp, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| stored_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            value,
            stored_at,
            expires_at,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn stored_at(&self) -> Timestamp {
        self.stored_at
    }

    pub fn expires_at(&self) -> Timestamp {
        self.expires_at
    }

    /// Usable at `now`: the expiry instant itself is still inside the TTL.
    pub fn is_live_at(&self, now: Timestamp) -> bool {
        self.expires_at > self.stored_at && now <= self.expires_at
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        !self.is_live_at(now)
    }

    /// Age of the entry at `now`; zero if `now` precedes `stored_at`.
    pub fn age_at(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.stored_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Time left before expiry at `now`; zero once expired.
    pub fn remaining_at(&self, now: Timestamp) -> Duration {
        self.expires_at
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Map the inner value, keeping timestamps.
    pub fn map<U, F>(self, f: F) -> CacheEntry<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheEntry {
            value: f(self.value),
            stored_at: self.stored_at,
            expires_at: self.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> Timestamp {
        DateTime::from_timestamp(1_704_067_200, 0).unwrap_or(DateTime::UNIX_EPOCH)
    }

    #[test]
    fn test_expiry_boundaries() {
        let entry = CacheEntry::new("meals", t0(), Duration::from_secs(300));
        assert_eq!(entry.expires_at() - entry.stored_at(), chrono::Duration::seconds(300));

        assert!(entry.is_live_at(t0()));
        assert!(entry.is_live_at(t0() + chrono::Duration::seconds(300)));
        assert!(entry.is_expired_at(t0() + chrono::Duration::milliseconds(300_001)));
    }

    #[test]
    fn test_zero_ttl_is_expired_immediately() {
        let entry = CacheEntry::new(1, t0(), Duration::ZERO);
        assert_eq!(entry.expires_at(), entry.stored_at());
        assert!(entry.is_expired_at(t0()));
        assert!(entry.is_expired_at(t0() + chrono::Duration::milliseconds(1)));
        assert_eq!(entry.remaining_at(t0()), Duration::ZERO);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let entry = CacheEntry::new(1, t0(), Duration::from_secs(u64::MAX));
        assert_eq!(entry.expires_at(), DateTime::<Utc>::MAX_UTC);
        assert!(entry.expires_at() >= entry.stored_at());
    }

    #[test]
    fn test_age_and_remaining() {
        let entry = CacheEntry::new(1, t0(), Duration::from_secs(60));
        let later = t0() + chrono::Duration::seconds(20);
        assert_eq!(entry.age_at(later), Duration::from_secs(20));
        assert_eq!(entry.remaining_at(later), Duration::from_secs(40));
        assert_eq!(entry.remaining_at(t0() + chrono::Duration::seconds(90)), Duration::ZERO);
        assert_eq!(entry.age_at(t0() - chrono::Duration::seconds(5)), Duration::ZERO);
    }

    #[test]
    fn test_map_keeps_timestamps() {
        let entry = CacheEntry::new(21, t0(), Duration::from_secs(60));
        let mapped = entry.clone().map(|v| v * 2);
        assert_eq!(*mapped.value(), 42);
        assert_eq!(mapped.stored_at(), entry.stored_at());
        assert_eq!(mapped.expires_at(), entry.expires_at());
    }
}
