//! Memoization of server-side verification results.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

/// How long a confirmed-valid result may be reused.
pub const POSITIVE_TTL_SECS: i64 = 5 * 60;

/// How long a failed validation is held against a token. Deliberately short:
/// a failure may reflect a transient server fault rather than a genuinely
/// invalid token, so the penalty window is tens of seconds, not minutes.
pub const NEGATIVE_TTL_SECS: i64 = 30;

/// Short derived identifier for a token.
///
/// Cache keys never hold the raw credential: the fingerprint is the first
/// eight bytes of SHA-256, hex-encoded, which also bounds key memory.
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    hex::encode(&digest[..8])
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    is_valid: bool,
    expires_at: DateTime<Utc>,
}

/// TTL-bounded memo of "is token X valid" answers.
///
/// Entries past their expiry behave as absent, never as stale-valid.
#[derive(Debug, Default)]
pub struct ValidationCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ValidationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_result_at(
        &self,
        token_fingerprint: &str,
        is_valid: bool,
        ttl: Duration,
        now: DateTime<Utc>,
    ) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                token_fingerprint.to_string(),
                CacheEntry {
                    is_valid,
                    expires_at: now + ttl,
                },
            );
        }
    }

    pub fn cache_result(&self, token_fingerprint: &str, is_valid: bool, ttl: Duration) {
        self.cache_result_at(token_fingerprint, is_valid, ttl, Utc::now());
    }

    /// `None` means cache miss: the caller must verify with the server.
    pub fn get_cached_at(&self, token_fingerprint: &str, now: DateTime<Utc>) -> Option<bool> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(token_fingerprint) {
            Some(entry) if now < entry.expires_at => Some(entry.is_valid),
            Some(_) => {
                entries.remove(token_fingerprint);
                None
            }
            None => None,
        }
    }

    pub fn get_cached(&self, token_fingerprint: &str) -> Option<bool> {
        self.get_cached_at(token_fingerprint, Utc::now())
    }

    pub fn invalidate(&self, token_fingerprint: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(token_fingerprint);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_short_and_stable() {
        let fp = fingerprint("some.jwt.token");
        assert_eq!(fp.len(), 16);
        assert_eq!(fp, fingerprint("some.jwt.token"));
        assert_ne!(fp, fingerprint("some.jwt.token2"));
    }

    #[test]
    fn hit_within_ttl_miss_after() {
        let cache = ValidationCache::new();
        let now = Utc::now();
        cache.cache_result_at("fp", true, Duration::seconds(60), now);

        assert_eq!(cache.get_cached_at("fp", now + Duration::seconds(59)), Some(true));
        assert_eq!(cache.get_cached_at("fp", now + Duration::seconds(61)), None);
        // The expired entry was pruned, not merely skipped.
        assert_eq!(cache.get_cached_at("fp", now), None);
    }

    #[test]
    fn negative_results_are_cacheable_too() {
        let cache = ValidationCache::new();
        let now = Utc::now();
        cache.cache_result_at("fp", false, Duration::seconds(NEGATIVE_TTL_SECS), now);

        assert_eq!(cache.get_cached_at("fp", now + Duration::seconds(10)), Some(false));
        assert_eq!(
            cache.get_cached_at("fp", now + Duration::seconds(NEGATIVE_TTL_SECS + 1)),
            None
        );
    }

    #[test]
    fn invalidate_and_clear_forget_entries() {
        let cache = ValidationCache::new();
        let now = Utc::now();
        cache.cache_result_at("a", true, Duration::seconds(60), now);
        cache.cache_result_at("b", true, Duration::seconds(60), now);

        cache.invalidate("a");
        assert_eq!(cache.get_cached_at("a", now), None);
        assert_eq!(cache.get_cached_at("b", now), Some(true));

        cache.clear();
        assert_eq!(cache.get_cached_at("b", now), None);
    }
}
