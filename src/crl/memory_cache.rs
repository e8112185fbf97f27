use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::model::RevocationList;

#[derive(Debug, Clone)]
struct CacheEntry {
    crl: Arc<RevocationList>,
    expire_at: DateTime<Utc>,
}

/// Process-wide in-memory CRL cache. Entries never outlive their CRL's own
/// nextUpdate and are refreshed at least once per cache validity window.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    max_validity: chrono::Duration,
}

impl MemoryCache {
    pub fn new(max_validity: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_validity: chrono::Duration::from_std(max_validity)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Returns the cached CRL when present and still live. An expired entry
    /// is removed as a side effect of the lookup.
    pub fn get(&self, url: &str) -> Option<Arc<RevocationList>> {
        let now = Utc::now();
        {
            let entry = self.entries.get(url)?;
            if now < entry.expire_at {
                return Some(Arc::clone(&entry.crl));
            }
        }
        debug!(%url, "removing expired CRL from the in-memory cache");
        self.entries.remove(url);
        None
    }

    pub fn set(&self, url: &str, crl: Arc<RevocationList>) {
        let ceiling = Utc::now()
            .checked_add_signed(self.max_validity)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let expire_at = match crl.next_update {
            Some(next_update) => ceiling.min(next_update),
            None => ceiling,
        };
        self.entries.insert(url.to_string(), CacheEntry { crl, expire_at });
    }

    /// Removes every expired entry.
    pub fn sweep(&self) {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expire_at >= now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "swept expired CRLs from the in-memory cache");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn crl_with_next_update(next_update: Option<DateTime<Utc>>) -> Arc<RevocationList> {
        Arc::new(RevocationList {
            raw: Vec::new(),
            tbs_raw: Vec::new(),
            signature_algorithm: "1.2.840.10045.4.3.2".to_string(),
            signature: Vec::new(),
            issuer: "CN=Test CA".to_string(),
            this_update: Utc::now(),
            next_update,
            revoked: HashMap::new(),
            issuing_distribution_point_uris: None,
        })
    }

    #[test]
    fn live_entry_is_returned() {
        let cache = MemoryCache::new(Duration::from_secs(3600));
        let crl = crl_with_next_update(Some(Utc::now() + chrono::Duration::hours(4)));
        cache.set("http://crl.example.com/ca.crl", Arc::clone(&crl));

        let hit = cache.get("http://crl.example.com/ca.crl");
        assert!(hit.is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entry_is_removed_on_read() {
        let cache = MemoryCache::new(Duration::from_secs(3600));
        let crl = crl_with_next_update(Some(Utc::now() - chrono::Duration::minutes(1)));
        cache.set("http://crl.example.com/ca.crl", crl);
        assert_eq!(cache.len(), 1);

        assert!(cache.get("http://crl.example.com/ca.crl").is_none());
        assert_eq!(cache.len(), 0, "expired entry must be evicted by the read");
    }

    #[test]
    fn expiry_is_capped_by_next_update() {
        let cache = MemoryCache::new(Duration::from_secs(3600));
        let next_update = Utc::now() + chrono::Duration::minutes(5);
        let crl = crl_with_next_update(Some(next_update));
        cache.set("http://crl.example.com/ca.crl", crl);

        let entry = cache
            .entries
            .get("http://crl.example.com/ca.crl")
            .expect("entry present");
        assert_eq!(entry.expire_at, next_update);
    }

    #[test]
    fn expiry_is_capped_by_validity_window() {
        let cache = MemoryCache::new(Duration::from_secs(3600));
        let before = Utc::now();
        let crl = crl_with_next_update(Some(Utc::now() + chrono::Duration::days(30)));
        cache.set("http://crl.example.com/ca.crl", crl);

        let entry = cache
            .entries
            .get("http://crl.example.com/ca.crl")
            .expect("entry present");
        assert!(entry.expire_at >= before + chrono::Duration::hours(1));
        assert!(entry.expire_at <= Utc::now() + chrono::Duration::hours(1));
    }

    #[test]
    fn missing_next_update_falls_back_to_validity_window() {
        let cache = MemoryCache::new(Duration::from_secs(3600));
        let before = Utc::now();
        cache.set("http://crl.example.com/ca.crl", crl_with_next_update(None));

        let entry = cache
            .entries
            .get("http://crl.example.com/ca.crl")
            .expect("entry present");
        assert!(entry.expire_at >= before + chrono::Duration::hours(1));
        assert!(entry.expire_at <= Utc::now() + chrono::Duration::hours(1));
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache = MemoryCache::new(Duration::from_secs(3600));
        cache.set(
            "http://crl.example.com/expired.crl",
            crl_with_next_update(Some(Utc::now() - chrono::Duration::minutes(1))),
        );
        cache.set(
            "http://crl.example.com/live.crl",
            crl_with_next_update(Some(Utc::now() + chrono::Duration::hours(2))),
        );

        cache.sweep();

        assert_eq!(cache.len(), 1);
        assert!(cache.get("http://crl.example.com/live.crl").is_some());
    }
}
