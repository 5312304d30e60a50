use dashmap::DashMap;
use std::sync::Arc;

/// The cached slice of a link: what the redirect hot path needs to resolve
/// the target and append the click without a links-table read.
#[derive(Debug, Clone)]
pub struct CachedLink {
    pub id: i64,
    pub long_url: String,
}

/// Thread-safe in-memory cache mapping alias -> CachedLink.
///
/// Backed by a DashMap so reads are concurrent and lock-free for most cases.
/// The cache is warmed on startup by loading all links from the database,
/// then kept in sync via explicit insert calls from the handlers after
/// every write operation.
#[derive(Clone, Debug)]
pub struct LinkCache {
    inner: Arc<DashMap<String, CachedLink>>,
}

impl LinkCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Insert or update a mapping.
    pub fn set(&self, alias: impl Into<String>, id: i64, long_url: impl Into<String>) {
        self.inner.insert(
            alias.into(),
            CachedLink {
                id,
                long_url: long_url.into(),
            },
        );
    }

    /// Look up an alias. Returns a clone of the cached link if present.
    pub fn get(&self, alias: &str) -> Option<CachedLink> {
        self.inner.get(alias).map(|v| v.clone())
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for LinkCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let cache = LinkCache::new();
        assert!(cache.is_empty());

        cache.set("abc123", 7, "https://example.com");
        let hit = cache.get("abc123").unwrap();
        assert_eq!(hit.id, 7);
        assert_eq!(hit.long_url, "https://example.com");
        assert_eq!(cache.len(), 1);

        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn set_overwrites_existing_alias() {
        let cache = LinkCache::new();
        cache.set("abc", 1, "https://old.example.com");
        cache.set("abc", 1, "https://new.example.com");
        assert_eq!(cache.get("abc").unwrap().long_url, "https://new.example.com");
        assert_eq!(cache.len(), 1);
    }
}
