use crate::models::UrlRecord;
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe in-memory lookup tables for URL records.
///
/// `by_code` maps short_code -> record and serves redirects. `by_original`
/// maps a normalized URL -> short_code and serves create-or-get, so both
/// lookups share one copy of each record and its click count.
///
/// Entries live for the whole process. The cache is warmed on startup and
/// kept in sync by the service after every write; the only eviction is on
/// delete.
#[derive(Clone, Debug)]
pub struct UrlCache {
    by_code: Arc<DashMap<String, UrlRecord>>,
    by_original: Arc<DashMap<String, String>>,
}

impl UrlCache {
    pub fn new() -> Self {
        Self {
            by_code: Arc::new(DashMap::new()),
            by_original: Arc::new(DashMap::new()),
        }
    }

    /// Insert or replace a record under both keys.
    pub fn insert(&self, record: UrlRecord) {
        self.by_original
            .insert(record.original_url.clone(), record.short_code.clone());
        self.by_code.insert(record.short_code.clone(), record);
    }

    /// Look up a short code. Returns a clone of the cached record.
    pub fn by_code(&self, short_code: &str) -> Option<UrlRecord> {
        self.by_code.get(short_code).map(|r| r.clone())
    }

    /// Look up a normalized original URL.
    pub fn by_original(&self, original_url: &str) -> Option<UrlRecord> {
        // Clone the code out first so the two shard locks are never held together.
        let code = self.by_original.get(original_url).map(|c| c.clone())?;
        self.by_code(&code)
    }

    /// Drop both entries for a deleted record.
    pub fn remove(&self, record: &UrlRecord) {
        self.by_code.remove(&record.short_code);
        self.by_original.remove(&record.original_url);
    }

    /// Drop `record` only if the cached entries still belong to it, leaving
    /// any newer record under the same key alone.
    pub fn evict(&self, record: &UrlRecord) {
        self.by_code
            .remove_if(&record.short_code, |_, cached| cached.id == record.id);
        self.by_original
            .remove_if(&record.original_url, |_, code| *code == record.short_code);
    }

    /// Count one click on a cached record, returning the new in-memory total.
    pub fn bump_clicks(&self, short_code: &str) -> Option<i64> {
        self.by_code.get_mut(short_code).map(|mut r| {
            r.clicks += 1;
            r.clicks
        })
    }

    /// Sync the cached count with the stored one. Never lowers the count.
    pub fn set_clicks(&self, short_code: &str, clicks: i64) {
        if let Some(mut r) = self.by_code.get_mut(short_code) {
            r.clicks = r.clicks.max(clicks);
        }
    }

    /// Number of records currently cached.
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

impl Default for UrlCache {
    fn default() -> Self {
        Self::new()
    }
}
