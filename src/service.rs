use crate::{
    cache::UrlCache,
    clicks::ClickTracker,
    config::AppConfig,
    db,
    error::{is_unique_violation, AppError},
    models::{Shortened, UrlRecord, UrlView},
    realtime::{Hub, ServerEvent, ViewerId},
    shortcode::CodeGenerator,
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Canonicalize user input: trim it and make sure it carries an http(s) scheme.
pub fn normalize_url(input: &str) -> Result<String, AppError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::MissingUrl);
    }

    let lower = trimmed.to_ascii_lowercase();
    let normalized = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    };

    match url::Url::parse(&normalized) {
        Ok(parsed) if parsed.host_str().is_some_and(|h| !h.is_empty()) => Ok(normalized),
        _ => Err(AppError::InvalidUrl),
    }
}

/// All reads and writes of URL records go through here, from both the HTTP
/// handlers and realtime sessions. Every state change is published on the hub.
#[derive(Clone)]
pub struct UrlService {
    db: SqlitePool,
    cache: UrlCache,
    hub: Hub,
    codes: Arc<dyn CodeGenerator>,
    clicks: ClickTracker,
    base_url: String,
    max_attempts: u32,
}

impl UrlService {
    pub fn new(db: SqlitePool, hub: Hub, codes: Arc<dyn CodeGenerator>, config: &AppConfig) -> Self {
        Self {
            db,
            cache: UrlCache::new(),
            hub,
            codes,
            clicks: ClickTracker::new(),
            base_url: config.base_url.clone(),
            max_attempts: config.max_create_attempts.max(1),
        }
    }

    pub fn cache(&self) -> &UrlCache {
        &self.cache
    }

    pub fn clicks(&self) -> &ClickTracker {
        &self.clicks
    }

    pub fn view(&self, record: &UrlRecord) -> UrlView {
        record.view(&self.base_url)
    }

    pub async fn warm_cache(&self) -> Result<usize, AppError> {
        Ok(db::warm_cache(&self.db, &self.cache).await?)
    }

    /// Create-or-get. New records are announced to every viewer except `origin`.
    pub async fn shorten(
        &self,
        input: &str,
        origin: Option<ViewerId>,
    ) -> Result<Shortened, AppError> {
        let normalized = normalize_url(input)?;
        let shortened = self.create_or_get(&normalized).await?;

        if !shortened.existing {
            tracing::info!(
                "Created short code '{}' for {}",
                shortened.record.short_code,
                shortened.record.original_url
            );
            self.hub
                .publish(origin, ServerEvent::UrlCreated(self.view(&shortened.record)));
        }

        Ok(shortened)
    }

    async fn create_or_get(&self, normalized: &str) -> Result<Shortened, AppError> {
        if let Some(record) = self.cache.by_original(normalized) {
            tracing::debug!("'{}' found in cache", normalized);
            return Ok(Shortened {
                record,
                existing: true,
            });
        }

        if let Some(record) = self.find_existing(normalized).await? {
            return Ok(record);
        }

        for attempt in 1..=self.max_attempts {
            let code = self.codes.generate();
            match db::insert_url(&self.db, normalized, &code, Utc::now()).await {
                Ok(record) => {
                    self.cache.insert(record.clone());
                    return Ok(Shortened {
                        record,
                        existing: false,
                    });
                }
                Err(e) if is_unique_violation(&e) => {
                    // Either another request stored this URL first, or the code collided.
                    if let Some(record) = self.find_existing(normalized).await? {
                        return Ok(record);
                    }
                    tracing::warn!(
                        "Short code '{}' already taken (attempt {}/{}), retrying",
                        code,
                        attempt,
                        self.max_attempts
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::CodesExhausted(self.max_attempts))
    }

    async fn find_existing(&self, normalized: &str) -> Result<Option<Shortened>, AppError> {
        let Some(record) = db::find_by_original(&self.db, normalized).await? else {
            return Ok(None);
        };
        if !self.backfill(&record).await? {
            return Ok(None);
        }
        Ok(Some(Shortened {
            record,
            existing: true,
        }))
    }

    /// Cache a record read from the store. A delete can land between that
    /// read and the insert, so the row is checked again afterwards and the
    /// entry dropped if it is gone. Returns whether the record is still live.
    async fn backfill(&self, record: &UrlRecord) -> Result<bool, AppError> {
        self.cache.insert(record.clone());
        if db::find_by_id(&self.db, record.id).await?.is_some() {
            return Ok(true);
        }
        self.cache.evict(record);
        tracing::debug!("'{}' was deleted while being cached", record.short_code);
        Ok(false)
    }

    /// All records, newest first.
    pub async fn list(&self) -> Result<Vec<UrlRecord>, AppError> {
        Ok(db::list_urls(&self.db).await?)
    }

    pub async fn list_views(&self) -> Result<Vec<UrlView>, AppError> {
        let records = self.list().await?;
        Ok(records.iter().map(|r| self.view(r)).collect())
    }

    /// Remove a record and tell every viewer. Returns `false` if `id` was unknown.
    pub async fn delete(&self, id: i64) -> Result<bool, AppError> {
        match db::delete_url(&self.db, id).await? {
            Some(record) => {
                self.cache.remove(&record);
                tracing::info!("Deleted '{}' (id {})", record.short_code, id);
                self.hub.publish(None, ServerEvent::UrlDeleted { id });
                Ok(true)
            }
            None => {
                tracing::debug!("Delete of unknown id {}", id);
                Ok(false)
            }
        }
    }

    /// Find the record behind a short code, cache first.
    pub async fn resolve(&self, short_code: &str) -> Result<Option<UrlRecord>, AppError> {
        if let Some(record) = self.cache.by_code(short_code) {
            return Ok(Some(record));
        }

        match db::find_by_code(&self.db, short_code).await? {
            // Backfill the cache for next time
            Some(record) if self.backfill(&record).await? => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    /// Count a visit. The cached total moves right away; the store write and
    /// the `url_clicked` broadcast happen in a tracked background task so the
    /// redirect is not held up by them.
    pub fn record_click(&self, record: &UrlRecord) {
        self.cache.bump_clicks(&record.short_code);

        let db = self.db.clone();
        let cache = self.cache.clone();
        let hub = self.hub.clone();
        let id = record.id;
        let code = record.short_code.clone();

        self.clicks.spawn(async move {
            match db::increment_clicks(&db, id).await {
                Ok(Some(clicks)) => {
                    cache.set_clicks(&code, clicks);
                    hub.publish(None, ServerEvent::UrlClicked { id, clicks });
                }
                Ok(None) => {
                    tracing::warn!(
                        "Click on '{}' not saved: record deleted before the write",
                        code
                    );
                }
                Err(e) => {
                    tracing::error!("Error saving click count for '{}': {:?}", code, e);
                }
            }
        });
    }
}
