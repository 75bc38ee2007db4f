use crate::{cache::UrlCache, config::AppConfig, models::UrlRecord};
use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::time::Duration;

// ── Connection ─────────────────────────────────────────────────────────────

/// Open the SQLite pool, retrying while the database is unavailable.
pub async fn connect(config: &AppConfig) -> anyhow::Result<SqlitePool> {
    // CREATE the file if it doesn't exist yet
    let options = config
        .database_url
        .parse::<SqliteConnectOptions>()
        .with_context(|| format!("DATABASE_URL is not a valid SQLite URL: {}", config.database_url))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options.clone())
            .await
        {
            Ok(pool) => {
                tracing::info!("Connected to database after {} attempt(s)", attempt);
                return Ok(pool);
            }
            Err(e) if attempt < config.db_connect_attempts => {
                tracing::warn!(
                    "Database connection failed (attempt {}/{}): {}. Retrying in {}s",
                    attempt,
                    config.db_connect_attempts,
                    e,
                    config.db_retry_delay_secs
                );
                tokio::time::sleep(Duration::from_secs(config.db_retry_delay_secs)).await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("could not connect to the database after {attempt} attempt(s)")
                });
            }
        }
    }
}

/// Apply the embedded migrations in `migrations/`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

// ── Warm-up ────────────────────────────────────────────────────────────────

/// Load every record into the in-memory cache at startup.
pub async fn warm_cache(pool: &SqlitePool, cache: &UrlCache) -> Result<usize, sqlx::Error> {
    let records = list_urls(pool).await?;
    let count = records.len();
    for record in records {
        cache.insert(record);
    }

    tracing::info!("Cache warmed with {} URL(s)", count);
    Ok(count)
}

// ── URLs ───────────────────────────────────────────────────────────────────

/// Insert a new record and return the stored row.
///
/// Fails with a unique-violation when either the URL or the code already exists.
pub async fn insert_url(
    pool: &SqlitePool,
    original_url: &str,
    short_code: &str,
    created_at: DateTime<Utc>,
) -> Result<UrlRecord, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO urls (original_url, short_code, clicks, created_at)
         VALUES (?1, ?2, 0, ?3)
         RETURNING id, original_url, short_code, clicks, created_at",
    )
    .bind(original_url)
    .bind(short_code)
    .bind(created_at)
    .fetch_one(pool)
    .await
}

pub async fn find_by_original(
    pool: &SqlitePool,
    original_url: &str,
) -> Result<Option<UrlRecord>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, original_url, short_code, clicks, created_at
         FROM urls WHERE original_url = ?1",
    )
    .bind(original_url)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_code(
    pool: &SqlitePool,
    short_code: &str,
) -> Result<Option<UrlRecord>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, original_url, short_code, clicks, created_at
         FROM urls WHERE short_code = ?1",
    )
    .bind(short_code)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<UrlRecord>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, original_url, short_code, clicks, created_at
         FROM urls WHERE id = ?1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Return all records, newest first.
pub async fn list_urls(pool: &SqlitePool) -> Result<Vec<UrlRecord>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id, original_url, short_code, clicks, created_at
         FROM urls
         ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(pool)
    .await
}

/// Permanently delete a record, returning it if it existed.
pub async fn delete_url(pool: &SqlitePool, id: i64) -> Result<Option<UrlRecord>, sqlx::Error> {
    sqlx::query_as(
        "DELETE FROM urls WHERE id = ?1
         RETURNING id, original_url, short_code, clicks, created_at",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

// ── Clicks ─────────────────────────────────────────────────────────────────

/// Atomically add one click and return the new total, or `None` if the
/// record is gone. Called from a tracked background task after the redirect
/// has been sent.
pub async fn increment_clicks(pool: &SqlitePool, id: i64) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("UPDATE urls SET clicks = clicks + 1 WHERE id = ?1 RETURNING clicks")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Single-connection in-memory database with migrations applied.
#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    run_migrations(&pool).await.expect("run migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_unique_violation;

    #[tokio::test]
    async fn insert_then_find_by_every_key() {
        let pool = memory_pool().await;
        let created = insert_url(&pool, "https://a.com", "aaa", Utc::now())
            .await
            .unwrap();

        assert_eq!(created.clicks, 0);
        assert_eq!(find_by_code(&pool, "aaa").await.unwrap(), Some(created.clone()));
        assert_eq!(
            find_by_original(&pool, "https://a.com").await.unwrap(),
            Some(created.clone())
        );
        assert_eq!(find_by_id(&pool, created.id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn duplicate_code_or_url_is_a_unique_violation() {
        let pool = memory_pool().await;
        insert_url(&pool, "https://a.com", "aaa", Utc::now())
            .await
            .unwrap();

        let same_code = insert_url(&pool, "https://b.com", "aaa", Utc::now())
            .await
            .unwrap_err();
        assert!(is_unique_violation(&same_code));

        let same_url = insert_url(&pool, "https://a.com", "bbb", Utc::now())
            .await
            .unwrap_err();
        assert!(is_unique_violation(&same_url));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let pool = memory_pool().await;
        let now = Utc::now();
        insert_url(&pool, "https://old.com", "old", now - chrono::Duration::minutes(5))
            .await
            .unwrap();
        insert_url(&pool, "https://new.com", "new", now).await.unwrap();

        let codes: Vec<String> = list_urls(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.short_code)
            .collect();
        assert_eq!(codes, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn increment_and_delete() {
        let pool = memory_pool().await;
        let r = insert_url(&pool, "https://a.com", "aaa", Utc::now())
            .await
            .unwrap();

        assert_eq!(increment_clicks(&pool, r.id).await.unwrap(), Some(1));
        assert_eq!(increment_clicks(&pool, r.id).await.unwrap(), Some(2));

        let deleted = delete_url(&pool, r.id).await.unwrap().unwrap();
        assert_eq!(deleted.clicks, 2);
        assert_eq!(delete_url(&pool, r.id).await.unwrap(), None);
        assert_eq!(increment_clicks(&pool, r.id).await.unwrap(), None);
    }
}
