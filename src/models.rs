use chrono::{DateTime, Utc};
use serde::Serialize;

/// A shortened URL record from the `urls` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct UrlRecord {
    pub id: i64,
    pub original_url: String,
    pub short_code: String,
    pub clicks: i64,
    pub created_at: DateTime<Utc>,
}

impl UrlRecord {
    /// Wire form of this record, with `shortUrl` built from `base_url`.
    pub fn view(&self, base_url: &str) -> UrlView {
        UrlView {
            id: self.id,
            original_url: self.original_url.clone(),
            short_code: self.short_code.clone(),
            short_url: format!("{}/{}", base_url, self.short_code),
            clicks: self.clicks,
            created_at: self.created_at,
        }
    }
}

/// JSON shape shared by the HTTP API and the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlView {
    pub id: i64,
    pub original_url: String,
    pub short_code: String,
    pub short_url: String,
    pub clicks: i64,
    pub created_at: DateTime<Utc>,
}

/// Result of a create-or-get request.
#[derive(Debug, Clone)]
pub struct Shortened {
    pub record: UrlRecord,
    /// `true` when the URL had already been shortened before this request.
    pub existing: bool,
}
