use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite connection string, e.g. "sqlite:./linkpulse.db"
    pub database_url: String,

    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Public base URL used when building `shortUrl`, e.g. "https://go.example.com".
    /// Never has a trailing slash.
    pub base_url: String,

    /// Length of generated short codes
    pub code_length: usize,

    /// How many codes to try before a create request gives up
    pub max_create_attempts: u32,

    /// How many times to try opening the database at startup
    pub db_connect_attempts: u32,

    /// Pause between database connection attempts
    pub db_retry_delay_secs: u64,

    /// Buffer size of the realtime broadcast channel
    pub realtime_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./linkpulse.db".into(),
            host: "0.0.0.0".into(),
            port: 3002,
            base_url: "http://localhost:3002".into(),
            code_length: 7,
            max_create_attempts: 5,
            db_connect_attempts: 12,
            db_retry_delay_secs: 5,
            realtime_capacity: 256,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port = env_or("PORT", defaults.port)?;

        let base_url = std::env::var("BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let code_length: usize = env_or("CODE_LENGTH", defaults.code_length)?;
        if !(4..=32).contains(&code_length) {
            anyhow::bail!("CODE_LENGTH must be between 4 and 32");
        }

        let max_create_attempts: u32 = env_or("MAX_CREATE_ATTEMPTS", defaults.max_create_attempts)?;
        if max_create_attempts == 0 {
            anyhow::bail!("MAX_CREATE_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port,
            base_url,
            code_length,
            max_create_attempts,
            db_connect_attempts: env_or("DB_CONNECT_ATTEMPTS", defaults.db_connect_attempts)?
                .max(1),
            db_retry_delay_secs: env_or("DB_RETRY_DELAY_SECS", defaults.db_retry_delay_secs)?,
            realtime_capacity: env_or("REALTIME_CAPACITY", defaults.realtime_capacity)?.max(1),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse `key` from the environment, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}
