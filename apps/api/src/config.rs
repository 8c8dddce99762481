use std::str::FromStr;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub db_max_connections: u32,
    /// Page size used when a history request does not ask for one.
    pub history_page_size: u32,
    /// Upper bound for any requested history page size.
    pub history_max_page_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let config = Config {
            database_url: require_env("DATABASE_URL")?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 10)?,
            history_page_size: env_or("HISTORY_PAGE_SIZE", 50)?,
            history_max_page_size: env_or("HISTORY_MAX_PAGE_SIZE", 200)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.history_page_size == 0 || self.history_max_page_size == 0 {
            bail!("HISTORY_PAGE_SIZE and HISTORY_MAX_PAGE_SIZE must be at least 1");
        }
        if self.history_page_size > self.history_max_page_size {
            bail!(
                "HISTORY_PAGE_SIZE ({}) exceeds HISTORY_MAX_PAGE_SIZE ({})",
                self.history_page_size,
                self.history_max_page_size
            );
        }
        Ok(())
    }

    /// Resolves a requested page size against the configured default and cap.
    pub fn page_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.history_page_size)
            .clamp(1, self.history_max_page_size)
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}
