use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
///
/// Only `DATABASE_URL` is required at startup. Missing generation credentials
/// surface per call as configuration errors, so the rest of the API stays up.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: Option<String>,
    pub agent_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    /// Running rows older than this are marked abandoned before a new run opens.
    pub stale_run_minutes: i32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            agent_api_key: optional_env("AGENT_API_KEY"),
            port: parse_env("PORT", 8080).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            stale_run_minutes: stale_minutes(parse_env("STALE_RUN_MINUTES", 15))?,
        })
    }
}

/// Stale-run threshold in whole minutes, at least 1.
fn stale_minutes(parsed: Result<i32>) -> Result<i32> {
    let minutes = parsed.context("STALE_RUN_MINUTES must be a whole number of minutes")?;
    anyhow::ensure!(minutes >= 1, "STALE_RUN_MINUTES must be at least 1 (got {minutes})");
    Ok(minutes)
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => Ok(raw.trim().parse::<T>()?),
        Err(_) => Ok(default),
    }
}
