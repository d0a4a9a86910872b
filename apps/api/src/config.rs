use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Unset means the unfinished-interview cache lives in process memory.
    pub redis_url: Option<String>,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub llm: LlmConfig,
    pub unfinished_ttl: Duration,
    pub sweep_interval: Duration,
    pub port: u16,
    pub rust_log: String,
}

/// System-wide LLM defaults. Users may override model and key via AI settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    pub json_mode: bool,
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            llm: LlmConfig {
                api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
                base_url: std::env::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "https://api.deepseek.com".to_string()),
                default_model: std::env::var("LLM_DEFAULT_MODEL")
                    .unwrap_or_else(|_| "deepseek-chat".to_string()),
                json_mode: env_or("LLM_JSON_MODE", true)?,
                timeout: Duration::from_secs(env_or("LLM_TIMEOUT_SECS", 120)?),
            },
            unfinished_ttl: Duration::from_secs(env_or("UNFINISHED_TTL_SECS", 7200)?),
            sweep_interval: Duration::from_secs(env_or("SWEEP_INTERVAL_SECS", 600)?),
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
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
        Ok(raw) if !raw.trim().is_empty() => parse_value(key, &raw),
        _ => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("{key} has an invalid value: '{raw}'"))
}
