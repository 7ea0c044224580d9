use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
pub const DEFAULT_MAX_DURATION_SECS: u64 = 30;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_STATIC_DIR: &str = "frontend/dist";
/// Requests carry images as data URIs and re-send the whole history.
pub const DEFAULT_MAX_BODY_MB: usize = 20;

/// Runtime configuration, read once at startup from the environment
/// (and `.env`, when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    pub max_duration: Duration,
    pub port: u16,
    pub static_dir: PathBuf,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
    /// `None` allows any origin.
    pub cors_allow_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = var("DEEPSEEK_API_KEY")
            .ok_or_else(|| AppError::MissingConfig { name: "DEEPSEEK_API_KEY".to_string() })?;

        let max_duration_secs = match var("MAX_DURATION_SECS") {
            Some(raw) => parse_var("MAX_DURATION_SECS", &raw)?,
            None => DEFAULT_MAX_DURATION_SECS,
        };
        let port = match var("PORT") {
            Some(raw) => parse_var("PORT", &raw)?,
            None => DEFAULT_PORT,
        };
        let max_body_mb: usize = match var("MAX_BODY_MB") {
            Some(raw) => parse_var("MAX_BODY_MB", &raw)?,
            None => DEFAULT_MAX_BODY_MB,
        };

        Ok(Self {
            api_key,
            base_url: var("DEEPSEEK_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            default_model: var("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_duration: Duration::from_secs(max_duration_secs),
            port,
            static_dir: var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
            max_body_bytes: max_body_mb * 1024 * 1024,
            cors_allow_origin: var("CORS_ALLOW_ORIGIN"),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, AppError> {
    raw.trim().parse().map_err(|_| AppError::InvalidConfig {
        name: name.to_string(),
        value: raw.to_string(),
    })
}
