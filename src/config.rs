//! Application settings loaded from environment variables.
//!
//! The Mistral API key itself is read by [`crate::mistral::MistralClient::from_env`];
//! everything here is server tuning (bind address, upload ceilings, model names, CORS).

use anyhow::{Context, Result};
use std::env;

/// Server settings, populated from the environment with documented defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Maximum accepted upload size in megabytes.
    pub max_file_size_mb: u64,
    /// Advertised page-count ceiling (informational, enforced by the provider).
    pub max_pages: u32,
    pub default_qa_model: String,
    pub ocr_model: String,
    /// Allowed CORS origins; `*` means permissive.
    pub cors_origins: Vec<String>,
}

impl Settings {
    /// Read settings from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env("PORT", 8000)?,
            max_file_size_mb: parse_env("MAX_FILE_SIZE_MB", 50)?,
            max_pages: parse_env("MAX_PAGES", 1000)?,
            default_qa_model: env::var("DEFAULT_QA_MODEL")
                .unwrap_or_else(|_| "mistral-small-latest".to_string()),
            ocr_model: env::var("OCR_MODEL").unwrap_or_else(|_| "mistral-ocr-latest".to_string()),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
        })
    }

    /// Upload ceiling in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Request body limit: the upload ceiling plus slack for multipart framing.
    pub fn body_limit(&self) -> usize {
        (self.max_file_size_bytes() + 1024 * 1024) as usize
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {}", key, value)),
        Err(_) => Ok(default),
    }
}
