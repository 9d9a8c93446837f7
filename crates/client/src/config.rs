//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SIJANG_API_BASE_URL` - Base URL of the marketplace backend API
//! - `KAKAO_REST_API_KEY` - Kakao Local REST API key for places search
//!
//! ## Optional
//! - `SIJANG_STORAGE_PATH` - Path of the durable key-value store file
//!   (default: in-memory storage only)
//! - `SIJANG_CACHE_TTL_SECS` - Shop listing cache TTL in seconds
//!   (default: 300)

use std::path::PathBuf;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Default time-to-live of the shop listing cache.
const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Top-level client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Marketplace backend API configuration
    pub api: ApiConfig,
    /// Places-search provider configuration
    pub places: PlacesConfig,
    /// Durable storage file path; `None` keeps everything in memory
    pub storage_path: Option<PathBuf>,
}

/// Marketplace backend API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the backend API (no trailing slash required)
    pub base_url: String,
    /// Shop listing cache TTL in seconds
    pub cache_ttl_secs: u64,
}

/// Places-search provider configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct PlacesConfig {
    /// Kakao REST API key
    pub api_key: SecretString,
}

impl std::fmt::Debug for PlacesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacesConfig")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            api: ApiConfig::from_env()?,
            places: PlacesConfig::from_env()?,
            storage_path: get_optional_env("SIJANG_STORAGE_PATH").map(PathBuf::from),
        })
    }
}

impl ApiConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = get_required_env("SIJANG_API_BASE_URL")?;
        validate_base_url(&base_url, "SIJANG_API_BASE_URL")?;
        let cache_ttl_secs =
            get_env_or_default("SIJANG_CACHE_TTL_SECS", &DEFAULT_CACHE_TTL_SECS.to_string())
                .parse::<u64>()
                .map_err(|e| {
                    ConfigError::InvalidEnvVar("SIJANG_CACHE_TTL_SECS".to_string(), e.to_string())
                })?;

        Ok(Self {
            base_url,
            cache_ttl_secs,
        })
    }
}

impl PlacesConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: get_required_secret("KAKAO_REST_API_KEY")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate that a base URL parses and uses an HTTP scheme.
fn validate_base_url(value: &str, var_name: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(())
}
