//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BOARD_COUPON_API_URL` - Backend endpoint (the deployed spreadsheet web app)
//! - `BOARD_COUPON_LIFF_ID` - Identity SDK app id
//!
//! ## Optional
//! - `BOARD_COUPON_CELL_SOURCE` - `backend` (default) or `sheet`
//! - `BOARD_COUPON_SHEET_URL` - Published sheet export URL (required for `sheet`)
//! - `BOARD_COUPON_REGISTRATION_URL` - Registration page (default: register.html)
//! - `BOARD_COUPON_LOGIN_URL` - Login page (default: index.html)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::str::FromStr;

use thiserror::Error;
use url::Url;

/// Blocklist of unfilled template values (case-insensitive).
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your_script_id",
    "your_liff_id",
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example.com",
    "xxx",
    "todo",
    "insert",
];

const DEFAULT_REGISTRATION_URL: &str = "register.html";
const DEFAULT_LOGIN_URL: &str = "index.html";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Unfilled placeholder in {0}: {1}")]
    Placeholder(String, String),
}

/// Where board cell configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellSource {
    /// The backend's `getCellConfigs` action.
    Backend,
    /// A published Google Sheets export (visualization JSON).
    Sheet(Url),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend endpoint every action is sent to
    pub api_url: Url,
    /// Identity SDK app id passed to `init`
    pub liff_id: String,
    /// Board cell configuration source
    pub cell_source: CellSource,
    /// Page users are sent to when they are not registered
    pub registration_url: String,
    /// Page users are sent to when no identity is available
    pub login_url: String,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

impl ClientConfig {
    /// Build a configuration with defaults for everything but the endpoint
    /// and the SDK app id.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `api_url` is not an absolute http(s) URL or
    /// either value is an unfilled placeholder.
    pub fn new(api_url: &str, liff_id: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_endpoint("BOARD_COUPON_API_URL", api_url)?,
            liff_id: validate_not_placeholder("BOARD_COUPON_LIFF_ID", liff_id)?,
            cell_source: CellSource::Backend,
            registration_url: DEFAULT_REGISTRATION_URL.to_string(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            sentry_dsn: None,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// still hold template placeholders.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = get_required_env("BOARD_COUPON_API_URL")?;
        let liff_id = get_required_env("BOARD_COUPON_LIFF_ID")?;
        let mut config = Self::new(&api_url, &liff_id)?;

        config.cell_source = get_env_or_default("BOARD_COUPON_CELL_SOURCE", "backend")
            .parse::<CellSourceKind>()
            .map_err(|e| ConfigError::InvalidEnvVar("BOARD_COUPON_CELL_SOURCE".to_string(), e))?
            .resolve()?;
        config.registration_url =
            get_env_or_default("BOARD_COUPON_REGISTRATION_URL", DEFAULT_REGISTRATION_URL);
        config.login_url = get_env_or_default("BOARD_COUPON_LOGIN_URL", DEFAULT_LOGIN_URL);
        config.sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(config)
    }
}

/// Cell source named in the environment, before its URL is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellSourceKind {
    Backend,
    Sheet,
}

impl FromStr for CellSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "backend" => Ok(Self::Backend),
            "sheet" => Ok(Self::Sheet),
            other => Err(format!("expected `backend` or `sheet`, got `{other}`")),
        }
    }
}

impl CellSourceKind {
    fn resolve(self) -> Result<CellSource, ConfigError> {
        match self {
            Self::Backend => Ok(CellSource::Backend),
            Self::Sheet => {
                let key = "BOARD_COUPON_SHEET_URL";
                let raw = get_required_env(key)?;
                Ok(CellSource::Sheet(parse_endpoint(key, &raw)?))
            }
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Reject values that still look like a template placeholder.
fn validate_not_placeholder(var_name: &str, value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            "must not be empty".to_string(),
        ));
    }

    let lower = trimmed.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::Placeholder(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(trimmed.to_string())
}

/// Parse an absolute http(s) endpoint.
fn parse_endpoint(var_name: &str, value: &str) -> Result<Url, ConfigError> {
    let value = validate_not_placeholder(var_name, value)?;
    let url = Url::parse(&value)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }

    Ok(url)
}
