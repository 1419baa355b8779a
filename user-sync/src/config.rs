//! Configuration module for environment variable parsing.
//!
//! All configuration is read once at startup. The database endpoint and
//! credential are required; the webhook signing secret is optional here and
//! its absence is reported per request by the webhook handler.

use std::env;

use thiserror::Error;
use tracing::warn;
use url::Url;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{name} must use http or https, got scheme {scheme:?}")]
    UnsupportedScheme { name: &'static str, scheme: String },
}

/// Policy applied to `user.created` deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateMode {
    /// Plain insert; a redelivered create fails with a duplicate key.
    Insert,
    /// Insert-or-replace keyed by the user id; redeliveries are idempotent.
    #[default]
    Upsert,
}

impl CreateMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "insert" => Some(CreateMode::Insert),
            "upsert" => Some(CreateMode::Upsert),
            _ => None,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the hosted database (Supabase project URL)
    pub supabase_url: Url,

    /// Service role key used as both `apikey` and bearer token
    pub supabase_service_role_key: String,

    /// Svix signing secret for Clerk webhooks (`whsec_...`)
    pub webhook_signing_secret: Option<String>,

    /// Table holding the mirrored user records
    pub users_table: String,

    /// How `user.created` is written
    pub create_mode: CreateMode,

    /// Maximum skew in seconds between the signed timestamp and now
    pub webhook_tolerance_secs: u64,

    /// HTTP timeout in milliseconds for database requests
    pub database_timeout_ms: u64,

    /// Port for the web server to listen on
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let supabase_url = parse_http_url("SUPABASE_URL", &required("SUPABASE_URL")?)?;

        Ok(Config {
            supabase_url,

            supabase_service_role_key: required("SUPABASE_SERVICE_ROLE_KEY")?,

            webhook_signing_secret: env::var("CLERK_WEBHOOK_SIGNING_SECRET")
                .ok()
                .filter(|s| !s.trim().is_empty()),

            users_table: env::var("USERS_TABLE")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "users".to_string()),

            create_mode: parse_create_mode("USER_CREATE_MODE"),

            webhook_tolerance_secs: env::var("WEBHOOK_TOLERANCE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300), // 5 minutes, same window Svix uses

            database_timeout_ms: env::var("DATABASE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10_000),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),
        })
    }
}

/// Read a variable that must be present and non-empty.
fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

/// Parse an absolute http(s) URL.
///
/// `Url::parse` reads `host:port` without a scheme as scheme `host`, so the
/// scheme is checked explicitly.
fn parse_http_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { name, source })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ConfigError::UnsupportedScheme {
            name,
            scheme: other.to_string(),
        }),
    }
}

/// Parse the create policy, falling back to upsert on unknown values.
fn parse_create_mode(name: &str) -> CreateMode {
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return CreateMode::default(),
    };

    CreateMode::parse(&raw).unwrap_or_else(|| {
        warn!(env_var = name, value = %raw, "Invalid create mode, using default");
        CreateMode::default()
    })
}
