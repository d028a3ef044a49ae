//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

/// Runtime configuration for listing-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8000"`).
    pub bind_address: String,

    /// sqlx database URL (default: `"sqlite://listings.db?mode=rwc"`).
    /// The bundled migrations target SQLite.
    pub database_url: String,

    /// Upper bound on pooled database connections.
    pub db_max_connections: u32,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated list of allowed CORS origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve Swagger UI and the OpenAPI document.
    pub enable_swagger: bool,

    /// Prefix for public image URLs; `/<listing id>/<file name>` is appended.
    pub image_base_url: String,

    /// How long a finished bulk task stays pollable.
    pub task_ttl: Duration,

    /// How often expired bulk tasks are swept.
    pub task_sweep_interval: Duration,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("LISTING_BIND", "0.0.0.0:8000"),
            database_url: env_or("LISTING_DATABASE_URL", "sqlite://listings.db?mode=rwc"),
            db_max_connections: parse_env("LISTING_DB_MAX_CONNECTIONS", 10),
            log_level: env_or("LISTING_LOG", "info"),
            log_json: env_flag("LISTING_LOG_JSON", false),
            cors_allowed_origins: std::env::var("LISTING_CORS_ORIGINS").ok(),
            enable_swagger: env_flag("LISTING_ENABLE_SWAGGER", true),
            image_base_url: env_or("LISTING_IMAGE_BASE_URL", "https://cdn.example.com/listings")
                .trim_end_matches('/')
                .to_owned(),
            task_ttl: Duration::from_secs(parse_env::<u64>("LISTING_TASK_TTL_SECS", 3600)),
            task_sweep_interval: Duration::from_secs(parse_env::<u64>("LISTING_TASK_SWEEP_SECS", 60).max(1)),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
impl Config {
    /// Defaults suitable for router tests against an in-memory database.
    pub fn for_tests() -> Self {
        Self {
            bind_address: "127.0.0.1:0".into(),
            database_url: "sqlite::memory:".into(),
            db_max_connections: 1,
            log_level: "debug".into(),
            log_json: false,
            cors_allowed_origins: None,
            enable_swagger: false,
            image_base_url: "https://cdn.example.com/listings".into(),
            task_ttl: Duration::from_secs(3600),
            task_sweep_interval: Duration::from_secs(60),
        }
    }
}
