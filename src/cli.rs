//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use axum::http::HeaderName;
use clap::Parser;
use tracing::{error, info};

use crate::ServerConfig;
use crate::db::Database;
use crate::providers::ProviderRegistry;
use crate::rate_limit::DEFAULT_EXCHANGE_PER_MINUTE;
use crate::tokens::TokenSettings;

const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Upper bound for every configurable lifetime: ten years
const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sessiongate",
    about = "Session authentication service with rotating refresh credentials"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SESSIONGATE_PORT", default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file, or ":memory:"
    #[arg(short, long, env = "SESSIONGATE_DATABASE", default_value = "sessiongate.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Lifetime of access credentials, in seconds
    #[arg(
        long,
        env = "SESSIONGATE_ACCESS_TTL",
        default_value = "900",
        value_parser = clap::value_parser!(u64).range(1..=MAX_LIFETIME_SECS)
    )]
    pub access_ttl_secs: u64,

    /// Lifetime of refresh sessions, in seconds
    #[arg(
        long,
        env = "SESSIONGATE_REFRESH_TTL",
        default_value = "2592000",
        value_parser = clap::value_parser!(u64).range(1..=MAX_LIFETIME_SECS)
    )]
    pub refresh_ttl_secs: u64,

    /// How long a rotated refresh credential stays usable, in seconds
    #[arg(
        long,
        env = "SESSIONGATE_GRACE_TIMEOUT",
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..=MAX_LIFETIME_SECS)
    )]
    pub grace_timeout_secs: u64,

    /// Interval between sweeps of expired sessions, in seconds
    #[arg(long, env = "SESSIONGATE_SWEEP_INTERVAL", default_value = "60")]
    pub sweep_interval_secs: u64,

    /// Set the Secure flag on credential cookies (enable behind HTTPS)
    #[arg(long, env = "SESSIONGATE_SECURE_COOKIES")]
    pub secure_cookies: bool,

    /// Header carrying the client IP when behind a reverse proxy (e.g. x-forwarded-for)
    #[arg(long, env = "SESSIONGATE_IP_HEADER", value_parser = parse_ip_header)]
    pub ip_header: Option<HeaderName>,

    /// JSON file listing identity providers
    #[arg(long, env = "SESSIONGATE_PROVIDERS_FILE")]
    pub providers_file: Option<String>,

    /// Token exchange requests allowed per minute per client IP
    #[arg(long, env = "SESSIONGATE_EXCHANGE_RATE", default_value_t = DEFAULT_EXCHANGE_PER_MINUTE)]
    pub exchange_per_minute: u32,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn parse_ip_header(s: &str) -> Result<HeaderName, String> {
    HeaderName::from_bytes(s.trim().to_ascii_lowercase().as_bytes())
        .map_err(|_| format!("Invalid header name: {}", s))
}

impl Args {
    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            access_ttl: Duration::from_secs(self.access_ttl_secs),
            refresh_ttl: Duration::from_secs(self.refresh_ttl_secs),
            grace_timeout: Duration::from_secs(self.grace_timeout_secs),
        }
    }
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    validate_jwt_secret(secret)
}

fn validate_jwt_secret(secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }
    Some(secret)
}

/// Load the provider registry. No file means no providers.
pub fn load_providers(path: Option<&str>) -> Option<ProviderRegistry> {
    let Some(path) = path else {
        return Some(ProviderRegistry::default());
    };

    match ProviderRegistry::from_file(path) {
        Ok(registry) => {
            info!(path = %path, count = registry.len(), "Identity providers loaded");
            Some(registry)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to load identity providers");
            None
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    jwt_secret: String,
    providers: ProviderRegistry,
) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        settings: args.token_settings(),
        secure_cookies: args.secure_cookies,
        ip_header: args.ip_header.clone(),
        providers,
        sweep_interval: Duration::from_secs(args.sweep_interval_secs),
        exchange_per_minute: args.exchange_per_minute,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
