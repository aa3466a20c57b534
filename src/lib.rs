pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod providers;
pub mod rate_limit;
pub mod tokens;

use api::create_api_router;
use auth::AuthState;
use axum::{Router, http::HeaderName};
use db::Database;
use jwt::JwtConfig;
use providers::ProviderRegistry;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokens::{TokenController, TokenSettings};
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// JWT secret for signing access credentials
    pub jwt_secret: Vec<u8>,
    /// Access, refresh and grace lifetimes
    pub settings: TokenSettings,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Header carrying the client IP (requires running behind a proxy)
    pub ip_header: Option<HeaderName>,
    /// Registered identity providers
    pub providers: ProviderRegistry,
    /// Interval between sweeps of expired sessions
    pub sweep_interval: Duration,
    /// Exchange requests allowed per minute per client IP
    pub exchange_per_minute: u32,
}

impl ServerConfig {
    /// Build the token controller for this configuration.
    pub fn controller(&self) -> TokenController {
        let jwt = Arc::new(JwtConfig::new(&self.jwt_secret));
        TokenController::new(jwt, self.db.clone(), self.settings)
            .with_providers(self.providers.clone())
    }

    /// Build the per-IP limiter for the exchange endpoint.
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.exchange_per_minute, self.ip_header.clone())
    }
}

/// Create the application router around an existing controller.
pub fn create_router(
    config: &ServerConfig,
    controller: TokenController,
    rate_limit: RateLimitConfig,
) -> Router {
    let auth = AuthState::new(controller, config.secure_cookies, config.ip_header.clone());
    Router::new().nest("/api", create_api_router(auth, rate_limit))
}

/// Spawn the background sweeper. The first sweep runs immediately.
pub fn init_sweeper(
    controller: &TokenController,
    rate_limit: &RateLimitConfig,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    cleanup::spawn_sweep_scheduler(controller.clone(), Some(rate_limit.clone()), every)
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let controller = config.controller();
    let rate_limit = config.rate_limit();
    let sweeper = init_sweeper(&controller, &rate_limit, config.sweep_interval);

    let app = create_router(&config, controller, rate_limit);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let result = axum::serve(listener, make_service).await;

    sweeper.abort();
    result
}
