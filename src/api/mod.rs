mod admin;
mod auth;
mod error;
mod sessions;

use axum::Router;

use crate::auth::AuthState;
use crate::rate_limit::RateLimitConfig;

pub use admin::ADMIN_PERMISSION;
pub use error::ApiError;

/// Create the API router.
pub fn create_api_router(state: AuthState, rate_limit: RateLimitConfig) -> Router {
    Router::new()
        .nest("/auth", auth::router(state.clone(), rate_limit))
        .nest("/sessions", sessions::router(state.clone()))
        .nest("/admin", admin::router(state))
}
