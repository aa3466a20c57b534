//! Rate limiting for the credential exchange endpoint.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down guessing
//! of one-shot exchange credentials.

use axum::{
    extract::{Request, State},
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::debug;

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Default exchange allowance: 10 requests per minute per IP.
pub const DEFAULT_EXCHANGE_PER_MINUTE: u32 = 10;

/// Rate limiting configuration for the exchange endpoint.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub exchange: Arc<IpLimiter>,
    /// Header holding the client IP when running behind a proxy
    pub ip_header: Option<HeaderName>,
}

impl RateLimitConfig {
    /// `per_minute` requests per IP, all of which may arrive in one burst.
    /// Zero is treated as one.
    pub fn new(per_minute: u32, ip_header: Option<HeaderName>) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            exchange: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
            ip_header,
        }
    }

    /// Drop limiter state for IPs whose buckets have fully refilled.
    /// Returns how many IPs are still tracked.
    pub fn forget_idle(&self) -> usize {
        self.exchange.retain_recent();
        self.exchange.shrink_to_fit();
        self.exchange.len()
    }
}

/// Middleware for rate limiting the exchange endpoint.
pub async fn rate_limit_exchange(
    State(config): State<RateLimitConfig>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ip) = extract_client_ip(&request, config.ip_header.as_ref()) else {
        return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
    };

    match config.exchange.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            debug!(ip = %ip, "Exchange rate limit hit");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests. Please try again later.",
            )
                .into_response()
        }
    }
}
