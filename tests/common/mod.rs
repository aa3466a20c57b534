#![allow(dead_code)]

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{HeaderName, Request, Response, header},
};
use sessiongate::{
    ServerConfig, create_router,
    db::Database,
    providers::ProviderRegistry,
    tokens::{TokenController, TokenPair, TokenSettings, parse_refresh},
};

pub const TEST_SECRET: &[u8] = b"test-jwt-secret-at-least-32-bytes-long";
pub const CLIENT_IP: &str = "203.0.113.7";

pub struct TestApp {
    pub app: Router,
    pub controller: TokenController,
    pub db: Database,
}

pub async fn test_config(settings: TokenSettings) -> ServerConfig {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    ServerConfig {
        db,
        jwt_secret: TEST_SECRET.to_vec(),
        settings,
        secure_cookies: false,
        ip_header: Some(HeaderName::from_static("x-forwarded-for")),
        providers: ProviderRegistry::default(),
        sweep_interval: Duration::from_secs(60),
        exchange_per_minute: 1000,
    }
}

pub async fn app_from_config(config: ServerConfig) -> TestApp {
    let controller = config.controller();
    let app = create_router(&config, controller.clone(), config.rate_limit());
    TestApp {
        app,
        controller,
        db: config.db.clone(),
    }
}

pub async fn test_app() -> TestApp {
    app_from_config(test_config(TokenSettings::default()).await).await
}

pub async fn test_controller(settings: TokenSettings) -> TokenController {
    test_config(settings).await.controller()
}

/// Request carrying the pair as cookies.
pub fn cookie_request(method: &str, uri: &str, pair: &TokenPair) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP)
        .header(
            header::COOKIE,
            format!("access_token={}; refresh_token={}", pair.access, pair.refresh),
        )
        .body(Body::empty())
        .unwrap()
}

/// Request carrying the pair as bearer token plus refresh header.
pub fn header_request(method: &str, uri: &str, pair: &TokenPair) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP)
        .header(header::AUTHORIZATION, format!("Bearer {}", pair.access))
        .header("x-refresh-token", &pair.refresh)
        .body(Body::empty())
        .unwrap()
}

pub fn anonymous_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", CLIENT_IP)
        .body(Body::empty())
        .unwrap()
}

pub fn set_cookies<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of the first Set-Cookie for `name`.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .find(|c| c.starts_with(&prefix))
        .map(|c| c[prefix.len()..].split(';').next().unwrap_or("").to_string())
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn session_id(pair: &TokenPair) -> String {
    parse_refresh(&pair.refresh).unwrap().0.to_string()
}
