//! Authentication API endpoints.
//!
//! - GET `/providers` - Registered identity providers
//! - POST `/exchange` - Redeem a one-shot exchange credential for cookies
//! - POST `/logout` - Revoke the presented refresh credential and clear cookies
//! - POST `/logout-all` - Revoke every session of the caller
//! - GET `/verify` - 200 if the caller is authenticated
//! - GET `/status` - Authentication status, never fails

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware,
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::{ApiError, TokenResultExt};
use crate::auth::{
    ACCESS_COOKIE_NAME, Auth, AuthState, CredentialSource, MaybeAuth, REFRESH_COOKIE_NAME,
    bearer_token, clear_cookie, extract_credentials, optional_auth, require_auth,
    write_credentials,
};
use crate::providers::ProviderSummary;
use crate::rate_limit::{RateLimitConfig, rate_limit_exchange};

pub fn router(state: AuthState, rate_limit: RateLimitConfig) -> Router {
    let protected = Router::new()
        .route("/logout-all", post(logout_all))
        .route("/verify", get(verify))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let optional = Router::new()
        .route("/status", get(status))
        .route_layer(middleware::from_fn_with_state(state.clone(), optional_auth));

    Router::new()
        .route("/providers", get(list_providers))
        .route(
            "/exchange",
            post(exchange).route_layer(middleware::from_fn_with_state(
                rate_limit,
                rate_limit_exchange,
            )),
        )
        .route("/logout", post(logout))
        .merge(protected)
        .merge(optional)
        .with_state(state)
}

#[derive(Serialize)]
struct ProvidersResponse {
    providers: Vec<ProviderSummary>,
}

async fn list_providers(State(state): State<AuthState>) -> impl IntoResponse {
    Json(ProvidersResponse {
        providers: state.controller.providers().summaries(),
    })
}

#[derive(Deserialize)]
struct ExchangeRequest {
    access_token: Option<String>,
}

/// Redeem a one-shot exchange credential, sent as a bearer token or in the
/// JSON body `access_token` field, for the full credential pair in cookies.
async fn exchange(
    State(state): State<AuthState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<ExchangeRequest>(&body)
            .map_err(|_| ApiError::bad_request("Invalid request body"))?
            .access_token
    };

    let credential = bearer_token(&headers)
        .map(str::to_string)
        .or(from_body)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthorized("No exchange token"))?;

    let pair = state
        .controller
        .exchange(&credential)
        .await
        .token_err("Token exchange failed")?;

    let mut response = (StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response();
    write_credentials(
        response.headers_mut(),
        &pair,
        CredentialSource::Cookie,
        state.controller.settings(),
        state.secure_cookies,
    );
    Ok(response)
}

fn clear_credential_cookies(secure: bool) -> AppendHeaders<[(axum::http::HeaderName, String); 2]> {
    AppendHeaders([
        (SET_COOKIE, clear_cookie(ACCESS_COOKIE_NAME, secure)),
        (SET_COOKIE, clear_cookie(REFRESH_COOKIE_NAME, secure)),
    ])
}

/// Logout - revoke the presented refresh credential and clear both cookies.
async fn logout(State(state): State<AuthState>, headers: HeaderMap) -> impl IntoResponse {
    let (pair, _source) = extract_credentials(&headers);

    if !pair.refresh.is_empty() {
        if let Err(e) = state.controller.revoke(&pair.refresh).await {
            if !e.is_validation() {
                warn!(error = %e, "Failed to revoke session on logout");
            }
        }
    }

    (
        StatusCode::OK,
        clear_credential_cookies(state.secure_cookies),
        Json(serde_json::json!({ "success": true })),
    )
}

#[derive(Serialize)]
struct LogoutAllResponse {
    revoked: u64,
}

async fn logout_all(
    State(state): State<AuthState>,
    Auth(identity): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = state
        .controller
        .revoke_all(&identity.subject_id)
        .await
        .token_err("Failed to revoke sessions")?;

    Ok((
        StatusCode::OK,
        clear_credential_cookies(state.secure_cookies),
        Json(LogoutAllResponse { revoked }),
    ))
}

#[derive(Serialize)]
struct VerifyResponse {
    subject_id: String,
    session_id: String,
}

/// Lightweight check of the current credentials.
async fn verify(Auth(identity): Auth) -> impl IntoResponse {
    Json(VerifyResponse {
        subject_id: identity.subject_id,
        session_id: identity.session_id,
    })
}

#[derive(Serialize)]
struct StatusResponse {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject_id: Option<String>,
}

async fn status(MaybeAuth(identity): MaybeAuth) -> impl IntoResponse {
    Json(StatusResponse {
        authenticated: identity.is_some(),
        subject_id: identity.map(|i| i.subject_id),
    })
}
