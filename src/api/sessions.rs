//! Session management API endpoints.
//!
//! - GET `/` - List live sessions of the current subject
//! - DELETE `/{id}` - Revoke one of the current subject's sessions

use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::{delete, get},
};
use serde::Serialize;

use super::error::{ApiError, TokenResultExt, validate_session_id};
use crate::auth::{Auth, AuthState, require_auth};
use crate::db::Session;

pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/", get(list_sessions))
        .route("/{id}", delete(revoke_session))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

#[derive(Serialize)]
pub(super) struct SessionInfo {
    id: String,
    ip: String,
    /// Unix milliseconds
    expires_at: i64,
    is_current: bool,
}

impl SessionInfo {
    pub(super) fn from_session(session: Session, current: Option<&str>) -> Self {
        Self {
            is_current: current == Some(session.id.as_str()),
            id: session.id,
            ip: session.ip,
            expires_at: session.expire,
        }
    }
}

#[derive(Serialize)]
pub(super) struct ListSessionsResponse {
    pub(super) sessions: Vec<SessionInfo>,
}

async fn list_sessions(
    State(state): State<AuthState>,
    Auth(identity): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state
        .controller
        .list_sessions(&identity.subject_id)
        .await
        .token_err("Failed to list sessions")?;

    let sessions = sessions
        .into_iter()
        .map(|s| SessionInfo::from_session(s, Some(&identity.session_id)))
        .collect();

    Ok(Json(ListSessionsResponse { sessions }))
}

#[derive(Serialize)]
struct RevokeResponse {
    revoked: bool,
}

/// Revoke a session by id. Sessions of other subjects are reported as not found.
async fn revoke_session(
    State(state): State<AuthState>,
    Auth(identity): Auth,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_session_id(&id)?;

    let revoked = state
        .controller
        .revoke_session(&identity.subject_id, &id)
        .await
        .token_err("Failed to revoke session")?;

    if !revoked {
        return Err(ApiError::not_found("Session not found"));
    }

    Ok(Json(RevokeResponse { revoked }))
}
