//! Admin API endpoints.
//!
//! All endpoints require the `admin` permission.

use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::{get, put},
};
use serde::Serialize;

use super::error::{ApiError, ResultExt, TokenResultExt};
use super::sessions::{ListSessionsResponse, SessionInfo};
use crate::auth::{Auth, AuthState, require_permissions};

/// Permission required for every admin endpoint.
pub const ADMIN_PERMISSION: &str = "admin";

pub fn router(state: AuthState) -> Router {
    let gate = state.requiring(&[ADMIN_PERMISSION]);

    Router::new()
        .route(
            "/subjects/{subject}/sessions",
            get(list_subject_sessions).delete(revoke_subject_sessions),
        )
        .route(
            "/subjects/{subject}/permissions",
            get(list_subject_permissions),
        )
        .route(
            "/subjects/{subject}/permissions/{permission}",
            put(grant_permission).delete(revoke_permission),
        )
        .route_layer(middleware::from_fn_with_state(gate, require_permissions))
        .with_state(state)
}

fn validate_subject(subject: &str) -> Result<(), ApiError> {
    if subject.trim().is_empty() {
        return Err(ApiError::bad_request("Subject cannot be empty"));
    }
    Ok(())
}

async fn list_subject_sessions(
    State(state): State<AuthState>,
    Path(subject): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_subject(&subject)?;

    let sessions = state
        .controller
        .list_sessions(&subject)
        .await
        .token_err("Failed to list sessions")?
        .into_iter()
        .map(|s| SessionInfo::from_session(s, None))
        .collect();

    Ok(Json(ListSessionsResponse { sessions }))
}

#[derive(Serialize)]
struct RevokeAllResponse {
    revoked: u64,
}

async fn revoke_subject_sessions(
    State(state): State<AuthState>,
    Path(subject): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_subject(&subject)?;

    let revoked = state
        .controller
        .revoke_all(&subject)
        .await
        .token_err("Failed to revoke sessions")?;

    Ok(Json(RevokeAllResponse { revoked }))
}

#[derive(Serialize)]
struct PermissionsResponse {
    permissions: Vec<String>,
}

async fn list_subject_permissions(
    State(state): State<AuthState>,
    Path(subject): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_subject(&subject)?;

    let permissions = state
        .controller
        .db()
        .permissions()
        .list_for_subject(&subject)
        .await
        .db_err("Failed to list permissions")?;

    Ok(Json(PermissionsResponse { permissions }))
}

#[derive(Serialize)]
struct PermissionChangeResponse {
    changed: bool,
}

async fn grant_permission(
    State(state): State<AuthState>,
    Auth(identity): Auth,
    Path((subject, permission)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    validate_subject(&subject)?;
    if permission.trim().is_empty() {
        return Err(ApiError::bad_request("Permission cannot be empty"));
    }

    state
        .controller
        .db()
        .permissions()
        .grant(&subject, &permission)
        .await
        .db_err("Failed to grant permission")?;

    tracing::info!(
        admin = %identity.subject_id,
        subject = %subject,
        permission = %permission,
        "Permission granted"
    );

    Ok(Json(PermissionChangeResponse { changed: true }))
}

async fn revoke_permission(
    State(state): State<AuthState>,
    Auth(identity): Auth,
    Path((subject, permission)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    validate_subject(&subject)?;

    let changed = state
        .controller
        .db()
        .permissions()
        .revoke(&subject, &permission)
        .await
        .db_err("Failed to revoke permission")?;

    if changed {
        tracing::info!(
            admin = %identity.subject_id,
            subject = %subject,
            permission = %permission,
            "Permission revoked"
        );
    }

    Ok(Json(PermissionChangeResponse { changed }))
}
