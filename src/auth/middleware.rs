//! Request gatekeeping middleware.
//!
//! Three variants share one sequence: extract the credential pair,
//! authenticate it, attach the identity, and on rotation mint a replacement
//! session whose credentials are written onto the response.
//!
//! - [`require_auth`]: failures abort with a JSON error.
//! - [`optional_auth`]: failures are swallowed and the request continues anonymous.
//! - [`require_permissions`]: as required, plus an all-of permission check.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};

use super::credentials::{CredentialSource, extract_credentials, write_credentials};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::ip::extract_client_ip;
use super::recover::RecoverGuard;
use super::state::{AuthState, PermissionGate};
use super::types::{Identity, PermissionSet};
use crate::tokens::{TokenError, TokenPair, parse_refresh};

/// Credentials minted during this request because the presented pair rotated.
struct Reissue {
    pair: TokenPair,
    source: CredentialSource,
    guard: RecoverGuard,
}

/// What the middleware reads off the request before any await.
struct Presented {
    pair: TokenPair,
    source: CredentialSource,
    ip: String,
}

impl Presented {
    fn from_request(state: &AuthState, request: &Request) -> Self {
        let (pair, source) = extract_credentials(request.headers());
        let ip = extract_client_ip(request, state.ip_header.as_ref()).unwrap_or_default();
        Self { pair, source, ip }
    }

    fn is_empty(&self) -> bool {
        self.pair.access.is_empty() && self.pair.refresh.is_empty()
    }
}

async fn authenticate(
    state: &AuthState,
    presented: Presented,
) -> Result<(Identity, Option<Reissue>), TokenError> {
    let auth = state.controller.authenticate(&presented.pair).await?;

    let Some(rotation) = auth.rotation else {
        let identity = Identity {
            subject_id: auth.subject_id,
            session_id: auth.session_id,
        };
        return Ok((identity, None));
    };

    let issued = match state
        .controller
        .create(&presented.ip, &auth.subject_id)
        .await
    {
        Ok(issued) => issued,
        Err(e) => {
            // Nothing new can reach the client, so keep the old session usable
            state.controller.recover(&rotation, None).await;
            return Err(e);
        }
    };

    let session_id = parse_refresh(&issued.refresh)
        .map(|(id, _)| id.to_string())
        .unwrap_or(auth.session_id);

    let guard = RecoverGuard::arm(state.controller.clone(), rotation, issued.refresh.clone());
    let identity = Identity {
        subject_id: auth.subject_id,
        session_id,
    };
    let reissue = Reissue {
        pair: issued,
        source: presented.source,
        guard,
    };
    Ok((identity, Some(reissue)))
}

fn reject(state: &AuthState, e: &TokenError) -> Response {
    match e {
        TokenError::Validation(reason) => {
            debug!(reason = reason.as_str(), "Authentication rejected")
        }
        _ => error!(error = %e, "Authentication failed"),
    }
    ApiAuthError::new(AuthErrorKind::from(e), state.secure_cookies).into_response()
}

/// Write reissued credentials onto the outgoing response.
fn attach(state: &AuthState, mut response: Response, reissue: Option<Reissue>) -> Response {
    if let Some(Reissue {
        pair,
        source,
        guard,
    }) = reissue
    {
        guard.disarm();
        write_credentials(
            response.headers_mut(),
            &pair,
            source,
            state.controller.settings(),
            state.secure_cookies,
        );
    }
    response
}

/// Middleware for routes that require authentication.
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let presented = Presented::from_request(&state, &request);

    let (identity, reissue) = match authenticate(&state, presented).await {
        Ok(result) => result,
        Err(e) => return reject(&state, &e),
    };

    request.extensions_mut().insert(identity);
    let response = next.run(request).await;
    attach(&state, response, reissue)
}

/// Middleware for routes that work with or without authentication.
pub async fn optional_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let presented = Presented::from_request(&state, &request);
    if presented.is_empty() {
        return next.run(request).await;
    }

    match authenticate(&state, presented).await {
        Ok((identity, reissue)) => {
            request.extensions_mut().insert(identity);
            let response = next.run(request).await;
            attach(&state, response, reissue)
        }
        Err(e) => {
            if !e.is_validation() {
                warn!(error = %e, "Optional authentication failed, continuing anonymous");
            }
            next.run(request).await
        }
    }
}

/// Middleware for routes that require authentication and a set of permissions.
pub async fn require_permissions(
    State(gate): State<PermissionGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let state = &gate.auth;
    let presented = Presented::from_request(state, &request);

    let (identity, reissue) = match authenticate(state, presented).await {
        Ok(result) => result,
        Err(e) => return reject(state, &e),
    };

    let granted = state
        .controller
        .db()
        .permissions()
        .list_for_subject(&identity.subject_id)
        .await;

    let response = match granted {
        Ok(granted) => {
            let permissions: PermissionSet = granted.into_iter().collect();
            let missing = permissions.missing(gate.required);

            if missing.is_empty() {
                request.extensions_mut().insert(identity);
                next.run(request).await
            } else {
                debug!(subject_id = %identity.subject_id, missing = ?missing, "Permission denied");
                ApiAuthError::new(AuthErrorKind::Forbidden, state.secure_cookies).into_response()
            }
        }
        Err(e) => {
            error!(subject_id = %identity.subject_id, error = %e, "Failed to load permissions");
            ApiAuthError::new(AuthErrorKind::Internal, state.secure_cookies).into_response()
        }
    };

    attach(state, response, reissue)
}
