//! Axum extractors for handlers behind the authentication middleware.
//!
//! The middleware does the work; these read what it attached to the request.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::types::Identity;

/// Authenticated caller. Rejects with 401 when no middleware attached one.
pub struct Auth(pub Identity);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(Auth)
            .ok_or_else(|| ApiAuthError::new(AuthErrorKind::Unauthorized, false))
    }
}

/// Caller identity if present, for routes behind `optional_auth`.
pub struct MaybeAuth(pub Option<Identity>);

impl<S> FromRequestParts<S> for MaybeAuth
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuth(parts.extensions.get::<Identity>().cloned()))
    }
}
