//! Authentication error types.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, clear_cookie};
use crate::tokens::TokenError;

/// Internal auth error kind used by the middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Credentials missing, malformed, mismatched or expired
    Unauthorized,
    /// Authenticated, but missing a required permission
    Forbidden,
    /// Store or signer failure
    Internal,
}

impl From<&TokenError> for AuthErrorKind {
    fn from(e: &TokenError) -> Self {
        match e {
            TokenError::Validation(_) => AuthErrorKind::Unauthorized,
            TokenError::Store(_) | TokenError::Signing(_) => AuthErrorKind::Internal,
        }
    }
}

/// API authentication errors (returns JSON, clears cookies on 401).
#[derive(Debug)]
pub struct ApiAuthError {
    pub(super) kind: AuthErrorKind,
    pub(super) secure_cookies: bool,
}

impl ApiAuthError {
    pub fn new(kind: AuthErrorKind, secure_cookies: bool) -> Self {
        Self {
            kind,
            secure_cookies,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthErrorKind::Forbidden => StatusCode::FORBIDDEN,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::Unauthorized => "Invalid or expired credentials",
            AuthErrorKind::Forbidden => "Insufficient permissions",
            AuthErrorKind::Internal => "Internal error",
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        use axum::Json;
        use serde::Serialize;

        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        // Dead credentials are cleared; a store outage or a 403 keeps them
        if self.kind == AuthErrorKind::Unauthorized {
            let headers = response.headers_mut();
            for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME] {
                if let Ok(value) = HeaderValue::from_str(&clear_cookie(name, self.secure_cookies))
                {
                    headers.append(header::SET_COOKIE, value);
                }
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::ValidationFailure;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                TokenError::Validation(ValidationFailure::Mismatch),
                StatusCode::UNAUTHORIZED,
            ),
            (TokenError::Store(sqlx::Error::PoolClosed), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let response = ApiAuthError::new(AuthErrorKind::from(&err), false).into_response();
            assert_eq!(response.status(), status);
        }

        let forbidden = ApiAuthError::new(AuthErrorKind::Forbidden, false).into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert!(forbidden.headers().get(header::SET_COOKIE).is_none());
    }

    #[test]
    fn test_unauthorized_clears_cookies() {
        let response = ApiAuthError::new(AuthErrorKind::Unauthorized, true).into_response();
        let cookies: Vec<_> = response.headers().get_all(header::SET_COOKIE).iter().collect();

        assert_eq!(cookies.len(), 2);
        for cookie in cookies {
            let cookie = cookie.to_str().unwrap();
            assert!(cookie.contains("Max-Age=0"));
            assert!(cookie.ends_with("; Secure"));
        }
    }
}
