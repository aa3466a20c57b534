//! State shared by the authentication middleware.

use axum::http::HeaderName;

use crate::tokens::TokenController;

/// Everything the middleware needs to authenticate a request.
#[derive(Clone)]
pub struct AuthState {
    pub controller: TokenController,
    /// Set the Secure flag on credential cookies
    pub secure_cookies: bool,
    /// Header holding the client IP when running behind a proxy
    pub ip_header: Option<HeaderName>,
}

impl AuthState {
    pub fn new(
        controller: TokenController,
        secure_cookies: bool,
        ip_header: Option<HeaderName>,
    ) -> Self {
        Self {
            controller,
            secure_cookies,
            ip_header,
        }
    }

    /// Gate state requiring every permission in `required`.
    pub fn requiring(&self, required: &'static [&'static str]) -> PermissionGate {
        PermissionGate {
            auth: self.clone(),
            required,
        }
    }
}

/// State for the permissioned middleware: auth plus a static all-of requirement.
#[derive(Clone)]
pub struct PermissionGate {
    pub auth: AuthState,
    pub required: &'static [&'static str],
}
