//! Session authentication for axum routes.
//!
//! Clients carry a short-lived signed access credential and a long-lived
//! opaque refresh credential, either as cookies or as headers. The
//! middleware validates the pair, rotates the session when the access
//! credential has expired, and writes the replacement pair back on the
//! channel it arrived on.

mod cookie;
mod credentials;
mod errors;
mod extractors;
mod ip;
mod middleware;
mod recover;
mod state;
mod types;

pub use cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, build_cookie, clear_cookie, get_cookie};
pub use credentials::{
    ACCESS_HEADER, CredentialSource, REFRESH_HEADER, bearer_token, extract_credentials,
    write_credentials,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{Auth, MaybeAuth};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use middleware::{optional_auth, require_auth, require_permissions};
pub use state::{AuthState, PermissionGate};
pub use types::{Identity, PermissionSet};
