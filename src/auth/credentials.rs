//! Reading and writing the credential pair on HTTP messages.
//!
//! Browsers carry the pair in cookies. Other clients send the access
//! credential as a bearer token and the refresh credential in
//! `X-Refresh-Token`, and get rotated credentials back in headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use tracing::warn;

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, build_cookie, get_cookie};
use crate::tokens::{TokenPair, TokenSettings};

/// Request header carrying the refresh credential for non-cookie clients.
pub const REFRESH_HEADER: HeaderName = HeaderName::from_static("x-refresh-token");

/// Response header carrying a rotated access credential.
pub const ACCESS_HEADER: HeaderName = HeaderName::from_static("x-access-token");

/// Channel the credentials arrived on; rotated credentials go back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Cookie,
    Header,
}

/// Extract the bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Read the credential pair.
///
/// Each part is taken from its cookie when present, otherwise from its
/// header. The source is `Cookie` as soon as either cookie was sent. Parts
/// missing on both channels come back as empty strings, which never validate.
pub fn extract_credentials(headers: &HeaderMap) -> (TokenPair, CredentialSource) {
    let access_cookie = get_cookie(headers, ACCESS_COOKIE_NAME);
    let refresh_cookie = get_cookie(headers, REFRESH_COOKIE_NAME);

    let source = if access_cookie.is_some() || refresh_cookie.is_some() {
        CredentialSource::Cookie
    } else {
        CredentialSource::Header
    };

    let refresh_header = headers
        .get(REFRESH_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let pair = TokenPair {
        access: access_cookie
            .or_else(|| bearer_token(headers))
            .unwrap_or_default()
            .to_string(),
        refresh: refresh_cookie.or(refresh_header).unwrap_or_default().to_string(),
    };
    (pair, source)
}

/// Write a newly issued pair onto a response.
///
/// Cookies are placed ahead of any `Set-Cookie` the handler produced, so a
/// handler that clears credentials still has the last word.
pub fn write_credentials(
    headers: &mut HeaderMap,
    pair: &TokenPair,
    source: CredentialSource,
    settings: &TokenSettings,
    secure: bool,
) {
    match source {
        CredentialSource::Cookie => {
            let cookies = [
                build_cookie(
                    ACCESS_COOKIE_NAME,
                    &pair.access,
                    settings.access_ttl.as_secs(),
                    secure,
                ),
                build_cookie(
                    REFRESH_COOKIE_NAME,
                    &pair.refresh,
                    settings.refresh_ttl.as_secs(),
                    secure,
                ),
            ];
            prepend_set_cookies(headers, &cookies);
        }
        CredentialSource::Header => {
            insert_header(headers, ACCESS_HEADER, &pair.access);
            insert_header(headers, REFRESH_HEADER, &pair.refresh);
        }
    }
}

fn prepend_set_cookies(headers: &mut HeaderMap, cookies: &[String]) {
    let existing: Vec<HeaderValue> = headers.get_all(header::SET_COOKIE).iter().cloned().collect();
    headers.remove(header::SET_COOKIE);

    for cookie in cookies {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Credential cookie is not a valid header value"),
        }
    }
    for value in existing {
        headers.append(header::SET_COOKIE, value);
    }
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(e) => warn!(header = %name, error = %e, "Credential is not a valid header value"),
    }
}
