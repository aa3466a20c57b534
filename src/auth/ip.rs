//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::{extract::ConnectInfo, http::HeaderName, http::request::Parts};

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract the client IP address.
///
/// If `ip_header` is set (running behind a proxy), the first entry of that
/// header is used and there is no fallback to the socket address. Otherwise
/// the address from `ConnectInfo` is used.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    ip_header: Option<&HeaderName>,
) -> Option<String> {
    match ip_header {
        Some(name) => {
            let value = source.headers().get(name)?.to_str().ok()?;
            let first = value.split(',').next()?.trim();
            (!first.is_empty()).then(|| first.to_string())
        }
        None => source
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;

    #[test]
    fn test_forwarded_header_first_entry() {
        let request = Request::builder()
            .header("x-forwarded-for", " 10.0.0.1 , 10.0.0.2")
            .body(Body::empty())
            .unwrap();
        let name = HeaderName::from_static("x-forwarded-for");

        assert_eq!(
            extract_client_ip(&request, Some(&name)),
            Some("10.0.0.1".to_string())
        );
    }

    #[test]
    fn test_missing_header_does_not_fall_back() {
        let mut request = Request::builder().body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        let name = HeaderName::from_static("x-real-ip");

        assert_eq!(extract_client_ip(&request, Some(&name)), None);
        assert_eq!(
            extract_client_ip(&request, None),
            Some("127.0.0.1".to_string())
        );
    }
}
