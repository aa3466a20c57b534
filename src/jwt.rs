//! Access credential signing and validation.
//!
//! Access credentials are short-lived, stateless HS256 JWTs carrying only the
//! session identifier. Exchange credentials use the same shape with a
//! different `typ`, and are only accepted by the one-shot exchange. Refresh
//! credentials are opaque and never pass through here, apart from the random
//! secret they are built from.

use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::TryRngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of random bytes behind an opaque secret.
const SECRET_BYTES: usize = 32;

/// Lifetime of an exchange credential: 1 minute
pub const EXCHANGE_TTL: Duration = Duration::from_secs(60);

/// What a signed credential may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// Authenticates requests until it expires
    Access,
    /// Handed to a federated callback, traded once for the full pair
    Exchange,
}

/// JWT claims for access and exchange credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Session identifier
    pub sid: String,
    #[serde(rename = "typ")]
    pub credential_type: CredentialType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

/// Result of generating an access credential.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    /// Token duration in seconds
    pub duration: u64,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Sign an access credential for a session, valid for `ttl`.
    pub fn generate_access(
        &self,
        session_id: &str,
        ttl: Duration,
    ) -> Result<AccessTokenResult, JwtError> {
        self.sign(session_id, CredentialType::Access, ttl)
    }

    /// Sign an exchange credential for a session, valid for [`EXCHANGE_TTL`].
    pub fn generate_exchange(&self, session_id: &str) -> Result<AccessTokenResult, JwtError> {
        self.sign(session_id, CredentialType::Exchange, EXCHANGE_TTL)
    }

    fn sign(
        &self,
        session_id: &str,
        credential_type: CredentialType,
        ttl: Duration,
    ) -> Result<AccessTokenResult, JwtError> {
        let now = unix_now().ok_or(JwtError::TimeError)?;
        let duration = ttl.as_secs();

        let claims = SessionClaims {
            sid: session_id.to_string(),
            credential_type,
            iat: now,
            exp: now.saturating_add(duration),
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult { token, duration })
    }

    /// Validate and decode an access credential.
    ///
    /// Returns `None` for anything malformed, wrongly signed, expired or of
    /// another type. A credential expiring in the current second is already
    /// expired.
    pub fn validate(&self, token: &str) -> Option<SessionClaims> {
        self.decode(token, CredentialType::Access)
    }

    /// Validate and decode an exchange credential.
    pub fn validate_exchange(&self, token: &str) -> Option<SessionClaims> {
        self.decode(token, CredentialType::Exchange)
    }

    fn decode(&self, token: &str, expected: CredentialType) -> Option<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data =
            jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &validation).ok()?;

        if token_data.claims.credential_type != expected {
            return None;
        }

        let now = unix_now()?;
        if token_data.claims.exp <= now {
            return None;
        }

        Some(token_data.claims)
    }

    /// Sign and verify a probe credential and draw one secret.
    /// Run once at startup so key or entropy problems surface before serving.
    pub fn self_check(&self) -> Result<(), JwtError> {
        let probe = self.generate_access("self-check", Duration::from_secs(60))?;
        if self.validate(&probe.token).is_none() {
            return Err(JwtError::SelfCheck);
        }
        generate_opaque_secret()?;
        Ok(())
    }
}

/// Draw a new opaque secret from the OS entropy source, base64url encoded.
pub fn generate_opaque_secret() -> Result<String, JwtError> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| JwtError::Entropy(e.to_string()))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

fn unix_now() -> Option<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// The entropy source could not produce bytes
    Entropy(String),
    /// A freshly signed probe did not validate
    SelfCheck,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::Entropy(e) => write!(f, "Entropy source failed: {}", e),
            JwtError::SelfCheck => write!(f, "Signed probe token failed validation"),
        }
    }
}

impl std::error::Error for JwtError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_and_validate_access() {
        let config = JwtConfig::new(b"test-secret-key-for-testing");

        let result = config
            .generate_access("session-123", Duration::from_secs(900))
            .unwrap();
        assert_eq!(result.duration, 900);

        let claims = config.validate(&result.token).unwrap();
        assert_eq!(claims.sid, "session-123");
        assert_eq!(claims.exp, claims.iat + 900);
    }

    #[test]
    fn test_zero_ttl_is_expired() {
        let config = JwtConfig::new(b"test-secret-key-for-testing");

        let result = config.generate_access("session-123", Duration::ZERO).unwrap();
        assert!(config.validate(&result.token).is_none());
    }

    #[test]
    fn test_invalid_token() {
        let config = JwtConfig::new(b"test-secret-key-for-testing");

        assert!(config.validate("invalid-token").is_none());
        assert!(config.validate("").is_none());
        assert!(config.validate("a.b.c").is_none());
    }

    #[test]
    fn test_wrong_secret() {
        let config1 = JwtConfig::new(b"secret-1");
        let config2 = JwtConfig::new(b"secret-2");

        let result = config1
            .generate_access("session-123", Duration::from_secs(60))
            .unwrap();

        assert!(config2.validate(&result.token).is_none());
    }

    #[test]
    fn test_expired_token() {
        let secret = b"test-secret";
        let encoding_key = EncodingKey::from_secret(secret);
        let now = unix_now().unwrap();

        let claims = SessionClaims {
            sid: "session-123".to_string(),
            credential_type: CredentialType::Access,
            iat: now - 100,
            exp: now - 50,
        };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &encoding_key).unwrap();

        let config = JwtConfig::new(secret);
        assert!(config.validate(&token).is_none());
    }

    #[test]
    fn test_unsigned_token_rejected() {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;

        let now = unix_now().unwrap();
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(
            r#"{{"sid":"session-123","typ":"access","iat":{},"exp":{}}}"#,
            now,
            now + 600
        ));
        let token = format!("{}.{}.", header, payload);

        let config = JwtConfig::new(b"test-secret");
        assert!(config.validate(&token).is_none());
    }

    #[test]
    fn test_credential_types_do_not_mix() {
        let config = JwtConfig::new(b"test-secret-key-for-testing");

        let access = config
            .generate_access("session-123", Duration::from_secs(60))
            .unwrap();
        let exchange = config.generate_exchange("session-123").unwrap();
        assert_eq!(exchange.duration, EXCHANGE_TTL.as_secs());

        assert!(config.validate_exchange(&access.token).is_none());
        assert!(config.validate(&exchange.token).is_none());

        let claims = config.validate_exchange(&exchange.token).unwrap();
        assert_eq!(claims.sid, "session-123");
        assert_eq!(claims.credential_type, CredentialType::Exchange);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let config = JwtConfig::new(b"test-secret-key-for-testing");

        let result = config
            .generate_access("session-123", Duration::from_secs(u64::MAX))
            .unwrap();
        let claims = config.validate(&result.token).unwrap();
        assert_eq!(claims.exp, u64::MAX);
    }

    #[test]
    fn test_opaque_secrets_are_unique() {
        let a = generate_opaque_secret().unwrap();
        let b = generate_opaque_secret().unwrap();

        assert_ne!(a, b);
        // 32 bytes base64url without padding
        assert_eq!(a.len(), 43);
        assert!(!a.contains('|'));
    }

    #[test]
    fn test_self_check() {
        let config = JwtConfig::new(b"test-secret-key-for-testing");
        assert!(config.self_check().is_ok());
    }
}
