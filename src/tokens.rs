//! Token lifecycle and refresh session rotation.
//!
//! A session moves through three states:
//! - Fresh: `updated = false`. The next refresh rotates it.
//! - Grace: `updated = true`, not yet expired. The superseded refresh credential
//!   is still accepted, without further mutation, so that racing requests
//!   carrying the same stale access credential all succeed.
//! - Expired: `expire` has passed. Never authenticates, whatever the flag says,
//!   and is removed by the next sweep.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

use crate::db::{Database, Session};
use crate::jwt::{JwtConfig, JwtError, generate_opaque_secret};
use crate::providers::ProviderRegistry;

/// Separator between session id and secret in a refresh credential.
pub const REFRESH_DELIMITER: char = '|';

/// Default access credential lifetime: 15 minutes
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

/// Default refresh session lifetime: 30 days
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Default grace window after a rotation: 1 minute
pub const DEFAULT_GRACE_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifetimes used by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub grace_timeout: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            grace_timeout: DEFAULT_GRACE_TIMEOUT,
        }
    }
}

/// Access and refresh credentials as delivered to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Record of a Fresh -> Grace transition, kept so it can be compensated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    pub session_id: String,
    /// Refresh credential that was presented (and is still the stored one)
    pub refresh: String,
    /// Session expiry before the grace window replaced it
    pub previous_expire: i64,
}

/// Outcome of a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    pub subject_id: String,
    pub session_id: String,
    /// Set only when this call moved the session from Fresh to Grace
    pub rotation: Option<Rotation>,
}

impl Authenticated {
    pub fn rotated(&self) -> bool {
        self.rotation.is_some()
    }
}

/// Why a credential was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Wrong shape, bad signature or expired access credential
    Malformed,
    /// No session with that id
    NotFound,
    /// Presented refresh credential is not the stored one
    Mismatch,
    /// Session is past its expiry
    Expired,
    /// Exchange credential was already redeemed
    Consumed,
}

impl ValidationFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationFailure::Malformed => "malformed credential",
            ValidationFailure::NotFound => "session not found",
            ValidationFailure::Mismatch => "refresh credential mismatch",
            ValidationFailure::Expired => "session expired",
            ValidationFailure::Consumed => "exchange credential already used",
        }
    }
}

/// Errors returned by the token controller.
#[derive(Debug)]
pub enum TokenError {
    /// The presented credentials do not authenticate
    Validation(ValidationFailure),
    /// The session store failed; passed through unchanged
    Store(sqlx::Error),
    /// Signing or entropy failure
    Signing(JwtError),
}

impl TokenError {
    pub fn is_validation(&self) -> bool {
        matches!(self, TokenError::Validation(_))
    }
}

impl From<sqlx::Error> for TokenError {
    fn from(e: sqlx::Error) -> Self {
        TokenError::Store(e)
    }
}

impl From<JwtError> for TokenError {
    fn from(e: JwtError) -> Self {
        TokenError::Signing(e)
    }
}

impl From<ValidationFailure> for TokenError {
    fn from(reason: ValidationFailure) -> Self {
        TokenError::Validation(reason)
    }
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Validation(reason) => write!(f, "Validation failed: {}", reason.as_str()),
            TokenError::Store(e) => write!(f, "Session store error: {}", e),
            TokenError::Signing(e) => write!(f, "Signing error: {}", e),
        }
    }
}

impl std::error::Error for TokenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TokenError::Validation(_) => None,
            TokenError::Store(e) => Some(e),
            TokenError::Signing(e) => Some(e),
        }
    }
}

/// Split a refresh credential into `(session_id, secret)`.
pub fn parse_refresh(refresh: &str) -> Result<(&str, &str), ValidationFailure> {
    match refresh.split_once(REFRESH_DELIMITER) {
        Some((id, secret))
            if !id.is_empty() && !secret.is_empty() && !secret.contains(REFRESH_DELIMITER) =>
        {
            Ok((id, secret))
        }
        _ => Err(ValidationFailure::Malformed),
    }
}

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(millis)
        .unwrap_or_default()
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Issues, authenticates, rotates and revokes refresh sessions.
#[derive(Clone)]
pub struct TokenController {
    jwt: Arc<JwtConfig>,
    db: Database,
    settings: TokenSettings,
    providers: Arc<ProviderRegistry>,
}

impl TokenController {
    pub fn new(jwt: Arc<JwtConfig>, db: Database, settings: TokenSettings) -> Self {
        Self {
            jwt,
            db,
            settings,
            providers: Arc::new(ProviderRegistry::default()),
        }
    }

    /// Attach the identity provider registry.
    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = Arc::new(providers);
        self
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Start a new session for `subject_id` with the configured access TTL.
    pub async fn create(&self, ip: &str, subject_id: &str) -> Result<TokenPair, TokenError> {
        self.create_with_ttl(ip, subject_id, self.settings.access_ttl)
            .await
    }

    /// Start a new session, signing the access credential for `access_ttl`.
    pub async fn create_with_ttl(
        &self,
        ip: &str,
        subject_id: &str,
        access_ttl: Duration,
    ) -> Result<TokenPair, TokenError> {
        let session_id = new_session_id();
        let access = self.jwt.generate_access(&session_id, access_ttl)?;
        let refresh = self.insert_session(session_id, ip, subject_id).await?;

        Ok(TokenPair {
            access: access.token,
            refresh,
        })
    }

    /// Start a new session and return a one-shot exchange credential for it.
    ///
    /// Federated callbacks hand this to the client, which redeems it once via
    /// [`TokenController::exchange`] for the full pair.
    pub async fn create_exchange(&self, ip: &str, subject_id: &str) -> Result<String, TokenError> {
        let session_id = new_session_id();
        let credential = self.jwt.generate_exchange(&session_id)?;
        self.insert_session(session_id, ip, subject_id).await?;
        Ok(credential.token)
    }

    async fn insert_session(
        &self,
        session_id: String,
        ip: &str,
        subject_id: &str,
    ) -> Result<String, TokenError> {
        let secret = generate_opaque_secret()?;
        let refresh = format!("{}{}{}", session_id, REFRESH_DELIMITER, secret);

        let session = Session {
            id: session_id,
            token: refresh.clone(),
            ip: ip.to_string(),
            subject_id: subject_id.to_string(),
            expire: now_millis().saturating_add(millis(self.settings.refresh_ttl)),
            updated: false,
        };
        self.db.sessions().add(&session).await?;

        debug!(session_id = %session.id, subject_id = %subject_id, "Session created");
        Ok(refresh)
    }

    /// Authenticate a credential pair.
    ///
    /// A valid access credential whose session still exists is accepted
    /// without touching the session. Otherwise the refresh credential decides,
    /// rotating a Fresh session into Grace.
    pub async fn authenticate(&self, pair: &TokenPair) -> Result<Authenticated, TokenError> {
        let now = now_millis();

        if let Some(claims) = self.jwt.validate(&pair.access) {
            if let Some(session) = self.db.sessions().get_by_id(&claims.sid).await? {
                if !session.is_expired(now) {
                    return Ok(Authenticated {
                        subject_id: session.subject_id,
                        session_id: session.id,
                        rotation: None,
                    });
                }
            }
        }

        let (session_id, _secret) = parse_refresh(&pair.refresh)?;

        let session = self
            .db
            .sessions()
            .get_by_id(session_id)
            .await?
            .ok_or(ValidationFailure::NotFound)?;

        if session.token != pair.refresh {
            warn!(session_id = %session_id, "Refresh credential mismatch");
            return Err(ValidationFailure::Mismatch.into());
        }

        if session.is_expired(now) {
            return Err(ValidationFailure::Expired.into());
        }

        if session.updated {
            debug!(session_id = %session.id, "Session in grace window, reusing");
            return Ok(Authenticated {
                subject_id: session.subject_id,
                session_id: session.id,
                rotation: None,
            });
        }

        let previous_expire = session.expire;
        let grace_expire = now.saturating_add(millis(self.settings.grace_timeout));
        let won = self
            .db
            .sessions()
            .begin_grace(&session.id, &session.token, grace_expire)
            .await?;

        if !won {
            // A concurrent request with the same credential rotated first
            return self.reuse_grace(&pair.refresh, now).await;
        }

        debug!(session_id = %session.id, "Session rotated into grace window");

        Ok(Authenticated {
            subject_id: session.subject_id,
            rotation: Some(Rotation {
                session_id: session.id.clone(),
                refresh: session.token,
                previous_expire,
            }),
            session_id: session.id,
        })
    }

    /// Re-check a session that another request just moved into Grace.
    async fn reuse_grace(&self, refresh: &str, now: i64) -> Result<Authenticated, TokenError> {
        let (session_id, _secret) = parse_refresh(refresh)?;
        let session = self
            .db
            .sessions()
            .get_by_id(session_id)
            .await?
            .ok_or(ValidationFailure::NotFound)?;

        if session.token != refresh {
            return Err(ValidationFailure::Mismatch.into());
        }
        if session.is_expired(now) {
            return Err(ValidationFailure::Expired.into());
        }

        debug!(session_id = %session.id, "Lost rotation race, reusing grace window");
        Ok(Authenticated {
            subject_id: session.subject_id,
            session_id: session.id,
            rotation: None,
        })
    }

    /// Revoke the session behind a refresh credential. Returns whether it existed.
    pub async fn revoke(&self, refresh: &str) -> Result<bool, TokenError> {
        let (session_id, _secret) = parse_refresh(refresh)?;
        let removed = self.db.sessions().remove_by_id(session_id).await?;
        if removed {
            debug!(session_id = %session_id, "Session revoked");
        }
        Ok(removed)
    }

    /// Revoke a session by id, but only if it belongs to `subject_id`.
    pub async fn revoke_session(
        &self,
        subject_id: &str,
        session_id: &str,
    ) -> Result<bool, TokenError> {
        match self.db.sessions().get_by_id(session_id).await? {
            Some(session) if session.subject_id == subject_id => {
                Ok(self.db.sessions().remove_by_id(session_id).await?)
            }
            _ => Ok(false),
        }
    }

    /// Revoke every session of a subject.
    pub async fn revoke_all(&self, subject_id: &str) -> Result<u64, TokenError> {
        let count = self.db.sessions().remove_by_subject(subject_id).await?;
        info!(subject_id = %subject_id, count, "Revoked all sessions");
        Ok(count)
    }

    /// Live sessions of a subject.
    pub async fn list_sessions(&self, subject_id: &str) -> Result<Vec<Session>, TokenError> {
        Ok(self
            .db
            .sessions()
            .list_by_subject(subject_id, now_millis())
            .await?)
    }

    /// Redeem an exchange credential from [`TokenController::create_exchange`]
    /// for the full pair. Each session can be exchanged once; ordinary access
    /// credentials are rejected as malformed.
    pub async fn exchange(&self, credential: &str) -> Result<TokenPair, TokenError> {
        let claims = self
            .jwt
            .validate_exchange(credential)
            .ok_or(ValidationFailure::Malformed)?;

        let session = self
            .db
            .sessions()
            .get_by_id(&claims.sid)
            .await?
            .ok_or(ValidationFailure::NotFound)?;

        if session.is_expired(now_millis()) {
            return Err(ValidationFailure::Expired.into());
        }

        if !self.db.sessions().claim_exchange(&session.id).await? {
            warn!(session_id = %session.id, "Exchange credential replayed");
            return Err(ValidationFailure::Consumed.into());
        }

        let access = self
            .jwt
            .generate_access(&session.id, self.settings.access_ttl)?;

        Ok(TokenPair {
            access: access.token,
            refresh: session.token,
        })
    }

    /// Compensate a rotation whose response never reached the client.
    ///
    /// Drops the session minted for the lost response and returns the rotated
    /// session to Fresh with its previous expiry, if it is still in Grace and
    /// unchanged. Best-effort: failures are logged, not returned. Returns
    /// whether the previous session was restored.
    pub async fn recover(&self, rotation: &Rotation, issued_refresh: Option<&str>) -> bool {
        if let Some(issued) = issued_refresh {
            if let Err(e) = self.revoke(issued).await {
                warn!(error = %e, "Recover: failed to revoke undelivered session");
            }
        }

        match self
            .db
            .sessions()
            .restore_fresh(
                &rotation.session_id,
                &rotation.refresh,
                rotation.previous_expire,
                now_millis(),
            )
            .await
        {
            Ok(true) => {
                info!(session_id = %rotation.session_id, "Recovered rotated session");
                true
            }
            Ok(false) => {
                warn!(session_id = %rotation.session_id, "Recover: session no longer in grace");
                false
            }
            Err(e) => {
                error!(session_id = %rotation.session_id, error = %e, "Recover failed");
                false
            }
        }
    }

    /// Delete every session that expired before `now` (Unix milliseconds).
    pub async fn sweep(&self, now: i64) -> Result<u64, TokenError> {
        match self.db.sessions().remove_expired(now).await {
            Ok(count) => {
                if count > 0 {
                    info!(count, "Swept expired sessions");
                } else {
                    debug!("No expired sessions to sweep");
                }
                Ok(count)
            }
            Err(e) => {
                error!(error = %e, "Failed to sweep expired sessions");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_refresh() {
        assert_eq!(parse_refresh("abc|def"), Ok(("abc", "def")));
        assert_eq!(parse_refresh("abc"), Err(ValidationFailure::Malformed));
        assert_eq!(parse_refresh("|def"), Err(ValidationFailure::Malformed));
        assert_eq!(parse_refresh("abc|"), Err(ValidationFailure::Malformed));
        assert_eq!(parse_refresh("a|b|c"), Err(ValidationFailure::Malformed));
        assert_eq!(parse_refresh(""), Err(ValidationFailure::Malformed));
    }

    #[test]
    fn test_default_settings() {
        let settings = TokenSettings::default();
        assert_eq!(settings.access_ttl, Duration::from_secs(900));
        assert_eq!(settings.refresh_ttl, Duration::from_secs(2_592_000));
        assert_eq!(settings.grace_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_error_classification() {
        assert!(TokenError::Validation(ValidationFailure::Expired).is_validation());
        assert!(!TokenError::Store(sqlx::Error::PoolClosed).is_validation());
        assert_eq!(
            TokenError::Validation(ValidationFailure::Mismatch).to_string(),
            "Validation failed: refresh credential mismatch"
        );
    }

    async fn controller(settings: TokenSettings) -> TokenController {
        let db = Database::open(":memory:").await.unwrap();
        let jwt = Arc::new(JwtConfig::new(b"test-secret-key-for-testing"));
        TokenController::new(jwt, db, settings)
    }

    #[tokio::test]
    async fn test_create_persists_fresh_session() {
        let ctl = controller(TokenSettings::default()).await;

        let pair = ctl.create("1.2.3.4", "u1").await.unwrap();
        let (id, _) = parse_refresh(&pair.refresh).unwrap();

        let session = ctl.db().sessions().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(session.token, pair.refresh);
        assert_eq!(session.ip, "1.2.3.4");
        assert_eq!(session.subject_id, "u1");
        assert!(!session.updated);
        assert!(session.expire > now_millis());
    }

    #[tokio::test]
    async fn test_recover_restores_fresh_and_drops_issued() {
        let ctl = controller(TokenSettings::default()).await;

        let old = ctl
            .create_with_ttl("ip", "u1", Duration::ZERO)
            .await
            .unwrap();
        let (old_id, _) = parse_refresh(&old.refresh).unwrap();
        let before = ctl.db().sessions().get_by_id(old_id).await.unwrap().unwrap();

        let auth = ctl.authenticate(&old).await.unwrap();
        let rotation = auth.rotation.expect("rotation");
        let issued = ctl.create("ip", "u1").await.unwrap();

        assert!(ctl.recover(&rotation, Some(&issued.refresh)).await);

        let restored = ctl.db().sessions().get_by_id(old_id).await.unwrap().unwrap();
        assert!(!restored.updated);
        assert_eq!(restored.expire, before.expire);

        let (new_id, _) = parse_refresh(&issued.refresh).unwrap();
        assert!(ctl.db().sessions().get_by_id(new_id).await.unwrap().is_none());

        // Restored session rotates again on the next refresh
        let again = ctl.authenticate(&old).await.unwrap();
        assert!(again.rotated());
    }

    #[tokio::test]
    async fn test_recover_skips_revoked_session() {
        let ctl = controller(TokenSettings::default()).await;

        let old = ctl
            .create_with_ttl("ip", "u1", Duration::ZERO)
            .await
            .unwrap();
        let rotation = ctl.authenticate(&old).await.unwrap().rotation.unwrap();
        ctl.revoke(&old.refresh).await.unwrap();

        assert!(!ctl.recover(&rotation, None).await);
    }

    #[tokio::test]
    async fn test_exchange_redeems_once() {
        let ctl = controller(TokenSettings::default()).await;

        let credential = ctl.create_exchange("ip", "u1").await.unwrap();
        let exchanged = ctl.exchange(&credential).await.unwrap();

        let auth = ctl.authenticate(&exchanged).await.unwrap();
        assert_eq!(auth.subject_id, "u1");
        assert!(!auth.rotated());

        assert!(matches!(
            ctl.exchange(&credential).await,
            Err(TokenError::Validation(ValidationFailure::Consumed))
        ));
        // The access credential it produced cannot start another exchange
        assert!(matches!(
            ctl.exchange(&exchanged.access).await,
            Err(TokenError::Validation(ValidationFailure::Malformed))
        ));
    }

    #[tokio::test]
    async fn test_exchange_rejects_access_credentials() {
        let ctl = controller(TokenSettings::default()).await;

        let pair = ctl.create("ip", "u1").await.unwrap();
        assert!(matches!(
            ctl.exchange(&pair.access).await,
            Err(TokenError::Validation(ValidationFailure::Malformed))
        ));
        assert!(matches!(
            ctl.exchange("garbage").await,
            Err(TokenError::Validation(ValidationFailure::Malformed))
        ));

        // An exchange credential is not an access credential either
        let credential = ctl.create_exchange("ip", "u1").await.unwrap();
        let presented = TokenPair {
            access: credential,
            refresh: String::new(),
        };
        assert!(matches!(
            ctl.authenticate(&presented).await,
            Err(TokenError::Validation(ValidationFailure::Malformed))
        ));
    }

    #[tokio::test]
    async fn test_exchange_of_revoked_session() {
        let ctl = controller(TokenSettings::default()).await;

        let credential = ctl.create_exchange("ip", "u1").await.unwrap();
        let sessions = ctl.list_sessions("u1").await.unwrap();
        ctl.revoke(&sessions[0].token).await.unwrap();

        assert!(matches!(
            ctl.exchange(&credential).await,
            Err(TokenError::Validation(ValidationFailure::NotFound))
        ));
    }

    #[tokio::test]
    async fn test_huge_lifetimes_do_not_wrap() {
        let ctl = controller(TokenSettings {
            refresh_ttl: Duration::MAX,
            grace_timeout: Duration::MAX,
            ..TokenSettings::default()
        })
        .await;

        let pair = ctl
            .create_with_ttl("ip", "u1", Duration::ZERO)
            .await
            .unwrap();
        let (id, _) = parse_refresh(&pair.refresh).unwrap();
        assert_eq!(
            ctl.db().sessions().get_by_id(id).await.unwrap().unwrap().expire,
            i64::MAX
        );

        // Rotation into a saturated grace window still authenticates
        assert!(ctl.authenticate(&pair).await.unwrap().rotated());
        assert!(ctl.authenticate(&pair).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_session_checks_owner() {
        let ctl = controller(TokenSettings::default()).await;

        let pair = ctl.create("ip", "u1").await.unwrap();
        let (id, _) = parse_refresh(&pair.refresh).unwrap();

        assert!(!ctl.revoke_session("u2", id).await.unwrap());
        assert!(ctl.revoke_session("u1", id).await.unwrap());
        assert!(!ctl.revoke_session("u1", id).await.unwrap());
    }
}
