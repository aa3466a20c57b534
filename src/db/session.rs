//! Refresh session storage.
//!
//! One row per active device/login. Only the refresh side is stored; access
//! credentials are stateless and never touch the database.

use sqlx::sqlite::SqlitePool;

/// A persisted refresh session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque session identifier, the external handle for the row
    pub id: String,
    /// Full refresh credential currently valid for this session
    pub token: String,
    /// Client address at creation, advisory only
    pub ip: String,
    pub subject_id: String,
    /// Absolute expiry (Unix milliseconds)
    pub expire: i64,
    /// Already rotated once and inside its grace window
    pub updated: bool,
}

impl Session {
    /// Expired sessions are dead even before the sweep removes them.
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expire
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    token: String,
    ip: String,
    subject_id: String,
    expire: i64,
    updated: i32,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            token: row.token,
            ip: row.ip,
            subject_id: row.subject_id,
            expire: row.expire,
            updated: row.updated != 0,
        }
    }
}

/// Store for refresh sessions.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new session. A duplicate id fails with a constraint error.
    pub async fn add(&self, session: &Session) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO sessions (id, token, ip, subject_id, expire, updated) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.token)
        .bind(&session.ip)
        .bind(&session.subject_id)
        .bind(session.expire)
        .bind(session.updated as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a session by its identifier.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Session>, sqlx::Error> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, token, ip, subject_id, expire, updated FROM sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Session::from))
    }

    /// Overwrite every mutable field of a session in one statement.
    pub async fn replace(&self, session: &Session) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE sessions SET token = ?, ip = ?, subject_id = ?, expire = ?, updated = ? WHERE id = ?",
        )
        .bind(&session.token)
        .bind(&session.ip)
        .bind(&session.subject_id)
        .bind(session.expire)
        .bind(session.updated as i32)
        .bind(&session.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Move a fresh session into its grace window.
    ///
    /// Applies only while the row still holds `token` and is not yet flagged,
    /// so of several racing rotations exactly one wins. Returns whether this
    /// call made the transition.
    pub async fn begin_grace(&self, id: &str, token: &str, expire: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET updated = 1, expire = ? WHERE id = ? AND token = ? AND updated = 0",
        )
        .bind(expire)
        .bind(id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Put a rotated session back into the fresh state.
    ///
    /// Only applies while the row still holds `token`, is flagged as updated
    /// and has not expired at `now`. Returns whether a row changed.
    pub async fn restore_fresh(
        &self,
        id: &str,
        token: &str,
        expire: i64,
        now: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET updated = 0, expire = ? WHERE id = ? AND token = ? AND updated = 1 AND expire >= ?",
        )
        .bind(expire)
        .bind(id)
        .bind(token)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark the session's exchange credential as redeemed.
    ///
    /// Only the first call for a session succeeds. Returns whether this call
    /// claimed it.
    pub async fn claim_exchange(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE sessions SET exchanged = 1 WHERE id = ? AND exchanged = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a session by id. Absent ids are not an error.
    pub async fn remove_by_id(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every session with `expire < now`.
    pub async fn remove_expired(&self, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expire < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// List live sessions for a subject, latest expiry first.
    pub async fn list_by_subject(
        &self,
        subject_id: &str,
        now: i64,
    ) -> Result<Vec<Session>, sqlx::Error> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            "SELECT id, token, ip, subject_id, expire, updated FROM sessions WHERE subject_id = ? AND expire >= ? ORDER BY expire DESC",
        )
        .bind(subject_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Session::from).collect())
    }

    /// Delete all sessions for a subject (sign out everywhere).
    pub async fn remove_by_subject(&self, subject_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE subject_id = ?")
            .bind(subject_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
