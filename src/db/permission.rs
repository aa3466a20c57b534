use sqlx::sqlite::SqlitePool;

/// Flat permission grants per subject.
#[derive(Clone)]
pub struct PermissionStore {
    pool: SqlitePool,
}

impl PermissionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Grant a permission. Granting twice is a no-op.
    pub async fn grant(&self, subject_id: &str, permission: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO permissions (subject_id, permission) VALUES (?, ?)")
            .bind(subject_id)
            .bind(permission)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove a permission grant.
    pub async fn revoke(&self, subject_id: &str, permission: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM permissions WHERE subject_id = ? AND permission = ?")
            .bind(subject_id)
            .bind(permission)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All permissions held by a subject, sorted.
    pub async fn list_for_subject(&self, subject_id: &str) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT permission FROM permissions WHERE subject_id = ? ORDER BY permission",
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn test_grant_list_revoke() {
        let db = Database::open(":memory:").await.unwrap();
        let store = db.permissions();

        store.grant("u1", "posts:write").await.unwrap();
        store.grant("u1", "posts:read").await.unwrap();
        store.grant("u1", "posts:read").await.unwrap();
        store.grant("u2", "admin").await.unwrap();

        assert_eq!(
            store.list_for_subject("u1").await.unwrap(),
            vec!["posts:read", "posts:write"]
        );

        assert!(store.revoke("u1", "posts:write").await.unwrap());
        assert!(!store.revoke("u1", "posts:write").await.unwrap());
        assert_eq!(store.list_for_subject("u1").await.unwrap(), vec!["posts:read"]);
        assert!(store.list_for_subject("nobody").await.unwrap().is_empty());
    }
}
