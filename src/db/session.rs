//! Active session storage for refresh-token tracking and revocation.
//!
//! Each login creates one session record keyed by the refresh token's `jti`
//! claim; the raw token is never stored. Access tokens are stateless and
//! never touch the database. A user may hold any number of concurrent
//! sessions, each revocable on its own.

use sqlx::sqlite::SqlitePool;

/// One active session record.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: i64,
    pub jti: String,
    pub user_id: i64,
    /// Unix seconds, mirrors the refresh token's `iat` claim.
    pub issued_at: i64,
    /// Unix seconds, mirrors the refresh token's `exp` claim.
    pub expires_at: i64,
    pub created_at: String,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    jti: String,
    user_id: i64,
    issued_at: i64,
    expires_at: i64,
    created_at: String,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            jti: row.jti,
            user_id: row.user_id,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

const SESSION_COLUMNS: &str = "id, jti, user_id, issued_at, expires_at, created_at";

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a new session. Returns the row id.
    pub async fn create(
        &self,
        jti: &str,
        user_id: i64,
        issued_at: u64,
        expires_at: u64,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO sessions (jti, user_id, issued_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(jti)
        .bind(user_id)
        .bind(issued_at as i64)
        .bind(expires_at as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_by_jti(&self, jti: &str) -> Result<Option<Session>, sqlx::Error> {
        let row: Option<SessionRow> =
            sqlx::query_as(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE jti = ?"))
                .bind(jti)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Session::from))
    }

    /// Revoke one session. Returns whether a row was deleted.
    pub async fn delete_by_jti(&self, jti: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE jti = ?")
            .bind(jti)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke every session for a user (logout everywhere).
    pub async fn delete_all_for_user(&self, user_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Drop sessions whose refresh token has expired. They could no longer
    /// verify anyway; this keeps the table from growing without bound.
    pub async fn delete_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(now as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
