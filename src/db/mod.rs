mod session;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use session::{Session, SessionStore};
pub use user::{NewUser, PublicUser, User, UserRole, UserStore};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        // An in-memory database exists per connection, so it must be
        // pinned to a single one.
        let max_connections = if path == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                // Identity records. username, email and phone are each unique
                // among active identities.
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT UNIQUE NOT NULL,
                    username TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    phone TEXT UNIQUE NOT NULL,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'customer',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_users_uuid ON users(uuid)",
                "CREATE INDEX idx_users_username ON users(username)",
                "CREATE INDEX idx_users_email ON users(email)",
                // One row per live session, keyed by the refresh token's jti
                // claim. The raw token is never stored. Deleting a row
                // revokes that session and no other.
                "CREATE TABLE sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    jti TEXT UNIQUE NOT NULL,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    issued_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_sessions_jti ON sessions(jti)",
                "CREATE INDEX idx_sessions_user_id ON sessions(user_id)",
                "CREATE INDEX idx_sessions_expires_at ON sessions(expires_at)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the session store.
    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> NewUser<'static> {
        NewUser {
            uuid: "uuid-123",
            username: "alice",
            email: "alice@example.com",
            phone: "+15550001",
            password_hash: "argon2-hash",
            role: UserRole::Customer,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db.users().create(&alice()).await.unwrap();

        let user = db.users().get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.uuid, "uuid-123");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, UserRole::Customer);

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.id, id);

        let user = db.users().get_by_uuid("uuid-123").await.unwrap().unwrap();
        assert_eq!(user.id, id);
    }

    #[tokio::test]
    async fn test_duplicate_username_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create(&alice()).await.unwrap();

        let mut dup = alice();
        dup.uuid = "uuid-456";
        dup.email = "other@example.com";
        dup.phone = "+15550002";
        assert!(db.users().create(&dup).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create(&alice()).await.unwrap();

        let mut dup = alice();
        dup.uuid = "uuid-456";
        dup.username = "bob";
        dup.phone = "+15550002";
        assert!(db.users().create(&dup).await.is_err());
    }

    #[tokio::test]
    async fn test_session_roundtrip() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db.users().create(&alice()).await.unwrap();

        db.sessions()
            .create("jti-1", user_id, 1_000, 2_000)
            .await
            .unwrap();

        let session = db.sessions().get_by_jti("jti-1").await.unwrap().unwrap();
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.issued_at, 1_000);
        assert_eq!(session.expires_at, 2_000);

        assert!(db.sessions().get_by_jti("jti-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db.users().create(&alice()).await.unwrap();

        db.sessions()
            .create("jti-1", user_id, 1_000, 2_000)
            .await
            .unwrap();
        db.sessions()
            .create("jti-2", user_id, 1_100, 2_100)
            .await
            .unwrap();

        // Revoking one session leaves the other untouched.
        assert!(db.sessions().delete_by_jti("jti-1").await.unwrap());
        assert!(db.sessions().get_by_jti("jti-1").await.unwrap().is_none());
        assert!(db.sessions().get_by_jti("jti-2").await.unwrap().is_some());

        // Revoking a missing session reports that nothing was deleted.
        assert!(!db.sessions().delete_by_jti("jti-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_all_sessions_for_user() {
        let db = Database::open(":memory:").await.unwrap();
        let alice_id = db.users().create(&alice()).await.unwrap();
        let mut other = alice();
        other.uuid = "uuid-456";
        other.username = "bob";
        other.email = "bob@example.com";
        other.phone = "+15550002";
        let bob_id = db.users().create(&other).await.unwrap();

        db.sessions()
            .create("jti-a1", alice_id, 1_000, 2_000)
            .await
            .unwrap();
        db.sessions()
            .create("jti-a2", alice_id, 1_000, 2_000)
            .await
            .unwrap();
        db.sessions()
            .create("jti-b1", bob_id, 1_000, 2_000)
            .await
            .unwrap();

        let deleted = db.sessions().delete_all_for_user(alice_id).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(db.sessions().get_by_jti("jti-a1").await.unwrap().is_none());
        assert!(db.sessions().get_by_jti("jti-b1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_expired_sessions() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db.users().create(&alice()).await.unwrap();

        db.sessions()
            .create("jti-old", user_id, 1_000, 2_000)
            .await
            .unwrap();
        db.sessions()
            .create("jti-live", user_id, 1_000, 9_000)
            .await
            .unwrap();

        let purged = db.sessions().delete_expired(5_000).await.unwrap();
        assert_eq!(purged, 1);
        assert!(db.sessions().get_by_jti("jti-old").await.unwrap().is_none());
        assert!(db.sessions().get_by_jti("jti-live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_by_login_matches_any_selector() {
        let db = Database::open(":memory:").await.unwrap();
        db.users().create(&alice()).await.unwrap();

        let by_username = db
            .users()
            .get_by_login(Some("alice"), None, None)
            .await
            .unwrap();
        assert!(by_username.is_some());

        let by_email = db
            .users()
            .get_by_login(None, Some("alice@example.com"), None)
            .await
            .unwrap();
        assert!(by_email.is_some());

        let by_phone = db
            .users()
            .get_by_login(None, None, Some("+15550001"))
            .await
            .unwrap();
        assert!(by_phone.is_some());

        let miss = db
            .users()
            .get_by_login(Some("nobody"), None, None)
            .await
            .unwrap();
        assert!(miss.is_none());
    }
}
