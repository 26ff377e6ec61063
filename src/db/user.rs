use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// User role claim. Authorization beyond reading this value is out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Customer,
    Seller,
    Visitor,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Customer => "customer",
            UserRole::Seller => "seller",
            UserRole::Visitor => "visitor",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            "seller" => UserRole::Seller,
            "visitor" => UserRole::Visitor,
            _ => UserRole::Customer,
        }
    }
}

/// Full identity record. Only ever handed to server-side code; callers get
/// the sanitized [`PublicUser`] projection.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    uuid: String,
    username: String,
    email: String,
    phone: String,
    password_hash: String,
    role: String,
    created_at: String,
    updated_at: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            uuid: row.uuid,
            username: row.username,
            email: row.email,
            phone: row.phone,
            password_hash: row.password_hash,
            role: UserRole::from_str(&row.role),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Sanitized identity returned to callers. Never carries the password hash
/// or any token material.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PublicUser {
    pub uuid: String,
    pub username: String,
    pub email: String,
    pub phone: String,
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            uuid: user.uuid,
            username: user.username,
            email: user.email,
            phone: user.phone,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Fields for creating a user record.
pub struct NewUser<'a> {
    pub uuid: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub phone: &'a str,
    pub password_hash: &'a str,
    pub role: UserRole,
}

const USER_COLUMNS: &str =
    "id, uuid, username, email, phone, password_hash, role, created_at, updated_at";

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user. Returns the user ID.
    /// Fails on any username/email/phone/uuid uniqueness violation.
    pub async fn create(&self, user: &NewUser<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (uuid, username, email, phone, password_hash, role) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user.uuid)
        .bind(user.username)
        .bind(user.email)
        .bind(user.phone)
        .bind(user.password_hash)
        .bind(user.role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by UUID.
    pub async fn get_by_uuid(&self, uuid: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE uuid = ?"))
                .bind(uuid)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by username.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user matching any of the provided login selectors.
    /// Absent selectors are bound to the empty string, which never matches.
    pub async fn get_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE username = ?1 OR email = ?2 OR phone = ?3 LIMIT 1"
        ))
        .bind(username.unwrap_or(""))
        .bind(email.unwrap_or(""))
        .bind(phone.unwrap_or(""))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Check whether any of the unique identity fields is already taken.
    pub async fn identity_taken(
        &self,
        username: &str,
        email: &str,
        phone: &str,
    ) -> Result<bool, sqlx::Error> {
        let count: (i32,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE username = ?1 OR email = ?2 OR phone = ?3",
        )
        .bind(username)
        .bind(email)
        .bind(phone)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }

    /// Delete a user by ID.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
