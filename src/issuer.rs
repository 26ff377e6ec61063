//! Token pair issuance.
//!
//! A successful login (or any re-issuance) produces one access token and one
//! refresh token, and records a session row keyed by the refresh token's
//! `jti` before the pair is returned. The caller therefore never holds a
//! refresh token the server does not recognize. Each issuance starts an
//! independent session; issuing a new pair leaves existing sessions valid.

use crate::db::Database;
use crate::jwt::{IssuedRefresh, IssuedToken, TokenError, TokenKeys};
use std::sync::Arc;

/// An access/refresh pair bound to one user identity.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedRefresh,
}

#[derive(Debug)]
pub enum IssueError {
    /// Referenced identity does not exist
    NotFound,
    /// Signing failure
    Token(TokenError),
    /// Store failure
    Database(sqlx::Error),
}

impl std::fmt::Display for IssueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueError::NotFound => write!(f, "User not found"),
            IssueError::Token(e) => write!(f, "Token error: {}", e),
            IssueError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for IssueError {}

impl From<TokenError> for IssueError {
    fn from(e: TokenError) -> Self {
        IssueError::Token(e)
    }
}

impl From<sqlx::Error> for IssueError {
    fn from(e: sqlx::Error) -> Self {
        IssueError::Database(e)
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    db: Database,
    keys: Arc<TokenKeys>,
}

impl TokenIssuer {
    /// Secret material is confirmed at boot when `TokenKeys` is built, so
    /// there is no per-call configuration failure path here.
    pub fn new(db: Database, keys: Arc<TokenKeys>) -> Self {
        Self { db, keys }
    }

    /// Issue an access/refresh pair for the given user.
    pub async fn issue_pair(&self, user_id: i64) -> Result<TokenPair, IssueError> {
        let user = self
            .db
            .users()
            .get_by_id(user_id)
            .await?
            .ok_or(IssueError::NotFound)?;

        let access = self.keys.issue_access(&user)?;
        let refresh = self.keys.issue_refresh(&user)?;

        // Persist before responding: a crash after this point leaves a
        // recognized session, a crash before it leaves none.
        self.db
            .sessions()
            .create(&refresh.jti, user.id, refresh.issued_at, refresh.expires_at)
            .await?;

        Ok(TokenPair { access, refresh })
    }
}
