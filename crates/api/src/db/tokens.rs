//! One-time account tokens and the refresh-token blacklist.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use souk_core::UserId;

use super::RepositoryError;

/// Kind of single-use emailed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OneTimeTokenKind {
    EmailVerification,
    PasswordReset,
}

impl OneTimeTokenKind {
    const fn table(self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification_tokens",
            Self::PasswordReset => "password_reset_tokens",
        }
    }

    /// How long a freshly issued token stays valid.
    #[must_use]
    pub fn lifetime(self) -> Duration {
        match self {
            Self::EmailVerification => Duration::hours(24),
            Self::PasswordReset => Duration::hours(1),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OneTimeToken {
    pub id: i32,
    pub user_id: UserId,
    pub token: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl OneTimeToken {
    #[must_use]
    pub const fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Repository for verification/reset tokens and blacklisted JTIs.
pub struct TokenRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Issue a new random token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn issue(
        &self,
        kind: OneTimeTokenKind,
        user_id: UserId,
    ) -> Result<OneTimeToken, RepositoryError> {
        let token = sqlx::query_as::<_, OneTimeToken>(&format!(
            r"
            INSERT INTO {} (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token, created_at, expires_at, used_at
            ",
            kind.table()
        ))
        .bind(user_id)
        .bind(Uuid::new_v4())
        .bind(Utc::now() + kind.lifetime())
        .fetch_one(self.pool)
        .await?;
        Ok(token)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find(
        &self,
        kind: OneTimeTokenKind,
        token: Uuid,
    ) -> Result<Option<OneTimeToken>, RepositoryError> {
        let row = sqlx::query_as::<_, OneTimeToken>(&format!(
            "SELECT id, user_id, token, created_at, expires_at, used_at FROM {} WHERE token = $1",
            kind.table()
        ))
        .bind(token)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Mark a token used. Returns `false` if it was already used.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn consume(&self, kind: OneTimeTokenKind, id: i32) -> Result<bool, RepositoryError> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET used_at = NOW() WHERE id = $1 AND used_at IS NULL",
            kind.table()
        ))
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Retire every unused token of this kind for the user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn invalidate_unused(
        &self,
        kind: OneTimeTokenKind,
        user_id: UserId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET used_at = NOW() WHERE user_id = $1 AND used_at IS NULL",
            kind.table()
        ))
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Blacklist a refresh token until it would have expired anyway.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn blacklist(
        &self,
        jti: &str,
        user_id: UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO blacklisted_tokens (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
            ",
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn is_blacklisted(&self, jti: &str) -> Result<bool, RepositoryError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM blacklisted_tokens WHERE jti = $1)")
                .bind(jti)
                .fetch_one(self.pool)
                .await?;
        Ok(exists)
    }

    /// Drop blacklist entries whose token has expired on its own.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn purge_expired_blacklist(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM blacklisted_tokens WHERE expires_at < NOW()")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_lifetimes() {
        assert_eq!(OneTimeTokenKind::EmailVerification.lifetime(), Duration::hours(24));
        assert_eq!(OneTimeTokenKind::PasswordReset.lifetime(), Duration::hours(1));
    }

    #[test]
    fn test_one_time_token_state() {
        let now = Utc::now();
        let mut token = OneTimeToken {
            id: 1,
            user_id: UserId::new(1),
            token: Uuid::new_v4(),
            created_at: now - Duration::hours(2),
            expires_at: now - Duration::hours(1),
            used_at: None,
        };
        assert!(token.is_expired(now));
        assert!(!token.is_used());

        token.used_at = Some(now);
        assert!(token.is_used());
    }
}
