//! Append-only log of security-sensitive attempts.

use chrono::{Duration, Utc};
use sqlx::PgPool;

use souk_core::{AttemptType, UserId};

use super::RepositoryError;
use crate::models::NewSecurityAttempt;

/// Repository for `security_attempts`.
pub struct SecurityAttemptRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SecurityAttemptRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn record(&self, attempt: &NewSecurityAttempt) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO security_attempts
                (attempt_type, user_id, ip_address, user_agent, success,
                 email_attempted, failure_reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(attempt.attempt_type)
        .bind(attempt.user_id)
        .bind(attempt.ip_address.as_deref())
        .bind(&attempt.user_agent)
        .bind(attempt.success)
        .bind(&attempt.email_attempted)
        .bind(&attempt.failure_reason)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Failed attempts from `ip` within the trailing `window`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn failures_from_ip(
        &self,
        ip: &str,
        attempt_type: AttemptType,
        window: Duration,
    ) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM security_attempts
            WHERE ip_address = $1 AND attempt_type = $2
              AND NOT success AND created_at >= $3
            ",
        )
        .bind(ip)
        .bind(attempt_type)
        .bind(Utc::now() - window)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// Failed attempts against `user_id` within the trailing `window`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn failures_for_user(
        &self,
        user_id: UserId,
        attempt_type: AttemptType,
        window: Duration,
    ) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(*) FROM security_attempts
            WHERE user_id = $1 AND attempt_type = $2
              AND NOT success AND created_at >= $3
            ",
        )
        .bind(user_id)
        .bind(attempt_type)
        .bind(Utc::now() - window)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// Delete attempts older than `days`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_older_than(&self, days: u32) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM security_attempts WHERE created_at < $1")
            .bind(Utc::now() - Duration::days(i64::from(days)))
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
