//! Rate limiting over the security-attempt log.
//!
//! Every auth action appends a row to `security_attempts`; a caller is
//! blocked once the number of FAILED rows of the same type inside the
//! sliding window reaches the policy's limit.

use chrono::Duration;
use sqlx::PgPool;

use souk_core::{AttemptType, UserId};

use crate::db::{RepositoryError, SecurityAttemptRepository};
use crate::models::{ClientInfo, NewSecurityAttempt};
use crate::services::auth::AuthError;

/// Attempts older than this are deleted by the cleanup job.
pub const ATTEMPT_RETENTION_DAYS: u32 = 90;

/// Failure threshold for one kind of attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptPolicy {
    pub attempt_type: AttemptType,
    pub max_failures: i64,
    pub window_minutes: i64,
    /// Message returned with the 429.
    pub message: &'static str,
}

impl AttemptPolicy {
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::minutes(self.window_minutes)
    }

    #[must_use]
    pub const fn is_exceeded(&self, failures: i64) -> bool {
        failures >= self.max_failures
    }
}

pub const LOGIN_PER_IP: AttemptPolicy = AttemptPolicy {
    attempt_type: AttemptType::Login,
    max_failures: 5,
    window_minutes: 15,
    message: "Too many failed login attempts. Please try again later.",
};

pub const LOGIN_PER_USER: AttemptPolicy = AttemptPolicy {
    attempt_type: AttemptType::Login,
    max_failures: 3,
    window_minutes: 15,
    message: "Too many failed login attempts for this account. Please try again later.",
};

pub const REGISTER_PER_IP: AttemptPolicy = AttemptPolicy {
    attempt_type: AttemptType::Register,
    max_failures: 10,
    window_minutes: 60,
    message: "Too many registration attempts. Please try again later.",
};

pub const RESEND_PER_IP: AttemptPolicy = AttemptPolicy {
    attempt_type: AttemptType::ResendVerification,
    max_failures: 5,
    window_minutes: 60,
    message: "Too many verification requests. Please try again later.",
};

pub struct SecurityService<'a> {
    attempts: SecurityAttemptRepository<'a>,
}

impl<'a> SecurityService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            attempts: SecurityAttemptRepository::new(pool),
        }
    }

    /// Whether `ip` has hit the policy's failure limit. Unknown IPs are never blocked.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the count fails.
    pub async fn is_ip_blocked(
        &self,
        ip: Option<&str>,
        policy: &AttemptPolicy,
    ) -> Result<bool, RepositoryError> {
        let Some(ip) = ip else {
            return Ok(false);
        };
        let failures = self
            .attempts
            .failures_from_ip(ip, policy.attempt_type, policy.window())
            .await?;
        Ok(policy.is_exceeded(failures))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the count fails.
    pub async fn is_user_blocked(
        &self,
        user_id: UserId,
        policy: &AttemptPolicy,
    ) -> Result<bool, RepositoryError> {
        let failures = self
            .attempts
            .failures_for_user(user_id, policy.attempt_type, policy.window())
            .await?;
        Ok(policy.is_exceeded(failures))
    }

    /// Reject the request with a 429 if the caller's IP is blocked.
    ///
    /// The rejection is itself logged as a failed attempt.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TooManyAttempts` when blocked.
    pub async fn guard_ip(
        &self,
        client: &ClientInfo,
        policy: &AttemptPolicy,
        email: &str,
    ) -> Result<(), AuthError> {
        let ip = client.ip_string();
        if self.is_ip_blocked(ip.as_deref(), policy).await? {
            tracing::warn!(
                ip = ip.as_deref().unwrap_or("-"),
                attempt_type = %policy.attempt_type,
                "Blocked by IP rate limit"
            );
            self.record(
                &NewSecurityAttempt::failure(policy.attempt_type, client, "too_many_attempts")
                    .email(email),
            )
            .await?;
            return Err(AuthError::TooManyAttempts(policy.message));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn record(&self, attempt: &NewSecurityAttempt) -> Result<(), RepositoryError> {
        self.attempts.record(attempt).await
    }

    /// Delete attempts past the retention period.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn purge(&self, days: u32) -> Result<u64, RepositoryError> {
        let deleted = self.attempts.delete_older_than(days).await?;
        tracing::info!(deleted, days, "Purged old security attempts");
        Ok(deleted)
    }
}
