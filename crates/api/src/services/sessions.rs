//! Multi-device session lifecycle.

use chrono::{Duration, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::Serialize;
use sqlx::PgPool;

use souk_core::{SessionId, UserId};

use crate::config::SessionPolicy;
use crate::db::sessions::NewSession;
use crate::db::{RepositoryError, SessionRepository, TokenRepository};
use crate::models::{ClientInfo, UserSession};
use crate::services::auth::TokenPair;
use crate::services::security::{ATTEMPT_RETENTION_DAYS, SecurityService};

const SESSION_KEY_LEN: usize = 40;

/// Inactive sessions older than this are deleted by the cleanup job.
pub const INACTIVE_SESSION_RETENTION_DAYS: u32 = 90;

/// More than this many other IPs active in the last hour is suspicious.
const SUSPICIOUS_IP_THRESHOLD: i64 = 2;

/// Random alphanumeric key identifying a session row.
#[must_use]
pub fn generate_session_key() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_KEY_LEN)
        .map(char::from)
        .collect()
}

/// Payload of `GET /api/v1/auth/sessions/stats/`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub active_sessions: i64,
    pub total_sessions: i64,
    pub max_allowed: u32,
    pub expire_days: u32,
}

/// Rows touched by one cleanup run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub sessions_expired: u64,
    pub sessions_deleted: u64,
    pub blacklist_purged: u64,
    pub attempts_deleted: u64,
}

pub struct SessionService<'a> {
    sessions: SessionRepository<'a>,
    policy: &'a SessionPolicy,
}

impl<'a> SessionService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, policy: &'a SessionPolicy) -> Self {
        Self {
            sessions: SessionRepository::new(pool),
            policy,
        }
    }

    /// Record a new signed-in device for `tokens`, then trim the user's
    /// sessions down to the configured maximum.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the insert or the trim fails.
    pub async fn start(
        &self,
        user_id: UserId,
        tokens: &TokenPair,
        client: &ClientInfo,
    ) -> Result<UserSession, RepositoryError> {
        let session_key = generate_session_key();
        let device_info = client.device_info();
        let ip = client.ip_string();

        let session = self
            .sessions
            .create(&NewSession {
                user_id,
                session_key: &session_key,
                device_info: &device_info,
                ip_address: ip.as_deref(),
                jti: &tokens.refresh_claims.jti,
                access_jti: &tokens.access_claims.jti,
            })
            .await?;

        if self.policy.log_activities {
            tracing::info!(
                user_id = %user_id,
                session_id = %session.id,
                ip = ip.as_deref().unwrap_or("-"),
                "Session created"
            );
        }

        self.enforce_limit(user_id).await?;
        Ok(session)
    }

    /// Keep only the newest `max_sessions_per_user` active sessions.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn enforce_limit(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let max = self.policy.max_sessions_per_user;
        if max == 0 {
            return Ok(0);
        }

        let deactivated = self.sessions.deactivate_beyond_newest(user_id, max).await?;
        if deactivated > 0 && self.policy.log_activities {
            tracing::warn!(
                user_id = %user_id,
                deactivated,
                limit = max,
                "Session limit enforced, oldest sessions deactivated"
            );
        }
        Ok(deactivated)
    }

    /// Flag a login when the user has active sessions from more than two
    /// other IPs in the last hour.
    ///
    /// With `force_logout_on_suspicious` every session except `current` is
    /// terminated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn detect_suspicious(
        &self,
        user_id: UserId,
        current: SessionId,
        client: &ClientInfo,
    ) -> Result<bool, RepositoryError> {
        let ip = client.ip_string();
        let since = Utc::now() - Duration::hours(1);
        let other_ips = self
            .sessions
            .other_active_ips(user_id, ip.as_deref(), since)
            .await?;

        if other_ips <= SUSPICIOUS_IP_THRESHOLD {
            return Ok(false);
        }

        tracing::warn!(
            user_id = %user_id,
            ip = ip.as_deref().unwrap_or("-"),
            other_ips,
            "Suspicious session activity: active sessions from multiple IPs"
        );

        if self.policy.force_logout_on_suspicious {
            let terminated = self.sessions.deactivate_others(user_id, current).await?;
            tracing::warn!(user_id = %user_id, terminated, "Other sessions force-logged out");
        }
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, user_id: UserId) -> Result<Vec<UserSession>, RepositoryError> {
        self.sessions.list_active(user_id).await
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stats(&self, user_id: UserId) -> Result<SessionStats, RepositoryError> {
        let (active_sessions, total_sessions) = self.sessions.counts(user_id).await?;
        Ok(SessionStats {
            active_sessions,
            total_sessions,
            max_allowed: self.policy.max_sessions_per_user,
            expire_days: self.policy.expire_days,
        })
    }

    /// Terminate one of the user's own sessions.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the session belongs to someone else.
    pub async fn terminate(&self, user_id: UserId, id: SessionId) -> Result<(), RepositoryError> {
        if !self.sessions.deactivate(user_id, id).await? {
            return Err(RepositoryError::NotFound);
        }
        if self.policy.log_activities {
            tracing::info!(user_id = %user_id, session_id = %id, "Session terminated");
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn terminate_others(
        &self,
        user_id: UserId,
        current: SessionId,
    ) -> Result<u64, RepositoryError> {
        let count = self.sessions.deactivate_others(user_id, current).await?;
        if self.policy.log_activities {
            tracing::info!(user_id = %user_id, count, "Other sessions terminated");
        }
        Ok(count)
    }
}

/// Expire idle sessions, delete old inactive ones and purge the
/// refresh-token blacklist.
///
/// `retention_days` overrides the 90-day retention for deleted sessions.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if any statement fails.
pub async fn cleanup_sessions(
    pool: &PgPool,
    policy: &SessionPolicy,
    retention_days: Option<u32>,
) -> Result<CleanupReport, RepositoryError> {
    let sessions = SessionRepository::new(pool);
    Ok(CleanupReport {
        sessions_expired: sessions.deactivate_idle(policy.idle_timeout()).await?,
        sessions_deleted: sessions
            .delete_inactive_older_than(retention_days.unwrap_or(INACTIVE_SESSION_RETENTION_DAYS))
            .await?,
        blacklist_purged: TokenRepository::new(pool).purge_expired_blacklist().await?,
        attempts_deleted: 0,
    })
}

/// Session cleanup plus deletion of old security attempts.
///
/// `retention_days` overrides the 90-day retention for both deleted sessions
/// and attempts.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if any statement fails.
pub async fn run_cleanup(
    pool: &PgPool,
    policy: &SessionPolicy,
    retention_days: Option<u32>,
) -> Result<CleanupReport, RepositoryError> {
    let report = CleanupReport {
        attempts_deleted: SecurityService::new(pool)
            .purge(retention_days.unwrap_or(ATTEMPT_RETENTION_DAYS))
            .await?,
        ..cleanup_sessions(pool, policy, retention_days).await?
    };

    if policy.log_activities {
        tracing::info!(
            sessions_expired = report.sessions_expired,
            sessions_deleted = report.sessions_deleted,
            blacklist_purged = report.blacklist_purged,
            attempts_deleted = report.attempts_deleted,
            "Session cleanup finished"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_shape() {
        let key = generate_session_key();
        assert_eq!(key.len(), SESSION_KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, generate_session_key());
    }

    #[test]
    fn test_stats_serialize_policy_fields() {
        let stats = SessionStats {
            active_sessions: 2,
            total_sessions: 7,
            max_allowed: 5,
            expire_days: 30,
        };
        let json = serde_json::to_value(&stats).unwrap_or_default();
        assert_eq!(json["max_allowed"], 5);
        assert_eq!(json["expire_days"], 30);
    }
}
