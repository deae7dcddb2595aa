//! Device session repository.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use souk_core::{SessionId, UserId};

use super::RepositoryError;
use crate::models::UserSession;

const SESSION_COLUMNS: &str = "id, user_id, session_key, device_info, ip_address, jti, \
     access_jti, is_active, created_at, last_activity";

/// Fields of a session row at creation.
#[derive(Debug, Clone)]
pub struct NewSession<'s> {
    pub user_id: UserId,
    pub session_key: &'s str,
    pub device_info: &'s str,
    pub ip_address: Option<&'s str>,
    pub jti: &'s str,
    pub access_jti: &'s str,
}

/// Repository for `user_sessions`.
pub struct SessionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SessionRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` on a session key or JTI collision.
    pub async fn create(&self, new: &NewSession<'_>) -> Result<UserSession, RepositoryError> {
        let session = sqlx::query_as::<_, UserSession>(&format!(
            r"
            INSERT INTO user_sessions
                (user_id, session_key, device_info, ip_address, jti, access_jti)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SESSION_COLUMNS}
            "
        ))
        .bind(new.user_id)
        .bind(new.session_key)
        .bind(new.device_info)
        .bind(new.ip_address)
        .bind(new.jti)
        .bind(new.access_jti)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "session"))?;
        Ok(session)
    }

    /// Session of `user_id` whose refresh or access JTI equals `jti`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_token(
        &self,
        user_id: UserId,
        jti: &str,
    ) -> Result<Option<UserSession>, RepositoryError> {
        let session = sqlx::query_as::<_, UserSession>(&format!(
            r"
            SELECT {SESSION_COLUMNS} FROM user_sessions
            WHERE user_id = $1 AND (jti = $2 OR access_jti = $2)
            ORDER BY is_active DESC, last_activity DESC
            LIMIT 1
            "
        ))
        .bind(user_id)
        .bind(jti)
        .fetch_optional(self.pool)
        .await?;
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn touch(&self, id: SessionId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE user_sessions SET last_activity = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Point an active session at a freshly issued token pair.
    ///
    /// Returns `false` when the session is no longer active.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn rotate(
        &self,
        id: SessionId,
        jti: &str,
        access_jti: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE user_sessions
            SET jti = $2, access_jti = $3, last_activity = NOW()
            WHERE id = $1 AND is_active
            ",
        )
        .bind(id)
        .bind(jti)
        .bind(access_jti)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Active sessions of a user, most recently used first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self, user_id: UserId) -> Result<Vec<UserSession>, RepositoryError> {
        let sessions = sqlx::query_as::<_, UserSession>(&format!(
            r"
            SELECT {SESSION_COLUMNS} FROM user_sessions
            WHERE user_id = $1 AND is_active
            ORDER BY last_activity DESC, id DESC
            "
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(sessions)
    }

    /// `(active, total)` session counts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn counts(&self, user_id: UserId) -> Result<(i64, i64), RepositoryError> {
        let counts: (i64, i64) = sqlx::query_as(
            r"
            SELECT COUNT(*) FILTER (WHERE is_active), COUNT(*)
            FROM user_sessions WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(counts)
    }

    /// Deactivate one of the user's sessions. `false` if it is not theirs.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn deactivate(&self, user_id: UserId, id: SessionId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE user_sessions SET is_active = FALSE WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Deactivate every active session except `keep`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn deactivate_others(
        &self,
        user_id: UserId,
        keep: SessionId,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE user_sessions SET is_active = FALSE
            WHERE user_id = $1 AND id <> $2 AND is_active
            ",
        )
        .bind(user_id)
        .bind(keep)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn deactivate_all(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE user_sessions SET is_active = FALSE WHERE user_id = $1 AND is_active",
        )
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Keep the `keep` most recently used active sessions, deactivate the rest.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn deactivate_beyond_newest(
        &self,
        user_id: UserId,
        keep: u32,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE user_sessions SET is_active = FALSE
            WHERE user_id = $1 AND is_active AND id NOT IN (
                SELECT id FROM user_sessions
                WHERE user_id = $1 AND is_active
                ORDER BY last_activity DESC, id DESC
                LIMIT $2
            )
            ",
        )
        .bind(user_id)
        .bind(i64::from(keep))
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Distinct IPs, other than `ip`, with sessions active since `since`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn other_active_ips(
        &self,
        user_id: UserId,
        ip: Option<&str>,
        since: DateTime<Utc>,
    ) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(
            r"
            SELECT COUNT(DISTINCT ip_address) FROM user_sessions
            WHERE user_id = $1 AND is_active AND last_activity >= $3
              AND ip_address IS NOT NULL
              AND ip_address IS DISTINCT FROM $2
            ",
        )
        .bind(user_id)
        .bind(ip)
        .bind(since)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// Deactivate sessions idle for longer than `idle`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn deactivate_idle(&self, idle: Duration) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE user_sessions SET is_active = FALSE WHERE is_active AND last_activity < $1",
        )
        .bind(Utc::now() - idle)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete inactive sessions last used more than `days` ago.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_inactive_older_than(&self, days: u32) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM user_sessions WHERE NOT is_active AND last_activity < $1",
        )
        .bind(Utc::now() - Duration::days(i64::from(days)))
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
