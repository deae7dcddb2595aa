//! Device sessions and the authenticated principal.

use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use souk_core::{Email, SessionId, UserId};

/// Maximum stored length of a device description (the raw user agent).
pub const MAX_DEVICE_INFO_LEN: usize = 500;

/// One signed-in device.
///
/// `jti` tracks the current refresh token; `access_jti` tracks the access
/// token issued with it. Both rotate on every refresh.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserSession {
    pub id: SessionId,
    pub user_id: UserId,
    pub session_key: String,
    pub device_info: String,
    pub ip_address: Option<String>,
    pub jti: String,
    pub access_jti: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl UserSession {
    /// Whether the session has been idle for longer than `idle_timeout`.
    #[must_use]
    pub fn is_expired(&self, idle_timeout: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity > idle_timeout
    }

    /// Whether the given token ID belongs to this session.
    #[must_use]
    pub fn owns_jti(&self, jti: &str) -> bool {
        self.jti == jti || self.access_jti.as_deref() == Some(jti)
    }
}

/// Session as listed to its owner.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: SessionId,
    pub device_info: String,
    pub ip_address: Option<String>,
    pub is_active: bool,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionView {
    #[must_use]
    pub fn new(session: &UserSession, current_jti: &str) -> Self {
        Self {
            id: session.id,
            device_info: session.device_info.clone(),
            ip_address: session.ip_address.clone(),
            is_active: session.is_active,
            is_current: session.owns_jti(current_jti),
            created_at: session.created_at,
            last_activity: session.last_activity,
        }
    }
}

/// The user behind a verified bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: Email,
    pub username: String,
    pub session_id: SessionId,
    /// JTI of the access token used on this request.
    pub token_jti: String,
}

/// Network details of the calling client.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<IpAddr>,
    pub user_agent: String,
}

impl ClientInfo {
    /// User agent truncated to fit `user_sessions.device_info`.
    #[must_use]
    pub fn device_info(&self) -> String {
        self.user_agent.chars().take(MAX_DEVICE_INFO_LEN).collect()
    }

    #[must_use]
    pub fn ip_string(&self) -> Option<String> {
        self.ip.map(|ip| ip.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn session(last_activity: DateTime<Utc>) -> UserSession {
        UserSession {
            id: SessionId::new(1),
            user_id: UserId::new(1),
            session_key: "k".repeat(40),
            device_info: "curl/8.0".into(),
            ip_address: Some("10.0.0.1".into()),
            jti: "refresh-jti".into(),
            access_jti: Some("access-jti".into()),
            is_active: true,
            created_at: last_activity,
            last_activity,
        }
    }

    #[test]
    fn test_session_expiry_uses_last_activity() {
        let now = Utc::now();
        let fresh = session(now - Duration::days(29));
        let stale = session(now - Duration::days(31));

        assert!(!fresh.is_expired(Duration::days(30), now));
        assert!(stale.is_expired(Duration::days(30), now));
    }

    #[test]
    fn test_view_marks_current_by_either_jti() {
        let s = session(Utc::now());
        assert!(SessionView::new(&s, "access-jti").is_current);
        assert!(SessionView::new(&s, "refresh-jti").is_current);
        assert!(!SessionView::new(&s, "other").is_current);
    }

    #[test]
    fn test_device_info_is_truncated() {
        let client = ClientInfo {
            ip: Some("192.0.2.4".parse().unwrap()),
            user_agent: "x".repeat(900),
        };
        assert_eq!(client.device_info().len(), MAX_DEVICE_INFO_LEN);
        assert_eq!(client.ip_string().as_deref(), Some("192.0.2.4"));
    }
}
