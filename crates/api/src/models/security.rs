//! Security attempt log entries.

use souk_core::{AttemptType, UserId};

use super::ClientInfo;

/// A row to append to `security_attempts`.
#[derive(Debug, Clone)]
pub struct NewSecurityAttempt {
    pub attempt_type: AttemptType,
    pub user_id: Option<UserId>,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub success: bool,
    pub email_attempted: String,
    pub failure_reason: String,
}

impl NewSecurityAttempt {
    #[must_use]
    pub fn success(attempt_type: AttemptType, client: &ClientInfo) -> Self {
        Self {
            attempt_type,
            user_id: None,
            ip_address: client.ip_string(),
            user_agent: client.device_info(),
            success: true,
            email_attempted: String::new(),
            failure_reason: String::new(),
        }
    }

    #[must_use]
    pub fn failure(attempt_type: AttemptType, client: &ClientInfo, reason: &str) -> Self {
        Self {
            success: false,
            failure_reason: reason.to_owned(),
            ..Self::success(attempt_type, client)
        }
    }

    #[must_use]
    pub const fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn email(mut self, email: &str) -> Self {
        email.clone_into(&mut self.email_attempted);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_builder_sets_reason_and_user() {
        let attempt = NewSecurityAttempt::failure(
            AttemptType::Login,
            &ClientInfo::default(),
            "invalid_credentials",
        )
        .user(UserId::new(9))
        .email("a@b.co");

        assert!(!attempt.success);
        assert_eq!(attempt.failure_reason, "invalid_credentials");
        assert_eq!(attempt.user_id, Some(UserId::new(9)));
        assert_eq!(attempt.email_attempted, "a@b.co");
        assert!(attempt.ip_address.is_none());
    }
}
