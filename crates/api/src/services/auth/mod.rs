//! Authentication service.
//!
//! Password accounts with email verification, JWT access/refresh pairs
//! bound to device sessions, and password reset.

mod error;
mod tokens;

pub use error::AuthError;
pub use tokens::{Claims, TokenPair, TokenService, TokenType};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use souk_core::{AttemptType, Email, UserId};

use crate::config::ApiConfig;
use crate::db::tokens::{OneTimeToken, OneTimeTokenKind};
use crate::db::{RepositoryError, SessionRepository, TokenRepository, UserRepository};
use crate::error::{AppError, FieldErrors, Result};
use crate::models::{
    ChangePasswordRequest, ClientInfo, CurrentUser, LoginRequest, LoginResponse, NewSecurityAttempt,
    NewUser, PasswordResetConfirmRequest, RegisterRequest, TokenResponse, User, UserResponse,
};
use crate::services::security::{
    LOGIN_PER_IP, LOGIN_PER_USER, REGISTER_PER_IP, RESEND_PER_IP, SecurityService,
};
use crate::services::sessions::SessionService;

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

const MAX_USERNAME_LENGTH: usize = 150;

const COMMON_PASSWORDS: &[&str] = &[
    "password", "password1", "password123", "12345678", "123456789", "qwerty123", "iloveyou",
    "sunshine", "football", "baseball", "welcome1", "azertyuiop",
];

/// Authentication service.
pub struct AuthService<'a> {
    pool: &'a PgPool,
    config: &'a ApiConfig,
    tokens: &'a TokenService,
    users: UserRepository<'a>,
    one_time: TokenRepository<'a>,
    security: SecurityService<'a>,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, config: &'a ApiConfig, tokens: &'a TokenService) -> Self {
        Self {
            pool,
            config,
            tokens,
            users: UserRepository::new(pool),
            one_time: TokenRepository::new(pool),
            security: SecurityService::new(pool),
        }
    }

    fn sessions(&self) -> SessionService<'a> {
        SessionService::new(self.pool, &self.config.sessions)
    }

    // =========================================================================
    // Registration & verification
    // =========================================================================

    /// Create an inactive account and issue its email-verification token.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` with per-field messages, or
    /// `AuthError::TooManyAttempts` when the IP is rate limited.
    pub async fn register(&self, req: &RegisterRequest, client: &ClientInfo) -> Result<User> {
        self.security
            .guard_ip(client, &REGISTER_PER_IP, &req.email)
            .await?;

        let validated = self.validate_registration(req).await?;
        let (email, username) = match validated {
            Ok(ok) => ok,
            Err(errors) => {
                self.security
                    .record(
                        &NewSecurityAttempt::failure(
                            AttemptType::Register,
                            client,
                            "validation_error",
                        )
                        .email(&req.email),
                    )
                    .await?;
                return Err(AppError::Validation(errors));
            }
        };

        let new_user = NewUser {
            email,
            username,
            password_hash: hash_password(&req.password)?,
            first_name: req.first_name.trim().to_owned(),
            last_name: req.last_name.trim().to_owned(),
            phone: req.phone.trim().to_owned(),
        };
        let user = self.users.create(&new_user).await.map_err(|e| match e {
            RepositoryError::Conflict(field) => taken_error(&field),
            other => other.into(),
        })?;

        let token = self
            .one_time
            .issue(OneTimeTokenKind::EmailVerification, user.id)
            .await?;
        self.log_verification_link(&user, &token);

        self.security
            .record(
                &NewSecurityAttempt::success(AttemptType::Register, client)
                    .user(user.id)
                    .email(user.email.as_str()),
            )
            .await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    async fn validate_registration(
        &self,
        req: &RegisterRequest,
    ) -> Result<std::result::Result<(Email, String), FieldErrors>> {
        let mut errors = FieldErrors::default();

        errors.require("email", &req.email);
        errors.require("username", &req.username);
        errors.require("password", &req.password);
        errors.require("password_confirm", &req.password_confirm);
        errors.max_len("first_name", &req.first_name, 150);
        errors.max_len("last_name", &req.last_name, 150);
        errors.max_len("phone", &req.phone, 20);

        let email = if req.email.trim().is_empty() {
            None
        } else if let Ok(email) = Email::parse(&req.email) {
            Some(email)
        } else {
            errors.add("email", "Enter a valid email address.");
            None
        };

        let username = req.username.trim().to_lowercase();
        if !username.is_empty() {
            if username.chars().count() > MAX_USERNAME_LENGTH {
                errors.max_len("username", &username, MAX_USERNAME_LENGTH);
            } else if !is_valid_username(&username) {
                errors.add(
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            }
        }

        if !req.password.is_empty() {
            for message in validate_password(&req.password, email.as_ref(), &username) {
                errors.add("password", message);
            }
            if req.password != req.password_confirm && !req.password_confirm.is_empty() {
                errors.add("password_confirm", "Password fields didn't match.");
            }
        }

        // Uniqueness only matters once the values themselves are valid.
        if let Some(email) = &email
            && !errors.contains("email")
            && self.users.email_exists(email).await?
        {
            errors.add("email", taken_message("email"));
        }
        if !username.is_empty()
            && !errors.contains("username")
            && self.users.username_exists(&username).await?
        {
            errors.add("username", taken_message("username"));
        }

        Ok(match email {
            Some(email) if errors.is_empty() => Ok((email, username)),
            _ => Err(errors),
        })
    }

    /// Activate the account behind a verification token and sign it in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidVerificationToken`,
    /// `AuthError::VerificationTokenUsed` or `AuthError::VerificationTokenExpired`.
    pub async fn verify_email(&self, token: &str, client: &ClientInfo) -> Result<LoginResponse> {
        let token = self
            .find_one_time(OneTimeTokenKind::EmailVerification, token)
            .await?
            .ok_or(AuthError::InvalidVerificationToken)?;

        if token.is_used() {
            return Err(AuthError::VerificationTokenUsed.into());
        }
        if token.is_expired(Utc::now()) {
            return Err(AuthError::VerificationTokenExpired.into());
        }
        if !self
            .one_time
            .consume(OneTimeTokenKind::EmailVerification, token.id)
            .await?
        {
            return Err(AuthError::VerificationTokenUsed.into());
        }

        let user = self.users.activate(token.user_id).await?;
        let pair = self.sign_in(&user, client, AttemptType::EmailVerification).await?;

        tracing::info!(user_id = %user.id, "Email verified");
        Ok(LoginResponse {
            message: Some("Email verified successfully"),
            access: pair.access,
            refresh: pair.refresh,
            user: UserResponse::from(&user),
        })
    }

    /// Retire outstanding verification tokens and issue a fresh one.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownEmail` or `AuthError::AlreadyVerified`.
    pub async fn resend_verification(&self, email: &str, client: &ClientInfo) -> Result<()> {
        self.security.guard_ip(client, &RESEND_PER_IP, email).await?;

        if email.trim().is_empty() {
            return Err(FieldErrors::single("email", "This field is required."));
        }
        let Ok(parsed) = Email::parse(email) else {
            return Err(FieldErrors::single("email", "Enter a valid email address."));
        };

        let Some(user) = self.users.get_by_email(&parsed).await? else {
            self.security
                .record(
                    &NewSecurityAttempt::failure(
                        AttemptType::ResendVerification,
                        client,
                        "unknown_email",
                    )
                    .email(parsed.as_str()),
                )
                .await?;
            return Err(AuthError::UnknownEmail.into());
        };

        if user.is_active && user.is_email_verified() {
            return Err(AuthError::AlreadyVerified.into());
        }

        self.one_time
            .invalidate_unused(OneTimeTokenKind::EmailVerification, user.id)
            .await?;
        let token = self
            .one_time
            .issue(OneTimeTokenKind::EmailVerification, user.id)
            .await?;
        self.log_verification_link(&user, &token);

        self.security
            .record(
                &NewSecurityAttempt::success(AttemptType::ResendVerification, client)
                    .user(user.id)
                    .email(user.email.as_str()),
            )
            .await?;
        Ok(())
    }

    // =========================================================================
    // Login, refresh, logout
    // =========================================================================

    /// Authenticate with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TooManyAttempts`, `AuthError::InvalidCredentials`
    /// or `AuthError::AccountInactive`.
    pub async fn login(&self, req: &LoginRequest, client: &ClientInfo) -> Result<LoginResponse> {
        self.security
            .guard_ip(client, &LOGIN_PER_IP, &req.email)
            .await?;

        let mut missing = FieldErrors::default();
        missing.require("email", &req.email);
        missing.require("password", &req.password);
        missing.into_result()?;

        let user = match Email::parse(&req.email) {
            Ok(email) => self.users.get_by_email(&email).await?,
            Err(_) => None,
        };

        if let Some(user) = &user
            && self
                .security
                .is_user_blocked(user.id, &LOGIN_PER_USER)
                .await?
        {
            self.record_login_failure(client, &req.email, Some(user.id), "too_many_attempts")
                .await?;
            return Err(AuthError::TooManyAttempts(LOGIN_PER_USER.message).into());
        }

        let user_id = user.as_ref().map(|u| u.id);
        let Some(user) = user.filter(|u| verify_password(&req.password, &u.password_hash).is_ok())
        else {
            self.record_login_failure(client, &req.email, user_id, "invalid_credentials")
                .await?;
            return Err(AuthError::InvalidCredentials.into());
        };

        if !user.is_active {
            self.record_login_failure(client, &req.email, Some(user.id), "account_inactive")
                .await?;
            return Err(AuthError::AccountInactive.into());
        }

        let pair = self.sign_in(&user, client, AttemptType::Login).await?;
        self.users.touch_last_login(user.id).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginResponse {
            message: None,
            access: pair.access,
            refresh: pair.refresh,
            user: UserResponse::from(&user),
        })
    }

    async fn record_login_failure(
        &self,
        client: &ClientInfo,
        email: &str,
        user_id: Option<UserId>,
        reason: &str,
    ) -> std::result::Result<(), RepositoryError> {
        let mut attempt = NewSecurityAttempt::failure(AttemptType::Login, client, reason).email(email);
        attempt.user_id = user_id;
        self.security.record(&attempt).await
    }

    /// Issue tokens, open a device session and log the successful attempt.
    async fn sign_in(
        &self,
        user: &User,
        client: &ClientInfo,
        attempt_type: AttemptType,
    ) -> Result<TokenPair> {
        let pair = self.tokens.issue_pair(user.id)?;
        let sessions = self.sessions();
        let session = sessions.start(user.id, &pair, client).await?;
        sessions.detect_suspicious(user.id, session.id, client).await?;

        self.security
            .record(
                &NewSecurityAttempt::success(attempt_type, client)
                    .user(user.id)
                    .email(user.email.as_str()),
            )
            .await?;
        Ok(pair)
    }

    /// Rotate a refresh token into a new pair bound to the same session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for undecodable tokens and
    /// `AuthError::SessionTerminated` for blacklisted or orphaned ones.
    pub async fn refresh(&self, refresh: &str, client: &ClientInfo) -> Result<TokenResponse> {
        let claims = self.tokens.decode(refresh, TokenType::Refresh)?;

        if self.one_time.is_blacklisted(&claims.jti).await? {
            return Err(AuthError::SessionTerminated.into());
        }

        let sessions = SessionRepository::new(self.pool);
        let session = sessions
            .find_by_token(claims.sub, &claims.jti)
            .await?
            .filter(|s| s.is_active && s.jti == claims.jti)
            .ok_or(AuthError::SessionTerminated)?;

        if session.is_expired(self.config.sessions.idle_timeout(), Utc::now()) {
            return Err(AuthError::SessionExpired.into());
        }

        let user = self
            .users
            .get_by_id(claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::UserUnavailable)?;

        let pair = self.tokens.issue_pair(user.id)?;
        if !sessions
            .rotate(session.id, &pair.refresh_claims.jti, &pair.access_claims.jti)
            .await?
        {
            return Err(AuthError::SessionTerminated.into());
        }
        self.one_time
            .blacklist(&claims.jti, user.id, expiry(&claims))
            .await?;

        self.security
            .record(&NewSecurityAttempt::success(AttemptType::TokenRefresh, client).user(user.id))
            .await?;
        if self.config.sessions.log_activities {
            tracing::info!(user_id = %user.id, session_id = %session.id, "Session tokens rotated");
        }

        Ok(TokenResponse {
            access: pair.access,
            refresh: pair.refresh,
        })
    }

    /// End the caller's session and blacklist its refresh token.
    ///
    /// Never fails from the client's point of view: problems are logged.
    pub async fn logout(&self, user: &CurrentUser, refresh: Option<&str>) {
        let sessions = SessionRepository::new(self.pool);

        if let Some(claims) = refresh.and_then(|t| self.tokens.decode(t, TokenType::Refresh).ok())
            && claims.sub == user.id
        {
            if let Err(e) = self
                .one_time
                .blacklist(&claims.jti, user.id, expiry(&claims))
                .await
            {
                tracing::warn!(error = %e, "Failed to blacklist refresh token on logout");
            }
            match sessions.find_by_token(user.id, &claims.jti).await {
                Ok(Some(session)) if session.id != user.session_id => {
                    if let Err(e) = sessions.deactivate(user.id, session.id).await {
                        tracing::warn!(
                            error = %e,
                            session_id = %session.id,
                            "Failed to deactivate refresh session on logout"
                        );
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Failed to look up session on logout"),
            }
        }

        if let Err(e) = sessions.deactivate(user.id, user.session_id).await {
            tracing::warn!(error = %e, "Failed to deactivate session on logout");
        }
        if self.config.sessions.log_activities {
            tracing::info!(user_id = %user.id, session_id = %user.session_id, "User logged out");
        }
    }

    // =========================================================================
    // Passwords
    // =========================================================================

    /// # Errors
    ///
    /// Returns `AppError::Validation` when the current password is wrong or
    /// the new one is too weak.
    pub async fn change_password(
        &self,
        current: &CurrentUser,
        req: &ChangePasswordRequest,
    ) -> Result<()> {
        let user = self
            .users
            .get_by_id(current.id)
            .await?
            .ok_or(AuthError::UserUnavailable)?;

        let mut errors = FieldErrors::default();
        errors.require("current_password", &req.current_password);
        errors.require("new_password", &req.new_password);
        errors.into_result()?;

        if verify_password(&req.current_password, &user.password_hash).is_err() {
            return Err(FieldErrors::single(
                "current_password",
                "Current password is incorrect.",
            ));
        }
        check_new_password(
            &user,
            &req.new_password,
            req.new_password_confirm.as_deref(),
        )?;

        self.users
            .set_password_hash(user.id, &hash_password(&req.new_password)?)
            .await?;
        tracing::info!(user_id = %user.id, "Password changed");
        Ok(())
    }

    /// Issue a reset token for an active account. Unknown emails succeed
    /// silently.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Database` if the token cannot be stored.
    pub async fn request_password_reset(&self, email: &str, client: &ClientInfo) -> Result<()> {
        let Ok(parsed) = Email::parse(email) else {
            return Err(FieldErrors::single("email", "Enter a valid email address."));
        };

        let user = self.users.get_by_email(&parsed).await?.filter(|u| u.is_active);
        let mut attempt = NewSecurityAttempt::success(AttemptType::PasswordReset, client)
            .email(parsed.as_str());

        if let Some(user) = user {
            self.one_time
                .invalidate_unused(OneTimeTokenKind::PasswordReset, user.id)
                .await?;
            let token = self
                .one_time
                .issue(OneTimeTokenKind::PasswordReset, user.id)
                .await?;
            tracing::info!(
                user_id = %user.id,
                reset_token = %token.token,
                expires_at = %token.expires_at,
                "Password reset requested"
            );
            attempt = attempt.user(user.id);
        }

        self.security.record(&attempt).await?;
        Ok(())
    }

    /// Set a new password from a reset token and terminate every session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidResetToken` or `AppError::Validation`.
    pub async fn confirm_password_reset(
        &self,
        req: &PasswordResetConfirmRequest,
        client: &ClientInfo,
    ) -> Result<()> {
        let token = self
            .find_one_time(OneTimeTokenKind::PasswordReset, &req.token)
            .await?
            .filter(|t| !t.is_used() && !t.is_expired(Utc::now()))
            .ok_or(AuthError::InvalidResetToken)?;

        let user = self
            .users
            .get_by_id(token.user_id)
            .await?
            .ok_or(AuthError::InvalidResetToken)?;
        check_new_password(
            &user,
            &req.new_password,
            req.new_password_confirm.as_deref(),
        )?;

        if !self
            .one_time
            .consume(OneTimeTokenKind::PasswordReset, token.id)
            .await?
        {
            return Err(AuthError::InvalidResetToken.into());
        }

        self.users
            .set_password_hash(user.id, &hash_password(&req.new_password)?)
            .await?;
        let terminated = SessionRepository::new(self.pool)
            .deactivate_all(user.id)
            .await?;

        self.security
            .record(&NewSecurityAttempt::success(AttemptType::PasswordReset, client).user(user.id))
            .await?;
        tracing::info!(user_id = %user.id, terminated, "Password reset completed");
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn find_one_time(
        &self,
        kind: OneTimeTokenKind,
        raw: &str,
    ) -> std::result::Result<Option<OneTimeToken>, RepositoryError> {
        let Ok(token) = Uuid::parse_str(raw.trim()) else {
            return Ok(None);
        };
        self.one_time.find(kind, token).await
    }

    fn log_verification_link(&self, user: &User, token: &OneTimeToken) {
        let link = self
            .config
            .absolute_url(&format!("/api/v1/auth/verify-email/{}/", token.token));
        tracing::info!(
            user_id = %user.id,
            email = %user.email,
            verify_url = %link,
            expires_at = %token.expires_at,
            "Email verification link issued"
        );
    }
}

fn expiry(claims: &Claims) -> DateTime<Utc> {
    DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now)
}

fn taken_message(field: &str) -> String {
    format!("A user with this {field} already exists.")
}

/// Validation error for an email or username that lost a registration race.
fn taken_error(field: &str) -> AppError {
    FieldErrors::single(field, taken_message(field))
}

fn is_valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

fn check_new_password(user: &User, password: &str, confirm: Option<&str>) -> Result<()> {
    let mut errors = FieldErrors::default();
    errors.require("new_password", password);
    for message in validate_password(password, Some(&user.email), &user.username) {
        errors.add("new_password", message);
    }
    if let Some(confirm) = confirm
        && confirm != password
    {
        errors.add("new_password_confirm", "Password fields didn't match.");
    }
    errors.into_result()
}

/// Password strength rules. Returns one message per failed rule.
#[must_use]
pub fn validate_password(password: &str, email: Option<&Email>, username: &str) -> Vec<String> {
    let mut messages = Vec::new();
    if password.is_empty() {
        return messages;
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        messages.push(format!(
            "This password is too short. It must contain at least {MIN_PASSWORD_LENGTH} characters."
        ));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        messages.push("This password is entirely numeric.".to_owned());
    }

    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        messages.push("This password is too common.".to_owned());
    }

    let similar_to_email =
        email.is_some_and(|e| lowered == e.as_str() || lowered == e.local_part());
    if similar_to_email {
        messages.push("The password is too similar to the email.".to_owned());
    } else if !username.is_empty() && lowered == username.to_lowercase() {
        messages.push("The password is too similar to the username.".to_owned());
    }

    messages
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> std::result::Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> std::result::Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_conflict_names_the_taken_field() {
        let AppError::Validation(errors) = taken_error("username") else {
            panic!("expected a validation error");
        };
        assert_eq!(
            errors.get("username"),
            Some(&["A user with this username already exists.".to_owned()][..])
        );
        assert!(!errors.contains("email"));
    }

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash).is_ok());
        assert!(matches!(
            verify_password("wrong", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_verify_against_garbage_hash() {
        assert!(verify_password("anything", "not-a-hash").is_err());
    }

    #[test]
    fn test_password_rules() {
        let email = Email::parse("youssef@example.ma").unwrap();

        assert!(validate_password("Str0ng-Enough", Some(&email), "youssef").is_empty());

        let short = validate_password("abc", Some(&email), "youssef");
        assert!(short.iter().any(|m| m.contains("too short")));

        let numeric = validate_password("1234567890", Some(&email), "youssef");
        assert!(numeric.iter().any(|m| m.contains("entirely numeric")));

        let same_as_user = validate_password("Youssef2024", None, "youssef2024");
        assert!(same_as_user.iter().any(|m| m.contains("username")));

        let same_as_email = validate_password("youssef@example.ma", Some(&email), "x");
        assert!(same_as_email.iter().any(|m| m.contains("email")));

        let common = validate_password("Password123", None, "x");
        assert!(common.iter().any(|m| m.contains("too common")));
    }

    #[test]
    fn test_username_charset() {
        assert!(is_valid_username("amine.b+shop@ma"));
        assert!(!is_valid_username("amine b"));
        assert!(!is_valid_username("amine/b"));
    }

    #[test]
    fn test_expiry_from_claims() {
        let claims = Claims {
            sub: UserId::new(1),
            jti: "j".into(),
            token_type: TokenType::Refresh,
            iat: 1_700_000_000,
            exp: 1_700_604_800,
        };
        assert_eq!(expiry(&claims).timestamp(), 1_700_604_800);
    }
}
