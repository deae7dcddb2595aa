//! Authentication error types.

use axum::http::StatusCode;
use thiserror::Error;

use crate::db::RepositoryError;

/// Errors that can occur during authentication and account operations.
///
/// The display text of client-facing variants is the message returned in
/// the response body.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization: Bearer` header.
    #[error("Authentication credentials were not provided.")]
    MissingCredentials,

    /// Bad signature, expired, malformed, or wrong token type.
    #[error("Invalid token")]
    InvalidToken,

    /// Token owner no longer exists or has been deactivated.
    #[error("User not found or inactive")]
    UserUnavailable,

    /// The session behind the token was deactivated.
    #[error("Session has been terminated")]
    SessionTerminated,

    /// The session behind the token sat idle past the expiry window.
    #[error("Session has expired")]
    SessionExpired,

    /// No session record carries the token's JTI.
    #[error("No active session found for this token")]
    NoActiveSession,

    /// Wrong email or password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Account exists but has not verified its email.
    #[error("User account is not active. Please verify your email.")]
    AccountInactive,

    /// Too many failed attempts inside the rate-limit window.
    #[error("{0}")]
    TooManyAttempts(&'static str),

    #[error("Invalid verification token")]
    InvalidVerificationToken,

    #[error("Verification token has already been used")]
    VerificationTokenUsed,

    #[error("Verification token has expired")]
    VerificationTokenExpired,

    #[error("Email is already verified")]
    AlreadyVerified,

    #[error("No account found with this email address")]
    UnknownEmail,

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    /// Password hashing failed.
    #[error("password hashing error")]
    PasswordHash,

    /// Token signing failed.
    #[error("token encoding error: {0}")]
    TokenEncoding(#[from] jsonwebtoken::errors::Error),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl AuthError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredentials
            | Self::InvalidToken
            | Self::UserUnavailable
            | Self::SessionTerminated
            | Self::SessionExpired
            | Self::NoActiveSession => StatusCode::UNAUTHORIZED,
            Self::InvalidCredentials
            | Self::AccountInactive
            | Self::InvalidVerificationToken
            | Self::VerificationTokenUsed
            | Self::VerificationTokenExpired
            | Self::AlreadyVerified
            | Self::UnknownEmail
            | Self::InvalidResetToken => StatusCode::BAD_REQUEST,
            Self::TooManyAttempts(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::PasswordHash | Self::TokenEncoding(_) | Self::Repository(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_errors_are_unauthorized() {
        for err in [
            AuthError::SessionTerminated,
            AuthError::SessionExpired,
            AuthError::NoActiveSession,
            AuthError::InvalidToken,
        ] {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_login_failures_are_bad_requests() {
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "Invalid email or password"
        );
        assert_eq!(AuthError::AccountInactive.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AuthError::TooManyAttempts("slow down").status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
