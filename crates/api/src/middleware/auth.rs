//! Authentication extractors.
//!
//! Bearer access tokens are only honoured while the device session they were
//! issued with is still active and has not sat idle past the expiry window.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::Utc;

use crate::db::{SessionRepository, UserRepository};
use crate::error::{AppError, set_sentry_user};
use crate::models::CurrentUser;
use crate::services::auth::{AuthError, TokenType};
use crate::state::AppState;

/// Extractor that requires a valid access token with a live session.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.username)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

/// Extractor that authenticates when a bearer token is sent.
///
/// Requests without an `Authorization` header are treated as guests. A token
/// that is present but invalid is still rejected.
pub struct OptionalAuth(pub Option<CurrentUser>);

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn authenticate(state: &AppState, token: &str) -> Result<CurrentUser, AuthError> {
    let claims = state.tokens().decode(token, TokenType::Access)?;

    let user = UserRepository::new(state.pool())
        .get_by_id(claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AuthError::UserUnavailable)?;

    let sessions = SessionRepository::new(state.pool());
    let session = sessions
        .find_by_token(user.id, &claims.jti)
        .await?
        .ok_or(AuthError::NoActiveSession)?;

    if !session.is_active {
        return Err(AuthError::SessionTerminated);
    }

    if session.is_expired(state.config().sessions.idle_timeout(), Utc::now()) {
        sessions.deactivate(user.id, session.id).await?;
        tracing::info!(user_id = %user.id, session_id = %session.id, "Idle session expired");
        return Err(AuthError::SessionExpired);
    }

    sessions.touch(session.id).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));

    Ok(CurrentUser {
        id: user.id,
        email: user.email,
        username: user.username,
        session_id: session.id,
        token_jti: claims.jti,
    })
}

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingCredentials)?;
        Ok(Self(authenticate(state, token).await?))
    }
}

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts) {
            Some(token) => Ok(Self(Some(authenticate(state, token).await?))),
            None => Ok(Self(None)),
        }
    }
}
