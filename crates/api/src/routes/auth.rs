//! Authentication route handlers.
//!
//! Registration, email verification, login, token refresh, logout and
//! password management. Login and refresh open or rotate a device session.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use tracing::instrument;

use crate::error::Result;
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::RequireAuth;
use crate::models::{
    ChangePasswordRequest, ClientInfo, EmailRequest, LoginRequest, LoginResponse, LogoutRequest,
    MessageResponse, PasswordResetConfirmRequest, RefreshRequest, RegisterRequest, TokenResponse,
    UserResponse,
};
use crate::services::auth::AuthService;
use crate::state::AppState;

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: UserResponse,
}

fn service(state: &AppState) -> AuthService<'_> {
    AuthService::new(state.pool(), state.config(), state.tokens())
}

// =============================================================================
// Registration & Verification
// =============================================================================

/// Create an inactive account and log its verification link.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let user = service(&state).register(&req, &client).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Please check your email to verify your account.",
            user: UserResponse::from(&user),
        }),
    ))
}

/// Activate the account behind a verification token and sign it in.
///
/// Accepts both GET (link clicked from an email) and POST.
#[instrument(skip_all)]
pub async fn verify_email(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiPath(token): ApiPath<String>,
) -> Result<Json<LoginResponse>> {
    Ok(Json(service(&state).verify_email(&token, &client).await?))
}

#[instrument(skip_all)]
pub async fn resend_verification(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(req): ApiJson<EmailRequest>,
) -> Result<Json<MessageResponse>> {
    service(&state)
        .resend_verification(&req.email, &client)
        .await?;
    Ok(Json(MessageResponse::new("Verification email has been sent.")))
}

// =============================================================================
// Login & Tokens
// =============================================================================

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    Ok(Json(service(&state).login(&req, &client).await?))
}

/// Rotate a refresh token. The session keeps its row but takes the new JTIs.
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> Result<Json<TokenResponse>> {
    Ok(Json(service(&state).refresh(&req.refresh, &client).await?))
}

/// End the current session. Always succeeds for an authenticated caller.
#[instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    body: Bytes,
) -> Json<MessageResponse> {
    // The body is optional; a missing or malformed one still logs out.
    let refresh = serde_json::from_slice::<LogoutRequest>(&body)
        .ok()
        .and_then(|req| req.refresh);
    service(&state).logout(&user, refresh.as_deref()).await;
    Json(MessageResponse::new("Successfully logged out."))
}

// =============================================================================
// Passwords
// =============================================================================

#[instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>> {
    service(&state).change_password(&user, &req).await?;
    Ok(Json(MessageResponse::new("Password changed successfully.")))
}

/// Start a password reset. Responds the same whether or not the email is known.
#[instrument(skip_all)]
pub async fn password_reset(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(req): ApiJson<EmailRequest>,
) -> Result<Json<MessageResponse>> {
    service(&state)
        .request_password_reset(&req.email, &client)
        .await?;
    Ok(Json(MessageResponse::new(
        "If an account exists for this email, a password reset link has been sent.",
    )))
}

#[instrument(skip_all)]
pub async fn password_reset_confirm(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(req): ApiJson<PasswordResetConfirmRequest>,
) -> Result<Json<MessageResponse>> {
    service(&state)
        .confirm_password_reset(&req, &client)
        .await?;
    Ok(Json(MessageResponse::new(
        "Password has been reset successfully. Please log in again.",
    )))
}
