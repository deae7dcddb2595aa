//! Device session management for the signed-in user.

use axum::{Json, extract::State};
use serde::Serialize;

use souk_core::SessionId;

use crate::db::RepositoryError;
use crate::error::{AppError, Result};
use crate::extract::ApiPath;
use crate::middleware::RequireAuth;
use crate::models::{MessageResponse, SessionView};
use crate::services::sessions::{SessionService, SessionStats};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub count: usize,
    pub sessions: Vec<SessionView>,
}

#[derive(Debug, Serialize)]
pub struct DeactivateOthersResponse {
    pub message: String,
    pub deactivated_count: u64,
}

fn service(state: &AppState) -> SessionService<'_> {
    SessionService::new(state.pool(), &state.config().sessions)
}

/// Active sessions, with the one making this request flagged `is_current`.
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<SessionList>> {
    let sessions: Vec<SessionView> = service(&state)
        .list(user.id)
        .await?
        .iter()
        .map(|s| SessionView::new(s, &user.token_jti))
        .collect();
    Ok(Json(SessionList {
        count: sessions.len(),
        sessions,
    }))
}

pub async fn stats(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<SessionStats>> {
    Ok(Json(service(&state).stats(user.id).await?))
}

pub async fn deactivate(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<SessionId>,
) -> Result<Json<MessageResponse>> {
    service(&state)
        .terminate(user.id, id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("Session not found".into()),
            other => other.into(),
        })?;
    Ok(Json(MessageResponse::new("Session deactivated successfully")))
}

/// Sign out every device except this one.
pub async fn deactivate_others(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<DeactivateOthersResponse>> {
    let count = service(&state)
        .terminate_others(user.id, user.session_id)
        .await?;
    Ok(Json(DeactivateOthersResponse {
        message: format!("{count} other sessions deactivated successfully"),
        deactivated_count: count,
    }))
}
