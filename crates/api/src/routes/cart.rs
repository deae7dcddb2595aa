//! Cart route handlers.
//!
//! Signed-in callers work on their own active cart. Guests identify their
//! cart with the `X-Session-Key` header.

use axum::{Json, extract::State};
use tracing::instrument;

use crate::db::CartOwner;
use crate::error::{AppError, Result};
use crate::extract::ApiJson;
use crate::middleware::{OptionalAuth, RequireAuth, SessionKey};
use crate::models::{
    AddItemRequest, ApplyCouponRequest, CartView, CurrentUser, RemoveItemRequest,
    UpdateItemRequest,
};
use crate::services::cart::CartService;
use crate::state::AppState;

/// Resolve whose cart this request addresses.
fn owner<'k>(user: Option<&CurrentUser>, key: &'k SessionKey) -> Result<CartOwner<'k>> {
    match user {
        Some(user) => Ok(CartOwner::User(user.id)),
        None => key.required().map(CartOwner::Guest),
    }
}

pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    key: SessionKey,
) -> Result<Json<CartView>> {
    let owner = owner(user.as_ref(), &key)?;
    Ok(Json(CartService::new(state.pool()).view(owner).await?))
}

/// Add a product, merging into an existing line with the same variant.
#[instrument(skip_all)]
pub async fn add_item(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    key: SessionKey,
    ApiJson(req): ApiJson<AddItemRequest>,
) -> Result<Json<CartView>> {
    let owner = owner(user.as_ref(), &key)?;
    Ok(Json(CartService::new(state.pool()).add_item(owner, &req).await?))
}

/// Set a line's quantity. Zero removes the line.
#[instrument(skip_all)]
pub async fn update_item(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    key: SessionKey,
    ApiJson(req): ApiJson<UpdateItemRequest>,
) -> Result<Json<CartView>> {
    let owner = owner(user.as_ref(), &key)?;
    Ok(Json(
        CartService::new(state.pool())
            .update_item(owner, &req)
            .await?,
    ))
}

#[instrument(skip_all)]
pub async fn remove_item(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    key: SessionKey,
    ApiJson(req): ApiJson<RemoveItemRequest>,
) -> Result<Json<CartView>> {
    let owner = owner(user.as_ref(), &key)?;
    Ok(Json(
        CartService::new(state.pool())
            .remove_item(owner, &req)
            .await?,
    ))
}

pub async fn clear(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    key: SessionKey,
) -> Result<Json<CartView>> {
    let owner = owner(user.as_ref(), &key)?;
    Ok(Json(CartService::new(state.pool()).clear(owner).await?))
}

#[instrument(skip_all)]
pub async fn apply_coupon(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    key: SessionKey,
    ApiJson(req): ApiJson<ApplyCouponRequest>,
) -> Result<Json<CartView>> {
    let owner = owner(user.as_ref(), &key)?;
    Ok(Json(
        CartService::new(state.pool())
            .apply_coupon(owner, &req)
            .await?,
    ))
}

pub async fn remove_coupon(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    key: SessionKey,
) -> Result<Json<CartView>> {
    let owner = owner(user.as_ref(), &key)?;
    Ok(Json(CartService::new(state.pool()).remove_coupon(owner).await?))
}

/// Fold the guest cart named by `X-Session-Key` into the caller's cart.
#[instrument(skip_all)]
pub async fn merge(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    key: SessionKey,
) -> Result<Json<CartView>> {
    let session_key = key
        .0
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("Session key required to merge carts".into()))?;
    Ok(Json(
        CartService::new(state.pool())
            .merge(user.id, session_key)
            .await?,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use souk_core::{Email, SessionId, UserId};

    fn user() -> CurrentUser {
        CurrentUser {
            id: UserId::new(7),
            email: Email::parse("amine@example.ma").unwrap(),
            username: "amine".into(),
            session_id: SessionId::new(1),
            token_jti: "jti".into(),
        }
    }

    #[test]
    fn test_signed_in_user_ignores_session_key() {
        let key = SessionKey(Some("guest-key".into()));
        assert!(matches!(
            owner(Some(&user()), &key).unwrap(),
            CartOwner::User(id) if id == UserId::new(7)
        ));
    }

    #[test]
    fn test_guest_needs_session_key() {
        let key = SessionKey(Some("guest-key".into()));
        assert!(matches!(owner(None, &key).unwrap(), CartOwner::Guest("guest-key")));

        let err = owner(None, &SessionKey(None)).unwrap_err();
        assert_eq!(err.to_string(), "Session key required for guest users");
    }
}
