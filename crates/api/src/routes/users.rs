//! Profile and address book of the signed-in user.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::instrument;

use souk_core::AddressId;

use crate::db::{AddressRepository, UserRepository};
use crate::error::{AppError, FieldErrors, Result};
use crate::extract::{ApiJson, ApiPath};
use crate::middleware::RequireAuth;
use crate::models::{
    Address, AddressInput, AddressPatch, MeResponse, ProfilePatch, ProfileResponse, UserPatch,
    UserResponse,
};
use crate::state::AppState;

const MAX_NAME_LEN: usize = 150;
const MAX_PHONE_LEN: usize = 32;
const MAX_BIO_LEN: usize = 500;

// =============================================================================
// Me
// =============================================================================

async fn me_response(state: &AppState, user_id: souk_core::UserId) -> Result<MeResponse> {
    let users = UserRepository::new(state.pool());
    let user = users
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let profile = users.get_or_create_profile(user_id).await?;
    let (addresses_count, default_address_id) =
        AddressRepository::new(state.pool()).summary(user_id).await?;

    Ok(MeResponse {
        user: UserResponse::from(&user),
        profile: ProfileResponse::from(&profile),
        addresses_count,
        default_address_id,
    })
}

pub async fn me(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<MeResponse>> {
    Ok(Json(me_response(&state, user.id).await?))
}

/// Update names, phone, locale and timezone.
#[instrument(skip_all)]
pub async fn update_me(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(mut patch): ApiJson<UserPatch>,
) -> Result<Json<MeResponse>> {
    let mut errors = FieldErrors::default();
    for (field, value) in [
        ("first_name", &mut patch.first_name),
        ("last_name", &mut patch.last_name),
        ("phone", &mut patch.phone),
        ("locale", &mut patch.locale),
        ("timezone", &mut patch.timezone),
    ] {
        if let Some(v) = value {
            *v = v.trim().to_owned();
            let max = if field == "phone" {
                MAX_PHONE_LEN
            } else {
                MAX_NAME_LEN
            };
            errors.max_len(field, v, max);
        }
    }
    errors.into_result()?;

    UserRepository::new(state.pool())
        .update(user.id, &patch)
        .await?;
    Ok(Json(me_response(&state, user.id).await?))
}

/// Update preferences on the loyalty profile.
#[instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(patch): ApiJson<ProfilePatch>,
) -> Result<Json<ProfileResponse>> {
    if let Some(bio) = &patch.bio {
        let mut errors = FieldErrors::default();
        errors.max_len("bio", bio, MAX_BIO_LEN);
        errors.into_result()?;
    }

    let profile = UserRepository::new(state.pool())
        .update_profile(user.id, &patch)
        .await?;
    Ok(Json(ProfileResponse::from(&profile)))
}

// =============================================================================
// Addresses
// =============================================================================

fn address_not_found(err: crate::db::RepositoryError) -> AppError {
    match err {
        crate::db::RepositoryError::NotFound => AppError::NotFound("Address not found".into()),
        other => other.into(),
    }
}

pub async fn list_addresses(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Address>>> {
    Ok(Json(AddressRepository::new(state.pool()).list(user.id).await?))
}

/// Add an address. The first one becomes the default.
#[instrument(skip_all)]
pub async fn create_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(mut input): ApiJson<AddressInput>,
) -> Result<impl IntoResponse> {
    input.normalize().into_result()?;
    let address = AddressRepository::new(state.pool())
        .create(user.id, &input)
        .await?;
    Ok((StatusCode::CREATED, Json(address)))
}

pub async fn get_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<AddressId>,
) -> Result<Json<Address>> {
    let address = AddressRepository::new(state.pool())
        .get(user.id, id)
        .await
        .map_err(address_not_found)?;
    Ok(Json(address))
}

#[instrument(skip_all)]
pub async fn update_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<AddressId>,
    ApiJson(patch): ApiJson<AddressPatch>,
) -> Result<Json<Address>> {
    let repo = AddressRepository::new(state.pool());
    let current = repo.get(user.id, id).await.map_err(address_not_found)?;

    let mut input = patch.apply_to(&current);
    input.normalize().into_result()?;

    let address = repo
        .update(user.id, id, &input)
        .await
        .map_err(address_not_found)?;
    Ok(Json(address))
}

pub async fn delete_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<AddressId>,
) -> Result<StatusCode> {
    AddressRepository::new(state.pool())
        .delete(user.id, id)
        .await
        .map_err(address_not_found)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Make an address the default, clearing the previous one.
pub async fn set_default_address(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<AddressId>,
) -> Result<Json<Address>> {
    let address = AddressRepository::new(state.pool())
        .set_default(user.id, id)
        .await
        .map_err(address_not_found)?;
    Ok(Json(address))
}
