//! Order history of the signed-in user.

use axum::{Json, extract::State};
use tracing::instrument;

use crate::db::{OrderRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::extract::ApiPath;
use crate::middleware::RequireAuth;
use crate::models::{OrderDetail, OrderSummary};
use crate::state::AppState;

fn order_not_found(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("Order not found".into()),
        other => other.into(),
    }
}

async fn detail_of(repo: &OrderRepository<'_>, order: crate::models::Order) -> Result<OrderDetail> {
    let items = repo.items(order.id).await?;
    let addresses = repo.addresses(order.id).await?;
    Ok(OrderDetail::new(order, items, addresses))
}

/// Orders newest first.
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<OrderSummary>>> {
    Ok(Json(
        OrderRepository::new(state.pool())
            .list_for_user(user.id)
            .await?,
    ))
}

pub async fn detail(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(order_number): ApiPath<String>,
) -> Result<Json<OrderDetail>> {
    let repo = OrderRepository::new(state.pool());
    let order = repo
        .get_for_user(user.id, &order_number)
        .await
        .map_err(order_not_found)?;
    Ok(Json(detail_of(&repo, order).await?))
}

/// Cancel a pending or confirmed order that has not been paid.
#[instrument(skip_all)]
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(order_number): ApiPath<String>,
) -> Result<Json<OrderDetail>> {
    let repo = OrderRepository::new(state.pool());
    let order = repo
        .get_for_user(user.id, &order_number)
        .await
        .map_err(order_not_found)?;

    if !order.can_be_cancelled() {
        return Err(AppError::BadRequest(format!(
            "Order cannot be cancelled in status {}",
            order.status
        )));
    }

    let cancelled = repo.cancel(order.id).await?.ok_or_else(|| {
        AppError::BadRequest("Order can no longer be cancelled".into())
    })?;
    tracing::info!(user_id = %user.id, order_number = %order_number, "Order cancelled by customer");
    Ok(Json(detail_of(&repo, cancelled).await?))
}
