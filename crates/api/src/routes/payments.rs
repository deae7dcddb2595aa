//! Payment route handlers.
//!
//! Checkout turns the caller's cart into an order and starts the payment.
//! PayPal redirects the buyer back to `paypal/success` or `paypal/cancel`,
//! and posts asynchronous events to `webhooks/paypal`.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::instrument;

use crate::db::{OrderRepository, PaymentRepository, RepositoryError};
use crate::error::{AppError, Result};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::{RequireAuth, client_ip};
use crate::models::{CreatePaymentRequest, PayPalReturnQuery, PaymentMethod, PaymentView};
use crate::services::checkout::{CallbackResponse, CheckoutService, WebhookReceipt};
use crate::state::AppState;

fn service(state: &AppState) -> CheckoutService<'_> {
    CheckoutService::new(state.pool(), state.config(), state.paypal())
}

/// Enabled payment methods in display order.
pub async fn methods(State(state): State<AppState>) -> Result<Json<Vec<PaymentMethod>>> {
    Ok(Json(
        PaymentRepository::new(state.pool())
            .active_methods()
            .await?,
    ))
}

/// Check out the caller's active cart.
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(req): ApiJson<CreatePaymentRequest>,
) -> Result<impl IntoResponse> {
    let created = service(&state).create_payment(user.id, &req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn status(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(payment_id): ApiPath<String>,
) -> Result<Json<PaymentView>> {
    let payments = PaymentRepository::new(state.pool());
    let payment = payments
        .get_for_user(user.id, &payment_id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("Payment not found".into()),
            other => other.into(),
        })?;

    let order = OrderRepository::new(state.pool()).get(payment.order_id).await?;
    let method = payments.method(payment.payment_method_id).await?;
    let transactions = payments.transactions(payment.id).await?;
    Ok(Json(PaymentView::new(
        &payment,
        order.order_number,
        &method,
        transactions,
    )))
}

/// Buyer approved the payment on PayPal; capture it.
#[instrument(skip_all)]
pub async fn paypal_success(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PayPalReturnQuery>,
) -> Result<Json<CallbackResponse>> {
    let (Some(token), Some(payer_id)) = (query.token, query.payer_id) else {
        return Err(AppError::BadRequest(
            "Missing PayPal token or PayerID".into(),
        ));
    };
    Ok(Json(service(&state).paypal_success(&token, &payer_id).await?))
}

/// Buyer backed out on PayPal.
#[instrument(skip_all)]
pub async fn paypal_cancel(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PayPalReturnQuery>,
) -> Result<Json<CallbackResponse>> {
    let token = query
        .token
        .ok_or_else(|| AppError::BadRequest("Missing PayPal token".into()))?;
    Ok(Json(service(&state).paypal_cancel(&token).await?))
}

/// PayPal webhook receiver.
#[instrument(skip_all)]
pub async fn paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(event): ApiJson<serde_json::Value>,
) -> Result<Json<WebhookReceipt>> {
    let ip = client_ip(&headers).map(|ip| ip.to_string());
    Ok(Json(
        service(&state)
            .paypal_webhook(&headers, &event, ip)
            .await?,
    ))
}
