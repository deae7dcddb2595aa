//! Cart → order → payment checkout and the PayPal callbacks.
//!
//! The order, its lines and the PENDING payment are written in one
//! database transaction. Talking to PayPal happens after that commit, so a
//! provider failure is undone with a compensating transaction that deletes
//! the order and hands the cart back.

use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use thiserror::Error;

use souk_core::{PaymentId, PaymentProvider, PaymentStatus, TransactionAction, UserId};

use crate::config::ApiConfig;
use crate::db::orders::CheckoutInput;
use crate::db::payments::{NewWebhook, webhook_action};
use crate::db::{CartOwner, CartRepository, OrderRepository, PaymentRepository, RepositoryError};
use crate::error::{FieldErrors, add_breadcrumb};
use crate::models::{
    CreatePaymentRequest, NewPaymentTransaction, Order, Payment, PaymentMethod,
};
use crate::paypal::{NewPayPalOrder, PayPalClient, PayPalError, WebhookHeaders};

pub const PAYPAL_SUCCESS_PATH: &str = "/api/v1/payments/paypal/success/";
pub const PAYPAL_CANCEL_PATH: &str = "/api/v1/payments/paypal/cancel/";

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("Payment method not available")]
    MethodUnavailable,

    #[error("No active cart found")]
    NoActiveCart,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Payment not found")]
    PaymentNotFound,

    #[error("Payment capture failed: {0}")]
    CaptureFailed(String),

    #[error("Payment can no longer be cancelled")]
    NotCancellable,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("payment provider error: {0}")]
    Provider(#[from] PayPalError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Body of a 201 from `POST /api/v1/payments/create/`.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedPayment {
    pub payment_id: String,
    pub order_number: String,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paypal_order_id: Option<String>,
    pub message: String,
    pub next_action: &'static str,
}

/// Body of the PayPal return/cancel callbacks.
#[derive(Debug, Clone, Serialize)]
pub struct CallbackResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl CallbackResponse {
    fn new(message: &'static str, payment: Option<&Payment>) -> Self {
        Self {
            success: true,
            message,
            payment_id: payment.map(|p| p.reference.clone()),
            order_number: None,
            amount: None,
            currency: None,
        }
    }
}

/// What happened to a delivered webhook.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookReceipt {
    pub received: bool,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
}

pub struct CheckoutService<'a> {
    config: &'a ApiConfig,
    paypal: Option<&'a PayPalClient>,
    carts: CartRepository<'a>,
    orders: OrderRepository<'a>,
    payments: PaymentRepository<'a>,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        config: &'a ApiConfig,
        paypal: Option<&'a PayPalClient>,
    ) -> Self {
        Self {
            config,
            paypal,
            carts: CartRepository::new(pool),
            orders: OrderRepository::new(pool),
            payments: PaymentRepository::new(pool),
        }
    }

    /// Convert the user's active cart into an order and start its payment.
    ///
    /// # Errors
    ///
    /// Returns the matching `CheckoutError` for bad input, a missing or empty
    /// cart, or an unavailable method. Returns `CheckoutError::Provider` after
    /// rolling the order back when PayPal refuses the payment.
    pub async fn create_payment(
        &self,
        user_id: UserId,
        req: &CreatePaymentRequest,
    ) -> Result<CreatedPayment, CheckoutError> {
        let mut errors = FieldErrors::default();
        errors.require("payment_method", &req.payment_method);
        req.shipping_address
            .validate_into("shipping_address", &mut errors);
        if let Some(billing) = &req.billing_address {
            billing.validate_into("billing_address", &mut errors);
        }
        if !errors.is_empty() {
            return Err(CheckoutError::Validation(errors));
        }

        let provider: PaymentProvider = req
            .payment_method
            .parse()
            .map_err(|_| CheckoutError::MethodUnavailable)?;
        let method = self
            .payments
            .active_method(provider)
            .await?
            .ok_or(CheckoutError::MethodUnavailable)?;

        let cart = self
            .carts
            .find_active(CartOwner::User(user_id))
            .await?
            .ok_or(CheckoutError::NoActiveCart)?;
        if self.carts.items(cart.id).await?.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let shipping = &req.shipping_address;
        let billing = req.billing_address.as_ref().unwrap_or(shipping);
        let (order, payment) = self
            .orders
            .create_from_cart(&CheckoutInput {
                cart_id: cart.id,
                user_id,
                payment_method_id: method.id,
                shipping,
                billing,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(what) if what == "empty cart" => CheckoutError::EmptyCart,
                RepositoryError::Conflict(_) => CheckoutError::NoActiveCart,
                other => other.into(),
            })?;

        tracing::info!(
            user_id = %user_id,
            order_number = %order.order_number,
            payment_id = %payment.reference,
            amount = %payment.amount,
            provider = %method.provider,
            "Order created from cart"
        );
        add_breadcrumb(
            "checkout",
            "Order created",
            Some(&[
                ("order", order.order_number.as_str()),
                ("payment", payment.reference.as_str()),
            ]),
        );

        match method.provider {
            PaymentProvider::Paypal => match self.start_paypal(&order, &payment, &method).await {
                Ok(created) => Ok(created),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        order_number = %order.order_number,
                        "PayPal payment creation failed, rolling back checkout"
                    );
                    if let Err(rollback) = self.orders.rollback_checkout(order.id, cart.id).await {
                        tracing::error!(
                            error = %rollback,
                            order_number = %order.order_number,
                            "Checkout rollback failed"
                        );
                    }
                    Err(e)
                }
            },
            _ => {
                let message = format!("{} payment created", method.display_name);
                self.payments
                    .log_transaction(
                        payment.id,
                        &NewPaymentTransaction::ok(TransactionAction::Created, Some(payment.amount))
                            .notes(&message),
                    )
                    .await?;
                Ok(CreatedPayment {
                    payment_id: payment.reference,
                    order_number: order.order_number,
                    status: payment.status,
                    amount: payment.amount,
                    currency: payment.currency,
                    provider: method.display_name,
                    approval_url: None,
                    paypal_order_id: None,
                    message,
                    next_action: "redirect_to_provider",
                })
            }
        }
    }

    async fn start_paypal(
        &self,
        order: &Order,
        payment: &Payment,
        method: &PaymentMethod,
    ) -> Result<CreatedPayment, CheckoutError> {
        let client = self.paypal.ok_or(PayPalError::NotConfigured("client"))?;
        let return_url = self.config.absolute_url(PAYPAL_SUCCESS_PATH);
        let cancel_url = self.config.absolute_url(PAYPAL_CANCEL_PATH);

        let paypal_order = client
            .create_order(&NewPayPalOrder {
                reference_id: &order.order_number,
                amount: payment.amount,
                currency: &payment.currency,
                return_url: &return_url,
                cancel_url: &cancel_url,
            })
            .await?;

        let updated = self
            .payments
            .mark_processing(
                payment.id,
                &paypal_order.id,
                &paypal_order.raw,
                &return_url,
                &cancel_url,
                &NewPaymentTransaction::ok(TransactionAction::Created, Some(payment.amount))
                    .provider(&paypal_order.id, paypal_order.raw.clone())
                    .notes("PayPal order created successfully"),
            )
            .await
            .inspect_err(|e| {
                tracing::error!(
                    error = %e,
                    paypal_order_id = %paypal_order.id,
                    "Could not record PayPal order; it will expire unapproved"
                );
            })?;

        tracing::info!(
            payment_id = %updated.reference,
            paypal_order_id = %paypal_order.id,
            "PayPal payment created"
        );

        Ok(CreatedPayment {
            payment_id: updated.reference,
            order_number: order.order_number.clone(),
            status: updated.status,
            amount: updated.amount,
            currency: updated.currency,
            provider: method.display_name.clone(),
            approval_url: paypal_order.approval_url().map(ToOwned::to_owned),
            paypal_order_id: Some(paypal_order.id),
            message: "PayPal payment created successfully".to_owned(),
            next_action: "redirect_to_approval_url",
        })
    }

    /// Capture an approved PayPal order. Idempotent for completed payments.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::PaymentNotFound` for unknown tokens and
    /// `CheckoutError::CaptureFailed` after recording a failed capture.
    pub async fn paypal_success(
        &self,
        paypal_order_id: &str,
        payer_id: &str,
    ) -> Result<CallbackResponse, CheckoutError> {
        tracing::info!(paypal_order_id, payer_id, "PayPal success callback");

        let payment = self
            .payments
            .find_by_provider_txn(paypal_order_id)
            .await?
            .ok_or(CheckoutError::PaymentNotFound)?;

        if payment.is_successful() {
            return Ok(CallbackResponse::new(
                "Payment already completed",
                Some(&payment),
            ));
        }

        let client = self.paypal.ok_or(PayPalError::NotConfigured("client"))?;
        match client.capture_order(paypal_order_id).await {
            Ok(captured) => {
                let mut response = payment.provider_response.clone();
                if let Value::Object(map) = &mut response {
                    map.insert("capture_response".to_owned(), captured.raw.clone());
                    map.insert("payer_id".to_owned(), Value::String(payer_id.to_owned()));
                } else {
                    response = json!({ "capture_response": captured.raw, "payer_id": payer_id });
                }

                let completed = self
                    .payments
                    .complete(
                        &payment,
                        &response,
                        &NewPaymentTransaction::ok(TransactionAction::Captured, Some(payment.amount))
                            .provider(paypal_order_id, captured.raw.clone())
                            .notes(format!(
                                "PayPal payment captured successfully for payer {payer_id}"
                            )),
                    )
                    .await?;
                let order = self.orders.get(completed.order_id).await?;

                tracing::info!(payment_id = %completed.reference, "Payment completed");
                add_breadcrumb(
                    "payment",
                    "Payment captured",
                    Some(&[("payment", completed.reference.as_str())]),
                );

                Ok(CallbackResponse {
                    order_number: Some(order.order_number),
                    amount: Some(completed.amount),
                    currency: Some(completed.currency.clone()),
                    ..CallbackResponse::new("Payment completed successfully", Some(&completed))
                })
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(error = %reason, payment_id = %payment.reference, "PayPal capture failed");
                self.payments
                    .fail(
                        &payment,
                        &reason,
                        &NewPaymentTransaction::failed(TransactionAction::Failed, &reason)
                            .provider(paypal_order_id, Value::Object(serde_json::Map::new()))
                            .notes("PayPal capture failed"),
                    )
                    .await?;
                Err(CheckoutError::CaptureFailed(reason))
            }
        }
    }

    /// The buyer abandoned PayPal: cancel the payment and order and restore the cart.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotCancellable` once the payment has completed.
    pub async fn paypal_cancel(
        &self,
        paypal_order_id: &str,
    ) -> Result<CallbackResponse, CheckoutError> {
        tracing::info!(paypal_order_id, "PayPal cancel callback");

        let Some(payment) = self.payments.find_by_provider_txn(paypal_order_id).await? else {
            tracing::warn!(paypal_order_id, "Payment not found for cancelled PayPal order");
            return Ok(CallbackResponse::new("Payment cancellation noted", None));
        };

        if payment.status == PaymentStatus::Cancelled {
            return Ok(CallbackResponse::new(
                "Payment already cancelled",
                Some(&payment),
            ));
        }
        if !payment.status.can_be_cancelled() {
            return Err(CheckoutError::NotCancellable);
        }

        let cancelled = self
            .payments
            .cancel(
                &payment,
                &NewPaymentTransaction::ok(TransactionAction::Cancelled, None)
                    .provider(paypal_order_id, Value::Object(serde_json::Map::new()))
                    .notes("Payment cancelled by user on PayPal"),
            )
            .await?;

        tracing::info!(payment_id = %cancelled.reference, "Payment cancelled by user");
        Ok(CallbackResponse::new(
            "Payment cancelled successfully, cart restored for retry",
            Some(&cancelled),
        ))
    }

    /// Store a PayPal webhook delivery, verify it, and apply it to its payment.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidSignature` when verification is
    /// configured and fails. The delivery is stored even when no PayPal
    /// method row exists.
    pub async fn paypal_webhook(
        &self,
        headers: &HeaderMap,
        event: &Value,
        ip_address: Option<String>,
    ) -> Result<WebhookReceipt, CheckoutError> {
        let method = self
            .payments
            .method_for_provider(PaymentProvider::Paypal)
            .await?;
        if method.is_none() {
            tracing::warn!("PayPal webhook received with no PayPal payment method configured");
        }

        let event_type = event
            .get("event_type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let event_id = event.get("id").and_then(Value::as_str).unwrap_or_default();
        let transmission = WebhookHeaders::from_headers(headers);

        let webhook_id = self
            .payments
            .record_webhook(&NewWebhook {
                payment_method_id: method.map(|m| m.id),
                event_type: &event_type,
                event_id,
                payload: event,
                headers: transmission.to_json(),
                ip_address,
            })
            .await?;
        tracing::info!(event_type = %event_type, event_id, "PayPal webhook received");

        if let Some(client) = self.paypal.filter(|c| c.verifies_webhooks()) {
            let verified = match client.verify_webhook_signature(&transmission, event).await {
                Ok(verified) => verified,
                Err(e) => {
                    tracing::error!(error = %e, "Webhook signature verification errored");
                    false
                }
            };
            if !verified {
                self.payments
                    .finish_webhook(webhook_id, None, Some("Invalid signature"))
                    .await?;
                tracing::warn!(event_id, "Rejected PayPal webhook with invalid signature");
                return Err(CheckoutError::InvalidSignature);
            }
        }

        let payment_id = match self.apply_webhook(&event_type, event).await {
            Ok(payment_id) => payment_id,
            Err(e) => {
                let message = e.to_string();
                self.payments
                    .finish_webhook(webhook_id, None, Some(&message))
                    .await?;
                return Err(e);
            }
        };
        self.payments
            .finish_webhook(webhook_id, payment_id.as_ref().map(|(id, _)| *id), None)
            .await?;

        Ok(WebhookReceipt {
            received: true,
            event_type,
            payment_id: payment_id.map(|(_, reference)| reference),
        })
    }

    async fn apply_webhook(
        &self,
        event_type: &str,
        event: &Value,
    ) -> Result<Option<(PaymentId, String)>, CheckoutError> {
        let Some(action) = webhook_action(event_type) else {
            tracing::debug!(event_type, "Ignoring unhandled PayPal webhook event");
            return Ok(None);
        };

        let resource = event.get("resource").cloned().unwrap_or(Value::Null);
        let Some(paypal_order_id) = related_order_id(event_type, &resource) else {
            tracing::warn!(event_type, "PayPal webhook without an order id");
            return Ok(None);
        };
        let Some(payment) = self.payments.find_by_provider_txn(paypal_order_id).await? else {
            tracing::warn!(event_type, paypal_order_id, "No payment for PayPal webhook");
            return Ok(None);
        };

        let resource_id = resource
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(paypal_order_id);
        let txn = NewPaymentTransaction::ok(action, Some(payment.amount))
            .provider(resource_id, resource.clone())
            .notes(format!("Webhook {event_type}"));

        match action {
            TransactionAction::Captured if !payment.is_successful() => {
                let mut response = payment.provider_response.clone();
                if let Value::Object(map) = &mut response {
                    map.insert("capture_webhook".to_owned(), resource.clone());
                }
                self.payments.complete(&payment, &response, &txn).await?;
            }
            TransactionAction::Failed if !payment.is_successful() => {
                self.payments
                    .fail(&payment, "Capture denied by PayPal", &txn)
                    .await?;
            }
            TransactionAction::Refunded if payment.is_refundable() => {
                self.payments.refund(&payment, &txn).await?;
            }
            _ => {
                self.payments.log_transaction(payment.id, &txn).await?;
            }
        }

        tracing::info!(
            event_type,
            payment_id = %payment.reference,
            action = %action,
            "PayPal webhook applied"
        );
        Ok(Some((payment.id, payment.reference)))
    }
}

/// PayPal order id a webhook resource refers to.
///
/// Capture events carry it under `supplementary_data.related_ids`; order
/// events are the order itself.
fn related_order_id<'r>(event_type: &str, resource: &'r Value) -> Option<&'r str> {
    if event_type.starts_with("PAYMENT.CAPTURE.") {
        resource
            .pointer("/supplementary_data/related_ids/order_id")
            .and_then(Value::as_str)
    } else {
        resource.get("id").and_then(Value::as_str)
    }
    .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_related_order_id_for_capture_events() {
        let resource = json!({
            "id": "3C679366HH908993F",
            "supplementary_data": {"related_ids": {"order_id": "5O190127TN364715T"}}
        });
        assert_eq!(
            related_order_id("PAYMENT.CAPTURE.COMPLETED", &resource),
            Some("5O190127TN364715T")
        );
        assert_eq!(
            related_order_id("CHECKOUT.ORDER.APPROVED", &resource),
            Some("3C679366HH908993F")
        );
        assert_eq!(related_order_id("PAYMENT.CAPTURE.DENIED", &json!({})), None);
    }

    #[test]
    fn test_callback_response_omits_absent_fields() {
        let json = serde_json::to_value(CallbackResponse::new("Payment cancellation noted", None))
            .unwrap_or_default();
        assert_eq!(json["success"], true);
        assert!(json.get("payment_id").is_none());
        assert!(json.get("order_number").is_none());
    }

    #[test]
    fn test_checkout_error_messages() {
        assert_eq!(
            CheckoutError::MethodUnavailable.to_string(),
            "Payment method not available"
        );
        assert_eq!(CheckoutError::NoActiveCart.to_string(), "No active cart found");
        assert_eq!(CheckoutError::EmptyCart.to_string(), "Cart is empty");
        assert_eq!(
            CheckoutError::CaptureFailed("declined".into()).to_string(),
            "Payment capture failed: declined"
        );
    }
}
