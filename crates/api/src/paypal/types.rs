//! PayPal REST payloads.

use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use souk_core::to_provider_value;

use super::PayPalError;

/// Input for `POST /v2/checkout/orders`.
#[derive(Debug, Clone)]
pub struct NewPayPalOrder<'a> {
    /// Our order number, echoed back by PayPal as `reference_id`.
    pub reference_id: &'a str,
    pub amount: Decimal,
    pub currency: &'a str,
    pub return_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Serialize)]
pub(super) struct CreateOrderBody<'a> {
    intent: &'static str,
    purchase_units: [PurchaseUnit<'a>; 1],
    application_context: ApplicationContext<'a>,
}

#[derive(Serialize)]
struct PurchaseUnit<'a> {
    reference_id: &'a str,
    amount: Amount<'a>,
}

#[derive(Serialize)]
struct Amount<'a> {
    currency_code: &'a str,
    value: String,
}

#[derive(Serialize)]
struct ApplicationContext<'a> {
    return_url: &'a str,
    cancel_url: &'a str,
    user_action: &'static str,
}

impl<'a> From<&NewPayPalOrder<'a>> for CreateOrderBody<'a> {
    fn from(order: &NewPayPalOrder<'a>) -> Self {
        Self {
            intent: "CAPTURE",
            purchase_units: [PurchaseUnit {
                reference_id: order.reference_id,
                amount: Amount {
                    currency_code: order.currency,
                    value: to_provider_value(order.amount),
                },
            }],
            application_context: ApplicationContext {
                return_url: order.return_url,
                cancel_url: order.cancel_url,
                user_action: "PAY_NOW",
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkDescription {
    pub href: String,
    pub rel: String,
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Deserialize)]
struct OrderFields {
    id: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    links: Vec<LinkDescription>,
}

/// A PayPal order, with the raw response kept for the payment record.
#[derive(Debug, Clone)]
pub struct PayPalOrder {
    pub id: String,
    pub status: String,
    pub links: Vec<LinkDescription>,
    pub raw: serde_json::Value,
}

impl PayPalOrder {
    pub(super) fn from_value(raw: serde_json::Value) -> Result<Self, PayPalError> {
        let fields = OrderFields::deserialize(&raw).map_err(|_| PayPalError::MissingField("id"))?;
        let id = fields
            .id
            .filter(|id| !id.is_empty())
            .ok_or(PayPalError::MissingField("id"))?;
        Ok(Self {
            id,
            status: fields.status,
            links: fields.links,
            raw,
        })
    }

    /// Where the buyer approves the payment (`rel == "approve"`).
    #[must_use]
    pub fn approval_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == "approve")
            .map(|link| link.href.as_str())
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }

    /// ID of the first capture, present once the order has been captured.
    #[must_use]
    pub fn capture_id(&self) -> Option<&str> {
        self.raw
            .get("purchase_units")?
            .get(0)?
            .get("payments")?
            .get("captures")?
            .get(0)?
            .get("id")?
            .as_str()
    }
}

#[derive(Deserialize)]
pub(super) struct AccessTokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

const fn default_expires_in() -> u64 {
    300
}

/// Transmission headers PayPal signs every webhook delivery with.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WebhookHeaders {
    pub auth_algo: String,
    pub cert_url: String,
    pub transmission_id: String,
    pub transmission_sig: String,
    pub transmission_time: String,
}

impl WebhookHeaders {
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_owned()
        };
        Self {
            auth_algo: get("paypal-auth-algo"),
            cert_url: get("paypal-cert-url"),
            transmission_id: get("paypal-transmission-id"),
            transmission_sig: get("paypal-transmission-sig"),
            transmission_time: get("paypal-transmission-time"),
        }
    }

    /// The headers as stored alongside the webhook payload.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Serialize)]
pub(super) struct VerifySignatureBody<'a> {
    #[serde(flatten)]
    pub headers: &'a WebhookHeaders,
    pub webhook_id: &'a str,
    pub webhook_event: &'a serde_json::Value,
}

#[derive(Deserialize)]
pub(super) struct VerifySignatureResponse {
    #[serde(default)]
    pub verification_status: String,
}
