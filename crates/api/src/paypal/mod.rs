//! PayPal REST client (Orders v2).
//!
//! # Flow
//!
//! 1. `create_order` returns an order with an `approve` link the buyer is
//!    redirected to.
//! 2. PayPal sends the buyer back to our success or cancel URL with
//!    `?token=<order id>`.
//! 3. `capture_order` moves the funds.
//!
//! The OAuth2 access token is shared by all requests and refreshed 60 seconds
//! before PayPal says it expires.

mod types;

pub use types::{LinkDescription, NewPayPalOrder, PayPalOrder, WebhookHeaders};

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::PayPalConfig;
use types::{AccessTokenResponse, CreateOrderBody, VerifySignatureBody, VerifySignatureResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Errors that can occur when talking to PayPal.
#[derive(Debug, Error)]
pub enum PayPalError {
    /// Credentials or webhook ID missing from the configuration.
    #[error("PayPal {0} not configured")]
    NotConfigured(&'static str),

    /// Transport failure or undecodable body.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// PayPal answered with an unexpected status.
    #[error("PayPal API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// A required field was absent from the response.
    #[error("PayPal response missing `{0}`")]
    MissingField(&'static str),
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Client for the PayPal REST API.
#[derive(Clone)]
pub struct PayPalClient {
    inner: Arc<PayPalClientInner>,
}

struct PayPalClientInner {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: SecretString,
    webhook_id: Option<String>,
    token: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for PayPalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayPalClient")
            .field("base_url", &self.inner.base_url)
            .field("client_id", &self.inner.client_id)
            .finish_non_exhaustive()
    }
}

impl PayPalClient {
    /// # Errors
    ///
    /// Returns `PayPalError::Http` if the HTTP client cannot be built.
    pub fn new(config: &PayPalConfig) -> Result<Self, PayPalError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(PayPalClientInner {
                client,
                base_url: config.base_url.trim_end_matches('/').to_owned(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                webhook_id: config.webhook_id.clone(),
                token: RwLock::new(None),
            }),
        })
    }

    /// Whether incoming webhooks can be verified.
    #[must_use]
    pub fn verifies_webhooks(&self) -> bool {
        self.inner.webhook_id.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.inner.base_url)
    }

    /// Current access token, fetching a new one when the cached token is
    /// missing or about to expire.
    async fn access_token(&self) -> Result<String, PayPalError> {
        {
            let cached = self.inner.token.read().await;
            if let Some(token) = cached.as_ref()
                && Instant::now() < token.refresh_at
            {
                return Ok(token.value.clone());
            }
        }

        let mut cached = self.inner.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let response = self
            .inner
            .client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(
                &self.inner.client_id,
                Some(self.inner.client_secret.expose_secret()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let token: AccessTokenResponse = read_json(response, &[StatusCode::OK]).await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        tracing::debug!(expires_in = token.expires_in, "PayPal access token refreshed");

        let value = token.access_token;
        *cached = Some(CachedToken {
            value: value.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    /// Create a CAPTURE-intent order. PayPal answers 201.
    ///
    /// # Errors
    ///
    /// Returns `PayPalError::Api` for any other status.
    pub async fn create_order(&self, order: &NewPayPalOrder<'_>) -> Result<PayPalOrder, PayPalError> {
        let token = self.access_token().await?;
        let response = self
            .inner
            .client
            .post(self.url("/v2/checkout/orders"))
            .bearer_auth(token)
            .json(&CreateOrderBody::from(order))
            .send()
            .await?;

        let raw = read_json(response, &[StatusCode::CREATED]).await?;
        let created = PayPalOrder::from_value(raw)?;
        tracing::info!(paypal_order_id = %created.id, reference = order.reference_id, "PayPal order created");
        Ok(created)
    }

    /// Capture an approved order.
    ///
    /// # Errors
    ///
    /// Returns `PayPalError::Api` unless PayPal answers 200 or 201.
    pub async fn capture_order(&self, order_id: &str) -> Result<PayPalOrder, PayPalError> {
        let token = self.access_token().await?;
        let response = self
            .inner
            .client
            .post(self.url(&format!("/v2/checkout/orders/{order_id}/capture")))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let raw = read_json(response, &[StatusCode::OK, StatusCode::CREATED]).await?;
        let captured = PayPalOrder::from_value(raw)?;
        tracing::info!(paypal_order_id = %order_id, status = %captured.status, "PayPal order captured");
        Ok(captured)
    }

    /// # Errors
    ///
    /// Returns `PayPalError::Api` unless PayPal answers 200.
    pub async fn get_order(&self, order_id: &str) -> Result<PayPalOrder, PayPalError> {
        let token = self.access_token().await?;
        let response = self
            .inner
            .client
            .get(self.url(&format!("/v2/checkout/orders/{order_id}")))
            .bearer_auth(token)
            .send()
            .await?;

        PayPalOrder::from_value(read_json(response, &[StatusCode::OK]).await?)
    }

    /// Ask PayPal whether a webhook delivery is authentic.
    ///
    /// # Errors
    ///
    /// Returns `PayPalError::NotConfigured` without a webhook ID, or the
    /// transport/API error of the verification call.
    pub async fn verify_webhook_signature(
        &self,
        headers: &WebhookHeaders,
        event: &serde_json::Value,
    ) -> Result<bool, PayPalError> {
        let webhook_id = self
            .inner
            .webhook_id
            .as_deref()
            .ok_or(PayPalError::NotConfigured("webhook ID"))?;

        let token = self.access_token().await?;
        let response = self
            .inner
            .client
            .post(self.url("/v1/notifications/verify-webhook-signature"))
            .bearer_auth(token)
            .json(&VerifySignatureBody {
                headers,
                webhook_id,
                webhook_event: event,
            })
            .send()
            .await?;

        let verdict: VerifySignatureResponse = read_json(response, &[StatusCode::OK]).await?;
        Ok(verdict.verification_status == "SUCCESS")
    }
}

/// Decode the body if the status is one of `expected`.
async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    expected: &[StatusCode],
) -> Result<T, PayPalError> {
    let status = response.status();
    if !expected.contains(&status) {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = status.as_u16(), body = %body, "PayPal API error");
        return Err(PayPalError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, webhook_id: Option<&str>) -> PayPalClient {
        PayPalClient::new(&PayPalConfig {
            base_url: server.uri(),
            client_id: "client-id".to_owned(),
            client_secret: SecretString::from("client-secret"),
            webhook_id: webhook_id.map(ToOwned::to_owned),
        })
        .unwrap()
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/v1/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "A21AA-token",
                "token_type": "Bearer",
                "expires_in": 32400
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn new_order() -> NewPayPalOrder<'static> {
        NewPayPalOrder {
            reference_id: "ORD-20250114-1A2B3C4D",
            amount: Decimal::new(4999, 2),
            currency: "USD",
            return_url: "http://localhost:8000/api/v1/payments/paypal/success/",
            cancel_url: "http://localhost:8000/api/v1/payments/paypal/cancel/",
        }
    }

    #[tokio::test]
    async fn test_create_order_returns_approval_link() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders"))
            .and(header("authorization", "Bearer A21AA-token"))
            .and(body_partial_json(json!({"intent": "CAPTURE"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "5O190127TN364715T",
                "status": "CREATED",
                "links": [{"href": "https://paypal.test/approve", "rel": "approve", "method": "GET"}]
            })))
            .mount(&server)
            .await;

        let order = client_for(&server, None).create_order(&new_order()).await.unwrap();
        assert_eq!(order.id, "5O190127TN364715T");
        assert_eq!(order.approval_url(), Some("https://paypal.test/approve"));
    }

    #[tokio::test]
    async fn test_access_token_is_cached() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path("/v2/checkout/orders/ABC"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "ABC", "status": "APPROVED"})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        client.get_order("ABC").await.unwrap();
        client.get_order("ABC").await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_status_is_api_error() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders"))
            .respond_with(ResponseTemplate::new(422).set_body_string("UNPROCESSABLE_ENTITY"))
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .create_order(&new_order())
            .await
            .unwrap_err();
        assert!(matches!(err, PayPalError::Api { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_verify_webhook_requires_webhook_id() {
        let server = MockServer::start().await;
        let err = client_for(&server, None)
            .verify_webhook_signature(&WebhookHeaders::default(), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PayPalError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_verify_webhook_success() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v1/notifications/verify-webhook-signature"))
            .and(body_partial_json(json!({"webhook_id": "WH-1"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"verification_status": "SUCCESS"})),
            )
            .mount(&server)
            .await;

        let verified = client_for(&server, Some("WH-1"))
            .verify_webhook_signature(&WebhookHeaders::default(), &json!({"id": "WH-EVT"}))
            .await
            .unwrap();
        assert!(verified);
    }
}
