//! Payment methods, payments and their transaction log.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use souk_core::{
    OrderId, PaymentId, PaymentMethodId, PaymentProvider, PaymentStatus, PaymentTransactionId,
    PaymentType, TransactionAction, UserId,
};

use super::AddressSnapshot;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    pub provider: PaymentProvider,
    pub display_name: String,
    pub is_active: bool,
    /// Provider settings; never serialized.
    #[serde(skip)]
    pub configuration: serde_json::Value,
    pub logo_url: String,
    pub description: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Payment {
    pub id: PaymentId,
    /// Public identifier, `PAY-YYYYMMDD-XXXXXXXXXXXX`.
    pub reference: String,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub payment_method_id: PaymentMethodId,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub currency: String,
    pub provider_transaction_id: String,
    pub provider_response: serde_json::Value,
    pub success_url: String,
    pub cancel_url: String,
    pub failure_reason: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Payment {
    #[must_use]
    pub fn is_successful(&self) -> bool {
        self.status == PaymentStatus::Completed
    }

    #[must_use]
    pub fn is_refundable(&self) -> bool {
        self.is_successful() && self.payment_type == PaymentType::Payment
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PaymentTransaction {
    pub id: PaymentTransactionId,
    #[serde(skip)]
    pub payment_id: PaymentId,
    pub action: TransactionAction,
    pub amount: Option<Decimal>,
    pub provider_transaction_id: String,
    #[serde(skip)]
    pub provider_response: serde_json::Value,
    pub success: bool,
    pub error_message: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// A transaction row before insertion.
#[derive(Debug, Clone)]
pub struct NewPaymentTransaction {
    pub action: TransactionAction,
    pub amount: Option<Decimal>,
    pub provider_transaction_id: String,
    pub provider_response: serde_json::Value,
    pub success: bool,
    pub error_message: String,
    pub notes: String,
}

impl NewPaymentTransaction {
    #[must_use]
    pub fn ok(action: TransactionAction, amount: Option<Decimal>) -> Self {
        Self {
            action,
            amount,
            provider_transaction_id: String::new(),
            provider_response: serde_json::Value::Object(serde_json::Map::new()),
            success: true,
            error_message: String::new(),
            notes: String::new(),
        }
    }

    #[must_use]
    pub fn failed(action: TransactionAction, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: error.into(),
            ..Self::ok(action, None)
        }
    }

    #[must_use]
    pub fn provider(mut self, transaction_id: &str, response: serde_json::Value) -> Self {
        transaction_id.clone_into(&mut self.provider_transaction_id);
        self.provider_response = response;
        self
    }

    #[must_use]
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// Payload of `GET /api/v1/payments/status/{payment_id}/`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentView {
    pub payment_id: String,
    pub order_number: String,
    pub payment_method: PaymentProvider,
    pub payment_method_name: String,
    pub status: PaymentStatus,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    pub currency: String,
    pub provider_transaction_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub failure_reason: String,
    pub is_successful: bool,
    pub is_refundable: bool,
    pub can_be_cancelled: bool,
    pub transactions: Vec<PaymentTransaction>,
}

impl PaymentView {
    #[must_use]
    pub fn new(
        payment: &Payment,
        order_number: String,
        method: &PaymentMethod,
        transactions: Vec<PaymentTransaction>,
    ) -> Self {
        Self {
            payment_id: payment.reference.clone(),
            order_number,
            payment_method: method.provider,
            payment_method_name: method.display_name.clone(),
            status: payment.status,
            payment_type: payment.payment_type,
            amount: payment.amount,
            currency: payment.currency.clone(),
            provider_transaction_id: payment.provider_transaction_id.clone(),
            created_at: payment.created_at,
            updated_at: payment.updated_at,
            processed_at: payment.processed_at,
            expires_at: payment.expires_at,
            failure_reason: payment.failure_reason.clone(),
            is_successful: payment.is_successful(),
            is_refundable: payment.is_refundable(),
            can_be_cancelled: payment.status.can_be_cancelled(),
            transactions,
        }
    }
}

/// Body of `POST /api/v1/payments/create/`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    /// Provider name, case-insensitive (`paypal`, `PAYPAL`).
    pub payment_method: String,
    pub shipping_address: AddressSnapshot,
    #[serde(default)]
    pub billing_address: Option<AddressSnapshot>,
}

/// Query string PayPal appends to the return URL.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayPalReturnQuery {
    pub token: Option<String>,
    #[serde(rename = "PayerID")]
    pub payer_id: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_accepts_missing_billing() {
        let req: CreatePaymentRequest = serde_json::from_str(
            r#"{
                "payment_method": "paypal",
                "shipping_address": {
                    "first_name": "Omar", "last_name": "Tazi",
                    "address_line_1": "12 Rue Atlas", "city": "Rabat",
                    "state_province": "Rabat", "postal_code": "10000", "country": "MA"
                }
            }"#,
        )
        .unwrap();
        assert!(req.billing_address.is_none());
        assert_eq!(req.shipping_address.city, "Rabat");
        assert!(req.shipping_address.company.is_empty());
    }

    #[test]
    fn test_return_query_reads_payer_id() {
        let q: PayPalReturnQuery =
            serde_json::from_str(r#"{"token": "5O190127TN364715T", "PayerID": "ABC"}"#).unwrap();
        assert_eq!(q.payer_id.as_deref(), Some("ABC"));
    }

    #[test]
    fn test_failed_transaction_builder() {
        let txn = NewPaymentTransaction::failed(TransactionAction::Failed, "declined")
            .notes("capture");
        assert!(!txn.success);
        assert_eq!(txn.error_message, "declined");
        assert_eq!(txn.notes, "capture");
        assert!(txn.amount.is_none());
    }
}
