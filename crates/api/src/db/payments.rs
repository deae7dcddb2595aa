//! Payment repository: methods, payments, the transaction log and webhooks.

use sqlx::{PgConnection, PgPool};

use souk_core::{
    OrderPaymentStatus, PaymentId, PaymentMethodId, PaymentProvider, PaymentStatus,
    PaymentWebhookId, TransactionAction, UserId,
};

use super::RepositoryError;
use super::orders::{PAYMENT_COLUMNS, cancel_and_restore_cart, mark_paid, set_payment_status};
use crate::models::{NewPaymentTransaction, Payment, PaymentMethod, PaymentTransaction};

const METHOD_COLUMNS: &str =
    "id, provider, display_name, is_active, configuration, logo_url, description, sort_order";

/// Incoming provider webhook, stored before it is acted on.
#[derive(Debug, Clone)]
pub struct NewWebhook<'w> {
    /// Unset when the provider has no `payment_methods` row yet.
    pub payment_method_id: Option<PaymentMethodId>,
    pub event_type: &'w str,
    pub event_id: &'w str,
    pub payload: &'w serde_json::Value,
    pub headers: serde_json::Value,
    pub ip_address: Option<String>,
}

/// Repository for `payment_methods`, `payments`, `payment_transactions` and
/// `payment_webhooks`.
pub struct PaymentRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PaymentRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Active methods in display order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn active_methods(&self) -> Result<Vec<PaymentMethod>, RepositoryError> {
        let methods = sqlx::query_as::<_, PaymentMethod>(&format!(
            r"
            SELECT {METHOD_COLUMNS} FROM payment_methods
            WHERE is_active
            ORDER BY sort_order, display_name
            "
        ))
        .fetch_all(self.pool)
        .await?;
        Ok(methods)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn active_method(
        &self,
        provider: PaymentProvider,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        let method = sqlx::query_as::<_, PaymentMethod>(&format!(
            "SELECT {METHOD_COLUMNS} FROM payment_methods WHERE provider = $1 AND is_active"
        ))
        .bind(provider)
        .fetch_optional(self.pool)
        .await?;
        Ok(method)
    }

    /// Method row for a provider whether or not it is enabled.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn method_for_provider(
        &self,
        provider: PaymentProvider,
    ) -> Result<Option<PaymentMethod>, RepositoryError> {
        let method = sqlx::query_as::<_, PaymentMethod>(&format!(
            "SELECT {METHOD_COLUMNS} FROM payment_methods WHERE provider = $1"
        ))
        .bind(provider)
        .fetch_optional(self.pool)
        .await?;
        Ok(method)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the method does not exist.
    pub async fn method(&self, id: PaymentMethodId) -> Result<PaymentMethod, RepositoryError> {
        sqlx::query_as::<_, PaymentMethod>(&format!(
            "SELECT {METHOD_COLUMNS} FROM payment_methods WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Insert any missing provider rows. Existing rows are left untouched.
    ///
    /// Returns the number of rows created.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn seed_methods(
        &self,
        methods: &[(PaymentProvider, &str, bool, i32)],
    ) -> Result<u64, RepositoryError> {
        let mut created = 0;
        for (provider, display_name, is_active, sort_order) in methods {
            let result = sqlx::query(
                r"
                INSERT INTO payment_methods (provider, display_name, is_active, sort_order)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (provider) DO NOTHING
                ",
            )
            .bind(provider)
            .bind(display_name)
            .bind(is_active)
            .bind(sort_order)
            .execute(self.pool)
            .await?;
            created += result.rows_affected();
        }
        Ok(created)
    }

    /// Look up a payment by its public `PAY-` reference, scoped to its owner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no such payment belongs to the user.
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        reference: &str,
    ) -> Result<Payment, RepositoryError> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reference = $1 AND user_id = $2"
        ))
        .bind(reference)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Find the payment for a provider order id (PayPal order id).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_provider_txn(
        &self,
        provider_transaction_id: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        if provider_transaction_id.is_empty() {
            return Ok(None);
        }
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE provider_transaction_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "
        ))
        .bind(provider_transaction_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(payment)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn transactions(
        &self,
        payment_id: PaymentId,
    ) -> Result<Vec<PaymentTransaction>, RepositoryError> {
        let rows = sqlx::query_as::<_, PaymentTransaction>(
            r"
            SELECT id, payment_id, action, amount, provider_transaction_id, provider_response,
                   success, error_message, notes, created_at
            FROM payment_transactions
            WHERE payment_id = $1
            ORDER BY created_at DESC, id DESC
            ",
        )
        .bind(payment_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Append to the transaction log outside any status change.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn log_transaction(
        &self,
        payment_id: PaymentId,
        txn: &NewPaymentTransaction,
    ) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        insert_transaction(&mut conn, payment_id, txn).await
    }

    /// The provider accepted the payment; the buyer must now approve it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the payment does not exist.
    pub async fn mark_processing(
        &self,
        payment_id: PaymentId,
        provider_transaction_id: &str,
        provider_response: &serde_json::Value,
        success_url: &str,
        cancel_url: &str,
        txn: &NewPaymentTransaction,
    ) -> Result<Payment, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r"
            UPDATE payments
            SET status = $2, provider_transaction_id = $3, provider_response = $4,
                success_url = $5, cancel_url = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "
        ))
        .bind(payment_id)
        .bind(PaymentStatus::Processing)
        .bind(provider_transaction_id)
        .bind(provider_response)
        .bind(success_url)
        .bind(cancel_url)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        insert_transaction(&mut tx, payment_id, txn).await?;
        tx.commit().await?;
        Ok(payment)
    }

    /// Funds captured: complete the payment and mark the order paid.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the payment does not exist.
    pub async fn complete(
        &self,
        payment: &Payment,
        provider_response: &serde_json::Value,
        txn: &NewPaymentTransaction,
    ) -> Result<Payment, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Payment>(&format!(
            r"
            UPDATE payments
            SET status = $2, provider_response = $3, processed_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "
        ))
        .bind(payment.id)
        .bind(PaymentStatus::Completed)
        .bind(provider_response)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        insert_transaction(&mut tx, payment.id, txn).await?;
        mark_paid(&mut tx, payment.order_id).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Capture or provider failure.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the payment does not exist.
    pub async fn fail(
        &self,
        payment: &Payment,
        reason: &str,
        txn: &NewPaymentTransaction,
    ) -> Result<Payment, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Payment>(&format!(
            r"
            UPDATE payments
            SET status = $2, failure_reason = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "
        ))
        .bind(payment.id)
        .bind(PaymentStatus::Failed)
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        insert_transaction(&mut tx, payment.id, txn).await?;
        set_payment_status(&mut tx, payment.order_id, OrderPaymentStatus::Failed).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// The buyer left the provider checkout: cancel payment and order, and
    /// give the cart back.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the payment does not exist.
    pub async fn cancel(
        &self,
        payment: &Payment,
        txn: &NewPaymentTransaction,
    ) -> Result<Payment, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Payment>(&format!(
            r"
            UPDATE payments SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "
        ))
        .bind(payment.id)
        .bind(PaymentStatus::Cancelled)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        insert_transaction(&mut tx, payment.id, txn).await?;
        cancel_and_restore_cart(&mut tx, payment.order_id).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Provider reported a refund of the full amount.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the payment does not exist.
    pub async fn refund(
        &self,
        payment: &Payment,
        txn: &NewPaymentTransaction,
    ) -> Result<Payment, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, Payment>(&format!(
            r"
            UPDATE payments SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "
        ))
        .bind(payment.id)
        .bind(PaymentStatus::Refunded)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        insert_transaction(&mut tx, payment.id, txn).await?;
        set_payment_status(&mut tx, payment.order_id, OrderPaymentStatus::Refunded).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn record_webhook(
        &self,
        hook: &NewWebhook<'_>,
    ) -> Result<PaymentWebhookId, RepositoryError> {
        let id = sqlx::query_scalar(
            r"
            INSERT INTO payment_webhooks
                (payment_method_id, event_type, event_id, payload, headers, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            ",
        )
        .bind(hook.payment_method_id)
        .bind(hook.event_type)
        .bind(hook.event_id)
        .bind(hook.payload)
        .bind(&hook.headers)
        .bind(hook.ip_address.as_deref())
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    /// Close out a stored webhook. `error` is recorded when handling failed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn finish_webhook(
        &self,
        id: PaymentWebhookId,
        payment_id: Option<PaymentId>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE payment_webhooks
            SET payment_id = COALESCE($2, payment_id),
                processed = $3,
                processed_at = CASE WHEN $3 THEN NOW() ELSE processed_at END,
                error_message = $4
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(payment_id)
        .bind(error.is_none())
        .bind(error.unwrap_or_default())
        .execute(self.pool)
        .await?;
        Ok(())
    }
}

async fn insert_transaction(
    conn: &mut PgConnection,
    payment_id: PaymentId,
    txn: &NewPaymentTransaction,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO payment_transactions
            (payment_id, action, amount, provider_transaction_id, provider_response,
             success, error_message, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ",
    )
    .bind(payment_id)
    .bind(txn.action)
    .bind(txn.amount)
    .bind(&txn.provider_transaction_id)
    .bind(&txn.provider_response)
    .bind(txn.success)
    .bind(&txn.error_message)
    .bind(&txn.notes)
    .execute(conn)
    .await?;
    Ok(())
}

/// Transaction action logged for a webhook event type, if it maps to one.
#[must_use]
pub fn webhook_action(event_type: &str) -> Option<TransactionAction> {
    match event_type {
        "PAYMENT.CAPTURE.COMPLETED" => Some(TransactionAction::Captured),
        "PAYMENT.CAPTURE.DENIED" => Some(TransactionAction::Failed),
        "PAYMENT.CAPTURE.REFUNDED" => Some(TransactionAction::Refunded),
        "CHECKOUT.ORDER.APPROVED" => Some(TransactionAction::WebhookReceived),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_action_mapping() {
        assert_eq!(
            webhook_action("PAYMENT.CAPTURE.COMPLETED"),
            Some(TransactionAction::Captured)
        );
        assert_eq!(
            webhook_action("CHECKOUT.ORDER.APPROVED"),
            Some(TransactionAction::WebhookReceived)
        );
        assert_eq!(webhook_action("BILLING.SUBSCRIPTION.CREATED"), None);
    }
}
