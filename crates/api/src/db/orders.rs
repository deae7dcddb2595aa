//! Order repository, including the cart-to-order conversion.

use chrono::Utc;
use sqlx::{PgConnection, PgPool};

use souk_core::{
    CartId, CartStatus, OrderAddressType, OrderId, OrderPaymentStatus, OrderStatus,
    PaymentMethodId, PaymentStatus, UserId, generate_order_number, generate_payment_id,
};

use super::RepositoryError;
use super::carts::{absorb_cart, recompute_totals};
use crate::models::{AddressSnapshot, Order, OrderAddress, OrderItem, OrderSummary, Payment};

pub(crate) const ORDER_COLUMNS: &str = "id, order_number, user_id, cart_id, status, \
     payment_status, currency, items_subtotal, discount_total, shipping_total, tax_total, \
     grand_total, notes, created_at, updated_at, confirmed_at, shipped_at, delivered_at, \
     cancelled_at";

pub(crate) const PAYMENT_COLUMNS: &str = "id, reference, order_id, user_id, payment_method_id, \
     status, payment_type, amount, currency, provider_transaction_id, provider_response, \
     success_url, cancel_url, failure_reason, notes, created_at, updated_at, processed_at, \
     expires_at";

#[derive(sqlx::FromRow)]
struct OrderWithCount {
    #[sqlx(flatten)]
    order: Order,
    items_count: i64,
}

/// Everything the checkout transaction needs from the caller.
#[derive(Debug, Clone)]
pub struct CheckoutInput<'c> {
    pub cart_id: CartId,
    pub user_id: UserId,
    pub payment_method_id: PaymentMethodId,
    pub shipping: &'c AddressSnapshot,
    pub billing: &'c AddressSnapshot,
}

/// Repository for `orders`, `order_items` and `order_addresses`.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Convert an ACTIVE cart into an order with a PENDING payment.
    ///
    /// Runs as one transaction: the order, its lines and addresses, the
    /// cart's CONVERTED status and the payment row commit together or not
    /// at all.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the cart is no longer active
    /// or has no lines. Returns `RepositoryError::Database` otherwise.
    pub async fn create_from_cart(
        &self,
        input: &CheckoutInput<'_>,
    ) -> Result<(Order, Payment), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<CartId> = sqlx::query_scalar(
            r"
            SELECT id FROM carts
            WHERE id = $1 AND user_id = $2 AND status = 'ACTIVE'
            FOR UPDATE
            ",
        )
        .bind(input.cart_id)
        .bind(input.user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if locked.is_none() {
            return Err(RepositoryError::Conflict("active cart".to_owned()));
        }

        let now = Utc::now();
        let order = sqlx::query_as::<_, Order>(&format!(
            r"
            INSERT INTO orders
                (order_number, user_id, cart_id, currency, items_subtotal, discount_total,
                 shipping_total, tax_total, grand_total, notes)
            SELECT $1, $2, id, currency, items_subtotal, discount_total,
                   shipping_total, tax_total, grand_total, 'Created from cart checkout'
            FROM carts WHERE id = $3
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(generate_order_number(now.date_naive()))
        .bind(input.user_id)
        .bind(input.cart_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "order number"))?;

        let copied = sqlx::query(
            r"
            INSERT INTO order_items
                (order_id, product_id, color_id, size_id, quantity, product_name_snapshot,
                 sku_snapshot, unit_price_snapshot, compare_price_snapshot, image_url_snapshot,
                 line_total)
            SELECT $1, product_id, color_id, size_id, quantity, product_name_snapshot,
                   sku_snapshot, unit_price_snapshot, compare_price_snapshot, image_url_snapshot,
                   unit_price_snapshot * quantity
            FROM cart_items WHERE cart_id = $2
            ORDER BY created_at, id
            ",
        )
        .bind(order.id)
        .bind(input.cart_id)
        .execute(&mut *tx)
        .await?;
        if copied.rows_affected() == 0 {
            return Err(RepositoryError::Conflict("empty cart".to_owned()));
        }

        insert_address(&mut tx, order.id, OrderAddressType::Shipping, input.shipping).await?;
        insert_address(&mut tx, order.id, OrderAddressType::Billing, input.billing).await?;

        sqlx::query(
            r"
            UPDATE carts SET status = $2, checked_out_at = NOW(), updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(input.cart_id)
        .bind(CartStatus::Converted)
        .execute(&mut *tx)
        .await?;

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r"
            INSERT INTO payments (reference, order_id, user_id, payment_method_id, amount, currency)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {PAYMENT_COLUMNS}
            "
        ))
        .bind(generate_payment_id(now.date_naive()))
        .bind(order.id)
        .bind(input.user_id)
        .bind(input.payment_method_id)
        .bind(order.grand_total)
        .bind(&order.currency)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "payment reference"))?;

        tx.commit().await?;
        Ok((order, payment))
    }

    /// Undo a checkout whose payment could not be created.
    ///
    /// Deletes the order (payments, lines and addresses cascade) and returns
    /// the source cart to ACTIVE. A cart the user started while the provider
    /// call was in flight is folded into the source cart first, so the
    /// one-active-cart rule holds.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn rollback_checkout(
        &self,
        order_id: OrderId,
        cart_id: CartId,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        let source = sqlx::query_scalar::<_, Option<UserId>>(
            "SELECT user_id FROM carts WHERE id = $1 AND status = 'CONVERTED' FOR UPDATE",
        )
        .bind(cart_id)
        .fetch_optional(&mut *tx)
        .await?
        .flatten();

        if let Some(user_id) = source {
            let newer: Option<CartId> = sqlx::query_scalar(
                r"
                SELECT id FROM carts
                WHERE user_id = $1 AND status = 'ACTIVE' AND id <> $2
                FOR UPDATE
                ",
            )
            .bind(user_id)
            .bind(cart_id)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(newer) = newer {
                absorb_cart(&mut tx, newer, cart_id).await?;
            }

            sqlx::query(
                r"
                UPDATE carts SET status = $2, checked_out_at = NULL, updated_at = NOW()
                WHERE id = $1
                ",
            )
            .bind(cart_id)
            .bind(CartStatus::Active)
            .execute(&mut *tx)
            .await?;
            recompute_totals(&mut tx, cart_id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Orders of a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<OrderSummary>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderWithCount>(&format!(
            r"
            SELECT {ORDER_COLUMNS},
                   (SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM order_items oi
                    WHERE oi.order_id = orders.id) AS items_count
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            "
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OrderSummary::new(row.order, row.items_count))
            .collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` unless the order belongs to the user.
    pub async fn get_for_user(
        &self,
        user_id: UserId,
        order_number: &str,
    ) -> Result<Order, RepositoryError> {
        sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_number = $1 AND user_id = $2"
        ))
        .bind(order_number)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn get(&self, id: OrderId) -> Result<Order, RepositoryError> {
        sqlx::query_as::<_, Order>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let items = sqlx::query_as::<_, OrderItem>(
            r"
            SELECT id, order_id, product_id, color_id, size_id, quantity, product_name_snapshot,
                   sku_snapshot, unit_price_snapshot, compare_price_snapshot, image_url_snapshot,
                   line_total
            FROM order_items WHERE order_id = $1 ORDER BY id
            ",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;
        Ok(items)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn addresses(&self, order_id: OrderId) -> Result<Vec<OrderAddress>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderAddress>(
            r"
            SELECT id, order_id, address_type, first_name, last_name, company, address_line_1,
                   address_line_2, city, state_province, postal_code, country, phone
            FROM order_addresses WHERE order_id = $1 ORDER BY address_type
            ",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Cancel an unpaid order on the customer's request.
    ///
    /// Any open payments on the order are cancelled with it. Returns `None`
    /// when the order is past the cancellable states.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn cancel(&self, order_id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            r"
            UPDATE orders
            SET status = $2, cancelled_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status IN ('PENDING', 'CONFIRMED') AND payment_status <> 'PAID'
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order_id)
        .bind(OrderStatus::Cancelled)
        .fetch_optional(&mut *tx)
        .await?;

        if order.is_some() {
            sqlx::query(
                r"
                UPDATE payments SET status = $2, updated_at = NOW()
                WHERE order_id = $1 AND status IN ('PENDING', 'PROCESSING')
                ",
            )
            .bind(order_id)
            .bind(PaymentStatus::Cancelled)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(order)
    }
}

async fn insert_address(
    conn: &mut PgConnection,
    order_id: OrderId,
    address_type: OrderAddressType,
    a: &AddressSnapshot,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO order_addresses
            (order_id, address_type, first_name, last_name, company, address_line_1,
             address_line_2, city, state_province, postal_code, country, phone)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ",
    )
    .bind(order_id)
    .bind(address_type)
    .bind(a.first_name.trim())
    .bind(a.last_name.trim())
    .bind(a.company.trim())
    .bind(a.address_line_1.trim())
    .bind(a.address_line_2.trim())
    .bind(a.city.trim())
    .bind(a.state_province.trim())
    .bind(a.postal_code.trim())
    .bind(a.country.trim())
    .bind(a.phone.trim())
    .execute(conn)
    .await?;
    Ok(())
}

/// Mark an order paid, confirming it if it was still PENDING.
pub(crate) async fn mark_paid(conn: &mut PgConnection, order_id: OrderId) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        UPDATE orders
        SET payment_status = $2,
            status = CASE WHEN status = 'PENDING' THEN $3 ELSE status END,
            confirmed_at = CASE WHEN status = 'PENDING' THEN NOW() ELSE confirmed_at END,
            updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(order_id)
    .bind(OrderPaymentStatus::Paid)
    .bind(OrderStatus::Confirmed)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn set_payment_status(
    conn: &mut PgConnection,
    order_id: OrderId,
    status: OrderPaymentStatus,
) -> Result<(), RepositoryError> {
    sqlx::query("UPDATE orders SET payment_status = $2, updated_at = NOW() WHERE id = $1")
        .bind(order_id)
        .bind(status)
        .execute(conn)
        .await?;
    Ok(())
}

/// Cancel an order after the buyer abandoned the provider checkout, and
/// give the source cart back if the user has not started a new one.
pub(crate) async fn cancel_and_restore_cart(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<(), RepositoryError> {
    let cart: Option<(Option<CartId>, UserId)> = sqlx::query_as(
        r"
        UPDATE orders
        SET status = $2, cancelled_at = NOW(), updated_at = NOW()
        WHERE id = $1
        RETURNING cart_id, user_id
        ",
    )
    .bind(order_id)
    .bind(OrderStatus::Cancelled)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some((Some(cart_id), user_id)) = cart {
        sqlx::query(
            r"
            UPDATE carts SET status = 'ACTIVE', checked_out_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'CONVERTED'
              AND NOT EXISTS (
                  SELECT 1 FROM carts WHERE user_id = $2 AND status = 'ACTIVE'
              )
            ",
        )
        .bind(cart_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
