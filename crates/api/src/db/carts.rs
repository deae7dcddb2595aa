//! Cart repository.
//!
//! Every mutation runs in a transaction that ends with [`recompute_totals`],
//! so the cached totals on `carts` always match the lines and adjustments.

use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use souk_core::{
    AdjustmentKind, CartId, CartItemId, CartStatus, ColorId, CouponId, DEFAULT_CURRENCY,
    SizeId, UserId,
};

use super::RepositoryError;
use crate::models::{
    AppliedCoupon, Cart, CartAdjustment, CartItem, CartTotals, CartView, Coupon, Product,
};

const CART_COLUMNS: &str = "id, user_id, session_key, status, currency, items_subtotal, \
     discount_total, shipping_total, tax_total, grand_total, created_at, updated_at, checked_out_at";

const ITEM_SELECT: &str = r"
    SELECT ci.id, ci.cart_id, ci.product_id, ci.color_id, co.name AS color_name,
           ci.size_id, s.name AS size_name, ci.quantity, ci.product_name_snapshot,
           ci.sku_snapshot, ci.unit_price_snapshot, ci.compare_price_snapshot,
           ci.image_url_snapshot, ci.unit_price_snapshot * ci.quantity AS line_total,
           ci.created_at, ci.updated_at
    FROM cart_items ci
    LEFT JOIN colors co ON co.id = ci.color_id
    LEFT JOIN sizes s ON s.id = ci.size_id
";

const COUPON_COLUMNS: &str = "id, code, kind, value, is_active, starts_at, ends_at, max_uses, \
     max_uses_per_user, created_at";

/// Who a cart belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartOwner<'k> {
    User(UserId),
    /// Guest identified by the `X-Session-Key` header.
    Guest(&'k str),
}

/// Repository for carts, cart lines, adjustments and coupons.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The owner's ACTIVE cart, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_active(&self, owner: CartOwner<'_>) -> Result<Option<Cart>, RepositoryError> {
        let cart = match owner {
            CartOwner::User(id) => {
                sqlx::query_as::<_, Cart>(&format!(
                    "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1 AND status = 'ACTIVE'"
                ))
                .bind(id)
                .fetch_optional(self.pool)
                .await?
            }
            CartOwner::Guest(key) => {
                sqlx::query_as::<_, Cart>(&format!(
                    "SELECT {CART_COLUMNS} FROM carts \
                     WHERE session_key = $1 AND user_id IS NULL AND status = 'ACTIVE'"
                ))
                .bind(key)
                .fetch_optional(self.pool)
                .await?
            }
        };
        Ok(cart)
    }

    /// The owner's ACTIVE cart, created on first use.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the queries fail.
    pub async fn get_or_create_active(&self, owner: CartOwner<'_>) -> Result<Cart, RepositoryError> {
        if let Some(cart) = self.find_active(owner).await? {
            return Ok(cart);
        }

        let (user_id, session_key) = match owner {
            CartOwner::User(id) => (Some(id), ""),
            CartOwner::Guest(key) => (None, key),
        };
        let inserted = sqlx::query_as::<_, Cart>(&format!(
            r"
            INSERT INTO carts (user_id, session_key, currency)
            VALUES ($1, $2, $3)
            RETURNING {CART_COLUMNS}
            "
        ))
        .bind(user_id)
        .bind(session_key)
        .bind(DEFAULT_CURRENCY)
        .fetch_one(self.pool)
        .await;

        match inserted {
            Ok(cart) => Ok(cart),
            // A concurrent request created it first.
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => self
                .find_active(owner)
                .await?
                .ok_or(RepositoryError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the cart does not exist.
    pub async fn get(&self, id: CartId) -> Result<Cart, RepositoryError> {
        sqlx::query_as::<_, Cart>(&format!("SELECT {CART_COLUMNS} FROM carts WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError> {
        let items = sqlx::query_as::<_, CartItem>(&format!(
            "{ITEM_SELECT} WHERE ci.cart_id = $1 ORDER BY ci.created_at, ci.id"
        ))
        .bind(cart_id)
        .fetch_all(self.pool)
        .await?;
        Ok(items)
    }

    /// Cart with lines, adjustments and the applied coupon.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn view(&self, cart_id: CartId) -> Result<CartView, RepositoryError> {
        let cart = self.get(cart_id).await?;
        let items = self.items(cart_id).await?;

        let adjustments = sqlx::query_as::<_, CartAdjustment>(
            r"
            SELECT id, cart_id, kind, label, amount, meta, created_at
            FROM cart_adjustments WHERE cart_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(cart_id)
        .fetch_all(self.pool)
        .await?;

        let coupon = sqlx::query_as::<_, AppliedCoupon>(
            r"
            SELECT c.code, c.kind, c.value, cc.amount_applied, cc.applied_at
            FROM cart_coupons cc JOIN coupons c ON c.id = cc.coupon_id
            WHERE cc.cart_id = $1
            ",
        )
        .bind(cart_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(CartView::new(cart, items, adjustments, coupon))
    }

    /// Add `quantity` of a product, merging into an existing line with the
    /// same options and refreshing its snapshots.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product: &Product,
        color: Option<ColorId>,
        size: Option<SizeId>,
        quantity: i32,
    ) -> Result<CartTotals, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO cart_items
                (cart_id, product_id, color_id, size_id, quantity, product_name_snapshot,
                 sku_snapshot, unit_price_snapshot, compare_price_snapshot, image_url_snapshot)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT ON CONSTRAINT cart_items_line_key DO UPDATE SET
                quantity = cart_items.quantity + EXCLUDED.quantity,
                product_name_snapshot = EXCLUDED.product_name_snapshot,
                sku_snapshot = EXCLUDED.sku_snapshot,
                unit_price_snapshot = EXCLUDED.unit_price_snapshot,
                compare_price_snapshot = EXCLUDED.compare_price_snapshot,
                image_url_snapshot = EXCLUDED.image_url_snapshot,
                updated_at = NOW()
            ",
        )
        .bind(cart_id)
        .bind(product.id)
        .bind(color)
        .bind(size)
        .bind(quantity)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(product.price)
        .bind(product.compare_price)
        .bind(product.primary_image.as_deref().unwrap_or_default())
        .execute(&mut *tx)
        .await?;

        let totals = recompute_totals(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(totals)
    }

    /// Set a line's quantity; zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in this cart.
    pub async fn set_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<CartTotals, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let affected = if quantity <= 0 {
            sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
                .bind(item_id)
                .bind(cart_id)
                .execute(&mut *tx)
                .await?
        } else {
            sqlx::query(
                "UPDATE cart_items SET quantity = $3, updated_at = NOW() WHERE id = $1 AND cart_id = $2",
            )
            .bind(item_id)
            .bind(cart_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?
        };
        if affected.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        let totals = recompute_totals(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(totals)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not in this cart.
    pub async fn remove_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<CartTotals, RepositoryError> {
        self.set_quantity(cart_id, item_id, 0).await
    }

    /// Remove every line and the applied coupon.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn clear(&self, cart_id: CartId) -> Result<CartTotals, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(&mut *tx)
            .await?;
        detach_coupon(&mut tx, cart_id).await?;

        let totals = recompute_totals(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(totals)
    }

    /// Look up a coupon by code (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_coupon(&self, code: &str) -> Result<Option<Coupon>, RepositoryError> {
        let coupon = sqlx::query_as::<_, Coupon>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE upper(code) = upper($1)"
        ))
        .bind(code.trim())
        .fetch_optional(self.pool)
        .await?;
        Ok(coupon)
    }

    /// Redemptions of a coupon on checked-out carts: `(total, by this user)`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn coupon_redemptions(
        &self,
        coupon_id: CouponId,
        user_id: Option<UserId>,
    ) -> Result<(i64, i64), RepositoryError> {
        let counts: (i64, i64) = sqlx::query_as(
            r"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE c.user_id IS NOT DISTINCT FROM $2)
            FROM cart_coupons cc JOIN carts c ON c.id = cc.cart_id
            WHERE cc.coupon_id = $1 AND c.status = 'CONVERTED'
            ",
        )
        .bind(coupon_id)
        .bind(user_id)
        .fetch_one(self.pool)
        .await?;
        Ok(counts)
    }

    /// Attach a coupon, replacing any coupon already on the cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn apply_coupon(
        &self,
        cart_id: CartId,
        coupon: &Coupon,
    ) -> Result<CartTotals, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        detach_coupon(&mut tx, cart_id).await?;

        let adjustment_id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO cart_adjustments (cart_id, kind, label, amount, meta)
            VALUES ($1, 'DISCOUNT', $2, 0, jsonb_build_object('coupon', $3::text))
            RETURNING id
            ",
        )
        .bind(cart_id)
        .bind(format!("Coupon {}", coupon.code))
        .bind(&coupon.code)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO cart_coupons (cart_id, coupon_id, adjustment_id) VALUES ($1, $2, $3)",
        )
        .bind(cart_id)
        .bind(coupon.id)
        .bind(adjustment_id)
        .execute(&mut *tx)
        .await?;

        let totals = recompute_totals(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(totals)
    }

    /// Returns `false` when no coupon was applied.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn remove_coupon(&self, cart_id: CartId) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let removed = detach_coupon(&mut tx, cart_id).await?;
        recompute_totals(&mut tx, cart_id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    /// Fold a guest cart into the user's active cart.
    ///
    /// Without an existing user cart the guest cart is simply claimed.
    /// Otherwise lines are merged (quantities added) and the guest cart is
    /// marked ABANDONED.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn merge_guest_cart(
        &self,
        guest_cart: CartId,
        user_id: UserId,
    ) -> Result<CartId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let user_cart: Option<CartId> = sqlx::query_scalar(
            "SELECT id FROM carts WHERE user_id = $1 AND status = 'ACTIVE' FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_cart) = user_cart else {
            sqlx::query(
                "UPDATE carts SET user_id = $2, session_key = '', updated_at = NOW() WHERE id = $1",
            )
            .bind(guest_cart)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok(guest_cart);
        };

        absorb_cart(&mut tx, guest_cart, user_cart).await?;
        recompute_totals(&mut tx, user_cart).await?;

        tx.commit().await?;
        Ok(user_cart)
    }
}

/// Move every line of `from` into `into`, summing quantities of matching
/// lines, then abandon `from`.
///
/// `into` still needs its totals recomputed by the caller.
pub(crate) async fn absorb_cart(
    conn: &mut PgConnection,
    from: CartId,
    into: CartId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO cart_items
            (cart_id, product_id, color_id, size_id, quantity, product_name_snapshot,
             sku_snapshot, unit_price_snapshot, compare_price_snapshot, image_url_snapshot)
        SELECT $2, product_id, color_id, size_id, quantity, product_name_snapshot,
               sku_snapshot, unit_price_snapshot, compare_price_snapshot, image_url_snapshot
        FROM cart_items WHERE cart_id = $1
        ON CONFLICT ON CONSTRAINT cart_items_line_key DO UPDATE SET
            quantity = cart_items.quantity + EXCLUDED.quantity,
            updated_at = NOW()
        ",
    )
    .bind(from)
    .bind(into)
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
        .bind(from)
        .execute(&mut *conn)
        .await?;
    detach_coupon(&mut *conn, from).await?;
    sqlx::query("UPDATE carts SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(from)
        .bind(CartStatus::Abandoned)
        .execute(&mut *conn)
        .await?;
    recompute_totals(&mut *conn, from).await?;
    Ok(())
}

/// Remove the cart's coupon and its discount adjustment.
async fn detach_coupon(conn: &mut PgConnection, cart_id: CartId) -> Result<bool, RepositoryError> {
    let adjustment: Option<i32> =
        sqlx::query_scalar("DELETE FROM cart_coupons WHERE cart_id = $1 RETURNING adjustment_id")
            .bind(cart_id)
            .fetch_optional(&mut *conn)
            .await?;

    if let Some(adjustment_id) = adjustment {
        sqlx::query("DELETE FROM cart_adjustments WHERE id = $1")
            .bind(adjustment_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(adjustment.is_some())
}

/// Recompute and store the cart's cached totals.
///
/// The coupon discount is re-derived from the current subtotal before the
/// adjustments are summed.
pub(crate) async fn recompute_totals(
    conn: &mut PgConnection,
    cart_id: CartId,
) -> Result<CartTotals, RepositoryError> {
    let lines: Vec<(Decimal, i32)> = sqlx::query_as(
        "SELECT unit_price_snapshot, quantity FROM cart_items WHERE cart_id = $1",
    )
    .bind(cart_id)
    .fetch_all(&mut *conn)
    .await?;
    let subtotal = CartTotals::compute(lines.iter().copied(), []).items_subtotal;

    let applied: Option<(i32, CouponId)> =
        sqlx::query_as("SELECT adjustment_id, coupon_id FROM cart_coupons WHERE cart_id = $1")
            .bind(cart_id)
            .fetch_optional(&mut *conn)
            .await?;
    if let Some((adjustment_id, coupon_id)) = applied {
        let coupon = sqlx::query_as::<_, Coupon>(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1"
        ))
        .bind(coupon_id)
        .fetch_one(&mut *conn)
        .await?;
        let discount = coupon.discount_for(subtotal);

        sqlx::query("UPDATE cart_adjustments SET amount = $2 WHERE id = $1")
            .bind(adjustment_id)
            .bind(-discount)
            .execute(&mut *conn)
            .await?;
        sqlx::query("UPDATE cart_coupons SET amount_applied = $2 WHERE cart_id = $1")
            .bind(cart_id)
            .bind(discount)
            .execute(&mut *conn)
            .await?;
    }

    let adjustments: Vec<(AdjustmentKind, Decimal)> =
        sqlx::query_as("SELECT kind, amount FROM cart_adjustments WHERE cart_id = $1")
            .bind(cart_id)
            .fetch_all(&mut *conn)
            .await?;

    let totals = CartTotals::compute(lines, adjustments);
    sqlx::query(
        r"
        UPDATE carts
        SET items_subtotal = $2, discount_total = $3, shipping_total = $4,
            tax_total = $5, grand_total = $6, updated_at = NOW()
        WHERE id = $1
        ",
    )
    .bind(cart_id)
    .bind(totals.items_subtotal)
    .bind(totals.discount_total)
    .bind(totals.shipping_total)
    .bind(totals.tax_total)
    .bind(totals.grand_total)
    .execute(&mut *conn)
    .await?;

    Ok(totals)
}
