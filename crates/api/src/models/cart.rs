//! Shopping cart models and totals arithmetic.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use souk_core::{
    AdjustmentKind, CartAdjustmentId, CartId, CartItemId, CartStatus, ColorId, CouponId,
    CouponKind, ProductId, SizeId, UserId, percent_off, round_money,
};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Cart {
    pub id: CartId,
    #[serde(skip)]
    pub user_id: Option<UserId>,
    #[serde(skip)]
    pub session_key: String,
    pub status: CartStatus,
    pub currency: String,
    pub items_subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub checked_out_at: Option<DateTime<Utc>>,
}

/// A cart line with its option names and line total.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: CartItemId,
    #[serde(skip)]
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub color_id: Option<ColorId>,
    pub color_name: Option<String>,
    pub size_id: Option<SizeId>,
    pub size_name: Option<String>,
    pub quantity: i32,
    pub product_name_snapshot: String,
    pub sku_snapshot: String,
    pub unit_price_snapshot: Decimal,
    pub compare_price_snapshot: Option<Decimal>,
    pub image_url_snapshot: String,
    pub line_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartAdjustment {
    pub id: CartAdjustmentId,
    #[serde(skip)]
    pub cart_id: CartId,
    pub kind: AdjustmentKind,
    pub label: String,
    pub amount: Decimal,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub kind: CouponKind,
    pub value: Decimal,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub max_uses: Option<i32>,
    pub max_uses_per_user: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Whether `now` falls inside the coupon's validity window.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.starts_at.is_none_or(|start| start <= now)
            && self.ends_at.is_none_or(|end| now <= end)
    }

    /// Discount granted on `subtotal`, never more than the subtotal itself.
    #[must_use]
    pub fn discount_for(&self, subtotal: Decimal) -> Decimal {
        let subtotal = subtotal.max(Decimal::ZERO);
        let raw = match self.kind {
            CouponKind::Percent => percent_off(subtotal, self.value.min(Decimal::ONE_HUNDRED)),
            CouponKind::Fixed => round_money(self.value),
        };
        raw.min(subtotal)
    }
}

/// The coupon currently applied to a cart.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AppliedCoupon {
    pub code: String,
    pub kind: CouponKind,
    pub value: Decimal,
    pub amount_applied: Decimal,
    pub applied_at: DateTime<Utc>,
}

/// Cached cart totals.
///
/// Discounts are stored as negative adjustments, so the grand total is a
/// plain sum. `MANUAL` adjustments are kept for bookkeeping and do not
/// contribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CartTotals {
    pub items_subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
}

impl CartTotals {
    /// Totals from `(unit_price, quantity)` lines and `(kind, amount)` adjustments.
    pub fn compute<L, A>(lines: L, adjustments: A) -> Self
    where
        L: IntoIterator<Item = (Decimal, i32)>,
        A: IntoIterator<Item = (AdjustmentKind, Decimal)>,
    {
        let items_subtotal: Decimal = lines
            .into_iter()
            .map(|(unit, qty)| unit * Decimal::from(qty))
            .sum();

        let mut totals = Self {
            items_subtotal: round_money(items_subtotal),
            ..Self::default()
        };
        for (kind, amount) in adjustments {
            match kind {
                AdjustmentKind::Discount => totals.discount_total += amount,
                AdjustmentKind::Shipping => totals.shipping_total += amount,
                AdjustmentKind::Tax => totals.tax_total += amount,
                AdjustmentKind::Manual => {}
            }
        }
        totals.grand_total = totals.items_subtotal
            + totals.discount_total
            + totals.shipping_total
            + totals.tax_total;
        totals
    }
}

/// Full cart payload returned by every cart endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub items: Vec<CartItem>,
    pub adjustments: Vec<CartAdjustment>,
    pub coupon: Option<AppliedCoupon>,
    pub items_count: i64,
}

impl CartView {
    #[must_use]
    pub fn new(
        cart: Cart,
        items: Vec<CartItem>,
        adjustments: Vec<CartAdjustment>,
        coupon: Option<AppliedCoupon>,
    ) -> Self {
        let items_count = items.iter().map(|i| i64::from(i.quantity)).sum();
        Self {
            cart,
            items,
            adjustments,
            coupon,
            items_count,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn default_quantity() -> i32 {
    1
}

/// Body of `POST /api/v1/cart/items/add`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddItemRequest {
    pub product: ProductId,
    #[serde(default)]
    pub color: Option<ColorId>,
    #[serde(default)]
    pub size: Option<SizeId>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

/// Body of `POST /api/v1/cart/items/update`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateItemRequest {
    pub item_id: CartItemId,
    pub quantity: i32,
}

/// Body of `POST /api/v1/cart/items/delete`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoveItemRequest {
    pub item_id: CartItemId,
}

/// Body of `POST /api/v1/cart/coupon/apply`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn coupon(kind: CouponKind, value: &str) -> Coupon {
        Coupon {
            id: CouponId::new(1),
            code: "WELCOME".into(),
            kind,
            value: d(value),
            is_active: true,
            starts_at: None,
            ends_at: None,
            max_uses: None,
            max_uses_per_user: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_totals_sum_lines_and_adjustments() {
        let totals = CartTotals::compute(
            [(d("19.99"), 2), (d("5.00"), 1)],
            [
                (AdjustmentKind::Discount, d("-4.50")),
                (AdjustmentKind::Shipping, d("7.00")),
                (AdjustmentKind::Tax, d("3.20")),
                (AdjustmentKind::Manual, d("100.00")),
            ],
        );

        assert_eq!(totals.items_subtotal, d("44.98"));
        assert_eq!(totals.discount_total, d("-4.50"));
        assert_eq!(totals.grand_total, d("50.68"));
    }

    #[test]
    fn test_empty_cart_totals_are_zero() {
        let totals = CartTotals::compute([], []);
        assert_eq!(totals, CartTotals::default());
    }

    #[test]
    fn test_percent_coupon_discount() {
        let c = coupon(CouponKind::Percent, "10");
        assert_eq!(c.discount_for(d("59.90")), d("5.99"));
    }

    #[test]
    fn test_fixed_coupon_is_capped_at_subtotal() {
        let c = coupon(CouponKind::Fixed, "25.00");
        assert_eq!(c.discount_for(d("80.00")), d("25.00"));
        assert_eq!(c.discount_for(d("12.00")), d("12.00"));
        assert_eq!(c.discount_for(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_coupon_window() {
        let now = Utc::now();
        let mut c = coupon(CouponKind::Fixed, "5");
        assert!(c.is_live(now));

        c.starts_at = Some(now + chrono::Duration::hours(1));
        assert!(!c.is_live(now));

        c.starts_at = None;
        c.ends_at = Some(now - chrono::Duration::seconds(1));
        assert!(!c.is_live(now));

        c.ends_at = None;
        c.is_active = false;
        assert!(!c.is_live(now));
    }

    #[test]
    fn test_add_item_defaults_quantity() {
        let req: AddItemRequest = serde_json::from_str(r#"{"product": 4}"#).unwrap();
        assert_eq!(req.quantity, 1);
        assert!(req.color.is_none());
    }
}
