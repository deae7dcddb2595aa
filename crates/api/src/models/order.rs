//! Orders created at checkout.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use souk_core::{
    CartId, ColorId, OrderAddressId, OrderAddressType, OrderId, OrderItemId, OrderPaymentStatus,
    OrderStatus, ProductId, SizeId, UserId,
};

use crate::error::FieldErrors;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    #[serde(skip)]
    pub id: OrderId,
    pub order_number: String,
    #[serde(skip)]
    pub user_id: UserId,
    #[serde(skip)]
    pub cart_id: Option<CartId>,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
    pub currency: String,
    pub items_subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping_total: Decimal,
    pub tax_total: Decimal,
    pub grand_total: Decimal,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status == OrderPaymentStatus::Paid
    }

    /// Only unpaid orders that have not started fulfilment can be cancelled.
    #[must_use]
    pub fn can_be_cancelled(&self) -> bool {
        self.status.can_be_cancelled() && !self.is_paid()
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    #[serde(skip)]
    pub order_id: OrderId,
    pub product_id: Option<ProductId>,
    pub color_id: Option<ColorId>,
    pub size_id: Option<SizeId>,
    pub quantity: i32,
    pub product_name_snapshot: String,
    pub sku_snapshot: String,
    pub unit_price_snapshot: Decimal,
    pub compare_price_snapshot: Option<Decimal>,
    pub image_url_snapshot: String,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderAddress {
    pub id: OrderAddressId,
    #[serde(skip)]
    pub order_id: OrderId,
    pub address_type: OrderAddressType,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub city: String,
    pub state_province: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

/// Address captured at checkout and copied onto the order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressSnapshot {
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub city: String,
    pub state_province: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

impl AddressSnapshot {
    /// Validate required fields, prefixing error keys with `prefix`.
    pub fn validate_into(&self, prefix: &'static str, errors: &mut FieldErrors) {
        let required = [
            ("first_name", &self.first_name, 100),
            ("last_name", &self.last_name, 100),
            ("address_line_1", &self.address_line_1, 255),
            ("city", &self.city, 100),
            ("state_province", &self.state_province, 100),
            ("postal_code", &self.postal_code, 20),
            ("country", &self.country, 100),
        ];
        for (field, value, max) in required {
            let key = format!("{prefix}.{field}");
            if value.trim().is_empty() {
                errors.add(&key, "This field is required.");
            } else if value.chars().count() > max {
                errors.add(&key, format!("Ensure this field has no more than {max} characters."));
            }
        }
        if self.phone.chars().count() > 20 {
            errors.add(
                &format!("{prefix}.phone"),
                "Ensure this field has no more than 20 characters.",
            );
        }
    }
}

/// Row of `GET /api/v1/orders/`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: Order,
    pub items_count: i64,
    pub is_paid: bool,
    pub can_be_cancelled: bool,
}

impl OrderSummary {
    #[must_use]
    pub fn new(order: Order, items_count: i64) -> Self {
        Self {
            is_paid: order.is_paid(),
            can_be_cancelled: order.can_be_cancelled(),
            order,
            items_count,
        }
    }
}

/// Payload of `GET /api/v1/orders/{order_number}/`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub summary: OrderSummary,
    pub items: Vec<OrderItem>,
    pub addresses: Vec<OrderAddress>,
}

impl OrderDetail {
    #[must_use]
    pub fn new(order: Order, items: Vec<OrderItem>, addresses: Vec<OrderAddress>) -> Self {
        let items_count = items.iter().map(|i| i64::from(i.quantity)).sum();
        Self {
            summary: OrderSummary::new(order, items_count),
            items,
            addresses,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn order(status: OrderStatus, payment_status: OrderPaymentStatus) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId::new(1),
            order_number: "ORD-20250101-ABCDEF12".into(),
            user_id: UserId::new(1),
            cart_id: Some(CartId::new(1)),
            status,
            payment_status,
            currency: "USD".into(),
            items_subtotal: Decimal::new(4000, 2),
            discount_total: Decimal::ZERO,
            shipping_total: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            grand_total: Decimal::new(4000, 2),
            notes: String::new(),
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            shipped_at: None,
            delivered_at: None,
            cancelled_at: None,
        }
    }

    #[test]
    fn test_cancellable_only_when_unpaid_and_early() {
        assert!(order(OrderStatus::Pending, OrderPaymentStatus::Pending).can_be_cancelled());
        assert!(order(OrderStatus::Confirmed, OrderPaymentStatus::Failed).can_be_cancelled());
        assert!(!order(OrderStatus::Confirmed, OrderPaymentStatus::Paid).can_be_cancelled());
        assert!(!order(OrderStatus::Shipped, OrderPaymentStatus::Pending).can_be_cancelled());
    }

    #[test]
    fn test_summary_serializes_flags_without_ids() {
        let summary = OrderSummary::new(order(OrderStatus::Pending, OrderPaymentStatus::Paid), 3);
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["order_number"], "ORD-20250101-ABCDEF12");
        assert_eq!(json["is_paid"], true);
        assert_eq!(json["can_be_cancelled"], false);
        assert_eq!(json["items_count"], 3);
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn test_address_snapshot_validation() {
        let mut errors = FieldErrors::default();
        let snapshot = AddressSnapshot {
            first_name: "Omar".into(),
            city: "Rabat".into(),
            ..AddressSnapshot::default()
        };
        snapshot.validate_into("shipping_address", &mut errors);

        assert!(errors.contains("shipping_address.last_name"));
        assert!(errors.contains("shipping_address.postal_code"));
        assert!(!errors.contains("shipping_address.city"));
    }
}
