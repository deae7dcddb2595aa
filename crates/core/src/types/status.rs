//! Status and kind enums shared by the API and the CLI.
//!
//! Each enum maps to a `PostgreSQL` enum type of the same snake-case name
//! (see the API migrations) and serializes with the same spelling the
//! database uses.

use serde::{Deserialize, Serialize};

/// Error returned when a string does not name a variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

/// Implement `as_str`, `Display` and case-insensitive `FromStr` from one
/// variant → text table.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Database / wire spelling of this value.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ParseStatusError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($text) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(ParseStatusError {
                    kind: $kind,
                    value: s.to_owned(),
                })
            }
        }
    };
}

// =============================================================================
// Cart
// =============================================================================

/// Lifecycle of a shopping cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "cart_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CartStatus {
    #[default]
    Active,
    Converted,
    Abandoned,
    Expired,
}

text_enum!(CartStatus, "cart status", {
    Active => "ACTIVE",
    Converted => "CONVERTED",
    Abandoned => "ABANDONED",
    Expired => "EXPIRED",
});

/// Kind of a cart-level adjustment. Discounts carry negative amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "adjustment_kind", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentKind {
    Discount,
    Shipping,
    Tax,
    Manual,
}

text_enum!(AdjustmentKind, "adjustment kind", {
    Discount => "DISCOUNT",
    Shipping => "SHIPPING",
    Tax => "TAX",
    Manual => "MANUAL",
});

/// How a coupon's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "coupon_kind", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponKind {
    /// `value` is a percentage of the items subtotal.
    Percent,
    /// `value` is a fixed amount in the cart currency.
    Fixed,
}

text_enum!(CouponKind, "coupon kind", {
    Percent => "PERCENT",
    Fixed => "FIXED",
});

// =============================================================================
// Orders
// =============================================================================

/// Fulfillment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Orders can be cancelled until they start processing.
    #[must_use]
    pub const fn can_be_cancelled(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed)
    }
}

text_enum!(OrderStatus, "order status", {
    Pending => "PENDING",
    Confirmed => "CONFIRMED",
    Processing => "PROCESSING",
    Shipped => "SHIPPED",
    Delivered => "DELIVERED",
    Cancelled => "CANCELLED",
    Refunded => "REFUNDED",
});

/// Payment state as seen from the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_payment_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
    PartiallyRefunded,
}

text_enum!(OrderPaymentStatus, "order payment status", {
    Pending => "PENDING",
    Paid => "PAID",
    Failed => "FAILED",
    Refunded => "REFUNDED",
    PartiallyRefunded => "PARTIALLY_REFUNDED",
});

/// Role of an address snapshot attached to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_address_type", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderAddressType {
    Shipping,
    Billing,
}

text_enum!(OrderAddressType, "order address type", {
    Shipping => "SHIPPING",
    Billing => "BILLING",
});

/// Purpose of a saved user address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "address_kind", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    #[default]
    Shipping,
    Billing,
    Other,
}

text_enum!(AddressKind, "address kind", {
    Shipping => "shipping",
    Billing => "billing",
    Other => "other",
});

// =============================================================================
// Payments
// =============================================================================

/// Supported payment providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_provider", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentProvider {
    Paypal,
    Caixa,
    Bizum,
    BinancePay,
}

text_enum!(PaymentProvider, "payment provider", {
    Paypal => "PAYPAL",
    Caixa => "CAIXA",
    Bizum => "BIZUM",
    BinancePay => "BINANCE_PAY",
});

/// Status of a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    /// Payments still waiting on the provider can be cancelled.
    #[must_use]
    pub const fn can_be_cancelled(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

text_enum!(PaymentStatus, "payment status", {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Completed => "COMPLETED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
    Refunded => "REFUNDED",
    PartiallyRefunded => "PARTIALLY_REFUNDED",
});

/// Direction of money movement for a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_type", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    #[default]
    Payment,
    Refund,
    PartialRefund,
}

text_enum!(PaymentType, "payment type", {
    Payment => "PAYMENT",
    Refund => "REFUND",
    PartialRefund => "PARTIAL_REFUND",
});

/// Audit-trail action recorded against a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "transaction_action", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionAction {
    Created,
    Authorized,
    Captured,
    Failed,
    Cancelled,
    Refunded,
    WebhookReceived,
}

text_enum!(TransactionAction, "transaction action", {
    Created => "CREATED",
    Authorized => "AUTHORIZED",
    Captured => "CAPTURED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
    Refunded => "REFUNDED",
    WebhookReceived => "WEBHOOK_RECEIVED",
});

// =============================================================================
// Accounts
// =============================================================================

/// Security-sensitive operation recorded in the attempt log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "attempt_type", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptType {
    Login,
    Register,
    PasswordReset,
    EmailVerification,
    ResendVerification,
    TokenRefresh,
}

text_enum!(AttemptType, "attempt type", {
    Login => "LOGIN",
    Register => "REGISTER",
    PasswordReset => "PASSWORD_RESET",
    EmailVerification => "EMAIL_VERIFICATION",
    ResendVerification => "RESEND_VERIFICATION",
    TokenRefresh => "TOKEN_REFRESH",
});

/// Loyalty tier derived from accumulated points.
///
/// Not stored: the tier is always recomputed from `loyalty_points`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl MembershipTier {
    /// Tier earned by a point balance.
    #[must_use]
    pub const fn for_points(points: i32) -> Self {
        match points {
            i32::MIN..=999 => Self::Bronze,
            1_000..=4_999 => Self::Silver,
            5_000..=9_999 => Self::Gold,
            _ => Self::Platinum,
        }
    }

    /// Member discount in whole percent.
    #[must_use]
    pub const fn discount_percentage(self) -> u8 {
        match self {
            Self::Bronze => 0,
            Self::Silver => 5,
            Self::Gold => 10,
            Self::Platinum => 15,
        }
    }
}

text_enum!(MembershipTier, "membership tier", {
    Bronze => "bronze",
    Silver => "silver",
    Gold => "gold",
    Platinum => "platinum",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("paypal".parse::<PaymentProvider>().unwrap(), PaymentProvider::Paypal);
        assert_eq!(
            "Binance_Pay".parse::<PaymentProvider>().unwrap(),
            PaymentProvider::BinancePay
        );
        assert!("stripe".parse::<PaymentProvider>().is_err());
    }

    #[test]
    fn test_parse_error_names_kind() {
        let err = "LOST".parse::<CartStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid cart status: LOST");
    }

    #[test]
    fn test_serde_matches_as_str() {
        let json = serde_json::to_string(&PaymentStatus::PartiallyRefunded).unwrap();
        assert_eq!(json, format!("\"{}\"", PaymentStatus::PartiallyRefunded.as_str()));

        let json = serde_json::to_string(&AddressKind::Billing).unwrap();
        assert_eq!(json, "\"billing\"");
    }

    #[test]
    fn test_order_cancellation_window() {
        assert!(OrderStatus::Pending.can_be_cancelled());
        assert!(OrderStatus::Confirmed.can_be_cancelled());
        assert!(!OrderStatus::Processing.can_be_cancelled());
        assert!(!OrderStatus::Shipped.can_be_cancelled());
        assert!(!OrderStatus::Cancelled.can_be_cancelled());
    }

    #[test]
    fn test_payment_cancellation_window() {
        assert!(PaymentStatus::Pending.can_be_cancelled());
        assert!(PaymentStatus::Processing.can_be_cancelled());
        assert!(!PaymentStatus::Completed.can_be_cancelled());
    }

    #[test]
    fn test_membership_tier_thresholds() {
        assert_eq!(MembershipTier::for_points(0), MembershipTier::Bronze);
        assert_eq!(MembershipTier::for_points(999), MembershipTier::Bronze);
        assert_eq!(MembershipTier::for_points(1_000), MembershipTier::Silver);
        assert_eq!(MembershipTier::for_points(5_000), MembershipTier::Gold);
        assert_eq!(MembershipTier::for_points(10_000), MembershipTier::Platinum);
        assert_eq!(MembershipTier::for_points(250_000), MembershipTier::Platinum);
    }

    #[test]
    fn test_membership_discounts() {
        assert_eq!(MembershipTier::Bronze.discount_percentage(), 0);
        assert_eq!(MembershipTier::Silver.discount_percentage(), 5);
        assert_eq!(MembershipTier::Gold.discount_percentage(), 10);
        assert_eq!(MembershipTier::Platinum.discount_percentage(), 15);
    }
}
