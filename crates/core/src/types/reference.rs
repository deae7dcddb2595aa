//! Human-facing reference numbers for orders and payments.
//!
//! Both formats embed the UTC creation date followed by upper-case hex
//! taken from a random UUID:
//!
//! - orders: `ORD-20250114-1A2B3C4D` (8 hex chars)
//! - payments: `PAY-20250114-1A2B3C4D5E6F` (12 hex chars)

use chrono::NaiveDate;
use uuid::Uuid;

const ORDER_SUFFIX_LEN: usize = 8;
const PAYMENT_SUFFIX_LEN: usize = 12;

fn random_hex(len: usize) -> String {
    let mut hex = Uuid::new_v4().simple().to_string();
    hex.truncate(len);
    hex.to_uppercase()
}

/// Generate an order number for an order created on `date`.
#[must_use]
pub fn generate_order_number(date: NaiveDate) -> String {
    format!(
        "ORD-{}-{}",
        date.format("%Y%m%d"),
        random_hex(ORDER_SUFFIX_LEN)
    )
}

/// Generate a payment reference for a payment created on `date`.
#[must_use]
pub fn generate_payment_id(date: NaiveDate) -> String {
    format!(
        "PAY-{}-{}",
        date.format("%Y%m%d"),
        random_hex(PAYMENT_SUFFIX_LEN)
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn is_upper_hex(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
    }

    #[test]
    fn test_order_number_format() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 14).unwrap();
        let number = generate_order_number(date);

        assert!(number.starts_with("ORD-20250114-"));
        let suffix = number.trim_start_matches("ORD-20250114-");
        assert_eq!(suffix.len(), 8);
        assert!(is_upper_hex(suffix));
    }

    #[test]
    fn test_payment_id_format() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let id = generate_payment_id(date);

        assert!(id.starts_with("PAY-20241231-"));
        let suffix = id.trim_start_matches("PAY-20241231-");
        assert_eq!(suffix.len(), 12);
        assert!(is_upper_hex(suffix));
    }

    #[test]
    fn test_references_are_unique() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_ne!(generate_order_number(date), generate_order_number(date));
    }
}
