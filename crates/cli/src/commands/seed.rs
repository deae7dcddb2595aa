//! Seed reference data.

use souk_api::db::PaymentRepository;
use souk_core::PaymentProvider;

use super::{CommandError, connect};

/// Provider rows created by `seed payment-methods`: provider, display
/// name, enabled, sort order. Only PayPal is wired to a live integration.
pub const PAYMENT_METHODS: &[(PaymentProvider, &str, bool, i32)] = &[
    (PaymentProvider::Paypal, "PayPal", true, 1),
    (PaymentProvider::Caixa, "Caixa", false, 2),
    (PaymentProvider::Bizum, "Bizum", false, 3),
    (PaymentProvider::BinancePay, "Binance Pay", false, 4),
];

/// Insert missing payment methods. Safe to run repeatedly.
///
/// # Errors
///
/// Returns an error if the database is unreachable or the insert fails.
pub async fn payment_methods() -> Result<(), CommandError> {
    let pool = connect().await?;
    let created = PaymentRepository::new(&pool)
        .seed_methods(PAYMENT_METHODS)
        .await?;

    tracing::info!(created, total = PAYMENT_METHODS.len(), "Payment methods seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_paypal_is_enabled() {
        let enabled: Vec<_> = PAYMENT_METHODS
            .iter()
            .filter(|(_, _, active, _)| *active)
            .map(|(provider, ..)| *provider)
            .collect();
        assert_eq!(enabled, vec![PaymentProvider::Paypal]);
    }

    #[test]
    fn test_sort_orders_are_distinct() {
        let mut orders: Vec<i32> = PAYMENT_METHODS.iter().map(|m| m.3).collect();
        orders.dedup();
        assert_eq!(orders.len(), PAYMENT_METHODS.len());
    }
}
