//! Database operations for the Souk API.
//!
//! # Tables
//!
//! - Accounts: `users`, `user_profiles`, `addresses`,
//!   `email_verification_tokens`, `password_reset_tokens`
//! - Security: `security_attempts`, `user_sessions`, `blacklisted_tokens`
//! - Catalog: `products`, `product_images`, `categories`, `colors`, `sizes`,
//!   `tags` and the `product_*` link tables
//! - Commerce: `carts`, `cart_items`, `cart_adjustments`, `coupons`,
//!   `cart_coupons`, `orders`, `order_items`, `order_addresses`
//! - Payments: `payment_methods`, `payments`, `payment_transactions`,
//!   `payment_webhooks`
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p souk-cli -- migrate
//! ```
//!
//! Queries are checked at runtime (`sqlx::query_as` + `FromRow`), so the
//! crate builds without a live database.

pub mod addresses;
pub mod carts;
pub mod catalog;
pub mod orders;
pub mod payments;
pub mod security;
pub mod sessions;
pub mod tokens;
pub mod users;

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use addresses::AddressRepository;
pub use carts::{CartOwner, CartRepository};
pub use catalog::CatalogRepository;
pub use orders::OrderRepository;
pub use payments::PaymentRepository;
pub use security::SecurityAttemptRepository;
pub use sessions::SessionRepository;
pub use tokens::TokenRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique-constraint violation to `Conflict`, pass everything else through.
    pub(crate) fn from_unique(e: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(what.to_owned());
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
