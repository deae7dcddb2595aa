//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Registration, verification, login, token rotation, passwords
//! - `security` - Failed-attempt rate limiting
//! - `sessions` - Device sessions and the cleanup job
//! - `catalog` - Product reads behind a `moka` cache
//! - `cart` - Cart validation and coupons
//! - `checkout` - Cart to order to payment, PayPal callbacks and webhooks

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod security;
pub mod sessions;
