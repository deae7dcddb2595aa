//! Core types for Souk.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod reference;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{
    DEFAULT_CURRENCY, markdown_percentage, percent_off, round_money, to_provider_value,
};
pub use reference::{generate_order_number, generate_payment_id};
pub use status::*;
