//! Souk Core - shared domain types.
//!
//! This crate provides the types used across all Souk components:
//! - `api` - JSON REST backend (auth, catalog, cart, orders, payments)
//! - `cli` - Command-line tools for migrations, cleanup and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and pure helpers - no I/O, no database
//! access, no HTTP clients. Database encoding is opt-in through the
//! `postgres` feature.
//!
//! # Modules
//!
//! - [`types`] - Typed IDs, emails, money helpers, reference numbers and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
