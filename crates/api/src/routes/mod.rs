//! HTTP route handlers.
//!
//! # Route Structure
//!
//! Every path also answers with a trailing `/`.
//!
//! ```text
//! GET  /api/health                          - Liveness
//! GET  /api/health/ready                    - Readiness (database ping)
//!
//! # Auth (/api/v1/auth)
//! POST register                             - Create an inactive account
//! GET|POST verify-email/{token}             - Activate and sign in
//! POST resend-verification                  - New verification token
//! POST login                                - Email + password sign-in
//! POST logout                               - End the current session (auth)
//! POST refresh                              - Rotate a refresh token
//! POST change-password                      - (auth)
//! POST password-reset                       - Start a reset
//! POST password-reset/confirm               - Finish a reset
//! GET  sessions                             - Active device sessions (auth)
//! GET  sessions/stats                       - Session counts (auth)
//! POST sessions/{id}/deactivate             - Sign out one device (auth)
//! POST sessions/deactivate-others           - Sign out other devices (auth)
//!
//! # Users (/api/v1/users, auth)
//! GET|PATCH me                              - Account + loyalty profile
//! PATCH me/profile                          - Preferences
//! GET|POST me/addresses                     - Address book
//! GET|PATCH|DELETE me/addresses/{id}
//! POST me/addresses/{id}/default
//!
//! # Catalog (/api/v1/products)
//! GET  /                                    - Filtered listing
//! GET  categories | colors | sizes | tags   - Cached taxonomy
//! GET  {slug}                               - Product detail
//!
//! # Cart (/api/v1/cart, auth or X-Session-Key)
//! GET  /
//! POST items/add | items/update | items/delete | clear
//! POST coupon/apply | coupon/remove
//! POST merge                                - Guest cart into user cart (auth)
//!
//! # Orders (/api/v1/orders, auth)
//! GET  /  |  {order_number}  |  POST {order_number}/cancel
//!
//! # Payments (/api/v1/payments)
//! GET  methods
//! POST create                               - Checkout (auth)
//! GET  status/{payment_id}                  - (auth)
//! GET  paypal/success | paypal/cancel       - PayPal return URLs
//! POST webhooks/paypal
//! ```

pub mod auth;
pub mod cart;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;
pub mod sessions;
pub mod users;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Create the auth and session routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route(
            "/verify-email/{token}",
            get(auth::verify_email).post(auth::verify_email),
        )
        .route("/resend-verification", post(auth::resend_verification))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/refresh", post(auth::refresh))
        .route("/change-password", post(auth::change_password))
        .route("/password-reset", post(auth::password_reset))
        .route("/password-reset/confirm", post(auth::password_reset_confirm))
        .route("/sessions", get(sessions::list))
        .route("/sessions/stats", get(sessions::stats))
        .route("/sessions/deactivate-others", post(sessions::deactivate_others))
        .route("/sessions/{id}/deactivate", post(sessions::deactivate))
}

/// Create the user profile and address routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(users::me).patch(users::update_me))
        .route("/me/profile", patch(users::update_profile))
        .route(
            "/me/addresses",
            get(users::list_addresses).post(users::create_address),
        )
        .route(
            "/me/addresses/{id}",
            get(users::get_address)
                .patch(users::update_address)
                .delete(users::delete_address),
        )
        .route("/me/addresses/{id}/default", post(users::set_default_address))
}

/// Create the catalog routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::list))
        .route("/categories", get(products::categories))
        .route("/colors", get(products::colors))
        .route("/sizes", get(products::sizes))
        .route("/tags", get(products::tags))
        .route("/{slug}", get(products::detail))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/items/add", post(cart::add_item))
        .route("/items/update", post(cart::update_item))
        .route("/items/delete", post(cart::remove_item))
        .route("/clear", post(cart::clear))
        .route("/coupon/apply", post(cart::apply_coupon))
        .route("/coupon/remove", post(cart::remove_coupon))
        .route("/merge", post(cart::merge))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list))
        .route("/{order_number}", get(orders::detail))
        .route("/{order_number}/cancel", post(orders::cancel))
}

/// Create the payment routes router.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/methods", get(payments::methods))
        .route("/create", post(payments::create))
        .route("/status/{payment_id}", get(payments::status))
        .route("/paypal/success", get(payments::paypal_success))
        .route("/paypal/cancel", get(payments::paypal_cancel))
        .route("/webhooks/paypal", post(payments::paypal_webhook))
}

/// Create all routes.
///
/// `/api/v1/auth` carries the strict per-IP limiter, everything else under
/// `/api/v1` the relaxed one. Health probes are never throttled.
pub fn routes() -> Router<AppState> {
    let v1 = Router::new()
        .nest("/users", user_routes())
        .nest("/products", product_routes())
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes())
        .nest("/payments", payment_routes())
        .layer(api_rate_limiter())
        .nest("/auth", auth_routes().layer(auth_rate_limiter()));

    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/health/ready", get(health::readiness))
        .nest("/api/v1", v1)
}
