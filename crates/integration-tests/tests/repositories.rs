//! Repository transactions against a real database.
//!
//! These need a disposable `PostgreSQL` database in `DATABASE_URL`;
//! migrations are applied on connect. Every test works on its own freshly
//! created user and product.

#![allow(clippy::unwrap_used)]

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use souk_api::db::orders::CheckoutInput;
use souk_api::db::payments::NewWebhook;
use souk_api::db::{
    CartOwner, CartRepository, CatalogRepository, OrderRepository, PaymentRepository,
    UserRepository,
};
use souk_api::models::{AddressSnapshot, NewUser, Product, User};
use souk_core::{CartStatus, Email, PaymentProvider};

use souk_integration_tests::database_pool;

async fn new_user(pool: &PgPool) -> User {
    let tag = Uuid::new_v4().simple().to_string();
    UserRepository::new(pool)
        .create(&NewUser {
            email: Email::parse(&format!("repo-{tag}@example.com")).unwrap(),
            username: format!("repo_{}", &tag[..12]),
            password_hash: "unused".to_owned(),
            first_name: "Repo".to_owned(),
            last_name: "Test".to_owned(),
            phone: String::new(),
        })
        .await
        .unwrap()
}

async fn new_product(pool: &PgPool, price: &str) -> Product {
    let tag = Uuid::new_v4().simple().to_string();
    let slug = format!("repo-item-{tag}");
    sqlx::query(
        "INSERT INTO products (name, slug, sku, price, stock_quantity) \
         VALUES ($1, $2, $3, $4::numeric, 10)",
    )
    .bind("Repo item")
    .bind(&slug)
    .bind(format!("SKU-{tag}"))
    .bind(price)
    .execute(pool)
    .await
    .unwrap();
    CatalogRepository::new(pool)
        .get_by_slug(&slug)
        .await
        .unwrap()
        .unwrap()
}

async fn paypal_method(pool: &PgPool) -> souk_api::models::PaymentMethod {
    let payments = PaymentRepository::new(pool);
    payments
        .seed_methods(&[(PaymentProvider::Paypal, "PayPal", true, 1)])
        .await
        .unwrap();
    payments
        .method_for_provider(PaymentProvider::Paypal)
        .await
        .unwrap()
        .unwrap()
}

fn shipping() -> AddressSnapshot {
    AddressSnapshot {
        first_name: "Amal".to_owned(),
        last_name: "Idrissi".to_owned(),
        address_line_1: "12 Rue Tarik".to_owned(),
        city: "Rabat".to_owned(),
        postal_code: "10000".to_owned(),
        country: "MA".to_owned(),
        ..AddressSnapshot::default()
    }
}

async fn order_count(pool: &PgPool, user: &User) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(user.id)
        .fetch_one(pool)
        .await
        .unwrap()
}

// ============================================================================
// Checkout Rollback
// ============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL in DATABASE_URL"]
async fn test_checkout_converts_cart_and_rollback_restores_it() {
    let pool = database_pool().await;
    let user = new_user(&pool).await;
    let product = new_product(&pool, "25.00").await;
    let method = paypal_method(&pool).await;
    let carts = CartRepository::new(&pool);
    let orders = OrderRepository::new(&pool);

    let cart = carts.get_or_create_active(CartOwner::User(user.id)).await.unwrap();
    carts.add_item(cart.id, &product, None, None, 2).await.unwrap();

    let address = shipping();
    let (order, payment) = orders
        .create_from_cart(&CheckoutInput {
            cart_id: cart.id,
            user_id: user.id,
            payment_method_id: method.id,
            shipping: &address,
            billing: &address,
        })
        .await
        .unwrap();
    assert_eq!(carts.get(cart.id).await.unwrap().status, CartStatus::Converted);
    assert_eq!(payment.order_id, order.id);
    assert_eq!(payment.amount, order.grand_total);

    orders.rollback_checkout(order.id, cart.id).await.unwrap();

    assert_eq!(order_count(&pool, &user).await, 0);
    let restored = carts.get(cart.id).await.unwrap();
    assert_eq!(restored.status, CartStatus::Active);
    assert!(restored.checked_out_at.is_none());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL in DATABASE_URL"]
async fn test_rollback_folds_cart_started_during_provider_call() {
    let pool = database_pool().await;
    let user = new_user(&pool).await;
    let shirt = new_product(&pool, "25.00").await;
    let scarf = new_product(&pool, "10.00").await;
    let method = paypal_method(&pool).await;
    let carts = CartRepository::new(&pool);
    let orders = OrderRepository::new(&pool);

    let cart = carts.get_or_create_active(CartOwner::User(user.id)).await.unwrap();
    carts.add_item(cart.id, &shirt, None, None, 1).await.unwrap();

    let address = shipping();
    let (order, _) = orders
        .create_from_cart(&CheckoutInput {
            cart_id: cart.id,
            user_id: user.id,
            payment_method_id: method.id,
            shipping: &address,
            billing: &address,
        })
        .await
        .unwrap();

    // The client reloads its cart while the provider call is in flight.
    let newer = carts.get_or_create_active(CartOwner::User(user.id)).await.unwrap();
    assert_ne!(newer.id, cart.id);
    carts.add_item(newer.id, &shirt, None, None, 1).await.unwrap();
    carts.add_item(newer.id, &scarf, None, None, 3).await.unwrap();

    orders.rollback_checkout(order.id, cart.id).await.unwrap();

    assert_eq!(order_count(&pool, &user).await, 0);
    let active = carts
        .find_active(CartOwner::User(user.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.id, cart.id);
    assert_eq!(carts.get(newer.id).await.unwrap().status, CartStatus::Abandoned);

    let items = carts.items(cart.id).await.unwrap();
    let quantity_of = |product: &Product| {
        items
            .iter()
            .find(|i| i.product_id == product.id)
            .map(|i| i.quantity)
    };
    assert_eq!(quantity_of(&shirt), Some(2));
    assert_eq!(quantity_of(&scarf), Some(3));
    assert_eq!(active.items_subtotal.to_string(), "80.00");
}

// ============================================================================
// Webhooks
// ============================================================================

#[tokio::test]
#[ignore = "Requires PostgreSQL in DATABASE_URL"]
async fn test_webhook_is_stored_without_a_method_row() {
    let pool = database_pool().await;
    let event_id = format!("WH-{}", Uuid::new_v4().simple());
    let payload = json!({ "id": &event_id, "event_type": "PAYMENT.CAPTURE.COMPLETED" });

    let webhook_id = PaymentRepository::new(&pool)
        .record_webhook(&NewWebhook {
            payment_method_id: None,
            event_type: "PAYMENT.CAPTURE.COMPLETED",
            event_id: &event_id,
            payload: &payload,
            headers: json!({}),
            ip_address: None,
        })
        .await
        .unwrap();

    let stored: (String, bool) = sqlx::query_as(
        "SELECT event_id, processed FROM payment_webhooks WHERE id = $1",
    )
    .bind(webhook_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(stored, (event_id, false));
}
