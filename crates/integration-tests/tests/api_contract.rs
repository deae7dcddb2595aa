//! Router contract tests.
//!
//! Each request here is answered before the first database query: auth
//! gating, guest cart resolution, input rejection and the middleware stack.
//! The app runs in-process over a pool that never connects.

#![allow(clippy::unwrap_used)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::json;
use souk_api::services::auth::TokenService;
use souk_core::UserId;

use souk_integration_tests::{json_body, send, test_config};

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ============================================================================
// Health & Middleware
// ============================================================================

#[tokio::test]
async fn test_liveness_does_not_touch_the_database() {
    let (status, body) = json_body(send(get("/api/health")).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_request_id_is_generated_and_echoed() {
    let generated = send(get("/api/health")).await;
    let id = generated.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());

    let echoed = send(
        Request::builder()
            .uri("/api/health")
            .header("x-request-id", "edge-7f3a")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(echoed.headers()["x-request-id"], "edge-7f3a");
}

#[tokio::test]
async fn test_security_headers_on_every_response() {
    let response = send(get("/api/v1/users/me/")).await;
    let headers = response.headers();
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert!(
        headers["content-security-policy"]
            .to_str()
            .unwrap()
            .contains("frame-ancestors 'none'")
    );
}

#[tokio::test]
async fn test_cors_preflight_allows_session_key_header() {
    let response = send(
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/cart/")
            .header(header::ORIGIN, "https://shop.example.ma")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-session-key")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert!(response.status().is_success());
    let allowed = response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS]
        .to_str()
        .unwrap()
        .to_ascii_lowercase();
    assert!(allowed.contains("x-session-key"));
}

// ============================================================================
// Authentication Gating
// ============================================================================

#[tokio::test]
async fn test_protected_routes_require_credentials() {
    for uri in [
        "/api/v1/users/me/",
        "/api/v1/auth/sessions/",
        "/api/v1/orders/",
        "/api/v1/payments/status/PAY-20260101-ABCDEF123456/",
    ] {
        let (status, body) = json_body(send(get(uri)).await).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(
            body["error"], "Authentication credentials were not provided.",
            "{uri}"
        );
    }
}

#[tokio::test]
async fn test_malformed_bearer_token_is_rejected() {
    let request = Request::builder()
        .uri("/api/v1/users/me")
        .header(header::AUTHORIZATION, "Bearer not.a.jwt")
        .body(Body::empty())
        .unwrap();
    let (status, body) = json_body(send(request).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let tokens = TokenService::new(&test_config().jwt);
    let pair = tokens.issue_pair(UserId::new(42)).unwrap();

    let request = Request::builder()
        .uri("/api/v1/orders/")
        .header(header::AUTHORIZATION, format!("Bearer {}", pair.refresh))
        .body(Body::empty())
        .unwrap();
    let (status, body) = json_body(send(request).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");
}

#[tokio::test]
async fn test_garbage_token_on_public_cart_is_still_rejected() {
    let request = Request::builder()
        .uri("/api/v1/cart/")
        .header(header::AUTHORIZATION, "Bearer garbage")
        .header("x-session-key", "guest-abc")
        .body(Body::empty())
        .unwrap();
    let (status, _) = json_body(send(request).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_with_invalid_token() {
    let (status, body) = json_body(
        send(post_json(
            "/api/v1/auth/refresh/",
            &json!({ "refresh": "definitely-not-a-token" }),
        ))
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");
}

// ============================================================================
// Guest Cart
// ============================================================================

#[tokio::test]
async fn test_guest_cart_requires_session_key() {
    for uri in ["/api/v1/cart", "/api/v1/cart/"] {
        let (status, body) = json_body(send(get(uri)).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"], "Session key required for guest users");
    }

    let (status, _) = json_body(
        send(post_json(
            "/api/v1/cart/items/add",
            &json!({ "product": 1, "quantity": 1 }),
        ))
        .await,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cart_merge_requires_auth() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/cart/merge")
        .header("x-session-key", "guest-abc")
        .body(Body::empty())
        .unwrap();
    let (status, _) = json_body(send(request).await).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Input Rejection
// ============================================================================

#[tokio::test]
async fn test_unknown_product_ordering_is_a_bad_request() {
    let (status, body) = json_body(send(get("/api/v1/products/?ordering=cheapest")).await).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_paypal_return_without_token() {
    let (status, body) =
        json_body(send(get("/api/v1/payments/paypal/success/?PayerID=ABC")).await).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing PayPal token or PayerID");
}

#[tokio::test]
async fn test_webhook_rejects_non_json_body() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/payments/webhooks/paypal/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = json_body(send(request).await).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_login_requires_json_body() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/login/")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("email=a@b.c"))
        .unwrap();
    let (status, _) = json_body(send(request).await).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let response = send(get("/api/v1/wishlist/")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
