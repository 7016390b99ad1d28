mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{valid_card, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use storefront_api::handlers::app_router;
use tower::util::ServiceExt;

fn router(app: &TestApp) -> Router {
    app_router(Arc::new(app.state.clone()))
}

/// Decimals serialize as strings; compare them numerically.
fn as_decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("expected a decimal string")).expect("invalid decimal")
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    serde_json::from_slice(&bytes).expect("body is not JSON")
}

fn json_request(method: &str, uri: &str, caller: Option<i64>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(id) = caller {
        builder = builder.header("x-caller-id", id.to_string());
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn health_endpoint_answers() {
    let app = TestApp::new().await;
    let response = router(&app)
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["status"], "ok");
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn cart_endpoints_round_trip() {
    let app = TestApp::new().await;
    let (caller, _) = app.seed_buyer("http@example.com").await;
    let user_id = caller.user_id().unwrap();
    let product_id = app.seed_product("widget", dec!(100.00), dec!(19.00)).await;

    // Add two units
    let response = router(&app)
        .oneshot(json_request(
            "POST",
            "/api/v1/cart/items",
            Some(user_id),
            json!({ "product_id": product_id, "quantity": 2 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let line = response_json(response).await;
    assert_eq!(line["quantity"], 2);

    // Summary carries the derived totals
    let response = router(&app)
        .oneshot(
            Request::builder()
                .uri("/api/v1/cart/summary")
                .header("x-caller-id", user_id.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary = response_json(response).await;
    assert_eq!(summary["total_items"], 2);
    assert_eq!(as_decimal(&summary["total_subtotal"]), dec!(200.00));
    assert_eq!(as_decimal(&summary["total_tax"]), dec!(38.00));
    assert_eq!(as_decimal(&summary["total_price"]), dec!(238.00));
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn missing_caller_maps_to_unauthorized() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("widget", dec!(10.00), dec!(0.00)).await;

    let response = router(&app)
        .oneshot(json_request(
            "POST",
            "/api/v1/cart/items",
            None,
            json!({ "product_id": product_id, "quantity": 1 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response_json(response).await;
    assert_eq!(body["code"], "authentication_required");
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn payment_endpoint_reports_typed_errors() {
    let app = TestApp::new().await;
    let (caller, _) = app.seed_buyer("httppay@example.com").await;
    let user_id = caller.user_id().unwrap();

    let response = router(&app)
        .oneshot(json_request(
            "POST",
            "/api/v1/payments",
            Some(user_id),
            json!({ "cart_id": null, "card_data": "%%% not base64 %%%" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["code"], "invalid_encrypted_data");
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn checkout_over_http_confirms_payment() {
    let app = TestApp::new().await;
    let (caller, _) = app.seed_buyer("httpcheckout@example.com").await;
    let user_id = caller.user_id().unwrap();
    let product_id = app.seed_product("widget", dec!(50.00), dec!(0.00)).await;
    app.set_stock(product_id, 5).await;

    let response = router(&app)
        .oneshot(json_request(
            "POST",
            "/api/v1/cart/items",
            Some(user_id),
            json!({ "product_id": product_id, "quantity": 1 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router(&app)
        .oneshot(json_request(
            "POST",
            "/api/v1/payments",
            Some(user_id),
            json!({ "cart_id": null, "card_data": valid_card("debit", None) }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let confirmation = response_json(response).await;
    assert_eq!(confirmation["status"], "Pending");
    assert_eq!(confirmation["payment_method"], "debit");
    assert!(confirmation["reference_number"]
        .as_str()
        .unwrap()
        .starts_with("REF-"));
}

#[tokio::test]
#[cfg_attr(not(feature = "db-tests"), ignore)]
async fn stock_admin_endpoints_round_trip() {
    let app = TestApp::new().await;
    let product_id = app.seed_product("widget", dec!(10.00), dec!(0.00)).await;

    let response = router(&app)
        .oneshot(json_request(
            "PUT",
            &format!("/api/v1/stock/{}", product_id),
            None,
            json!({ "quantity": 7 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = router(&app)
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/stock/{}/availability", product_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["available_quantity"], 7);
}
