use crate::handlers::{created_response, no_content_response, success_response};
use crate::{auth::Caller, errors::ServiceError, AppState};
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Creates the router for cart endpoints
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/items", post(add_item))
        .route("/items/:line_id", delete(remove_item))
        .route("/summary", get(summarize))
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: i64,
    pub quantity: i32,
}

/// Add a product to the caller's active cart
async fn add_item(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<AddItemRequest>,
) -> Result<Response, ServiceError> {
    let line = state
        .services
        .cart
        .add_item(&caller, payload.product_id, payload.quantity)
        .await?;

    Ok(created_response(line))
}

/// Remove a line from the caller's active cart
async fn remove_item(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(line_id): Path<i64>,
) -> Result<Response, ServiceError> {
    state.services.cart.remove_item(&caller, line_id).await?;
    Ok(no_content_response())
}

/// Summarize the caller's active cart with derived totals
async fn summarize(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Response, ServiceError> {
    let summary = state.services.cart.summarize(&caller).await?;
    Ok(success_response(summary))
}
