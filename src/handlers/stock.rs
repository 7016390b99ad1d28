use crate::handlers::{no_content_response, success_response};
use crate::{errors::ServiceError, AppState};
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Creates the router for stock administration endpoints
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:product_id", put(set_quantity))
        .route("/:product_id/availability", get(get_availability))
}

#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub product_id: i64,
    pub available_quantity: i32,
}

/// Create-or-replace the stock level for a product
async fn set_quantity(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
    Json(payload): Json<SetQuantityRequest>,
) -> Result<Response, ServiceError> {
    state
        .services
        .stock
        .set_quantity(product_id, payload.quantity)
        .await?;
    Ok(no_content_response())
}

/// Report the current availability for a product (zero when untracked)
async fn get_availability(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<i64>,
) -> Result<Response, ServiceError> {
    let available_quantity = state.services.stock.get_available(product_id).await?;
    Ok(success_response(AvailabilityResponse {
        product_id,
        available_quantity,
    }))
}
