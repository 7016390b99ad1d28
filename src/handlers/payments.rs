use crate::handlers::created_response;
use crate::{auth::Caller, errors::ServiceError, services::payment::ProcessPaymentInput, AppState};
use axum::{extract::State, response::Response, routing::post, Json, Router};
use std::sync::Arc;

/// Creates the router for payment endpoints
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(process_payment))
}

/// Run the checkout pipeline for the caller's cart
async fn process_payment(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(payload): Json<ProcessPaymentInput>,
) -> Result<Response, ServiceError> {
    let confirmation = state
        .services
        .payments
        .process_payment(&caller, payload)
        .await?;

    Ok(created_response(confirmation))
}
