use crate::{
    auth::AuthService,
    config::AppConfig,
    events::EventSender,
    services::{CartService, PaymentService, ReferenceGenerator, StockLedgerService},
    AppState,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod cart;
pub mod payments;
pub mod stock;

/// Container for the service graph shared by all handlers.
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub cart: Arc<CartService>,
    pub stock: Arc<StockLedgerService>,
    pub payments: Arc<PaymentService>,
}

impl AppServices {
    pub fn build(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        let auth = Arc::new(AuthService::new(db.clone()));
        let cart = Arc::new(CartService::new(
            db.clone(),
            event_sender.clone(),
            auth.clone(),
        ));
        let stock = Arc::new(StockLedgerService::new(db.clone(), event_sender.clone()));
        let payments = Arc::new(PaymentService::new(
            db,
            event_sender,
            auth.clone(),
            cart.clone(),
            ReferenceGenerator::new(config.reference_max_attempts),
        ));
        Self {
            auth,
            cart,
            stock,
            payments,
        }
    }
}

/// Builds the versioned API router.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/cart", cart::routes())
        .nest("/payments", payments::routes())
        .nest("/stock", stock::routes())
}

/// Builds the complete application router with middleware attached.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_router())
        .layer(axum::middleware::from_fn(crate::auth::attach_caller))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(data)).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(data)).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
