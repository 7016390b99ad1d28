use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Standard error payload returned by every handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Stable machine-readable error code (e.g., "insufficient_stock")
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    // Identity resolution
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Caller not found: {0}")]
    CallerNotFound(String),

    #[error("Caller has no roles assigned")]
    CallerHasNoRoles,

    #[error("Caller is not a buyer")]
    CallerNotBuyer,

    // Cart domain
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid cart transition: {from} -> {to}")]
    InvalidCartTransition { from: String, to: String },

    #[error("Cart not found: {0}")]
    CartNotFound(String),

    #[error("Cart item not found: {0}")]
    CartItemNotFound(String),

    #[error("Cart item is not available to this caller")]
    CartItemUnauthorized,

    // Stock domain
    #[error("No stock record for product {0}")]
    UnknownProduct(i64),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    // Payment domain
    #[error("Card data could not be decoded")]
    InvalidEncryptedData,

    #[error("Invalid card data: {0}")]
    InvalidCardDataFormat(String),

    #[error("Invalid payment type: {0}")]
    InvalidPaymentType(String),

    #[error("Invalid installments: {0}")]
    InvalidInstallments(String),

    #[error("Invalid expiration date: {0}")]
    InvalidExpirationDate(String),

    #[error("Invalid card number")]
    InvalidCardNumber,

    #[error("Payment status '{0}' is not configured")]
    PaymentStatusNotFound(String),

    #[error("Payment reference generation failed")]
    ReferenceGenerationFailed,

    #[error("Payment processing failed: {0}")]
    PaymentProcessingFailed(#[source] Box<ServiceError>),

    // Cross-cutting
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::EventError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::CallerNotFound(_) | Self::CallerHasNoRoles | Self::CallerNotBuyer => {
                StatusCode::FORBIDDEN
            }
            Self::CartNotFound(_) | Self::CartItemNotFound(_) | Self::UnknownProduct(_) => {
                StatusCode::NOT_FOUND
            }
            Self::CartItemUnauthorized => StatusCode::FORBIDDEN,
            Self::InvalidCartTransition { .. } => StatusCode::CONFLICT,
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidQuantity(_)
            | Self::InvalidEncryptedData
            | Self::InvalidCardDataFormat(_)
            | Self::InvalidPaymentType(_)
            | Self::InvalidInstallments(_)
            | Self::InvalidExpirationDate(_)
            | Self::InvalidCardNumber
            | Self::ValidationError(_)
            | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            // Config absence is fatal, not a client problem
            Self::PaymentStatusNotFound(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ReferenceGenerationFailed => StatusCode::CONFLICT,
            Self::PaymentProcessingFailed(source) => match source.as_ref() {
                ServiceError::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::PAYMENT_REQUIRED,
            },
        }
    }

    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::AuthenticationRequired => "authentication_required",
            Self::CallerNotFound(_) => "caller_not_found",
            Self::CallerHasNoRoles => "caller_has_no_roles",
            Self::CallerNotBuyer => "caller_not_buyer",
            Self::InvalidQuantity(_) => "invalid_quantity",
            Self::InvalidCartTransition { .. } => "invalid_cart_transition",
            Self::CartNotFound(_) => "cart_not_found",
            Self::CartItemNotFound(_) => "cart_item_not_found",
            Self::CartItemUnauthorized => "cart_item_unauthorized",
            Self::UnknownProduct(_) => "unknown_product",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::InvalidEncryptedData => "invalid_encrypted_data",
            Self::InvalidCardDataFormat(_) => "invalid_card_data_format",
            Self::InvalidPaymentType(_) => "invalid_payment_type",
            Self::InvalidInstallments(_) => "invalid_installments",
            Self::InvalidExpirationDate(_) => "invalid_expiration_date",
            Self::InvalidCardNumber => "invalid_card_number",
            Self::PaymentStatusNotFound(_) => "payment_status_not_found",
            Self::ReferenceGenerationFailed => "reference_generation_failed",
            Self::PaymentProcessingFailed(_) => "payment_processing_failed",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::EventError(_) => "event_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) => "Internal server error".to_string(),
            Self::PaymentStatusNotFound(_) => "Payment processing is misconfigured".to_string(),
            _ => self.to_string(),
        }
    }

    /// True for errors expected under normal concurrent load, where the
    /// caller may retry or surface an out-of-stock message. Everything else
    /// indicates a programmer or configuration problem.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            Self::InsufficientStock(_) | Self::ReferenceGenerationFailed
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
