use crate::{
    auth::{AuthService, Caller},
    entities::{
        payment, payment_detail, payment_status, CartStatus, PaymentMethod, PaymentStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{CartService, ReferenceGenerator, StockLedgerService},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr,
    TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

static CARD_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{13,19}$").expect("valid regex"));
static EXPIRATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2})/(\d{2})$").expect("valid regex"));

/// Payment coordinator.
///
/// `process_payment` is the single entry point for checkout: a sequence of
/// fail-fast guards followed by one atomic unit of work that persists the
/// payment, decrements stock for every cart line, and moves the cart to
/// `Processing`. Either all of it commits or none of it does.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    auth: Arc<AuthService>,
    cart_service: Arc<CartService>,
    reference_generator: ReferenceGenerator,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        auth: Arc<AuthService>,
        cart_service: Arc<CartService>,
        reference_generator: ReferenceGenerator,
    ) -> Self {
        Self {
            db,
            event_sender,
            auth,
            cart_service,
            reference_generator,
        }
    }

    /// Runs the checkout pipeline for the caller's cart.
    #[instrument(skip_all, fields(cart_id = ?input.cart_id))]
    pub async fn process_payment(
        &self,
        caller: &Caller,
        input: ProcessPaymentInput,
    ) -> Result<PaymentConfirmation, ServiceError> {
        // Decode before anything else; an unreadable payload never reaches
        // the database.
        let payload = CardPayload::decode(&input.card_data)?;

        let user_role_id = self.auth.resolve_buyer_role(caller).await?;
        let cart = self
            .cart_service
            .find_for_checkout(user_role_id, input.cart_id)
            .await?;

        payload.validate(Utc::now().date_naive())?;

        let method = PaymentMethod::parse(&payload.payment_method).ok_or_else(|| {
            ServiceError::InvalidPaymentType(payload.payment_method.trim().to_string())
        })?;
        let installments = resolve_installments(method, payload.installments)?;

        // Reference-data lookup; absence is a deployment defect, not
        // something a retry can fix.
        let pending = PaymentStatus::find()
            .filter(payment_status::Column::Name.eq(payment_status::PENDING))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::PaymentStatusNotFound(payment_status::PENDING.to_string())
            })?;

        let cart_id = cart.id;
        let generator = self.reference_generator.clone();

        // Steps that mutate state share one transaction: payment row,
        // detail row, every stock decrement, and the cart transition
        // commit together or roll back together.
        let (confirmation, lines) = self
            .db
            .transaction::<_, (PaymentConfirmation, Vec<crate::entities::CartLineModel>), ServiceError>(
                |txn| {
                    Box::pin(async move {
                        let lines = CartService::lines_on(txn, cart_id).await?;
                        if lines.is_empty() {
                            return Err(ServiceError::InvalidOperation(format!(
                                "cart {} has no lines to pay for",
                                cart_id
                            )));
                        }

                        let reference = generator.generate_unique(txn).await?;
                        let payment_row = payment::ActiveModel {
                            cart_id: Set(cart_id),
                            payment_method: Set(method),
                            payment_status_id: Set(pending.id),
                            reference_number: Set(reference),
                            created_at: Set(Utc::now()),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await
                        .map_err(|err| match err.sql_err() {
                            // A concurrent checkout raced us to the same reference.
                            Some(SqlErr::UniqueConstraintViolation(_)) => {
                                ServiceError::ReferenceGenerationFailed
                            }
                            _ => ServiceError::DatabaseError(err),
                        })?;

                        payment_detail::ActiveModel {
                            payment_id: Set(payment_row.id),
                            encoded_holder_name: Set(payload.encoded_holder_name()),
                            encoded_card_number: Set(payload.encoded_card_number()),
                            expiration: Set(payload.expiration.trim().to_string()),
                            installments: Set(match method {
                                PaymentMethod::Credit => Some(installments),
                                PaymentMethod::Debit => None,
                            }),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;

                        // Stock was never reserved at add-time; this is where
                        // scarcity surfaces.
                        for line in &lines {
                            StockLedgerService::decrement_on(txn, line.product_id, line.quantity)
                                .await
                                .map_err(|err| {
                                    ServiceError::PaymentProcessingFailed(Box::new(err))
                                })?;
                        }

                        CartService::transition_on(txn, cart_id, CartStatus::Processing).await?;

                        Ok((
                            PaymentConfirmation {
                                payment_id: payment_row.id,
                                reference_number: payment_row.reference_number,
                                status: pending.name,
                                payment_method: method.as_str().to_string(),
                            },
                            lines,
                        ))
                    })
                },
            )
            .await
            .map_err(|err| match err {
                TransactionError::Connection(db_err) => ServiceError::DatabaseError(db_err),
                TransactionError::Transaction(service_err) => service_err,
            })?;

        for line in &lines {
            self.event_sender
                .send_or_log(Event::StockDecremented {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    transaction_id: Uuid::new_v4(),
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::CartStatusChanged {
                cart_id,
                old_status: CartStatus::Active,
                new_status: CartStatus::Processing,
            })
            .await;
        self.event_sender
            .send_or_log(Event::PaymentProcessed {
                payment_id: confirmation.payment_id,
                cart_id,
                reference_number: confirmation.reference_number.clone(),
            })
            .await;

        info!(
            payment_id = confirmation.payment_id,
            cart_id,
            reference = %confirmation.reference_number,
            "checkout committed"
        );
        Ok(confirmation)
    }
}

/// Checkout request: the card payload arrives as one encoded blob.
#[derive(Debug, Deserialize)]
pub struct ProcessPaymentInput {
    pub cart_id: Option<i64>,
    pub card_data: String,
}

/// Result of a successful checkout.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentConfirmation {
    pub payment_id: i64,
    pub reference_number: String,
    pub status: String,
    pub payment_method: String,
}

/// Card payload carried inside the encoded checkout blob.
///
/// The base64 wrapping is a reversible-encoding boundary, not encryption;
/// it exists so raw card numbers never appear in request logs. Plaintext
/// fields live only on the stack during validation.
#[derive(Clone, Deserialize)]
pub struct CardPayload {
    pub card_number: String,
    pub holder_name: String,
    /// `MM/YY`
    pub expiration: String,
    pub payment_method: String,
    #[serde(default)]
    pub installments: Option<i32>,
}

// Card numbers must not leak through debug formatting of the payload.
impl std::fmt::Debug for CardPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardPayload")
            .field("card_number", &"<redacted>")
            .field("holder_name", &"<redacted>")
            .field("expiration", &self.expiration)
            .field("payment_method", &self.payment_method)
            .field("installments", &self.installments)
            .finish()
    }
}

impl CardPayload {
    /// Decodes the transport blob. Failing base64 is `InvalidEncryptedData`;
    /// decoding to something that is not a card document is
    /// `InvalidCardDataFormat`.
    pub fn decode(encoded: &str) -> Result<Self, ServiceError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| ServiceError::InvalidEncryptedData)?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ServiceError::InvalidCardDataFormat("payload is not UTF-8".to_string()))?;
        serde_json::from_str(&text).map_err(|_| {
            ServiceError::InvalidCardDataFormat("payload is not a card document".to_string())
        })
    }

    /// Field-level guards, each failing fast with its own error kind.
    pub fn validate(&self, today: NaiveDate) -> Result<(), ServiceError> {
        if self.holder_name.trim().is_empty() {
            return Err(ServiceError::InvalidCardDataFormat(
                "holder name must not be blank".to_string(),
            ));
        }
        if !CARD_NUMBER.is_match(&self.normalized_card_number()) {
            return Err(ServiceError::InvalidCardNumber);
        }
        validate_expiration(&self.expiration, today)?;
        Ok(())
    }

    fn normalized_card_number(&self) -> String {
        self.card_number
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect()
    }

    pub fn encoded_holder_name(&self) -> String {
        BASE64.encode(self.holder_name.trim())
    }

    pub fn encoded_card_number(&self) -> String {
        BASE64.encode(self.normalized_card_number())
    }
}

/// Parses `MM/YY` and rejects months already in the past.
fn validate_expiration(raw: &str, today: NaiveDate) -> Result<(), ServiceError> {
    let caps = EXPIRATION.captures(raw.trim()).ok_or_else(|| {
        ServiceError::InvalidExpirationDate("expiration must be MM/YY".to_string())
    })?;

    let month: u32 = caps[1]
        .parse()
        .map_err(|_| ServiceError::InvalidExpirationDate("expiration must be MM/YY".to_string()))?;
    if !(1..=12).contains(&month) {
        return Err(ServiceError::InvalidExpirationDate(format!(
            "{:02} is not a month",
            month
        )));
    }

    let year: i32 = 2000
        + caps[2].parse::<i32>().map_err(|_| {
            ServiceError::InvalidExpirationDate("expiration must be MM/YY".to_string())
        })?;

    if (year, month) < (today.year(), today.month()) {
        return Err(ServiceError::InvalidExpirationDate(
            "card has expired".to_string(),
        ));
    }

    Ok(())
}

/// Resolves the installment count for the method: debit always pays in
/// one installment and ignores whatever was supplied; credit defaults to
/// one and rejects non-positive counts.
fn resolve_installments(
    method: PaymentMethod,
    supplied: Option<i32>,
) -> Result<i32, ServiceError> {
    match method {
        PaymentMethod::Debit => {
            if let Some(n) = supplied {
                if n != 1 {
                    warn!(supplied = n, "debit payment ignores installment count");
                }
            }
            Ok(1)
        }
        PaymentMethod::Credit => match supplied {
            None => Ok(1),
            Some(n) if n <= 0 => Err(ServiceError::InvalidInstallments(format!(
                "installments must be positive, got {}",
                n
            ))),
            Some(n) => Ok(n),
        },
    }
}
