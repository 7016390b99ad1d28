use crate::{
    entities::{stock_record, StockRecord},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// The stock ledger: owns per-product available quantity.
///
/// The check and the subtraction of [`decrement`](Self::decrement) are a
/// single conditional UPDATE, so concurrent checkouts can never drive a
/// quantity negative. Nothing is cached; every read reflects the latest
/// committed value.
#[derive(Clone)]
pub struct StockLedgerService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl StockLedgerService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Returns the available quantity; a missing record counts as zero.
    pub async fn get_available(&self, product_id: i64) -> Result<i32, ServiceError> {
        Self::available_on(&*self.db, product_id).await
    }

    pub async fn has_enough(&self, product_id: i64, requested: i32) -> Result<bool, ServiceError> {
        Ok(Self::available_on(&*self.db, product_id).await? >= requested)
    }

    /// Administrative upsert used by catalog management, never by checkout.
    #[instrument(skip(self))]
    pub async fn set_quantity(&self, product_id: i64, quantity: i32) -> Result<(), ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::InvalidQuantity(
                "stock quantity must not be negative".to_string(),
            ));
        }

        let existing = StockRecord::find()
            .filter(stock_record::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;

        match existing {
            Some(record) => {
                let mut active: stock_record::ActiveModel = record.into();
                active.available_quantity = Set(quantity);
                active.updated_at = Set(Utc::now());
                active.update(&*self.db).await?;
            }
            None => {
                stock_record::ActiveModel {
                    product_id: Set(product_id),
                    available_quantity: Set(quantity),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?;
            }
        }

        self.event_sender
            .send_or_log(Event::StockLevelSet {
                product_id,
                quantity,
            })
            .await;

        info!(product_id, quantity, "stock level set");
        Ok(())
    }

    /// Atomically re-checks availability and subtracts `quantity`.
    #[instrument(skip(self))]
    pub async fn decrement(&self, product_id: i64, quantity: i32) -> Result<(), ServiceError> {
        Self::decrement_on(&*self.db, product_id, quantity).await?;

        self.event_sender
            .send_or_log(Event::StockDecremented {
                product_id,
                quantity,
                transaction_id: Uuid::new_v4(),
            })
            .await;

        Ok(())
    }

    /// Check-and-subtract on a caller-supplied connection, so the payment
    /// transaction can decrement inside its own unit of work.
    ///
    /// Either the full quantity is subtracted or nothing is: the guard and
    /// the subtraction are one statement, not a read followed by a write.
    pub async fn decrement_on<C: ConnectionTrait>(
        conn: &C,
        product_id: i64,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidQuantity(format!(
                "cannot decrement stock by {}",
                quantity
            )));
        }

        let result = StockRecord::update_many()
            .col_expr(
                stock_record::Column::AvailableQuantity,
                Expr::col(stock_record::Column::AvailableQuantity).sub(quantity),
            )
            .col_expr(stock_record::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(stock_record::Column::ProductId.eq(product_id))
            .filter(stock_record::Column::AvailableQuantity.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            // Nothing changed; find out which guard stopped it.
            let current = StockRecord::find()
                .filter(stock_record::Column::ProductId.eq(product_id))
                .one(conn)
                .await?;
            return Err(match current {
                None => ServiceError::UnknownProduct(product_id),
                Some(record) => ServiceError::InsufficientStock(format!(
                    "product {} has {} available, {} requested",
                    product_id, record.available_quantity, quantity
                )),
            });
        }

        Ok(())
    }

    pub async fn available_on<C: ConnectionTrait>(
        conn: &C,
        product_id: i64,
    ) -> Result<i32, ServiceError> {
        Ok(StockRecord::find()
            .filter(stock_record::Column::ProductId.eq(product_id))
            .one(conn)
            .await?
            .map(|record| record.available_quantity)
            .unwrap_or(0))
    }
}
