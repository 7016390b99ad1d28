use crate::{
    auth::{AuthService, Caller},
    entities::{cart, cart_line, Cart, CartLine, CartModel, CartStatus, Product, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, JoinType, QueryFilter, QuerySelect, RelationTrait, Set, SqlErr,
    TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Cart store and coordinator.
///
/// Store-level operations own the cart rows and the status state machine;
/// coordinator-level operations (`add_item`, `remove_item`, `summarize`)
/// resolve the caller first and enforce the cross-entity guards. Stock is
/// deliberately never consulted here: carts are reservation-free and stock
/// is enforced only at payment time.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    auth: Arc<AuthService>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        auth: Arc<AuthService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            auth,
        }
    }

    // ---- store-level operations ----

    /// Returns the caller role's Active cart, if any.
    pub async fn find_active(&self, user_role_id: i64) -> Result<Option<CartModel>, ServiceError> {
        Self::find_active_on(&*self.db, user_role_id).await
    }

    /// Returns the existing Active cart for the role or creates one.
    ///
    /// Race-safe: the partial unique index on `(user_role_id, status =
    /// 'active')` rejects a concurrent duplicate insert, in which case the
    /// winner's cart is fetched and returned.
    #[instrument(skip(self))]
    pub async fn find_or_create_active(&self, user_role_id: i64) -> Result<CartModel, ServiceError> {
        if let Some(cart) = Self::find_active_on(&*self.db, user_role_id).await? {
            return Ok(cart);
        }

        let insert = cart::ActiveModel {
            user_role_id: Set(user_role_id),
            status: Set(CartStatus::Active),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await;

        match insert {
            Ok(created) => {
                self.event_sender
                    .send_or_log(Event::CartCreated(created.id))
                    .await;
                info!(cart_id = created.id, user_role_id, "created active cart");
                Ok(created)
            }
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                // Lost the race; the concurrent first-add created the cart.
                Self::find_active_on(&*self.db, user_role_id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::CartNotFound(format!("active cart for role {}", user_role_id))
                    })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Inserts a line or overwrites the quantity of the existing line for
    /// the same product. Quantities below one are rejected.
    #[instrument(skip(self))]
    pub async fn add_or_update_line(
        &self,
        cart_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<cart_line::Model, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::InvalidQuantity(format!(
                "quantity must be at least 1, got {}",
                quantity
            )));
        }

        let txn = self.db.begin().await?;

        let cart = Cart::find_by_id(cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::CartNotFound(format!("cart {}", cart_id)))?;
        if cart.status != CartStatus::Active {
            return Err(ServiceError::InvalidOperation(format!(
                "cart {} is not active",
                cart_id
            )));
        }

        let existing = CartLine::find()
            .filter(cart_line::Column::CartId.eq(cart_id))
            .filter(cart_line::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        let line = match existing {
            Some(line) => {
                let mut active: cart_line::ActiveModel = line.into();
                active.quantity = Set(quantity);
                active.updated_at = Set(Utc::now());
                active.update(&txn).await?
            }
            None => {
                let insert = cart_line::ActiveModel {
                    cart_id: Set(cart_id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(&txn)
                .await;

                match insert {
                    Ok(line) => line,
                    Err(err)
                        if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
                    {
                        // Concurrent add of the same product won; overwrite it.
                        let line = CartLine::find()
                            .filter(cart_line::Column::CartId.eq(cart_id))
                            .filter(cart_line::Column::ProductId.eq(product_id))
                            .one(&txn)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::CartItemNotFound(format!(
                                    "line for product {} in cart {}",
                                    product_id, cart_id
                                ))
                            })?;
                        let mut active: cart_line::ActiveModel = line.into();
                        active.quantity = Set(quantity);
                        active.updated_at = Set(Utc::now());
                        active.update(&txn).await?
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartLineUpserted {
                cart_id,
                product_id,
                quantity,
            })
            .await;

        Ok(line)
    }

    /// Removes a line from the given cart; `CartItemNotFound` when the
    /// line does not belong to it.
    #[instrument(skip(self))]
    pub async fn remove_line(&self, cart_id: i64, line_id: i64) -> Result<(), ServiceError> {
        let line = CartLine::find_by_id(line_id)
            .filter(cart_line::Column::CartId.eq(cart_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::CartItemNotFound(format!("line {} in cart {}", line_id, cart_id))
            })?;

        CartLine::delete_by_id(line.id).exec(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartLineRemoved { cart_id, line_id })
            .await;

        Ok(())
    }

    pub async fn lines_of(&self, cart_id: i64) -> Result<Vec<cart_line::Model>, ServiceError> {
        Self::lines_on(&*self.db, cart_id).await
    }

    /// Validates and applies a state transition.
    pub async fn transition_to(
        &self,
        cart_id: i64,
        new_status: CartStatus,
    ) -> Result<CartModel, ServiceError> {
        let (updated, old_status) = Self::transition_on(&*self.db, cart_id, new_status).await?;

        self.event_sender
            .send_or_log(Event::CartStatusChanged {
                cart_id,
                old_status,
                new_status,
            })
            .await;

        Ok(updated)
    }

    /// Resolves the cart a checkout targets: the explicit cart when an id
    /// is given, otherwise the role's Active cart. Either way a miss is
    /// `CartNotFound`; an explicit id owned by someone else is reported
    /// the same way rather than confirming the cart exists.
    pub async fn find_for_checkout(
        &self,
        user_role_id: i64,
        cart_id: Option<i64>,
    ) -> Result<CartModel, ServiceError> {
        match cart_id {
            Some(id) => Cart::find_by_id(id)
                .filter(cart::Column::UserRoleId.eq(user_role_id))
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::CartNotFound(format!("cart {}", id))),
            None => Self::find_active_on(&*self.db, user_role_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::CartNotFound(format!("active cart for role {}", user_role_id))
                }),
        }
    }

    // ---- coordinator-level operations ----

    /// Adds a product to the caller's Active cart, creating the cart on
    /// first use. Re-adding a product overwrites its quantity.
    #[instrument(skip(self, caller))]
    pub async fn add_item(
        &self,
        caller: &Caller,
        product_id: i64,
        quantity: i32,
    ) -> Result<cart_line::Model, ServiceError> {
        let user_role_id = self.auth.resolve_buyer_role(caller).await?;
        let cart = self.find_or_create_active(user_role_id).await?;

        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::UnknownProduct(product_id))?;
        if !product.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "product {} is not sellable",
                product_id
            )));
        }

        self.add_or_update_line(cart.id, product_id, quantity).await
    }

    /// Removes a line from the caller's Active cart.
    ///
    /// Ownership and active-state are one query, so the caller cannot
    /// probe for the existence of other users' lines.
    #[instrument(skip(self, caller))]
    pub async fn remove_item(&self, caller: &Caller, line_id: i64) -> Result<(), ServiceError> {
        let user_role_id = self.auth.resolve_buyer_role(caller).await?;

        let line = CartLine::find_by_id(line_id)
            .join(JoinType::InnerJoin, cart_line::Relation::Cart.def())
            .filter(cart::Column::UserRoleId.eq(user_role_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::CartItemUnauthorized)?;

        CartLine::delete_by_id(line.id).exec(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartLineRemoved {
                cart_id: line.cart_id,
                line_id,
            })
            .await;

        Ok(())
    }

    /// Summarizes the caller's Active cart with derived totals. An empty
    /// cart yields zero totals, not an error.
    #[instrument(skip(self, caller))]
    pub async fn summarize(&self, caller: &Caller) -> Result<CartSummary, ServiceError> {
        let user_role_id = self.auth.resolve_buyer_role(caller).await?;
        let cart = self.find_or_create_active(user_role_id).await?;

        let lines = CartLine::find()
            .filter(cart_line::Column::CartId.eq(cart.id))
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        let mut summary = CartSummary::empty(cart.id);
        for (line, product) in lines {
            let product = product.ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "cart line {} references missing product {}",
                    line.id, line.product_id
                ))
            })?;
            summary.push(CartLineSummary::compute(&line, &product));
        }

        Ok(summary)
    }

    // ---- connection-generic internals shared with the payment transaction ----

    pub(crate) async fn find_active_on<C: ConnectionTrait>(
        conn: &C,
        user_role_id: i64,
    ) -> Result<Option<CartModel>, ServiceError> {
        Ok(Cart::find()
            .filter(cart::Column::UserRoleId.eq(user_role_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .one(conn)
            .await?)
    }

    pub(crate) async fn lines_on<C: ConnectionTrait>(
        conn: &C,
        cart_id: i64,
    ) -> Result<Vec<cart_line::Model>, ServiceError> {
        Ok(CartLine::find()
            .filter(cart_line::Column::CartId.eq(cart_id))
            .all(conn)
            .await?)
    }

    /// Applies a validated transition with a conditional UPDATE filtered on
    /// the observed status, so two concurrent transitions cannot both win.
    /// Returns the updated cart and the status it left.
    pub(crate) async fn transition_on<C: ConnectionTrait>(
        conn: &C,
        cart_id: i64,
        new_status: CartStatus,
    ) -> Result<(CartModel, CartStatus), ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::CartNotFound(format!("cart {}", cart_id)))?;

        let old_status = cart.status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidCartTransition {
                from: old_status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        let now = Utc::now();
        let result = Cart::update_many()
            .col_expr(cart::Column::Status, Expr::value(new_status))
            .col_expr(cart::Column::UpdatedAt, Expr::value(now))
            .filter(cart::Column::Id.eq(cart_id))
            .filter(cart::Column::Status.eq(old_status))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            // Someone else transitioned the cart between the read and the update.
            return Err(ServiceError::InvalidCartTransition {
                from: old_status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        Ok((
            CartModel {
                status: new_status,
                updated_at: now,
                ..cart
            },
            old_status,
        ))
    }
}

/// One cart line with its derived amounts.
#[derive(Debug, Clone, Serialize)]
pub struct CartLineSummary {
    pub line_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl CartLineSummary {
    /// Derives the line amounts from the product's current price and tax
    /// rate; nothing monetary is stored on the line itself.
    pub fn compute(line: &cart_line::Model, product: &ProductModel) -> Self {
        let quantity = Decimal::from(line.quantity);
        let subtotal = product.price * quantity;
        let tax = subtotal * product.tax_rate / Decimal::from(100);
        Self {
            line_id: line.id,
            product_id: line.product_id,
            product_name: product.name.clone(),
            quantity: line.quantity,
            unit_price: product.price,
            subtotal,
            tax,
            total: subtotal + tax,
        }
    }
}

/// Cart summary with grand totals over all lines.
#[derive(Debug, Clone, Serialize)]
pub struct CartSummary {
    pub cart_id: i64,
    pub lines: Vec<CartLineSummary>,
    pub total_items: i32,
    pub total_subtotal: Decimal,
    pub total_tax: Decimal,
    pub total_price: Decimal,
}

impl CartSummary {
    fn empty(cart_id: i64) -> Self {
        Self {
            cart_id,
            lines: Vec::new(),
            total_items: 0,
            total_subtotal: Decimal::ZERO,
            total_tax: Decimal::ZERO,
            total_price: Decimal::ZERO,
        }
    }

    fn push(&mut self, line: CartLineSummary) {
        self.total_items += line.quantity;
        self.total_subtotal += line.subtotal;
        self.total_tax += line.tax;
        self.total_price += line.total;
        self.lines.push(line);
    }
}
