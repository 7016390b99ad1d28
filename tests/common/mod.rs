use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use storefront_api::{
    auth::Caller,
    config::AppConfig,
    db,
    entities::{product, role, user, user_role, Role},
    events::{self, EventSender},
    AppState,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Helper harness backed by a throwaway SQLite database file.
pub struct TestApp {
    pub state: AppState,
    db_path: std::path::PathBuf,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let db_path =
            std::env::temp_dir().join(format!("storefront_test_{}.db", Uuid::new_v4().simple()));
        let _ = std::fs::remove_file(&db_path);

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.auto_migrate = true;
        // A single connection serializes writers, which keeps SQLite from
        // surfacing busy errors in the concurrency suites.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (tx, rx) = mpsc::channel(64);
        let sender = EventSender::new(tx);
        let event_task = tokio::spawn(events::process_events(rx));

        let state = AppState::new(Arc::new(pool), cfg, sender);
        Self {
            state,
            db_path,
            _event_task: event_task,
        }
    }

    /// Inserts a user holding the seeded buyer role; returns the caller and
    /// the id of the buyer user_roles row.
    #[allow(dead_code)]
    pub async fn seed_buyer(&self, email: &str) -> (Caller, i64) {
        let user = self.seed_user(email).await;
        let buyer_role = Role::find()
            .filter(role::Column::Name.eq(role::BUYER))
            .one(&*self.state.db)
            .await
            .expect("role query failed")
            .expect("buyer role is seeded by migration");

        let assignment = user_role::ActiveModel {
            user_id: Set(user.id),
            role_id: Set(buyer_role.id),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to assign buyer role");

        (Caller::authenticated(user.id), assignment.id)
    }

    /// Inserts a user with no role assignments at all.
    #[allow(dead_code)]
    pub async fn seed_user_without_roles(&self, email: &str) -> Caller {
        let user = self.seed_user(email).await;
        Caller::authenticated(user.id)
    }

    /// Inserts a user holding only the admin role.
    #[allow(dead_code)]
    pub async fn seed_non_buyer(&self, email: &str) -> Caller {
        let user = self.seed_user(email).await;
        let admin_role = Role::find()
            .filter(role::Column::Name.eq("admin"))
            .one(&*self.state.db)
            .await
            .expect("role query failed")
            .expect("admin role is seeded by migration");

        user_role::ActiveModel {
            user_id: Set(user.id),
            role_id: Set(admin_role.id),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to assign admin role");

        Caller::authenticated(user.id)
    }

    async fn seed_user(&self, email: &str) -> user::Model {
        user::ActiveModel {
            email: Set(email.to_string()),
            name: Set("Test User".to_string()),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to insert user")
    }

    /// Inserts a sellable product; returns its id.
    #[allow(dead_code)]
    pub async fn seed_product(&self, name: &str, price: Decimal, tax_rate: Decimal) -> i64 {
        let model = product::ActiveModel {
            name: Set(name.to_string()),
            price: Set(price),
            tax_rate: Set(tax_rate),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to insert product");
        model.id
    }

    /// Inserts a product that is no longer sellable.
    #[allow(dead_code)]
    pub async fn seed_inactive_product(&self, name: &str, price: Decimal) -> i64 {
        let model = product::ActiveModel {
            name: Set(name.to_string()),
            price: Set(price),
            tax_rate: Set(Decimal::ZERO),
            is_active: Set(false),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&*self.state.db)
        .await
        .expect("failed to insert product");
        model.id
    }

    #[allow(dead_code)]
    pub async fn set_stock(&self, product_id: i64, quantity: i32) {
        self.state
            .services
            .stock
            .set_quantity(product_id, quantity)
            .await
            .expect("failed to set stock");
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}

/// Builds the base64-wrapped card document the payment endpoint expects.
#[allow(dead_code)]
pub fn encode_card(
    card_number: &str,
    holder_name: &str,
    expiration: &str,
    payment_method: &str,
    installments: Option<i32>,
) -> String {
    let mut doc = serde_json::json!({
        "card_number": card_number,
        "holder_name": holder_name,
        "expiration": expiration,
        "payment_method": payment_method,
    });
    if let Some(n) = installments {
        doc["installments"] = serde_json::json!(n);
    }
    BASE64.encode(doc.to_string())
}

/// A well-formed card for the given method.
#[allow(dead_code)]
pub fn valid_card(payment_method: &str, installments: Option<i32>) -> String {
    encode_card(
        "4111111111111111",
        "Jane Roe",
        "12/49",
        payment_method,
        installments,
    )
}
