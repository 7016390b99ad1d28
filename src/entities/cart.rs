use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Shopping cart entity
///
/// A cart is created lazily on the first item-add and is never deleted,
/// only transitioned. At most one cart per `user_role_id` may be `Active`
/// at a time (enforced by a partial unique index).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_role_id: i64,
    pub status: CartStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_line::Entity")]
    CartLines,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::cart_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartLines.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Cart lifecycle states
///
/// `Active` is the only state in which lines may be added, updated, or
/// removed, and the only state returned by "find my cart" lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum CartStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "abandoned")]
    Abandoned,
    #[sea_orm(string_value = "expired")]
    Expired,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl CartStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CartStatus::Active => "active",
            CartStatus::Processing => "processing",
            CartStatus::Completed => "completed",
            CartStatus::Abandoned => "abandoned",
            CartStatus::Expired => "expired",
            CartStatus::Cancelled => "cancelled",
        }
    }

    /// Legal edges of the cart state machine.
    pub fn can_transition_to(self, next: CartStatus) -> bool {
        matches!(
            (self, next),
            (CartStatus::Active, CartStatus::Processing)
                | (CartStatus::Processing, CartStatus::Completed)
                | (CartStatus::Active, CartStatus::Abandoned)
                | (CartStatus::Active, CartStatus::Expired)
                | (CartStatus::Active, CartStatus::Cancelled)
        )
    }
}
