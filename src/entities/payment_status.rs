use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Seeded status names. Only `Pending` is produced by the checkout core;
/// the remaining transitions belong to downstream settlement flows.
pub const PENDING: &str = "Pending";
pub const APPROVED: &str = "Approved";
pub const REJECTED: &str = "Rejected";
pub const CANCELLED: &str = "Cancelled";
pub const REFUNDED: &str = "Refunded";
pub const FAILED: &str = "Failed";

/// Payment status reference entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_statuses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
