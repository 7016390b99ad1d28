use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment entity
///
/// Created once per successful checkout attempt. Immutable after creation
/// except for status, which later settlement flows own.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub cart_id: i64,
    pub payment_method: PaymentMethod,
    pub payment_status_id: i64,
    #[sea_orm(unique)]
    pub reference_number: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cart::Entity",
        from = "Column::CartId",
        to = "super::cart::Column::Id"
    )]
    Cart,
    #[sea_orm(
        belongs_to = "super::payment_status::Entity",
        from = "Column::PaymentStatusId",
        to = "super::payment_status::Column::Id"
    )]
    PaymentStatus,
    #[sea_orm(has_one = "super::payment_detail::Entity")]
    Detail,
}

impl Related<super::cart::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cart.def()
    }
}

impl Related<super::payment_status::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentStatus.def()
    }
}

impl Related<super::payment_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Detail.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Payment method enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "debit")]
    Debit,
    #[sea_orm(string_value = "credit")]
    Credit,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Debit => "debit",
            PaymentMethod::Credit => "credit",
        }
    }

    /// Resolves a raw method string: trimmed, case-insensitive, accepting
    /// the canonical names and their legacy aliases.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "debit" | "debito" => Some(PaymentMethod::Debit),
            "credit" | "credito" => Some(PaymentMethod::Credit),
            _ => None,
        }
    }
}
