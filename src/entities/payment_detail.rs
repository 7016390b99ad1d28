use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Method-specific payment detail entity
///
/// Card holder name and card number are stored in their reversibly-encoded
/// form only; plaintext card data never reaches this table or the logs.
/// `installments` is set for credit payments and absent for debit.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_details")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub payment_id: i64,
    pub encoded_holder_name: String,
    pub encoded_card_number: String,
    /// Expiration as supplied, `MM/YY`
    pub expiration: String,
    #[sea_orm(nullable)]
    pub installments: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::payment::Entity",
        from = "Column::PaymentId",
        to = "super::payment::Column::Id"
    )]
    Payment,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
