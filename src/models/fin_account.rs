//! Financial account entity model
//!
//! Known bank accounts camt statements can refer to; camt ingest maps
//! `account_identification` (the IBAN) to this table.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "wsjrdp_fin_accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: Option<String>,
    pub account_identification: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::camt_transaction::Entity")]
    CamtTransaction,
}

impl Related<super::camt_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CamtTransaction.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
