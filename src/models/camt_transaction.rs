//! Camt transaction entity model
//!
//! One row per booked bank statement transaction. The natural key is
//! (account_identification, account_servicer_reference, amount_cents,
//! value_date); ingest checks it before inserting, making re-runs of the
//! same camt file idempotent.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "wsjrdp_camt_transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub fin_account_id: i64,
    pub account_identification: String,
    pub account_servicer_reference: String,
    /// CRDT or DBIT.
    pub credit_debit_indication: String,
    pub status: String,
    /// Signed cents; debits are negative.
    pub amount_cents: i64,
    pub amount_currency: String,
    pub value_date: Date,
    pub booking_date: Option<Date>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub bank_transaction_code: Option<String>,
    pub mandate_id: Option<String>,
    pub endtoend_id: Option<String>,
    pub return_reason_code: Option<String>,
    pub dbtr_name: Option<String>,
    pub dbtr_iban: Option<String>,
    pub cdtr_name: Option<String>,
    pub cdtr_iban: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::fin_account::Entity",
        from = "Column::FinAccountId",
        to = "super::fin_account::Column::Id"
    )]
    FinAccount,
}

impl Related<super::fin_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FinAccount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
