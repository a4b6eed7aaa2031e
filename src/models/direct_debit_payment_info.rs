//! Direct debit payment info entity model
//!
//! Mirrors one `PmtInf` block of a pain.008 document: creditor account,
//! sequence type and collection date for a group of transactions.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "wsjrdp_direct_debit_payment_infos")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub payment_initiation_id: i64,
    pub payment_information_identification: String,
    pub batch_booking: bool,
    pub number_of_transactions: i32,
    pub control_sum_cents: i64,
    /// Local instrument code, CORE for consumer debits.
    pub payment_type_instrument: String,
    /// OOFF | FRST | RCUR | FNAL
    pub debit_sequence_type: String,
    pub requested_collection_date: Date,
    pub cdtr_name: String,
    pub cdtr_iban: String,
    pub cdtr_bic: String,
    pub creditor_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::payment_initiation::Entity",
        from = "Column::PaymentInitiationId",
        to = "super::payment_initiation::Column::Id"
    )]
    PaymentInitiation,
}

impl Related<super::payment_initiation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentInitiation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
