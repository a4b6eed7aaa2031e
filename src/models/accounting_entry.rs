//! Accounting entry entity model
//!
//! Signed cents movement on a person's ledger. Entries are derived from
//! generated direct debits (expected money) and from booked camt
//! transactions (actual money); the payment loader sums them per person.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "accounting_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub subject_type: String,
    pub subject_id: i64,
    pub author_type: Option<String>,
    pub author_id: Option<i64>,
    pub amount_currency: String,
    pub amount_cents: i64,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub payment_initiation_id: Option<i64>,
    pub direct_debit_payment_info_id: Option<i64>,
    pub direct_debit_pre_notification_id: Option<i64>,
    pub endtoend_id: Option<String>,
    pub mandate_id: Option<String>,
    pub mandate_date: Option<Date>,
    pub debit_sequence_type: Option<String>,
    pub value_date: Option<Date>,
    pub new_sepa_status: Option<String>,
    pub cdtr_name: Option<String>,
    pub cdtr_iban: Option<String>,
    pub cdtr_bic: Option<String>,
    pub dbtr_name: Option<String>,
    pub dbtr_iban: Option<String>,
    pub dbtr_bic: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::direct_debit_pre_notification::Entity",
        from = "Column::DirectDebitPreNotificationId",
        to = "super::direct_debit_pre_notification::Column::Id"
    )]
    DirectDebitPreNotification,
}

impl Related<super::direct_debit_pre_notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DirectDebitPreNotification.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
