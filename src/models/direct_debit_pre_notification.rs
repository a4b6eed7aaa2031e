//! Direct debit pre-notification entity model
//!
//! One row per debtor and collection: the announced amount, mandate data
//! and the email recipients the announcement went to. `payment_status`
//! tracks the transaction through its life cycle (pre_notified,
//! xml_generated, booked, returned, skipped).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "wsjrdp_direct_debit_pre_notifications")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    pub payment_initiation_id: i64,
    pub direct_debit_payment_info_id: i64,
    pub subject_type: String,
    pub subject_id: i64,
    pub author_type: Option<String>,
    pub author_id: Option<i64>,
    /// Operator request to leave this row out of the generated XML.
    pub try_skip: bool,
    pub payment_status: String,
    pub email_from: String,
    pub email_to: Vec<String>,
    pub email_cc: Vec<String>,
    pub email_bcc: Vec<String>,
    pub email_reply_to: Vec<String>,
    pub dbtr_name: String,
    pub dbtr_iban: String,
    pub dbtr_bic: Option<String>,
    pub dbtr_address: Option<String>,
    pub amount_currency: String,
    pub amount_cents: i64,
    /// Amount announced in the email; kept separate because the open
    /// amount can change between announcement and XML generation.
    pub pre_notified_amount_cents: i64,
    pub debit_sequence_type: String,
    pub collection_date: Date,
    pub mandate_id: String,
    pub mandate_date: Option<Date>,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Text")]
    pub comment: String,
    pub endtoend_id: String,
    pub payment_role: Option<String>,
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
    #[sea_orm(
        belongs_to = "super::direct_debit_payment_info::Entity",
        from = "Column::DirectDebitPaymentInfoId",
        to = "super::direct_debit_payment_info::Column::Id"
    )]
    DirectDebitPaymentInfo,
}

impl Related<super::payment_initiation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentInitiation.def()
    }
}

impl Related<super::direct_debit_payment_info::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DirectDebitPaymentInfo.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
