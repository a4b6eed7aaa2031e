//! Payment initiation entity model
//!
//! One row per generated pain.008 document. Group header fields of the
//! XML are mirrored here so a batch can be reconstructed or re-sent
//! without re-deriving the cohort.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "wsjrdp_payment_initiations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    /// planned | xml_generated | submitted | done
    pub status: String,
    pub sepa_schema: String,
    pub message_identification: String,
    pub number_of_transactions: i32,
    pub control_sum_cents: i64,
    pub initiating_party_name: String,
    pub initiating_party_iban: String,
    pub initiating_party_bic: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::direct_debit_payment_info::Entity")]
    DirectDebitPaymentInfo,
    #[sea_orm(has_many = "super::direct_debit_pre_notification::Entity")]
    DirectDebitPreNotification,
}

impl Related<super::direct_debit_payment_info::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DirectDebitPaymentInfo.def()
    }
}

impl Related<super::direct_debit_pre_notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DirectDebitPreNotification.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
