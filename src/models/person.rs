//! Person entity model
//!
//! Typed view of the Hitobito `people` table, restricted to the columns
//! the back-office tools read and update. Cohort loading goes through a
//! raw query (the tag and note arrays are aggregated in SQL); this
//! entity backs the targeted updates the batch runner applies.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "people")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub additional_contact_email_a: Option<String>,
    pub additional_contact_email_b: Option<String>,
    pub birthday: Option<Date>,
    pub gender: Option<String>,
    pub status: Option<String>,
    pub primary_group_id: Option<i64>,
    pub unit_code: Option<String>,
    pub payment_role: Option<String>,
    pub early_payer: Option<bool>,
    pub print_at: Option<Date>,
    pub sepa_status: Option<String>,
    pub sepa_name: Option<String>,
    pub sepa_mail: Option<String>,
    pub sepa_iban: Option<String>,
    pub sepa_bic: Option<String>,
    pub updated_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
