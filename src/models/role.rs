//! Role entity model (Hitobito `roles` table).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "roles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub person_id: i64,
    pub group_id: i64,
    /// Rails STI type string, e.g. `Group::Unit::Member`.
    #[sea_orm(column_name = "type")]
    pub role_type: String,
    pub start_on: Option<Date>,
    pub end_on: Option<Date>,
    pub created_at: Option<DateTime>,
    pub updated_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
