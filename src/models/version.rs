//! Version entity model (PaperTrail `versions` table).
//!
//! Hitobito records every change to a person as a version row whose
//! `object` and `object_changes` columns hold YAML documents. The batch
//! runner writes one such row per updated person so the changes show up
//! in the Hitobito change log.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "versions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub item_type: String,
    pub item_id: i64,
    pub main_type: Option<String>,
    pub main_id: Option<i64>,
    pub whodunnit: Option<String>,
    pub event: String,
    /// YAML snapshot of the row before the change.
    #[sea_orm(column_type = "Text")]
    pub object: Option<String>,
    /// YAML mapping of column name to `[old, new]`.
    #[sea_orm(column_type = "Text")]
    pub object_changes: Option<String>,
    pub created_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
