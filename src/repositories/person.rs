//! Person-side database writes.
//!
//! The batch runner records changes the way Hitobito itself would: an
//! UPDATE on `people`, one PaperTrail version row per changed column,
//! taggings through the acts-as-taggable tables, notes with the
//! Administrator as author and role rows for primary group moves. All
//! methods run on any [`ConnectionTrait`] so a whole batch can execute
//! inside a single transaction.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::sea_query::Expr;
use sea_orm::ActiveValue::Set;
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, DbBackend, EntityTrait, QueryFilter, Statement};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::models::{note, role, tagging, version};
use crate::models::{Note, Role, Tagging, Version};
use crate::repositories::ADMINISTRATOR_ID;
use crate::util::{sql_literal, sql_string_literal, SqlValue};

/// Primary group move derived from a batch update.
#[derive(Debug, Clone)]
pub struct PrimaryGroupMove {
    pub old_group_id: Option<i64>,
    pub new_group_id: i64,
    /// Rails STI type strings for the new roles.
    pub role_types: Vec<String>,
}

/// Everything a batch wants to change about one person.
///
/// `set_columns` feeds the UPDATE on `people`; `changes` holds the
/// `[old, new]` pairs recorded as version rows (including derived
/// values like the tag list, which have no own column update here).
#[derive(Debug, Clone, Default)]
pub struct PersonUpdate {
    pub person_id: i64,
    pub set_columns: Vec<(String, SqlValue)>,
    pub changes: BTreeMap<String, (JsonValue, JsonValue)>,
    pub add_tags: Vec<String>,
    pub note: Option<String>,
    pub group_move: Option<PrimaryGroupMove>,
}

impl PersonUpdate {
    pub fn is_empty(&self) -> bool {
        self.set_columns.is_empty()
            && self.changes.is_empty()
            && self.add_tags.is_empty()
            && self.note.is_none()
            && self.group_move.is_none()
    }
}

/// Repository for writes against the people graph.
pub struct PersonRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> PersonRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    /// Apply one derived update: people columns first, then the version
    /// trail, tags, note and role moves.
    pub async fn apply_update(&self, update: &PersonUpdate, now: NaiveDateTime) -> Result<()> {
        self.update_person(update.person_id, &update.set_columns, now).await?;
        for (column, (old, new)) in &update.changes {
            self.insert_version(update.person_id, column, old, new, now).await?;
        }
        for tag in &update.add_tags {
            self.add_tag(update.person_id, tag, now).await?;
        }
        if let Some(text) = &update.note {
            self.insert_note(update.person_id, text, now).await?;
        }
        if let Some(group_move) = &update.group_move {
            self.move_primary_group(update.person_id, group_move, now.date(), now).await?;
        }
        Ok(())
    }

    /// UPDATE `people` with literal assignments; `updated_at` is always
    /// bumped. A no-op when `updates` is empty.
    pub async fn update_person(
        &self,
        person_id: i64,
        updates: &[(String, SqlValue)],
        now: NaiveDateTime,
    ) -> Result<()> {
        if updates.is_empty() {
            tracing::debug!(id = person_id, "No people columns to update");
            return Ok(());
        }
        let sql = update_people_sql(person_id, updates, now);
        tracing::debug!(sql = %sql, "Update person");
        self.db
            .execute(Statement::from_string(DbBackend::Postgres, sql))
            .await?;
        Ok(())
    }

    /// One PaperTrail version row for one changed column, attributed to
    /// the Administrator.
    pub async fn insert_version(
        &self,
        person_id: i64,
        column: &str,
        old: &JsonValue,
        new: &JsonValue,
        now: NaiveDateTime,
    ) -> Result<i64> {
        let mut changes = BTreeMap::new();
        changes.insert(column.to_string(), (old.clone(), new.clone()));
        let object_changes = object_changes_yaml(&changes)?;
        let row = version::ActiveModel {
            item_type: Set("Person".to_string()),
            item_id: Set(person_id),
            main_type: Set(Some("Person".to_string())),
            main_id: Set(Some(person_id)),
            whodunnit: Set(Some(ADMINISTRATOR_ID.to_string())),
            event: Set("update".to_string()),
            object: Set(None),
            object_changes: Set(Some(object_changes)),
            created_at: Set(Some(now)),
            ..Default::default()
        };
        Ok(Version::insert(row).exec(self.db).await?.last_insert_id)
    }

    /// Idempotent tag assignment. Upserts the tag row, reuses an
    /// existing tagging and bumps the counter cache only for new ones.
    /// Returns the tagging id.
    pub async fn add_tag(&self, person_id: i64, tag_name: &str, now: NaiveDateTime) -> Result<i64> {
        let row = self
            .db
            .query_one(Statement::from_string(DbBackend::Postgres, upsert_tag_sql(tag_name)))
            .await?
            .ok_or_else(|| Error::other(format!("Tag upsert for '{tag_name}' returned no id")))?;
        let tag_id: i64 = row.try_get("", "id")?;

        let existing = Tagging::find()
            .filter(tagging::Column::TagId.eq(tag_id))
            .filter(tagging::Column::TaggableType.eq("Person"))
            .filter(tagging::Column::TaggableId.eq(person_id))
            .filter(tagging::Column::Context.eq("tags"))
            .one(self.db)
            .await?;
        if let Some(found) = existing {
            return Ok(found.id);
        }

        let tagging_id = Tagging::insert(tagging::ActiveModel {
            tag_id: Set(tag_id),
            taggable_type: Set("Person".to_string()),
            taggable_id: Set(person_id),
            context: Set(Some("tags".to_string())),
            created_at: Set(Some(now)),
            ..Default::default()
        })
        .exec(self.db)
        .await?
        .last_insert_id;
        self.db
            .execute(Statement::from_string(
                DbBackend::Postgres,
                format!(
                    r#"UPDATE "tags" SET "taggings_count" = "taggings_count" + 1 WHERE "id" = {tag_id}"#
                ),
            ))
            .await?;
        Ok(tagging_id)
    }

    pub async fn insert_note(&self, person_id: i64, text: &str, now: NaiveDateTime) -> Result<i64> {
        let row = note::ActiveModel {
            subject_id: Set(person_id),
            subject_type: Set("Person".to_string()),
            author_id: Set(ADMINISTRATOR_ID),
            text: Set(Some(text.to_string())),
            created_at: Set(Some(now)),
            updated_at: Set(Some(now)),
            ..Default::default()
        };
        Ok(Note::insert(row).exec(self.db).await?.last_insert_id)
    }

    /// Close the active roles in the old group and open new ones in the
    /// new group. A closed role whose end would not be after its start
    /// is deleted instead of kept as an empty interval. Without explicit
    /// `role_types` the closed roles' types are carried over.
    pub async fn move_primary_group(
        &self,
        person_id: i64,
        group_move: &PrimaryGroupMove,
        today: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<()> {
        let mut carried_types: Vec<String> = Vec::new();
        if let Some(group_id) = group_move.old_group_id {
            let active_roles = Role::find()
                .filter(role::Column::PersonId.eq(person_id))
                .filter(role::Column::GroupId.eq(group_id))
                .filter(
                    Condition::any()
                        .add(role::Column::EndOn.is_null())
                        .add(role::Column::EndOn.gte(today)),
                )
                .all(self.db)
                .await?;
            let active: Vec<i64> = active_roles.iter().map(|r| r.id).collect();
            carried_types = crate::util::dedup(active_roles.into_iter().map(|r| r.role_type));
            if !active.is_empty() {
                tracing::debug!(id = person_id, roles = ?active, "Close roles in old group");
                Role::update_many()
                    .col_expr(role::Column::EndOn, Expr::value(today))
                    .col_expr(role::Column::UpdatedAt, Expr::value(now))
                    .filter(role::Column::Id.is_in(active.clone()))
                    .exec(self.db)
                    .await?;
                Role::delete_many()
                    .filter(role::Column::Id.is_in(active))
                    .filter(Expr::col(role::Column::EndOn).lte(Expr::col(role::Column::StartOn)))
                    .exec(self.db)
                    .await?;
            }
        }
        let role_types = if group_move.role_types.is_empty() {
            &carried_types
        } else {
            &group_move.role_types
        };
        for role_type in role_types {
            let row = role::ActiveModel {
                person_id: Set(person_id),
                group_id: Set(group_move.new_group_id),
                role_type: Set(role_type.clone()),
                start_on: Set(Some(today)),
                end_on: Set(None),
                created_at: Set(Some(now)),
                updated_at: Set(Some(now)),
                ..Default::default()
            };
            Role::insert(row).exec(self.db).await?;
        }
        Ok(())
    }
}

fn update_people_sql(person_id: i64, updates: &[(String, SqlValue)], now: NaiveDateTime) -> String {
    let mut assignments: Vec<String> = updates
        .iter()
        .map(|(column, value)| format!(r#""{column}" = {}"#, sql_literal(value)))
        .collect();
    assignments.push(format!(
        r#""updated_at" = {}"#,
        sql_string_literal(&now.format("%Y-%m-%d %H:%M:%S").to_string())
    ));
    format!(
        r#"UPDATE "people" SET {} WHERE "id" = {person_id}"#,
        assignments.join(", ")
    )
}

/// Upsert a tag row and select its id whether or not the insert won.
fn upsert_tag_sql(tag_name: &str) -> String {
    let name = sql_string_literal(tag_name);
    format!(
        r#"WITH t AS (INSERT INTO "tags" ("name") VALUES ({name}) ON CONFLICT DO NOTHING RETURNING "id") SELECT "id" FROM t UNION SELECT "id" FROM "tags" WHERE "name" = {name}"#
    )
}

/// Render a change set as the canonical YAML document Hitobito stores in
/// `versions.object_changes`: sorted keys, each mapping to `[old, new]`.
pub fn object_changes_yaml(changes: &BTreeMap<String, (JsonValue, JsonValue)>) -> Result<String> {
    let doc: BTreeMap<&String, [&JsonValue; 2]> = changes
        .iter()
        .map(|(column, (old, new))| (column, [old, new]))
        .collect();
    Ok(format!("---\n{}", serde_yaml::to_string(&doc)?))
}
