//! Structured people queries.
//!
//! [`PeopleWhere`] is a recursive predicate over the `people` table that
//! round-trips through YAML, so batch configs can carry their cohort
//! selection declaratively. [`PeopleQuery`] wraps a predicate with the
//! loader parameters (limit, reference time, collection date).
//!
//! Lowering to SQL is purely textual: every value passes through the
//! literal helpers in [`crate::util`], multiple predicates combine with
//! AND, and the recursive combinators parenthesize their children.

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::payment_role::WsjRole;
use crate::util::{
    array_predicate_expr, combine_where, in_expr, negate_sql_comparison_op, normalize_sql_op,
    not_in_expr, ArrayQuantifier, SqlValue,
};

/// String sentinel that lowers to `IS NULL` inside an IN list.
pub const NULL_SENTINEL: &str = "NULL";
/// String sentinel that lowers to `IS NOT NULL` inside an IN list.
pub const NOT_NULL_SENTINEL: &str = "NOT NULL";

fn string_to_sql_value(s: &str) -> SqlValue {
    match s {
        NULL_SENTINEL => SqlValue::Null,
        NOT_NULL_SENTINEL => SqlValue::NotNull,
        other => SqlValue::Str(other.to_string()),
    }
}

/// Predicate over an aggregated text array (tags or notes).
///
/// Serializes as a bare string for the common `= ANY` case and as a
/// mapping `{op, expr, all}` otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayPredicate {
    pub op: String,
    pub expr: String,
    pub all: bool,
}

impl ArrayPredicate {
    pub fn equals(expr: impl Into<String>) -> Self {
        ArrayPredicate {
            op: "=".to_string(),
            expr: expr.into(),
            all: false,
        }
    }

    pub fn new(op: impl Into<String>, expr: impl Into<String>) -> Self {
        ArrayPredicate {
            op: normalize_sql_op(&op.into()),
            expr: expr.into(),
            all: false,
        }
    }

    /// Flip comparison and quantifier, turning "some element matches"
    /// into "no element matches".
    fn negated(&self) -> Result<ArrayPredicate, QueryError> {
        Ok(ArrayPredicate {
            op: negate_sql_comparison_op(&self.op)?,
            expr: self.expr.clone(),
            all: !self.all,
        })
    }

    fn as_sql(&self, array_sql: &str) -> Result<String, QueryError> {
        let quantifier = if self.all {
            ArrayQuantifier::All
        } else {
            ArrayQuantifier::Any
        };
        array_predicate_expr(
            array_sql,
            &self.op,
            &SqlValue::Str(self.expr.clone()),
            quantifier,
        )
    }
}

impl Serialize for ArrayPredicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.op == "=" && !self.all {
            serializer.serialize_str(&self.expr)
        } else {
            use serde::ser::SerializeMap;
            let mut map = serializer.serialize_map(None)?;
            map.serialize_entry("op", &self.op)?;
            map.serialize_entry("expr", &self.expr)?;
            if self.all {
                map.serialize_entry("all", &self.all)?;
            }
            map.end()
        }
    }
}

impl<'de> Deserialize<'de> for ArrayPredicate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Plain(String),
            Full {
                #[serde(default = "default_op")]
                op: String,
                expr: String,
                #[serde(default)]
                all: bool,
            },
        }
        fn default_op() -> String {
            "=".to_string()
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Plain(expr) => ArrayPredicate::equals(expr),
            Repr::Full { op, expr, all } => ArrayPredicate {
                op: normalize_sql_op(&op),
                expr,
                all,
            },
        })
    }
}

/// Serde adapter: one element collapses to a scalar in the output and a
/// scalar on input becomes a one-element list.
mod one_or_many {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: Serialize, S: Serializer>(
        value: &Option<Vec<T>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value.as_deref() {
            Some([single]) => single.serialize(serializer),
            Some(many) => many.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T: Deserialize<'de>, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<T>>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<T> {
            One(T),
            Many(Vec<T>),
        }
        Ok(match Option::<Repr<T>>::deserialize(deserializer)? {
            None => None,
            Some(Repr::One(one)) => Some(vec![one]),
            Some(Repr::Many(many)) => Some(many),
        })
    }
}

fn default_true() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Recursive predicate over the people table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PeopleWhere {
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub exclude_deregistered: bool,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub role: Option<Vec<WsjRole>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub status: Option<Vec<String>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub exclude_status: Option<Vec<String>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub sepa_status: Option<Vec<String>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub exclude_sepa_status: Option<Vec<String>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub id: Option<Vec<i64>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub exclude_id: Option<Vec<i64>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub primary_group_id: Option<Vec<i64>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub exclude_primary_group_id: Option<Vec<i64>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub unit_code: Option<Vec<String>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub exclude_unit_code: Option<Vec<String>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub tag: Option<Vec<ArrayPredicate>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub exclude_tag: Option<Vec<ArrayPredicate>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub note: Option<Vec<ArrayPredicate>>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub exclude_note: Option<Vec<ArrayPredicate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub early_payer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_print_at: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_sql: Option<String>,
    #[serde(
        rename = "not",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub not_: Option<Box<PeopleWhere>>,
    #[serde(rename = "and", default, skip_serializing_if = "Vec::is_empty")]
    pub and_: Vec<PeopleWhere>,
    #[serde(rename = "or", default, skip_serializing_if = "Vec::is_empty")]
    pub or_: Vec<PeopleWhere>,
}

/// Correlated subquery for the tag names of a person, usable both in the
/// SELECT list and inside WHERE predicates.
pub fn tag_array_sql(people_table: &str) -> String {
    format!(
        "ARRAY(\n    SELECT tags.name\n    FROM taggings\n    LEFT JOIN tags ON taggings.tag_id = tags.id\n      AND taggings.taggable_type = 'Person'\n    WHERE taggings.taggable_id = {people_table}.id\n  )"
    )
}

/// Correlated subquery for the note texts of a person.
pub fn note_array_sql(people_table: &str) -> String {
    format!(
        "ARRAY(\n    SELECT notes.text\n    FROM notes\n    WHERE notes.subject_type = 'Person'\n      AND notes.subject_id = {people_table}.id\n  )"
    )
}

impl PeopleWhere {
    pub fn new() -> Self {
        PeopleWhere {
            exclude_deregistered: true,
            ..Default::default()
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Lower to a SQL WHERE fragment over `people_table`. Returns an
    /// empty string when no predicate is set.
    pub fn as_where_condition(&self, people_table: &str) -> Result<String, QueryError> {
        let strs = |items: &[String]| -> Vec<SqlValue> {
            items.iter().map(|s| string_to_sql_value(s)).collect()
        };
        let ints =
            |items: &[i64]| -> Vec<SqlValue> { items.iter().map(|i| SqlValue::Int(*i)).collect() };

        let mut where_ = String::new();
        if self.exclude_deregistered {
            where_ = combine_where(
                where_,
                [format!(
                    "{people_table}.status NOT IN ('deregistration_noted', 'deregistered')"
                )
                .as_str()],
                "AND",
            );
        }
        if let Some(roles) = &self.role {
            let mut payment_roles: Vec<SqlValue> = Vec::new();
            for role in roles {
                payment_roles.push(
                    role.regular_payer_payment_role()
                        .db_payment_role()
                        .into(),
                );
                payment_roles.push(role.early_payer_payment_role().db_payment_role().into());
            }
            let expr = in_expr(&format!("{people_table}.payment_role"), &payment_roles);
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        if let Some(ids) = &self.id {
            let expr = in_expr(&format!("{people_table}.id"), &ints(ids));
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        if let Some(ids) = &self.exclude_id {
            let expr = not_in_expr(&format!("{people_table}.id"), &ints(ids));
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        if let Some(ids) = &self.primary_group_id {
            let expr = in_expr(&format!("{people_table}.primary_group_id"), &ints(ids));
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        if let Some(ids) = &self.exclude_primary_group_id {
            let expr = not_in_expr(&format!("{people_table}.primary_group_id"), &ints(ids));
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        if let Some(status) = &self.status {
            let expr = in_expr(&format!("{people_table}.status"), &strs(status));
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        if let Some(status) = &self.exclude_status {
            let expr = not_in_expr(&format!("{people_table}.status"), &strs(status));
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        if let Some(status) = &self.sepa_status {
            let expr = in_expr(&format!("{people_table}.sepa_status"), &strs(status));
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        if let Some(status) = &self.exclude_sepa_status {
            let expr = not_in_expr(&format!("{people_table}.sepa_status"), &strs(status));
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        if let Some(early_payer) = self.early_payer {
            let expr = if early_payer {
                format!("{people_table}.early_payer = TRUE")
            } else {
                format!(
                    "({people_table}.early_payer = FALSE OR {people_table}.early_payer IS NULL)"
                )
            };
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        if let Some(max_print_at) = self.max_print_at {
            let expr = format!(
                "{people_table}.print_at <= '{}'",
                max_print_at.format("%Y-%m-%d")
            );
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        if let Some(unit_codes) = &self.unit_code {
            let expr = in_expr(&format!("{people_table}.unit_code"), &strs(unit_codes));
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        if let Some(unit_codes) = &self.exclude_unit_code {
            let expr = not_in_expr(&format!("{people_table}.unit_code"), &strs(unit_codes));
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        for (predicates, negate, array_sql) in [
            (&self.tag, false, tag_array_sql(people_table)),
            (&self.exclude_tag, true, tag_array_sql(people_table)),
            (&self.note, false, note_array_sql(people_table)),
            (&self.exclude_note, true, note_array_sql(people_table)),
        ] {
            if let Some(predicates) = predicates {
                for predicate in predicates {
                    let predicate = if negate {
                        predicate.negated()?
                    } else {
                        predicate.clone()
                    };
                    let expr = predicate.as_sql(&array_sql)?;
                    where_ = combine_where(where_, [expr.as_str()], "AND");
                }
            }
        }
        if let Some(raw_sql) = &self.raw_sql {
            let expr = format!("({raw_sql})");
            where_ = combine_where(where_, [expr.as_str()], "AND");
        }
        if let Some(not_) = &self.not_ {
            let inner = not_.as_where_condition(people_table)?;
            if !inner.is_empty() {
                let expr = format!("NOT ({inner})");
                where_ = combine_where(where_, [expr.as_str()], "AND");
            }
        }
        if !self.and_.is_empty() {
            let mut inner = String::new();
            for child in &self.and_ {
                let child_where = child.as_where_condition(people_table)?;
                inner = combine_where(inner, [child_where.as_str()], "AND");
            }
            if !inner.is_empty() {
                let expr = format!("({inner})");
                where_ = combine_where(where_, [expr.as_str()], "AND");
            }
        }
        if !self.or_.is_empty() {
            let mut inner = String::new();
            for child in &self.or_ {
                let child_where = child.as_where_condition(people_table)?;
                inner = combine_where(inner, [child_where.as_str()], "OR");
            }
            if !inner.is_empty() {
                let expr = format!("({inner})");
                where_ = combine_where(where_, [expr.as_str()], "AND");
            }
        }
        Ok(where_)
    }
}

/// A complete cohort selection: the main predicate, an optional
/// email-only predicate, and the loader parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PeopleQuery {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_: Option<PeopleWhere>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_only_where: Option<PeopleWhere>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Reference time for age and fee computations. Defaults to the
    /// context start time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_date: Option<NaiveDate>,
    /// Put the SEPA payer address on the visible To list instead of
    /// only the SEPA-specific recipient columns.
    #[serde(default, skip_serializing_if = "is_false")]
    pub include_sepa_mail_in_mailing_to: bool,
}

impl PeopleQuery {
    pub fn with_where(where_: PeopleWhere) -> Self {
        PeopleQuery {
            where_: Some(where_),
            ..Default::default()
        }
    }

    /// Copy with `now` filled in if not set yet.
    pub fn or_now(mut self, now: NaiveDateTime) -> Self {
        self.now.get_or_insert(now);
        self
    }

    /// Copy with `collection_date` replaced.
    pub fn with_collection_date(mut self, collection_date: NaiveDate) -> Self {
        self.collection_date = Some(collection_date);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_where_lowers_to_deregistration_filter() {
        let where_ = PeopleWhere::new();
        assert_eq!(
            where_.as_where_condition("people").unwrap(),
            "people.status NOT IN ('deregistration_noted', 'deregistered')"
        );
    }

    #[test]
    fn test_role_expands_to_both_payment_roles() {
        let where_ = PeopleWhere {
            exclude_deregistered: false,
            role: Some(vec![WsjRole::Yp]),
            ..Default::default()
        };
        assert_eq!(
            where_.as_where_condition("people").unwrap(),
            "people.payment_role IN ('RegularPayer::Group::Unit::Member', 'EarlyPayer::Group::Unit::Member')"
        );
    }

    #[test]
    fn test_early_payer_false_includes_null() {
        let where_ = PeopleWhere {
            exclude_deregistered: false,
            early_payer: Some(false),
            ..Default::default()
        };
        assert_eq!(
            where_.as_where_condition("people").unwrap(),
            "(people.early_payer = FALSE OR people.early_payer IS NULL)"
        );
    }

    #[test]
    fn test_status_sentinels() {
        let where_ = PeopleWhere {
            exclude_deregistered: false,
            sepa_status: Some(vec!["ok".to_string(), NULL_SENTINEL.to_string()]),
            ..Default::default()
        };
        assert_eq!(
            where_.as_where_condition("people").unwrap(),
            "(people.sepa_status = 'ok' OR people.sepa_status IS NULL)"
        );
    }

    #[test]
    fn test_combined_predicates_join_with_and() {
        let where_ = PeopleWhere {
            status: Some(vec!["reviewed".to_string(), "confirmed".to_string()]),
            max_print_at: NaiveDate::from_ymd_opt(2025, 12, 1),
            ..PeopleWhere::new()
        };
        let sql = where_.as_where_condition("people").unwrap();
        assert_eq!(
            sql,
            "people.status NOT IN ('deregistration_noted', 'deregistered')\n    AND people.status IN ('reviewed', 'confirmed')\n    AND people.print_at <= '2025-12-01'"
        );
    }

    #[test]
    fn test_not_and_or_combinators() {
        let where_ = PeopleWhere {
            exclude_deregistered: false,
            not_: Some(Box::new(PeopleWhere {
                exclude_deregistered: false,
                id: Some(vec![3]),
                ..Default::default()
            })),
            or_: vec![
                PeopleWhere {
                    exclude_deregistered: false,
                    early_payer: Some(true),
                    ..Default::default()
                },
                PeopleWhere {
                    exclude_deregistered: false,
                    unit_code: Some(vec!["A12".to_string()]),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let sql = where_.as_where_condition("people").unwrap();
        assert_eq!(
            sql,
            "NOT (people.id = 3)\n    AND (people.early_payer = TRUE\n    OR people.unit_code = 'A12')"
        );
    }

    #[test]
    fn test_tag_predicate_lowering() {
        let where_ = PeopleWhere {
            exclude_deregistered: false,
            tag: Some(vec![ArrayPredicate::new("ilike", "%Warteliste%")]),
            ..Default::default()
        };
        let sql = where_.as_where_condition("people").unwrap();
        assert!(sql.contains("ILIKE '%Warteliste%'"), "{sql}");
        assert!(sql.starts_with("EXISTS(WITH t AS (SELECT UNNEST(ARRAY("), "{sql}");
    }

    #[test]
    fn test_exclude_tag_flips_comparison_and_quantifier() {
        let where_ = PeopleWhere {
            exclude_deregistered: false,
            exclude_tag: Some(vec![ArrayPredicate::equals("Warteliste")]),
            ..Default::default()
        };
        let sql = where_.as_where_condition("people").unwrap();
        assert!(sql.starts_with("'Warteliste' <> ALL(ARRAY("), "{sql}");
    }

    #[test]
    fn test_raw_sql_is_parenthesized() {
        let where_ = PeopleWhere {
            exclude_deregistered: false,
            raw_sql: Some("people.zip_code LIKE '1%'".to_string()),
            ..Default::default()
        };
        assert_eq!(
            where_.as_where_condition("people").unwrap(),
            "(people.zip_code LIKE '1%')"
        );
    }

    #[test]
    fn test_yaml_round_trip() {
        let where_ = PeopleWhere {
            role: Some(vec![WsjRole::Yp, WsjRole::Ul]),
            status: Some(vec!["reviewed".to_string()]),
            exclude_id: Some(vec![14, 15]),
            early_payer: Some(false),
            max_print_at: NaiveDate::from_ymd_opt(2025, 12, 1),
            tag: Some(vec![ArrayPredicate::new("ilike", "%Warteliste%")]),
            not_: Some(Box::new(PeopleWhere {
                unit_code: Some(vec!["B07".to_string()]),
                ..PeopleWhere::new()
            })),
            ..PeopleWhere::new()
        };
        let yaml = where_.to_yaml().unwrap();
        let reloaded = PeopleWhere::from_yaml(&yaml).unwrap();
        assert_eq!(reloaded, where_);
    }

    #[test]
    fn test_yaml_scalar_collapse() {
        let where_ = PeopleWhere {
            status: Some(vec!["reviewed".to_string()]),
            ..PeopleWhere::new()
        };
        let yaml = where_.to_yaml().unwrap();
        // A single-element list serializes as a plain scalar.
        assert!(yaml.contains("status: reviewed"), "{yaml}");
        assert_eq!(PeopleWhere::from_yaml(&yaml).unwrap(), where_);
    }

    #[test]
    fn test_yaml_tag_predicate_round_trip() {
        let yaml = "tag:\n  op: ilike\n  expr: '%Warteliste%'\n";
        let where_ = PeopleWhere::from_yaml(yaml).unwrap();
        assert_eq!(
            where_.tag,
            Some(vec![ArrayPredicate::new("ilike", "%Warteliste%")])
        );
        let reloaded = PeopleWhere::from_yaml(&where_.to_yaml().unwrap()).unwrap();
        assert_eq!(reloaded, where_);
    }

    #[test]
    fn test_people_query_round_trip() {
        let query = PeopleQuery {
            where_: Some(PeopleWhere {
                role: Some(vec![WsjRole::Yp]),
                ..PeopleWhere::new()
            }),
            email_only_where: Some(PeopleWhere {
                id: Some(vec![42]),
                ..PeopleWhere::new()
            }),
            limit: Some(10),
            collection_date: NaiveDate::from_ymd_opt(2026, 1, 5),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&query).unwrap();
        let reloaded: PeopleQuery = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(reloaded, query);
    }
}
