//! Small shared helpers: SQL expression building, German number and date
//! formatting, and a handful of string utilities used across the tools.
//!
//! The SQL helpers build literal WHERE fragments for the raw cohort query.
//! All values pass through [`sql_literal`], which quotes strings with `'`
//! doubling; the query layer never interpolates user input any other way.

use chrono::{Datelike, NaiveDate};

use crate::error::QueryError;

// ==========================================================================
// SQL expression building
// ==========================================================================

/// A scalar that can appear in a generated SQL expression.
///
/// `Null` and `NotNull` are sentinels: inside [`in_expr`] they fold into
/// `IS NULL` / `IS NOT NULL` branches instead of appearing as literals.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    NotNull,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Str(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Str(v)
    }
}

/// Render a scalar as a SQL literal. Strings are single-quoted with
/// embedded quotes doubled.
pub fn sql_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::NotNull => "NOT NULL".to_string(),
        SqlValue::Bool(true) => "TRUE".to_string(),
        SqlValue::Bool(false) => "FALSE".to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Str(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

pub fn sql_string_literal(s: &str) -> String {
    sql_literal(&SqlValue::Str(s.to_string()))
}

/// `expr IN (...)` with NULL folding.
///
/// An empty list yields `FALSE`, a single element collapses to `= lit`,
/// `Null` elements split off into an `OR expr IS NULL` branch and
/// `NotNull` into `OR expr IS NOT NULL`.
pub fn in_expr(expr: &str, elts: &[SqlValue]) -> String {
    if elts.is_empty() {
        return "FALSE".to_string();
    }
    if elts.iter().any(|x| *x == SqlValue::Null) {
        let rest: Vec<SqlValue> = elts.iter().filter(|x| **x != SqlValue::Null).cloned().collect();
        if rest.is_empty() {
            return format!("{expr} IS NULL");
        }
        return format!("({} OR {expr} IS NULL)", in_expr(expr, &rest));
    }
    if elts.iter().any(|x| *x == SqlValue::NotNull) {
        let rest: Vec<SqlValue> =
            elts.iter().filter(|x| **x != SqlValue::NotNull).cloned().collect();
        if rest.is_empty() {
            return format!("{expr} IS NOT NULL");
        }
        return format!("({} OR {expr} IS NOT NULL)", in_expr(expr, &rest));
    }
    if elts.len() == 1 {
        return format!("{expr} = {}", sql_literal(&elts[0]));
    }
    let list = elts.iter().map(sql_literal).collect::<Vec<_>>().join(", ");
    format!("{expr} IN ({list})")
}

/// `expr NOT IN (...)` with NULL folding; the dual of [`in_expr`].
pub fn not_in_expr(expr: &str, elts: &[SqlValue]) -> String {
    if elts.is_empty() {
        return "TRUE".to_string();
    }
    if elts.iter().any(|x| *x == SqlValue::Null) {
        let rest: Vec<SqlValue> = elts.iter().filter(|x| **x != SqlValue::Null).cloned().collect();
        if rest.is_empty() {
            return format!("{expr} IS NOT NULL");
        }
        return format!("({} AND {expr} IS NOT NULL)", not_in_expr(expr, &rest));
    }
    if elts.iter().any(|x| *x == SqlValue::NotNull) {
        let rest: Vec<SqlValue> =
            elts.iter().filter(|x| **x != SqlValue::NotNull).cloned().collect();
        if rest.is_empty() {
            return format!("{expr} IS NULL");
        }
        return format!("({} AND {expr} IS NULL)", not_in_expr(expr, &rest));
    }
    if elts.len() == 1 {
        return format!("{expr} <> {}", sql_literal(&elts[0]));
    }
    let list = elts.iter().map(sql_literal).collect::<Vec<_>>().join(", ");
    format!("{expr} NOT IN ({list})")
}

const LIKE_OPS: &[&str] = &[
    "LIKE",
    "ILIKE",
    "NOT LIKE",
    "NOT ILIKE",
    "SIMILAR TO",
    "NOT SIMILAR TO",
    "~",
    "~*",
    "!~",
    "!~*",
];

/// Normalize a comparison operator: trim, uppercase, single spaces.
pub fn normalize_sql_op(op: &str) -> String {
    op.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

/// Negate a comparison operator (`=` to `<>`, `ILIKE` to `NOT ILIKE`, ...).
pub fn negate_sql_comparison_op(op: &str) -> Result<String, QueryError> {
    let op = normalize_sql_op(op);
    let negated = match op.as_str() {
        "=" => "<>",
        "<>" => "=",
        ">=" => "<",
        ">" => "<=",
        "<=" => ">",
        "<" => ">=",
        "~" => "!~",
        "!~" => "~",
        "~*" => "!~*",
        "!~*" => "~*",
        "LIKE" => "NOT LIKE",
        "ILIKE" => "NOT ILIKE",
        "NOT LIKE" => "LIKE",
        "NOT ILIKE" => "ILIKE",
        "SIMILAR TO" => "NOT SIMILAR TO",
        "NOT SIMILAR TO" => "SIMILAR TO",
        _ => return Err(QueryError::UnsupportedOperator(op)),
    };
    Ok(negated.to_string())
}

/// Quantifier for array predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayQuantifier {
    Any,
    All,
}

/// Predicate over a SQL array expression.
///
/// Plain comparison operators use `lit op ANY(array)`. LIKE-family
/// operators cannot be used with `ANY` on the right, so they lower to an
/// `EXISTS` over `UNNEST`; the `All` quantifier negates the operator and
/// wraps in `NOT EXISTS`.
pub fn array_predicate_expr(
    array: &str,
    op: &str,
    value: &SqlValue,
    quantifier: ArrayQuantifier,
) -> Result<String, QueryError> {
    let op = normalize_sql_op(op);
    if LIKE_OPS.contains(&op.as_str()) {
        let lit = sql_literal(value);
        match quantifier {
            ArrayQuantifier::Any => Ok(format!(
                "EXISTS(WITH t AS (SELECT UNNEST({array}) AS r) SELECT FROM t WHERE r {op} {lit})"
            )),
            ArrayQuantifier::All => {
                let neg = negate_sql_comparison_op(&op)?;
                Ok(format!(
                    "NOT EXISTS(WITH t AS (SELECT UNNEST({array}) AS r) SELECT FROM t WHERE r {neg} {lit})"
                ))
            }
        }
    } else {
        let comp = match quantifier {
            ArrayQuantifier::Any => "ANY",
            ArrayQuantifier::All => "ALL",
        };
        Ok(format!("{} {op} {comp}({array})", sql_literal(value)))
    }
}

/// Append expressions to a WHERE fragment, joining with `op`.
pub fn combine_where<'a>(
    mut clause: String,
    exprs: impl IntoIterator<Item = &'a str>,
    op: &str,
) -> String {
    for expr in exprs {
        if expr.is_empty() {
            continue;
        }
        if clause.is_empty() {
            clause = expr.to_string();
        } else {
            clause = format!("{clause}\n    {op} {expr}");
        }
    }
    clause
}

// ==========================================================================
// German formatting
// ==========================================================================

const MONTH_NAMES_DE: [&str; 12] = [
    "Januar",
    "Februar",
    "März",
    "April",
    "Mai",
    "Juni",
    "Juli",
    "August",
    "September",
    "Oktober",
    "November",
    "Dezember",
];

pub fn month_name_de(month: u32) -> &'static str {
    MONTH_NAMES_DE[(month as usize).saturating_sub(1).min(11)]
}

/// `(2026, 1)` renders as `"Januar 2026"`.
pub fn to_month_year_de(year: i32, month: u32) -> String {
    format!("{} {}", month_name_de(month), year)
}

/// `"15.08.2025"` style date.
pub fn format_date_de(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

fn group_thousands_de(digits: &str) -> String {
    let bytes = digits.as_bytes();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 && (bytes.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(*b as char);
    }
    out
}

/// Cents as a German currency string with the euro sign: `"3.400,00 €"`.
pub fn format_eur_de(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!(
        "{sign}{},{:02}\u{a0}€",
        group_thousands_de(&(cents / 100).to_string()),
        cents % 100
    )
}

/// Compact variant used in debit purposes: `"400 EUR"`, `"123,45 EUR"`.
/// Whole euro amounts drop the decimals.
pub fn format_eur_de_compact(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    if cents % 100 == 0 {
        format!("{sign}{} EUR", group_thousands_de(&(cents / 100).to_string()))
    } else {
        format!(
            "{sign}{},{:02} EUR",
            group_thousands_de(&(cents / 100).to_string()),
            cents % 100
        )
    }
}

/// Age in completed years at `today`.
pub fn compute_age(birthday: NaiveDate, today: NaiveDate) -> i32 {
    let birthday_passed = (today.month() > birthday.month())
        || (today.month() == birthday.month() && today.day() >= birthday.day());
    (today.year() - birthday.year()) - if birthday_passed { 0 } else { 1 }
}

// ==========================================================================
// SEPA strings
// ==========================================================================

pub fn sepa_mandate_id_from_person_id(person_id: i64) -> String {
    format!("wsjrdp2027{person_id}")
}

/// Replace German umlauts and ß with their ASCII transcriptions.
pub fn german_transliterate(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            'Ä' => out.push_str("Ae"),
            'Ö' => out.push_str("Oe"),
            'Ü' => out.push_str("Ue"),
            'ä' => out.push_str("ae"),
            'ö' => out.push_str("oe"),
            'ü' => out.push_str("ue"),
            'ß' => out.push_str("ss"),
            _ => out.push(c),
        }
    }
    out
}

/// Mask the middle of an IBAN for display, keeping the first and last few
/// characters. Unknown country prefixes or unexpected lengths pass through.
pub fn format_iban_masked(iban: &str) -> String {
    fn mask(s: &str, left: usize, right: usize, expected_length: usize) -> String {
        if s.len() != expected_length || s.len() <= left + right {
            return s.to_string();
        }
        format!("{}{}{}", &s[..left], "*".repeat(s.len() - left - right), &s[s.len() - right..])
    }

    let iban: String = iban.trim().to_uppercase().replace(' ', "");
    match iban.get(..2) {
        Some("AT") => mask(&iban, 4, 4, 20),
        Some("CH") => mask(&iban, 4, 4, 21),
        Some("DE") => mask(&iban, 4, 4, 22),
        Some("NL") => mask(&iban, 5, 4, 18),
        Some("IT") => mask(&iban, 5, 4, 27),
        _ => iban,
    }
}

/// Deduplicate while keeping first-seen order.
pub fn dedup<T: Clone + Eq + std::hash::Hash>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}
