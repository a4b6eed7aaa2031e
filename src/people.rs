//! People cohort loading.
//!
//! Runs the composed cohort SQL against `people`, pulling the aggregated
//! additional-email, tag and note arrays in the same query, then derives
//! the columns every downstream consumer expects: German status labels,
//! name variants, mailing recipient lists and the SEPA mandate id.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, FromQueryResult, Statement};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::payment_role::PaymentRole;
use crate::query::{note_array_sql, tag_array_sql, PeopleQuery, PeopleWhere};
use crate::util::{compute_age, format_date_de, sepa_mandate_id_from_person_id};

pub fn status_to_de(status: &str) -> Option<&'static str> {
    Some(match status {
        "registered" => "Registriert",
        "printed" => "Anmeldung gedruckt",
        "upload" => "Upload vollständig",
        "in_review" => "Dokumente in Überprüfung durch CMT",
        "reviewed" => "Dokumente vollständig überprüft",
        "confirmed" => "Bestätigt durch CMT",
        "deregistration_noted" => "Abmeldung Vermerkt",
        "deregistered" => "Abgemeldet",
        _ => return None,
    })
}

/// Raw row shape of the cohort query.
#[derive(Debug, Clone, FromQueryResult)]
struct RawPersonRow {
    id: i64,
    primary_group_id: Option<i64>,
    status: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    nickname: Option<String>,
    birthday: Option<NaiveDate>,
    email: Option<String>,
    additional_contact_email_a: Option<String>,
    additional_contact_email_b: Option<String>,
    additional_emails_mailings: Vec<String>,
    tag_list: Vec<String>,
    note_list: Vec<String>,
    gender: Option<String>,
    payment_role: Option<String>,
    unit_code: Option<String>,
    sepa_status: Option<String>,
    sepa_name: Option<String>,
    sepa_mail: Option<String>,
    sepa_iban: Option<String>,
    sepa_bic: Option<String>,
    early_payer: bool,
    print_at: Option<NaiveDate>,
}

/// One enriched cohort row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonRow {
    pub id: i64,
    pub primary_group_id: Option<i64>,
    pub status: Option<String>,
    pub status_de: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub short_first_name: String,
    pub greeting_name: String,
    pub full_name: String,
    pub short_full_name: String,
    pub birthday: Option<NaiveDate>,
    pub birthday_de: Option<String>,
    pub age: Option<i32>,
    pub today: NaiveDate,
    pub today_de: String,
    pub gender: Option<String>,
    pub email: Option<String>,
    pub additional_contact_email_a: Option<String>,
    pub additional_contact_email_b: Option<String>,
    pub additional_emails_mailings: Vec<String>,
    pub tag_list: Vec<String>,
    pub note_list: Vec<String>,
    pub payment_role: Option<String>,
    pub unit_code: Option<String>,
    pub early_payer: bool,
    pub print_at: Option<NaiveDate>,
    pub sepa_status: Option<String>,
    pub sepa_name: Option<String>,
    pub sepa_mail: Option<String>,
    pub sepa_iban: Option<String>,
    pub sepa_bic: Option<String>,
    pub sepa_mandate_id: String,
    pub mailing_to: Vec<String>,
    pub mailing_cc: Vec<String>,
    pub sepa_to: Vec<String>,
    pub sepa_cc: Vec<String>,
    /// Row belongs to the email-only slice: send mail, skip DB writes.
    pub skip_db_updates: bool,
}

impl PersonRow {
    pub fn parsed_payment_role(&self) -> Option<PaymentRole> {
        self.payment_role
            .as_deref()
            .and_then(|s| PaymentRole::from_db_payment_role(s).ok())
    }

    fn from_raw(raw: RawPersonRow, today: NaiveDate, include_sepa_mail_in_mailing_to: bool) -> Self {
        let first_name = raw.first_name.unwrap_or_default();
        let last_name = raw.last_name.unwrap_or_default();
        let short_first_name = first_name
            .split(' ')
            .next()
            .unwrap_or_default()
            .to_string();
        let greeting_name = match raw.nickname.as_deref() {
            Some(nick) if !nick.is_empty() => nick.to_string(),
            _ => short_first_name.clone(),
        };
        let age = raw.birthday.map(|birthday| compute_age(birthday, today));

        let mut mailing_to: Vec<String> = raw.email.iter().cloned().collect();
        if include_sepa_mail_in_mailing_to {
            if let Some(sepa_mail) = raw.sepa_mail.as_deref() {
                if !sepa_mail.is_empty() && !mailing_to.iter().any(|a| a == sepa_mail) {
                    mailing_to.push(sepa_mail.to_string());
                }
            }
        }

        // Guardians go on CC for unit members and minors.
        let needs_guardian_cc = raw.primary_group_id == Some(3) || age.unwrap_or(18) < 18;
        let guardian_addrs = || {
            [
                raw.additional_contact_email_a.as_deref(),
                raw.additional_contact_email_b.as_deref(),
            ]
            .into_iter()
            .flatten()
            .filter(|a| !a.is_empty())
            .map(|a| a.to_string())
        };

        let mut mailing_cc: BTreeSet<String> =
            raw.additional_emails_mailings.iter().cloned().collect();
        if needs_guardian_cc {
            mailing_cc.extend(guardian_addrs());
        }
        for addr in &mailing_to {
            mailing_cc.remove(addr);
        }

        let sepa_to: Vec<String> = raw
            .sepa_mail
            .iter()
            .filter(|a| !a.is_empty())
            .cloned()
            .collect();
        let mut sepa_cc: BTreeSet<String> =
            raw.additional_emails_mailings.iter().cloned().collect();
        sepa_cc.extend(raw.email.iter().filter(|a| !a.is_empty()).cloned());
        if needs_guardian_cc {
            sepa_cc.extend(guardian_addrs());
        }
        for addr in &sepa_to {
            sepa_cc.remove(addr);
        }

        PersonRow {
            sepa_mandate_id: sepa_mandate_id_from_person_id(raw.id),
            status_de: raw.status.as_deref().and_then(status_to_de).map(String::from),
            full_name: format!("{first_name} {last_name}"),
            short_full_name: format!("{short_first_name} {last_name}"),
            birthday_de: raw.birthday.map(format_date_de),
            today_de: format_date_de(today),
            id: raw.id,
            primary_group_id: raw.primary_group_id,
            status: raw.status,
            first_name,
            last_name,
            nickname: raw.nickname,
            short_first_name,
            greeting_name,
            birthday: raw.birthday,
            age,
            today,
            gender: raw.gender,
            email: raw.email,
            additional_contact_email_a: raw.additional_contact_email_a,
            additional_contact_email_b: raw.additional_contact_email_b,
            additional_emails_mailings: raw.additional_emails_mailings,
            tag_list: raw.tag_list,
            note_list: raw.note_list,
            payment_role: raw.payment_role,
            unit_code: raw.unit_code,
            early_payer: raw.early_payer,
            print_at: raw.print_at,
            sepa_status: raw.sepa_status,
            sepa_name: raw.sepa_name,
            sepa_mail: raw.sepa_mail,
            sepa_iban: raw.sepa_iban,
            sepa_bic: raw.sepa_bic,
            mailing_to,
            mailing_cc: mailing_cc.into_iter().collect(),
            sepa_to,
            sepa_cc: sepa_cc.into_iter().collect(),
            skip_db_updates: false,
        }
    }
}

fn cohort_sql(where_clause: &str, limit: Option<u64>) -> String {
    let where_sql = if where_clause.is_empty() {
        String::new()
    } else {
        format!("\nWHERE {where_clause}")
    };
    let limit_sql = match limit {
        Some(n) => format!("\nLIMIT {n}"),
        None => String::new(),
    };
    format!(
        "SELECT\n  people.id, people.primary_group_id,\n  people.status,\n  people.first_name, people.last_name, people.nickname,\n  people.birthday,\n  people.email,\n  people.additional_contact_email_a,\n  people.additional_contact_email_b,\n  ARRAY(\n    SELECT a.email\n    FROM additional_emails a\n    WHERE a.contactable_type = 'Person'\n      AND a.contactable_id = people.id\n      AND a.mailings = TRUE\n  ) AS additional_emails_mailings,\n  {tags} AS tag_list,\n  {notes} AS note_list,\n  people.gender,\n  people.payment_role,\n  people.unit_code,\n  people.sepa_status,\n  people.sepa_name, people.sepa_mail, people.sepa_iban, people.sepa_bic,\n  COALESCE(people.early_payer, FALSE) AS early_payer,\n  people.print_at\nFROM people{where_sql}\nORDER BY people.id{limit_sql}",
        tags = tag_array_sql("people"),
        notes = note_array_sql("people"),
    )
}

async fn load_slice(
    conn: &DatabaseConnection,
    where_: Option<&PeopleWhere>,
    limit: Option<u64>,
    today: NaiveDate,
    include_sepa_mail_in_mailing_to: bool,
) -> Result<Vec<PersonRow>> {
    let where_clause = match where_ {
        Some(w) => w.as_where_condition("people")?,
        None => PeopleWhere::new().as_where_condition("people")?,
    };
    let sql = cohort_sql(&where_clause, limit);
    tracing::info!(sql = %sql, "Cohort query");
    let rows = RawPersonRow::find_by_statement(Statement::from_string(
        conn.get_database_backend(),
        sql,
    ))
    .all(conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|raw| PersonRow::from_raw(raw, today, include_sepa_mail_in_mailing_to))
        .collect())
}

/// Load the cohort a [`PeopleQuery`] describes.
///
/// The main slice comes from `where`; when `email_only_where` is set, a
/// second slice is loaded excluding the ids already found and appended
/// with `skip_db_updates = true`.
pub async fn load_cohort(
    conn: &DatabaseConnection,
    query: &PeopleQuery,
    default_today: NaiveDate,
) -> Result<Vec<PersonRow>> {
    let today = query.now.map(|now| now.date()).unwrap_or(default_today);
    let mut rows = load_slice(
        conn,
        query.where_.as_ref(),
        query.limit,
        today,
        query.include_sepa_mail_in_mailing_to,
    )
    .await?;
    tracing::info!(count = rows.len(), "Loaded cohort");

    if let Some(email_only_where) = &query.email_only_where {
        let found_ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut email_only_where = email_only_where.clone();
        if !found_ids.is_empty() {
            let mut exclude = email_only_where.exclude_id.take().unwrap_or_default();
            exclude.extend(found_ids);
            email_only_where.exclude_id = Some(exclude);
        }
        let mut email_only_rows = load_slice(
            conn,
            Some(&email_only_where),
            query.limit,
            today,
            query.include_sepa_mail_in_mailing_to,
        )
        .await?;
        for row in &mut email_only_rows {
            row.skip_db_updates = true;
        }
        tracing::info!(count = email_only_rows.len(), "Loaded email-only cohort");
        rows.extend(email_only_rows);
    }
    Ok(rows)
}

/// Check that the connection sees the expected tables.
pub async fn check_people_table(conn: &DatabaseConnection) -> Result<()> {
    conn.execute(Statement::from_string(
        DbBackend::Postgres,
        "SELECT 1 FROM people LIMIT 1".to_string(),
    ))
    .await?;
    Ok(())
}

// ==========================================================================
// XLSX export
// ==========================================================================

/// Write serializable rows as an XLSX table: bold frozen header row,
/// autofilter, autofitted columns. Column order follows the first row's
/// field order; arrays are joined with ", ".
pub fn write_rows_xlsx<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    use rust_xlsxwriter::{Format, Workbook};

    let json_rows: Vec<serde_json::Value> = rows
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<_, _>>()?;

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let header_format = Format::new().set_bold();

    let headers: Vec<String> = match json_rows.first() {
        Some(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
        _ => Vec::new(),
    };
    for (col, header) in headers.iter().enumerate() {
        sheet
            .write_with_format(0, col as u16, header, &header_format)
            .map_err(|e| Error::other(format!("XLSX write failed: {e}")))?;
    }
    for (i, row) in json_rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, header) in headers.iter().enumerate() {
            let c = col as u16;
            let write_result = match row.get(header) {
                None | Some(serde_json::Value::Null) => Ok(()),
                Some(serde_json::Value::Bool(b)) => sheet.write(r, c, *b).map(|_| ()),
                Some(serde_json::Value::Number(n)) => {
                    if let Some(int) = n.as_i64() {
                        sheet.write(r, c, int as f64).map(|_| ())
                    } else {
                        sheet.write(r, c, n.as_f64().unwrap_or(f64::NAN)).map(|_| ())
                    }
                }
                Some(serde_json::Value::String(s)) => sheet.write(r, c, s).map(|_| ()),
                Some(serde_json::Value::Array(items)) => {
                    let joined = items
                        .iter()
                        .map(|item| match item {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    sheet.write(r, c, joined).map(|_| ())
                }
                Some(other) => sheet.write(r, c, other.to_string()).map(|_| ()),
            };
            write_result.map_err(|e| Error::other(format!("XLSX write failed: {e}")))?;
        }
    }
    if !headers.is_empty() {
        sheet.set_freeze_panes(1, 0).ok();
        sheet
            .autofilter(0, 0, json_rows.len() as u32, (headers.len() - 1) as u16)
            .ok();
        sheet.autofit();
    }
    workbook
        .save(path)
        .map_err(|e| Error::other(format!("Cannot save XLSX {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_row() -> RawPersonRow {
        RawPersonRow {
            id: 14,
            primary_group_id: Some(3),
            status: Some("reviewed".to_string()),
            first_name: Some("Anna Maria".to_string()),
            last_name: Some("Müller".to_string()),
            nickname: None,
            birthday: NaiveDate::from_ymd_opt(2010, 6, 15),
            email: Some("anna@example.org".to_string()),
            additional_contact_email_a: Some("mutter@example.org".to_string()),
            additional_contact_email_b: None,
            additional_emails_mailings: vec!["extra@example.org".to_string()],
            tag_list: vec!["Warteliste".to_string()],
            note_list: vec![],
            gender: Some("w".to_string()),
            payment_role: Some("EarlyPayer::Group::Unit::Member".to_string()),
            unit_code: Some("A12".to_string()),
            sepa_status: Some("ok".to_string()),
            sepa_name: Some("Petra Müller".to_string()),
            sepa_mail: Some("petra@example.org".to_string()),
            sepa_iban: Some("DE02120300000000202051".to_string()),
            sepa_bic: None,
            early_payer: true,
            print_at: NaiveDate::from_ymd_opt(2025, 7, 15),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, 15).unwrap()
    }

    #[test]
    fn test_derived_names() {
        let row = PersonRow::from_raw(raw_row(), today(), false);
        assert_eq!(row.short_first_name, "Anna");
        assert_eq!(row.greeting_name, "Anna");
        assert_eq!(row.full_name, "Anna Maria Müller");
        assert_eq!(row.short_full_name, "Anna Müller");
        assert_eq!(row.age, Some(15));
        assert_eq!(row.status_de.as_deref(), Some("Dokumente vollständig überprüft"));
        assert_eq!(row.sepa_mandate_id, "wsjrdp202714");
        assert_eq!(row.birthday_de.as_deref(), Some("15.06.2010"));
        assert_eq!(row.today_de, "15.08.2025");
    }

    #[test]
    fn test_nickname_wins_for_greeting() {
        let mut raw = raw_row();
        raw.nickname = Some("Anni".to_string());
        let row = PersonRow::from_raw(raw, today(), false);
        assert_eq!(row.greeting_name, "Anni");
    }

    #[test]
    fn test_mailing_recipients_for_minor() {
        let row = PersonRow::from_raw(raw_row(), today(), false);
        assert_eq!(row.mailing_to, vec!["anna@example.org"]);
        // Guardian and extra addresses on CC, without the To address.
        assert_eq!(
            row.mailing_cc,
            vec!["extra@example.org", "mutter@example.org"]
        );
        assert_eq!(row.sepa_to, vec!["petra@example.org"]);
        assert_eq!(
            row.sepa_cc,
            vec!["anna@example.org", "extra@example.org", "mutter@example.org"]
        );
    }

    #[test]
    fn test_mailing_recipients_for_adult_staff() {
        let mut raw = raw_row();
        raw.primary_group_id = Some(4);
        raw.birthday = NaiveDate::from_ymd_opt(1995, 1, 1);
        let row = PersonRow::from_raw(raw, today(), false);
        // No guardian CC for adults outside unit groups.
        assert_eq!(row.mailing_cc, vec!["extra@example.org"]);
    }

    #[test]
    fn test_include_sepa_mail_in_mailing_to() {
        let row = PersonRow::from_raw(raw_row(), today(), true);
        assert_eq!(row.mailing_to, vec!["anna@example.org", "petra@example.org"]);
        // CC never repeats a To address.
        assert!(!row.mailing_cc.contains(&"petra@example.org".to_string()));
    }

    #[test]
    fn test_cohort_sql_shape() {
        let sql = cohort_sql("people.id = 3", Some(10));
        assert!(sql.starts_with("SELECT"), "{sql}");
        assert!(sql.contains("WHERE people.id = 3"), "{sql}");
        assert!(sql.contains("additional_emails_mailings"), "{sql}");
        assert!(sql.contains("AS tag_list"), "{sql}");
        assert!(sql.contains("AS note_list"), "{sql}");
        assert!(sql.contains("COALESCE(people.early_payer, FALSE)"), "{sql}");
        assert!(sql.ends_with("ORDER BY people.id\nLIMIT 10"), "{sql}");
    }

    #[test]
    fn test_write_rows_xlsx() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.xlsx");
        let rows = vec![PersonRow::from_raw(raw_row(), today(), false)];
        write_rows_xlsx(&path, &rows).unwrap();
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
