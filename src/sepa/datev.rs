//! DATEV booking export for a payment initiation.
//!
//! The bookkeeping team imports one CSV per collection run. Columns and
//! account constants follow the DATEV Buchungsstapel the Ring's tax
//! advisor expects; the Buchungstext is rewritten from the direct debit
//! description into the `ROLE id name / installment` form used in the
//! ledger.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::error::Error;
use crate::util::to_month_year_de;

const COLUMNS: [&str; 7] = [
    "Umsatz",
    "BU_Gegenkonto_H",
    "Belegfeld1",
    "Datum",
    "Konto_S",
    "KOST1",
    "Buchungstext",
];

const CONTRA_ACCOUNT: &str = "8116";
const BANK_ACCOUNT: &str = "1200";
// Kostenstelle für Beiträge
const COST_CENTER: &str = "9500";

/// One pre-notification row to be booked.
#[derive(Debug, Clone)]
pub struct DatevBookingRow {
    pub amount_cents: i64,
    pub debit_sequence_type: String,
    pub collection_date: NaiveDate,
    pub description: String,
}

fn rewrite_regexes() -> &'static [(Regex, &'static str); 3] {
    static REGEXES: OnceLock<[(Regex, &'static str); 3]> = OnceLock::new();
    REGEXES.get_or_init(|| {
        [
            (
                Regex::new(r"Beitrag *(?P<descr>.*) +(?P<role>CMT|YP|UL|IST) (?P<id>[0-9]+)")
                    .unwrap(),
                "$role $id $descr / Beitrag",
            ),
            (
                Regex::new(r"(?P<role>CMT|YP|UL|IST) Beitrag *(?P<descr>.*) +(?P<id>[0-9]+)")
                    .unwrap(),
                "$role $id $descr / Beitrag",
            ),
            (
                Regex::new(
                    r"(?P<installment>[0-9]+\. Rate \w+ 202[567]) (?P<role>CMT|YP|UL|IST) *(?P<descr>.*) +\(id (?P<id>[0-9]+)\)",
                )
                .unwrap(),
                "$role $id $descr / $installment",
            ),
        ]
    })
}

/// Normalize a direct debit description into the ledger booking text.
pub fn booking_text(description: &str) -> String {
    let mut text = description.replace(" WSJ 2027 ", " ");
    if let Some(stripped) = text.strip_prefix("WSJ 2027 ") {
        text = stripped.to_string();
    }
    for (regex, replacement) in rewrite_regexes() {
        text = regex.replace_all(&text, *replacement).into_owned();
    }
    text
}

/// Document reference column, e.g. `August 2025 Einzug FRST (id=7)`.
pub fn belegfeld(collection_date: NaiveDate, debit_sequence_type: &str, pain_id: i64) -> String {
    format!(
        "{} Einzug {} (id={})",
        to_month_year_de(collection_date.year(), collection_date.month()),
        debit_sequence_type,
        pain_id
    )
}

fn amount_de(amount_cents: i64) -> String {
    let sign = if amount_cents < 0 { "-" } else { "" };
    let cents = amount_cents.abs();
    format!("{sign}{},{:02}", cents / 100, cents % 100)
}

/// Serialize booking rows as a semicolon-delimited DATEV CSV.
pub fn write_datev_csv(
    writer: impl std::io::Write,
    rows: &[DatevBookingRow],
    pain_id: i64,
) -> Result<(), Error> {
    let mut csv = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);
    csv.write_record(COLUMNS)
        .map_err(|e| Error::other(format!("DATEV CSV: {e}")))?;
    for row in rows {
        csv.write_record([
            amount_de(row.amount_cents).as_str(),
            CONTRA_ACCOUNT,
            &belegfeld(row.collection_date, &row.debit_sequence_type, pain_id),
            &row.collection_date.format("%d.%m.%Y").to_string(),
            BANK_ACCOUNT,
            COST_CENTER,
            &booking_text(&row.description),
        ])
        .map_err(|e| Error::other(format!("DATEV CSV: {e}")))?;
    }
    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_text_plain_fee() {
        assert_eq!(
            booking_text("YP 14 Anna Müller / WSJ 2027 Beitrag"),
            "YP 14 Anna Müller / Beitrag"
        );
    }

    #[test]
    fn test_booking_text_installment() {
        assert_eq!(
            booking_text("UL 33 Ben Meier / WSJ 2027 2. Rate Dezember 2025"),
            "UL 33 Ben Meier / 2. Rate Dezember 2025"
        );
    }

    #[test]
    fn test_booking_text_legacy_orders() {
        assert_eq!(
            booking_text("Beitrag Anna Müller YP 14"),
            "YP 14 Anna Müller / Beitrag"
        );
        assert_eq!(
            booking_text("YP Beitrag Anna Müller 14"),
            "YP 14 Anna Müller / Beitrag"
        );
        assert_eq!(
            booking_text("2. Rate Dezember 2025 UL Ben Meier (id 33)"),
            "UL 33 Ben Meier / 2. Rate Dezember 2025"
        );
    }

    #[test]
    fn test_booking_text_requires_ordinal_dot() {
        // Only "<n>. Rate" is an installment reference.
        assert_eq!(
            booking_text("3x Rate Februar 2026 UL Ben Meier (id 33)"),
            "3x Rate Februar 2026 UL Ben Meier (id 33)"
        );
    }

    #[test]
    fn test_belegfeld() {
        assert_eq!(
            belegfeld(
                NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(),
                "FRST",
                7
            ),
            "August 2025 Einzug FRST (id=7)"
        );
    }

    #[test]
    fn test_write_datev_csv() {
        let rows = vec![
            DatevBookingRow {
                amount_cents: 30000,
                debit_sequence_type: "FRST".to_string(),
                collection_date: NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(),
                description: "YP 14 Anna Müller / WSJ 2027 Beitrag".to_string(),
            },
            DatevBookingRow {
                amount_cents: 15050,
                debit_sequence_type: "FRST".to_string(),
                collection_date: NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(),
                description: "UL 33 Ben Meier / WSJ 2027 1. Rate August 2025".to_string(),
            },
        ];
        let mut out = Vec::new();
        write_datev_csv(&mut out, &rows, 7).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "Umsatz;BU_Gegenkonto_H;Belegfeld1;Datum;Konto_S;KOST1;Buchungstext"
        );
        assert_eq!(
            lines[1],
            "300,00;8116;August 2025 Einzug FRST (id=7);15.08.2025;1200;9500;YP 14 Anna Müller / Beitrag"
        );
        assert_eq!(
            lines[2],
            "150,50;8116;August 2025 Einzug FRST (id=7);15.08.2025;1200;9500;UL 33 Ben Meier / 1. Rate August 2025"
        );
    }
}
