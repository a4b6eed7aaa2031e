//! Payment cohort loading and enrichment.
//!
//! Extends the people cohort with the ledger state needed for a debit
//! run: fee and installment amounts, what has been paid and what is
//! open at a collection date, the direct debit description and
//! end-to-end id, and a payment status that says whether the row can be
//! collected at all.
//!
//! The open amount is what is due by the collection date minus what has
//! been settled, so a person in arrears is collected for the backlog
//! and a person who paid ahead is skipped.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, FromQueryResult, QueryFilter, Statement,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::direct_debit_pre_notification;
use crate::models::DirectDebitPreNotification;
use crate::people::{load_cohort, PersonRow};
use crate::query::{PeopleQuery, PeopleWhere};
use crate::sepa::iban::{is_bic_compatible, validate_bic, validate_iban, BicDirectory};
use crate::util::{format_eur_de_compact, in_expr, to_month_year_de};

pub const PAYMENT_STATUS_OK: &str = "ok";
pub const PAYMENT_STATUS_NO_MANDATE: &str = "no_mandate";
pub const PAYMENT_STATUS_SEPA_STATUS_NOT_OK: &str = "sepa_status_not_ok";
pub const PAYMENT_STATUS_ALREADY_FULLY_PAID: &str = "already_fully_paid";
pub const PAYMENT_STATUS_NOTHING_DUE: &str = "nothing_due";
pub const PAYMENT_STATUS_SKIPPED_MANUAL: &str = "skipped_manual";

/// Aggregated accounting entries for one person.
#[derive(Debug, Clone, Default)]
pub struct LedgerSummary {
    pub entries_count: i64,
    /// Signed sum of all EUR entries.
    pub ledger_cents: i64,
    /// Sum of the magnitudes of negative entries (returned debits).
    pub returned_cents: i64,
}

/// Knobs for the payment enrichment.
#[derive(Debug, Clone, Default)]
pub struct PaymentOptions {
    pub booking_at: Option<NaiveDateTime>,
    /// Fail rows with invalid or inconsistent BICs instead of fixing
    /// them up silently.
    pub pedantic: bool,
    /// Reuse end-to-end ids from an earlier run instead of minting new
    /// ones (resends must keep the announced id).
    pub endtoend_ids: HashMap<i64, String>,
    /// Bank code directory for deriving BICs from German IBANs.
    pub bic_directory: Option<BicDirectory>,
}

/// One person enriched for a debit run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRow {
    #[serde(flatten)]
    pub person: PersonRow,
    pub collection_date: NaiveDate,
    pub total_fee_cents: i64,
    /// `"YYYY-MM"` to cents, in schedule order.
    pub installments_cents: BTreeMap<String, i64>,
    pub installments_cents_sum: i64,
    pub accounting_entries_count: i64,
    pub amount_paid_cents: i64,
    pub amount_unpaid_cents: i64,
    pub overpaid_cents: i64,
    /// Cumulative amount due by the collection date.
    pub amount_due_cents: i64,
    pub amount_due_in_collection_date_month_cents: i64,
    pub open_amount_cents: i64,
    pub sepa_mandate_date: Option<NaiveDate>,
    pub sepa_bic_status: Option<String>,
    pub sepa_bic_status_reason: String,
    pub sepa_dd_sequence_type: String,
    pub sepa_dd_description: String,
    pub sepa_dd_endtoend_id: String,
    pub payment_status: String,
    pub payment_status_reason: String,
    pub accounting_value_date: NaiveDate,
    pub accounting_booking_at: NaiveDateTime,
    pub accounting_description: String,
    pub payment_initiation_id: Option<i64>,
    pub direct_debit_payment_info_id: Option<i64>,
    pub pre_notification_id: Option<i64>,
    pub pre_notified_amount_cents: Option<i64>,
    pub pre_notification_status: Option<String>,
    pub try_skip: bool,
}

impl PaymentRow {
    pub fn is_ok(&self) -> bool {
        self.payment_status == PAYMENT_STATUS_OK
    }

    fn skip(&mut self, status: &str, reason: &str) {
        tracing::warn!(
            id = self.person.id,
            status,
            reason,
            "Skip payment"
        );
        if self.payment_status == PAYMENT_STATUS_OK {
            self.payment_status = status.to_string();
        }
        let parts: Vec<&str> = [self.payment_status_reason.as_str(), reason]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        self.payment_status_reason = parts.join(", ");
    }
}

fn normalize_account_field(value: Option<&str>) -> Option<String> {
    value
        .map(|s| s.replace(' ', "").to_uppercase())
        .filter(|s| !s.is_empty())
}

fn year_month(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

fn ym_key(ym: (i32, u32)) -> String {
    format!("{:04}-{:02}", ym.0, ym.1)
}

/// Enrich one cohort row. Pure apart from the random end-to-end suffix.
pub fn enrich_person_for_payment(
    person: PersonRow,
    ledger: &LedgerSummary,
    collection_date: NaiveDate,
    options: &PaymentOptions,
) -> PaymentRow {
    let booking_at = options
        .booking_at
        .unwrap_or_else(|| chrono::Local::now().naive_local());
    let collection_ym = year_month(collection_date);

    let mut person = person;
    person.sepa_iban = normalize_account_field(person.sepa_iban.as_deref());
    person.sepa_bic = normalize_account_field(person.sepa_bic.as_deref());

    let installments: BTreeMap<(i32, u32), i64> = person
        .parsed_payment_role()
        .map(|role| {
            role.get_installments_cents(
                Some(person.early_payer),
                person.print_at,
                person.today,
                0,
            )
        })
        .unwrap_or_default();
    let total_fee_cents: i64 = installments.values().sum();
    let amount_due_cents: i64 = installments
        .iter()
        .filter(|(ym, _)| **ym <= collection_ym)
        .map(|(_, cents)| *cents)
        .sum();
    let this_month_cents = installments.get(&collection_ym).copied().unwrap_or(0);

    let amount_paid_cents = ledger.ledger_cents.clamp(0, total_fee_cents);
    let overpaid_cents = (ledger.ledger_cents - total_fee_cents).max(0);
    let open_amount_cents = (amount_due_cents - ledger.ledger_cents.max(0)).max(0);

    let last_installment_ym = installments.keys().next_back().copied();
    let sepa_dd_sequence_type = if person.early_payer {
        "OOFF"
    } else if ledger.entries_count == 0 {
        "FRST"
    } else if last_installment_ym.is_some_and(|last| last <= collection_ym) {
        "FNAL"
    } else {
        "RCUR"
    }
    .to_string();

    let sepa_dd_endtoend_id = match options.endtoend_ids.get(&person.id) {
        Some(id) => id.clone(),
        None => {
            let id = format!(
                "{}-{}-{}",
                person.sepa_mandate_id,
                ledger.entries_count,
                &Uuid::new_v4().simple().to_string()[..10]
            );
            id.chars().take(35).collect()
        }
    };

    let sepa_dd_description = dd_description(
        &person,
        &installments,
        collection_ym,
        open_amount_cents,
        this_month_cents,
    );

    let accounting_description = format!(
        "SEPA Lastschrifteinzug {} zum {} (Kontoinhaber*in: {}, IBAN: {}, Sequenz: {})",
        sepa_dd_endtoend_id,
        collection_date.format("%d.%m.%Y"),
        person.sepa_name.as_deref().unwrap_or(""),
        person.sepa_iban.as_deref().unwrap_or(""),
        sepa_dd_sequence_type,
    );

    // The mandate is part of the printed registration; its signature
    // date is the contract print date.
    let sepa_mandate_date = person.print_at;

    let mut row = PaymentRow {
        collection_date,
        total_fee_cents,
        installments_cents: installments
            .iter()
            .map(|(ym, cents)| (ym_key(*ym), *cents))
            .collect(),
        installments_cents_sum: total_fee_cents,
        accounting_entries_count: ledger.entries_count,
        amount_paid_cents,
        amount_unpaid_cents: ledger.returned_cents,
        overpaid_cents,
        amount_due_cents,
        amount_due_in_collection_date_month_cents: this_month_cents,
        open_amount_cents,
        sepa_mandate_date,
        sepa_bic_status: None,
        sepa_bic_status_reason: String::new(),
        sepa_dd_sequence_type,
        sepa_dd_description,
        sepa_dd_endtoend_id,
        payment_status: PAYMENT_STATUS_OK.to_string(),
        payment_status_reason: String::new(),
        accounting_value_date: collection_date,
        accounting_booking_at: booking_at,
        accounting_description,
        payment_initiation_id: None,
        direct_debit_payment_info_id: None,
        pre_notification_id: None,
        pre_notified_amount_cents: None,
        pre_notification_status: None,
        try_skip: false,
        person,
    };

    classify_payment_status(&mut row, ledger, options.bic_directory.as_ref(), options.pedantic);
    row
}

fn dd_description(
    person: &PersonRow,
    installments: &BTreeMap<(i32, u32), i64>,
    collection_ym: (i32, u32),
    open_amount_cents: i64,
    this_month_cents: i64,
) -> String {
    let Some(role) = person.parsed_payment_role() else {
        return String::new();
    };
    if installments.is_empty() {
        return String::new();
    }

    let subject_ident = format!(
        "{} {} {}",
        role.short_role_name(),
        person.id,
        person.short_full_name
    );

    let mut purpose = "WSJ 2027".to_string();
    if person.early_payer || installments.len() < 2 {
        purpose.push_str(" Beitrag");
    } else {
        let installment_num = installments.keys().filter(|ym| **ym <= collection_ym).count();
        purpose.push_str(&format!(
            " {}. Rate {}",
            installment_num,
            to_month_year_de(collection_ym.0, collection_ym.1)
        ));
    }

    if open_amount_cents != this_month_cents {
        purpose.push_str(&format!(" ({})", format_eur_de_compact(this_month_cents)));
        let difference = format_eur_de_compact((open_amount_cents - this_month_cents).abs());
        if open_amount_cents < this_month_cents {
            purpose.push_str(&format!(", davon bereits {difference} bezahlt"));
        } else {
            purpose.push_str(&format!(" + Zahlungsrückstand ({difference})"));
        }
    }

    format!("{subject_ident} / {purpose}")
}

/// Run the IBAN, BIC and amount checks and settle the payment status.
fn classify_payment_status(
    row: &mut PaymentRow,
    ledger: &LedgerSummary,
    bic_directory: Option<&BicDirectory>,
    pedantic: bool,
) {
    let sepa_status = row.person.sepa_status.as_deref().unwrap_or("ok");
    if sepa_status != "ok" {
        row.skip(
            PAYMENT_STATUS_SEPA_STATUS_NOT_OK,
            &format!("sepa_status = {sepa_status}"),
        );
    }

    let validated_iban = match row.person.sepa_iban.as_deref() {
        None => {
            row.skip(PAYMENT_STATUS_NO_MANDATE, "No IBAN");
            None
        }
        Some(raw) => match validate_iban(raw) {
            Ok(iban) => Some(iban),
            Err(e) => {
                row.skip(PAYMENT_STATUS_NO_MANDATE, &format!("sepa_iban: {e}"));
                None
            }
        },
    };
    if row.sepa_mandate_date.is_none() {
        row.skip(PAYMENT_STATUS_NO_MANDATE, "No mandate date");
    }

    if row.open_amount_cents <= 0 {
        if ledger.ledger_cents >= row.total_fee_cents && row.total_fee_cents > 0 {
            row.skip(PAYMENT_STATUS_ALREADY_FULLY_PAID, "amount = 0");
        } else {
            row.skip(PAYMENT_STATUS_NOTHING_DUE, "amount = 0");
        }
    }

    check_bic(row, validated_iban.as_deref(), bic_directory, pedantic);
}

/// BIC handling: validate a supplied BIC, derive one from the IBAN when
/// absent, flag inconsistencies between the two. With `pedantic` the
/// row is skipped on an invalid or inconsistent BIC; otherwise the
/// derived BIC replaces the supplied one and the run continues.
pub fn check_bic(
    row: &mut PaymentRow,
    iban: Option<&str>,
    directory: Option<&BicDirectory>,
    pedantic: bool,
) {
    let derived = iban
        .and_then(|i| directory.and_then(|d| d.bic_for_iban(i)))
        .map(String::from);

    match row.person.sepa_bic.clone() {
        Some(raw) => match validate_bic(&raw) {
            Ok(bic) => {
                row.sepa_bic_status = Some("valid".to_string());
                if let Some(derived) = derived {
                    if !is_bic_compatible(Some(&bic), Some(&derived)) {
                        let reason = format!(
                            "sepa_bic {bic} not consistent with {derived} derived from sepa_iban"
                        );
                        row.person.sepa_bic = Some(derived);
                        row.sepa_bic_status = Some("inconsistent".to_string());
                        row.sepa_bic_status_reason = reason.clone();
                        if pedantic {
                            row.skip(
                                PAYMENT_STATUS_SEPA_STATUS_NOT_OK,
                                &format!("sepa_bic: {reason}"),
                            );
                        }
                    }
                }
            }
            Err(e) => {
                row.person.sepa_bic = None;
                row.sepa_bic_status = Some("invalid".to_string());
                row.sepa_bic_status_reason = e.to_string();
                if pedantic {
                    row.skip(PAYMENT_STATUS_SEPA_STATUS_NOT_OK, &format!("sepa_bic: {e}"));
                }
            }
        },
        None => match derived {
            Some(derived) => {
                row.person.sepa_bic = Some(derived);
                row.sepa_bic_status = Some("from_iban".to_string());
                row.sepa_bic_status_reason = "sepa_bic empty".to_string();
            }
            None => {
                row.sepa_bic_status = Some("not_present".to_string());
            }
        },
    }
}

// ==========================================================================
// Loading
// ==========================================================================

#[derive(Debug, FromQueryResult)]
struct LedgerRow {
    subject_id: i64,
    entries_count: i64,
    ledger_cents: i64,
    returned_cents: i64,
}

/// Aggregate the EUR accounting entries for a set of people.
pub async fn load_ledger_summaries(
    conn: &DatabaseConnection,
    ids: &[i64],
) -> Result<HashMap<i64, LedgerSummary>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let id_values: Vec<crate::util::SqlValue> =
        ids.iter().map(|&id| crate::util::SqlValue::from(id)).collect();
    let sql = format!(
        "SELECT\n  subject_id,\n  COUNT(*)::bigint AS entries_count,\n  COALESCE(SUM(amount_cents), 0)::bigint AS ledger_cents,\n  COALESCE(SUM(CASE WHEN amount_cents < 0 THEN -amount_cents ELSE 0 END), 0)::bigint AS returned_cents\nFROM accounting_entries\nWHERE subject_type = 'Person'\n  AND amount_currency = 'EUR'\n  AND {}\nGROUP BY subject_id",
        in_expr("subject_id", &id_values),
    );
    let rows = LedgerRow::find_by_statement(Statement::from_string(
        sea_orm::DbBackend::Postgres,
        sql,
    ))
    .all(conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| {
            (
                r.subject_id,
                LedgerSummary {
                    entries_count: r.entries_count,
                    ledger_cents: r.ledger_cents,
                    returned_cents: r.returned_cents,
                },
            )
        })
        .collect())
}

/// Load a payment cohort. The query must carry a `collection_date`.
pub async fn load_payment_rows(
    conn: &DatabaseConnection,
    query: &PeopleQuery,
    default_today: NaiveDate,
    options: &PaymentOptions,
) -> Result<Vec<PaymentRow>> {
    let collection_date = query
        .collection_date
        .ok_or_else(|| Error::other("query.collection_date must be set for payment loading"))?;
    let people = load_cohort(conn, query, default_today).await?;
    let ids: Vec<i64> = people.iter().map(|p| p.id).collect();
    let ledgers = load_ledger_summaries(conn, &ids).await?;

    let rows: Vec<PaymentRow> = people
        .into_iter()
        .map(|person| {
            let ledger = ledgers.get(&person.id).cloned().unwrap_or_default();
            enrich_person_for_payment(person, &ledger, collection_date, options)
        })
        .collect();
    tracing::info!(
        count = rows.len(),
        ok = rows.iter().filter(|r| r.is_ok()).count(),
        "Loaded payment cohort"
    );
    Ok(rows)
}

/// Rebuild the payment cohort of an existing payment initiation, for
/// XML regeneration and resends. Amounts are recomputed; the announced
/// end-to-end ids and collection date are reused, and every row is
/// linked to its pre-notification.
pub async fn load_payment_rows_from_payment_initiation(
    conn: &DatabaseConnection,
    payment_initiation_id: i64,
    default_today: NaiveDate,
    options: &PaymentOptions,
) -> Result<Vec<PaymentRow>> {
    let pre_notifications = DirectDebitPreNotification::find()
        .filter(direct_debit_pre_notification::Column::PaymentInitiationId.eq(payment_initiation_id))
        .filter(direct_debit_pre_notification::Column::SubjectType.eq("Person"))
        .all(conn)
        .await?;
    if pre_notifications.is_empty() {
        tracing::warn!(payment_initiation_id, "No pre-notifications found");
        return Ok(Vec::new());
    }

    let collection_dates: std::collections::BTreeSet<NaiveDate> = pre_notifications
        .iter()
        .map(|pn| pn.collection_date)
        .collect();
    if collection_dates.len() != 1 {
        return Err(Error::other(format!(
            "Can handle only one collection_date, found {collection_dates:?}"
        )));
    }
    let collection_date = *collection_dates
        .iter()
        .next()
        .ok_or_else(|| Error::other("empty collection date set"))?;

    let by_subject: HashMap<i64, &direct_debit_pre_notification::Model> = pre_notifications
        .iter()
        .map(|pn| (pn.subject_id, pn))
        .collect();
    let mut options = options.clone();
    options.endtoend_ids = pre_notifications
        .iter()
        .map(|pn| (pn.subject_id, pn.endtoend_id.clone()))
        .collect();

    let query = PeopleQuery::with_where(PeopleWhere {
        id: Some(by_subject.keys().copied().collect()),
        ..PeopleWhere::new()
    })
    .with_collection_date(collection_date);

    let mut rows = load_payment_rows(conn, &query, default_today, &options).await?;
    for row in &mut rows {
        let Some(pn) = by_subject.get(&row.person.id) else {
            continue;
        };
        row.payment_initiation_id = Some(payment_initiation_id);
        row.direct_debit_payment_info_id = Some(pn.direct_debit_payment_info_id);
        row.pre_notification_id = Some(pn.id);
        row.pre_notified_amount_cents = Some(pn.amount_cents);
        row.pre_notification_status = Some(pn.payment_status.clone());
        row.try_skip = pn.try_skip;
        if pn.try_skip {
            row.skip(PAYMENT_STATUS_SKIPPED_MANUAL, "try_skip requested");
        }
        if row.open_amount_cents != pn.amount_cents {
            tracing::info!(
                id = row.person.id,
                full_name = %row.person.full_name,
                pre_notified_amount_cents = pn.amount_cents,
                open_amount_cents = row.open_amount_cents,
                "Amount differs between pre-notification and current computation"
            );
        }
    }
    Ok(rows)
}
