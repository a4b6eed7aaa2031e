//! Accounting-side database writes.
//!
//! Mirrors the life cycle of a direct debit run: one payment initiation
//! row per generated pain.008 document, one payment info row per PmtInf
//! block, pre-notifications for announced amounts and accounting entries
//! once a debit lands in the XML. Camt ingest stores bank statement
//! transactions idempotently and flips matched pre-notifications to
//! booked or returned.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use sea_orm::ActiveValue::Set;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::error::{Result, SepaError};
use crate::models::{
    accounting_entry, camt_transaction, direct_debit_payment_info, direct_debit_pre_notification,
    payment_initiation,
};
use crate::models::{
    AccountingEntry, CamtTransaction, DirectDebitPaymentInfo, DirectDebitPreNotification,
    FinAccount, PaymentInitiation,
};
use crate::payment::PaymentRow;
use crate::repositories::ADMINISTRATOR_ID;
use crate::sepa::camt::CamtEntry;
use crate::sepa::SepaDirectDebitConfig;

pub const SEPA_SCHEMA_PAIN_008: &str = "pain.008.001.02";

pub const PAYMENT_INITIATION_STATUS_PLANNED: &str = "planned";
pub const PAYMENT_INITIATION_STATUS_XML_GENERATED: &str = "xml_generated";

pub const PRE_NOTIFICATION_STATUS_PRE_NOTIFIED: &str = "pre_notified";
pub const PRE_NOTIFICATION_STATUS_XML_GENERATED: &str = "xml_generated";
pub const PRE_NOTIFICATION_STATUS_SKIPPED: &str = "skipped";
pub const PRE_NOTIFICATION_STATUS_BOOKED: &str = "booked";
pub const PRE_NOTIFICATION_STATUS_RETURNED: &str = "returned";

/// Result of offering one camt entry to the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CamtIngestOutcome {
    Inserted(i64),
    AlreadyPresent(i64),
}

/// Result of linking one camt entry to a pre-notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CamtLinkOutcome {
    pub pre_notification_id: i64,
    pub status: String,
    /// False when the pre-notification already carried the status.
    pub changed: bool,
}

/// Repository for writes against the accounting tables.
pub struct AccountingRepository<'a, C: ConnectionTrait> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> AccountingRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    // ----------------------------------------------------------------
    // Payment initiations and payment infos
    // ----------------------------------------------------------------

    /// Insert a `planned` payment initiation for a new run. Transaction
    /// count and control sum stay zero until the XML is generated.
    pub async fn insert_payment_initiation(
        &self,
        config: &SepaDirectDebitConfig,
        message_identification: &str,
        now: NaiveDateTime,
    ) -> Result<i64> {
        let row = payment_initiation::ActiveModel {
            created_at: Set(now),
            updated_at: Set(now),
            status: Set(PAYMENT_INITIATION_STATUS_PLANNED.to_string()),
            sepa_schema: Set(SEPA_SCHEMA_PAIN_008.to_string()),
            message_identification: Set(message_identification.to_string()),
            number_of_transactions: Set(0),
            control_sum_cents: Set(0),
            initiating_party_name: Set(config.name.clone()),
            initiating_party_iban: Set(config.iban.clone()),
            initiating_party_bic: Set(config.bic.clone()),
            ..Default::default()
        };
        let id = PaymentInitiation::insert(row).exec(self.db).await?.last_insert_id;
        tracing::info!(payment_initiation_id = id, "Insert payment initiation");
        Ok(id)
    }

    /// Record the group header of a generated document on its
    /// initiation row.
    pub async fn mark_payment_initiation_generated(
        &self,
        id: i64,
        message_identification: &str,
        number_of_transactions: i32,
        control_sum_cents: i64,
        now: NaiveDateTime,
    ) -> Result<()> {
        let row = payment_initiation::ActiveModel {
            id: Set(id),
            status: Set(PAYMENT_INITIATION_STATUS_XML_GENERATED.to_string()),
            message_identification: Set(message_identification.to_string()),
            number_of_transactions: Set(number_of_transactions),
            control_sum_cents: Set(control_sum_cents),
            updated_at: Set(now),
            ..Default::default()
        };
        PaymentInitiation::update(row).exec(self.db).await?;
        Ok(())
    }

    pub async fn find_payment_initiation(
        &self,
        id: i64,
    ) -> Result<Option<payment_initiation::Model>> {
        Ok(PaymentInitiation::find_by_id(id).one(self.db).await?)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_payment_info(
        &self,
        payment_initiation_id: i64,
        identification: &str,
        debit_sequence_type: &str,
        requested_collection_date: NaiveDate,
        number_of_transactions: i32,
        control_sum_cents: i64,
        config: &SepaDirectDebitConfig,
        now: NaiveDateTime,
    ) -> Result<i64> {
        let row = direct_debit_payment_info::ActiveModel {
            created_at: Set(now),
            updated_at: Set(now),
            payment_initiation_id: Set(payment_initiation_id),
            payment_information_identification: Set(identification.to_string()),
            batch_booking: Set(true),
            number_of_transactions: Set(number_of_transactions),
            control_sum_cents: Set(control_sum_cents),
            payment_type_instrument: Set("CORE".to_string()),
            debit_sequence_type: Set(debit_sequence_type.to_string()),
            requested_collection_date: Set(requested_collection_date),
            cdtr_name: Set(config.name.clone()),
            cdtr_iban: Set(config.iban.clone()),
            cdtr_bic: Set(config.bic.clone()),
            creditor_id: Set(config.creditor_id.clone()),
            ..Default::default()
        };
        let id = DirectDebitPaymentInfo::insert(row).exec(self.db).await?.last_insert_id;
        tracing::info!(direct_debit_payment_info_id = id, "Insert direct debit payment info");
        Ok(id)
    }

    // ----------------------------------------------------------------
    // Pre-notifications
    // ----------------------------------------------------------------

    /// Insert a `pre_notified` row for one announced debit. The amount
    /// stored is the open amount at announcement time.
    pub async fn insert_pre_notification(
        &self,
        row: &PaymentRow,
        payment_initiation_id: i64,
        direct_debit_payment_info_id: i64,
        email_from: &str,
        email_reply_to: &[String],
        config: &SepaDirectDebitConfig,
        now: NaiveDateTime,
    ) -> Result<i64> {
        let model = direct_debit_pre_notification::ActiveModel {
            created_at: Set(now),
            updated_at: Set(now),
            payment_initiation_id: Set(payment_initiation_id),
            direct_debit_payment_info_id: Set(direct_debit_payment_info_id),
            subject_type: Set("Person".to_string()),
            subject_id: Set(row.person.id),
            author_type: Set(Some("Person".to_string())),
            author_id: Set(Some(ADMINISTRATOR_ID)),
            try_skip: Set(false),
            payment_status: Set(PRE_NOTIFICATION_STATUS_PRE_NOTIFIED.to_string()),
            email_from: Set(email_from.to_string()),
            email_to: Set(row.person.sepa_to.clone()),
            email_cc: Set(row.person.sepa_cc.clone()),
            email_bcc: Set(Vec::new()),
            email_reply_to: Set(email_reply_to.to_vec()),
            dbtr_name: Set(row.person.sepa_name.clone().unwrap_or_default()),
            dbtr_iban: Set(row.person.sepa_iban.clone().unwrap_or_default()),
            dbtr_bic: Set(row.person.sepa_bic.clone()),
            dbtr_address: Set(None),
            amount_currency: Set(config.currency.clone()),
            amount_cents: Set(row.open_amount_cents),
            pre_notified_amount_cents: Set(row.open_amount_cents),
            debit_sequence_type: Set(row.sepa_dd_sequence_type.clone()),
            collection_date: Set(row.collection_date),
            mandate_id: Set(row.person.sepa_mandate_id.clone()),
            mandate_date: Set(row.sepa_mandate_date),
            description: Set(row.sepa_dd_description.clone()),
            comment: Set(String::new()),
            endtoend_id: Set(row.sepa_dd_endtoend_id.clone()),
            payment_role: Set(row.person.payment_role.clone()),
            cdtr_name: Set(config.name.clone()),
            cdtr_iban: Set(config.iban.clone()),
            cdtr_bic: Set(config.bic.clone()),
            creditor_id: Set(config.creditor_id.clone()),
            ..Default::default()
        };
        let id = DirectDebitPreNotification::insert(model).exec(self.db).await?.last_insert_id;
        tracing::debug!(
            pre_notification_id = id,
            subject_id = row.person.id,
            amount_cents = row.open_amount_cents,
            "Insert direct debit pre-notification"
        );
        Ok(id)
    }

    pub async fn update_pre_notification_status(
        &self,
        id: i64,
        status: &str,
        now: NaiveDateTime,
    ) -> Result<()> {
        let row = direct_debit_pre_notification::ActiveModel {
            id: Set(id),
            payment_status: Set(status.to_string()),
            updated_at: Set(now),
            ..Default::default()
        };
        DirectDebitPreNotification::update(row).exec(self.db).await?;
        Ok(())
    }

    /// All pre-notifications of one payment initiation, in insertion
    /// order.
    pub async fn list_pre_notifications(
        &self,
        payment_initiation_id: i64,
    ) -> Result<Vec<direct_debit_pre_notification::Model>> {
        Ok(DirectDebitPreNotification::find()
            .filter(
                direct_debit_pre_notification::Column::PaymentInitiationId
                    .eq(payment_initiation_id),
            )
            .order_by_asc(direct_debit_pre_notification::Column::Id)
            .all(self.db)
            .await?)
    }

    // ----------------------------------------------------------------
    // Accounting entries
    // ----------------------------------------------------------------

    /// Book the generated debits for a run. Non-ok rows are skipped,
    /// pre-notified rows move to `xml_generated` (or `skipped` on a
    /// `try_skip` request) and each collected row gets an accounting
    /// entry.
    pub async fn write_payment_rows(&self, rows: &[PaymentRow]) -> Result<()> {
        for row in rows {
            if !row.is_ok() {
                tracing::debug!(
                    id = row.person.id,
                    payment_status = %row.payment_status,
                    payment_status_reason = %row.payment_status_reason,
                    "[ACC] Skip non-ok row"
                );
                continue;
            }
            if let Some(pn_id) = row.pre_notification_id {
                let pn_status = row.pre_notification_status.as_deref().unwrap_or_default();
                if pn_status != PRE_NOTIFICATION_STATUS_PRE_NOTIFIED {
                    tracing::debug!(
                        id = row.person.id,
                        pn_id,
                        pn_status,
                        "[ACC] Skip pre-notification due to payment_status"
                    );
                    continue;
                }
                if row.try_skip {
                    self.update_pre_notification_status(
                        pn_id,
                        PRE_NOTIFICATION_STATUS_SKIPPED,
                        row.accounting_booking_at,
                    )
                    .await?;
                    tracing::debug!(
                        id = row.person.id,
                        pn_id,
                        "[ACC] Skip pre-notification due to try_skip"
                    );
                    continue;
                }
                self.update_pre_notification_status(
                    pn_id,
                    PRE_NOTIFICATION_STATUS_XML_GENERATED,
                    row.accounting_booking_at,
                )
                .await?;
            }
            let entry_id = self.insert_accounting_entry_for_row(row).await?;
            tracing::info!(
                subject_id = row.person.id,
                sepa_name = ?row.person.sepa_name,
                short_full_name = %row.person.short_full_name,
                payment_role = ?row.person.payment_role,
                open_amount_cents = row.open_amount_cents,
                accounting_entry_id = entry_id,
                "[ACC] Insert accounting entry"
            );
        }
        Ok(())
    }

    async fn insert_accounting_entry_for_row(&self, row: &PaymentRow) -> Result<i64> {
        match row.pre_notification_id {
            Some(pn_id) => {
                let pn = DirectDebitPreNotification::find_by_id(pn_id)
                    .one(self.db)
                    .await?
                    .ok_or(SepaError::ReconciliationMismatch {
                        reference: format!("pre_notification {pn_id}"),
                        details: "row vanished during the run".to_string(),
                    })?;
                self.insert_entry_from_pre_notification(row, &pn).await
            }
            None => self.insert_entry_from_row(row).await,
        }
    }

    /// Entry derived from an earlier announcement: the announced amount
    /// and recipients win over the freshly computed ones.
    async fn insert_entry_from_pre_notification(
        &self,
        row: &PaymentRow,
        pn: &direct_debit_pre_notification::Model,
    ) -> Result<i64> {
        let model = accounting_entry::ActiveModel {
            created_at: Set(row.accounting_booking_at),
            updated_at: Set(row.accounting_booking_at),
            subject_type: Set("Person".to_string()),
            subject_id: Set(row.person.id),
            author_type: Set(pn.author_type.clone()),
            author_id: Set(pn.author_id),
            amount_currency: Set(pn.amount_currency.clone()),
            amount_cents: Set(pn.amount_cents),
            description: Set(Some(pn.description.clone())),
            payment_initiation_id: Set(Some(pn.payment_initiation_id)),
            direct_debit_payment_info_id: Set(Some(pn.direct_debit_payment_info_id)),
            direct_debit_pre_notification_id: Set(Some(pn.id)),
            endtoend_id: Set(Some(pn.endtoend_id.clone())),
            mandate_id: Set(Some(pn.mandate_id.clone())),
            mandate_date: Set(pn.mandate_date),
            debit_sequence_type: Set(Some(pn.debit_sequence_type.clone())),
            value_date: Set(Some(pn.collection_date)),
            new_sepa_status: Set(None),
            cdtr_name: Set(Some(pn.cdtr_name.clone())),
            cdtr_iban: Set(Some(pn.cdtr_iban.clone())),
            cdtr_bic: Set(Some(pn.cdtr_bic.clone())),
            dbtr_name: Set(Some(pn.dbtr_name.clone())),
            dbtr_iban: Set(Some(pn.dbtr_iban.clone())),
            dbtr_bic: Set(pn.dbtr_bic.clone()),
            ..Default::default()
        };
        Ok(AccountingEntry::insert(model).exec(self.db).await?.last_insert_id)
    }

    async fn insert_entry_from_row(&self, row: &PaymentRow) -> Result<i64> {
        let model = accounting_entry::ActiveModel {
            created_at: Set(row.accounting_booking_at),
            updated_at: Set(row.accounting_booking_at),
            subject_type: Set("Person".to_string()),
            subject_id: Set(row.person.id),
            author_type: Set(Some("Person".to_string())),
            author_id: Set(Some(ADMINISTRATOR_ID)),
            amount_currency: Set("EUR".to_string()),
            amount_cents: Set(row.open_amount_cents),
            description: Set(Some(row.accounting_description.clone())),
            payment_initiation_id: Set(row.payment_initiation_id),
            direct_debit_payment_info_id: Set(row.direct_debit_payment_info_id),
            direct_debit_pre_notification_id: Set(None),
            endtoend_id: Set(Some(row.sepa_dd_endtoend_id.clone())),
            mandate_id: Set(Some(row.person.sepa_mandate_id.clone())),
            mandate_date: Set(row.sepa_mandate_date),
            debit_sequence_type: Set(Some(row.sepa_dd_sequence_type.clone())),
            value_date: Set(Some(row.collection_date)),
            new_sepa_status: Set(None),
            ..Default::default()
        };
        Ok(AccountingEntry::insert(model).exec(self.db).await?.last_insert_id)
    }

    // ----------------------------------------------------------------
    // Camt ingest
    // ----------------------------------------------------------------

    /// Map `account_identification` (IBAN) to fin account ids.
    pub async fn load_fin_accounts(&self) -> Result<HashMap<String, i64>> {
        let accounts = FinAccount::find().all(self.db).await?;
        Ok(accounts
            .into_iter()
            .map(|a| (a.account_identification, a.id))
            .collect())
    }

    /// Store one booked camt entry. Re-offering a known transaction is
    /// fine as long as the stored row agrees on amount, currency and
    /// value date; a disagreement is a reconciliation error.
    pub async fn ingest_camt_entry(
        &self,
        fin_account_id: i64,
        entry: &CamtEntry,
        now: NaiveDateTime,
    ) -> Result<CamtIngestOutcome> {
        let existing = CamtTransaction::find()
            .filter(
                camt_transaction::Column::AccountIdentification
                    .eq(entry.account_identification.clone()),
            )
            .filter(
                camt_transaction::Column::AccountServicerReference
                    .eq(entry.account_servicer_reference.clone()),
            )
            .filter(camt_transaction::Column::AmountCents.eq(entry.amount_cents))
            .filter(camt_transaction::Column::ValueDate.eq(entry.value_date))
            .one(self.db)
            .await?;
        if let Some(found) = existing {
            if found.amount_currency != entry.amount_currency {
                return Err(SepaError::ReconciliationMismatch {
                    reference: entry.account_servicer_reference.clone(),
                    details: format!(
                        "currency {} in the statement, {} in the database",
                        entry.amount_currency, found.amount_currency
                    ),
                }
                .into());
            }
            tracing::info!(
                reference = %entry.account_servicer_reference,
                camt_transaction_id = found.id,
                "Transaction already in DB"
            );
            return Ok(CamtIngestOutcome::AlreadyPresent(found.id));
        }

        let model = camt_transaction::ActiveModel {
            created_at: Set(now),
            updated_at: Set(now),
            fin_account_id: Set(fin_account_id),
            account_identification: Set(entry.account_identification.clone()),
            account_servicer_reference: Set(entry.account_servicer_reference.clone()),
            credit_debit_indication: Set(entry.credit_debit_indication.clone()),
            status: Set(entry.status.clone()),
            amount_cents: Set(entry.amount_cents),
            amount_currency: Set(entry.amount_currency.clone()),
            value_date: Set(entry.value_date),
            booking_date: Set(Some(entry.booking_date)),
            description: Set(Some(entry.description.clone()).filter(|d| !d.is_empty())),
            bank_transaction_code: Set(Some(entry.bank_transaction_code.clone())
                .filter(|c| !c.is_empty())),
            mandate_id: Set(entry.mandate_id.clone()),
            endtoend_id: Set(entry.endtoend_id.clone()),
            return_reason_code: Set(entry.return_reason_code.clone()),
            dbtr_name: Set(entry.dbtr_name.clone()),
            dbtr_iban: Set(entry.dbtr_iban.clone()),
            cdtr_name: Set(entry.cdtr_name.clone()),
            cdtr_iban: Set(entry.cdtr_iban.clone()),
            ..Default::default()
        };
        let id = CamtTransaction::insert(model).exec(self.db).await?.last_insert_id;
        tracing::info!(
            reference = %entry.account_servicer_reference,
            amount_cents = entry.amount_cents,
            camt_transaction_id = id,
            "Insert camt transaction"
        );
        Ok(CamtIngestOutcome::Inserted(id))
    }

    /// Flip the pre-notification a statement entry refers to. Credits
    /// settle a debit (`booked`), debit entries carry the return of an
    /// earlier collection (`returned`). Returns the pre-notification id
    /// and the new status when a match was found.
    pub async fn update_pre_notification_for_camt(
        &self,
        entry: &CamtEntry,
        now: NaiveDateTime,
    ) -> Result<Option<CamtLinkOutcome>> {
        let Some(endtoend_id) = entry.endtoend_id.as_deref() else {
            return Ok(None);
        };
        let pn = DirectDebitPreNotification::find()
            .filter(direct_debit_pre_notification::Column::EndtoendId.eq(endtoend_id))
            .order_by_desc(direct_debit_pre_notification::Column::Id)
            .one(self.db)
            .await?;
        let Some(pn) = pn else {
            tracing::debug!(endtoend_id, "No pre-notification for statement entry");
            return Ok(None);
        };
        let status = pre_notification_status_for_camt(entry);
        if pn.payment_status == status {
            return Ok(Some(CamtLinkOutcome {
                pre_notification_id: pn.id,
                status: status.to_string(),
                changed: false,
            }));
        }
        tracing::info!(
            pre_notification_id = pn.id,
            endtoend_id,
            from = %pn.payment_status,
            to = status,
            "Update pre-notification from statement"
        );
        self.update_pre_notification_status(pn.id, status, now).await?;
        Ok(Some(CamtLinkOutcome {
            pre_notification_id: pn.id,
            status: status.to_string(),
            changed: true,
        }))
    }

    /// Book the debit side of a returned collection on the person's
    /// ledger. The signed statement amount already carries the minus.
    pub async fn insert_return_entry(
        &self,
        pre_notification_id: i64,
        entry: &CamtEntry,
        now: NaiveDateTime,
    ) -> Result<i64> {
        let pn = DirectDebitPreNotification::find_by_id(pre_notification_id)
            .one(self.db)
            .await?
            .ok_or(SepaError::ReconciliationMismatch {
                reference: format!("pre_notification {pre_notification_id}"),
                details: "row vanished during camt ingest".to_string(),
            })?;
        let reason = entry
            .return_reason_code
            .as_deref()
            .map(|code| format!(" ({code})"))
            .unwrap_or_default();
        let description = format!(
            "SEPA Rücklastschrift {} zum {}{}",
            pn.endtoend_id,
            crate::util::format_date_de(entry.value_date),
            reason
        );
        let model = accounting_entry::ActiveModel {
            created_at: Set(now),
            updated_at: Set(now),
            subject_type: Set("Person".to_string()),
            subject_id: Set(pn.subject_id),
            author_type: Set(Some("Person".to_string())),
            author_id: Set(Some(ADMINISTRATOR_ID)),
            amount_currency: Set(entry.amount_currency.clone()),
            amount_cents: Set(entry.amount_cents),
            description: Set(Some(description)),
            payment_initiation_id: Set(Some(pn.payment_initiation_id)),
            direct_debit_payment_info_id: Set(Some(pn.direct_debit_payment_info_id)),
            direct_debit_pre_notification_id: Set(Some(pn.id)),
            endtoend_id: Set(Some(pn.endtoend_id.clone())),
            mandate_id: Set(Some(pn.mandate_id.clone())),
            mandate_date: Set(pn.mandate_date),
            debit_sequence_type: Set(Some(pn.debit_sequence_type.clone())),
            value_date: Set(Some(entry.value_date)),
            new_sepa_status: Set(None),
            dbtr_name: Set(Some(pn.dbtr_name.clone())),
            dbtr_iban: Set(Some(pn.dbtr_iban.clone())),
            dbtr_bic: Set(pn.dbtr_bic.clone()),
            ..Default::default()
        };
        let id = AccountingEntry::insert(model).exec(self.db).await?.last_insert_id;
        tracing::info!(
            subject_id = pn.subject_id,
            amount_cents = entry.amount_cents,
            accounting_entry_id = id,
            "Insert return accounting entry"
        );
        Ok(id)
    }
}

fn pre_notification_status_for_camt(entry: &CamtEntry) -> &'static str {
    if entry.is_debit() || entry.return_reason_code.is_some() {
        PRE_NOTIFICATION_STATUS_RETURNED
    } else {
        PRE_NOTIFICATION_STATUS_BOOKED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(credit_debit: &str, return_reason_code: Option<&str>) -> CamtEntry {
        CamtEntry {
            account_identification: "DE34520900000077228802".to_string(),
            account_servicer_reference: "REF-1".to_string(),
            credit_debit_indication: credit_debit.to_string(),
            status: "BOOK".to_string(),
            amount_cents: if credit_debit == "CRDT" { 40000 } else { -40000 },
            amount_currency: "EUR".to_string(),
            value_date: NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(),
            booking_date: NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(),
            bank_transaction_code: "PMNT-RDDT-ESDD".to_string(),
            additional_entry_info: None,
            description: String::new(),
            mandate_id: Some("wsjrdp202714".to_string()),
            endtoend_id: Some("wsjrdp202714-0-abc".to_string()),
            return_reason_code: return_reason_code.map(str::to_string),
            dbtr_name: None,
            dbtr_iban: None,
            cdtr_name: None,
            cdtr_iban: None,
        }
    }

    #[test]
    fn test_camt_credit_books_pre_notification() {
        assert_eq!(
            pre_notification_status_for_camt(&entry("CRDT", None)),
            PRE_NOTIFICATION_STATUS_BOOKED
        );
    }

    #[test]
    fn test_camt_debit_returns_pre_notification() {
        assert_eq!(
            pre_notification_status_for_camt(&entry("DBIT", Some("AM04"))),
            PRE_NOTIFICATION_STATUS_RETURNED
        );
        assert_eq!(
            pre_notification_status_for_camt(&entry("DBIT", None)),
            PRE_NOTIFICATION_STATUS_RETURNED
        );
    }
}
