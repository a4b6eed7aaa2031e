//! Round-trip tests for the SEPA document pipeline: build a pain.008
//! document the way `sepa-xml` does, parse it back and verify the
//! structural guarantees the exporter promises.

use chrono::NaiveDate;
use wsjrdp_backoffice::error::SepaError;
use wsjrdp_backoffice::sepa::datev::{write_datev_csv, DatevBookingRow};
use wsjrdp_backoffice::sepa::pain008::{PainMessage, SepaDirectDebit, SepaDirectDebitPayment};
use wsjrdp_backoffice::sepa::SepaDirectDebitConfig;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn payment(id: i64, amount_cents: i64, sequence_type: &str) -> SepaDirectDebitPayment {
    SepaDirectDebitPayment {
        name: format!("Petra Müller {id}"),
        iban: "DE02120300000000202051".to_string(),
        bic: Some("BYLADEM1001".to_string()),
        amount_cents,
        sequence_type: sequence_type.to_string(),
        collection_date: date(2026, 2, 2),
        mandate_id: format!("wsjrdp2027{id}"),
        mandate_date: date(2025, 7, 15),
        description: format!("YP {id} Anna Müller / WSJ 2027 Beitrag"),
        endtoend_id: format!("wsjrdp2027{id}-0-abcdef"),
    }
}

#[test]
fn export_parses_back_with_matching_control_sums() {
    let config = SepaDirectDebitConfig::default();
    let mut dd = SepaDirectDebit::new(&config);
    dd.add_payment(&payment(14, 30000, "RCUR")).unwrap();
    dd.add_payment(&payment(15, 45000, "RCUR")).unwrap();
    let mut first = payment(16, 20000, "FRST");
    first.collection_date = date(2026, 2, 16);
    dd.add_payment(&first).unwrap();

    assert_eq!(dd.num_payments(), 3);
    assert_eq!(dd.control_sum_cents(), 95000);

    let xml = dd.export().unwrap();
    let message = PainMessage::parse_str(&xml).unwrap();
    message.validate_control_sums().unwrap();

    assert_eq!(
        message.group_header.message_identification,
        dd.message_identification()
    );
    assert_eq!(message.group_header.number_of_transactions, 3);
    assert_eq!(message.group_header.control_sum_cents, 95000);

    // One PmtInf per (sequence type, collection date) group.
    assert_eq!(message.payment_informations.len(), 2);
    let frst = message
        .payment_informations
        .iter()
        .find(|info| info.debit_sequence_type == "FRST")
        .unwrap();
    assert_eq!(frst.requested_collection_date, Some(date(2026, 2, 16)));
    assert_eq!(frst.transactions.len(), 1);
    let rcur = message
        .payment_informations
        .iter()
        .find(|info| info.debit_sequence_type == "RCUR")
        .unwrap();
    assert_eq!(rcur.control_sum_cents, 75000);
    assert_eq!(rcur.creditor_id.as_deref(), Some(config.creditor_id.as_str()));
    assert_eq!(rcur.cdtr_iban, config.iban);
}

#[test]
fn export_transliterates_names_and_drops_debtor_bic() {
    let mut dd = SepaDirectDebit::new(&SepaDirectDebitConfig::default());
    dd.add_payment(&payment(14, 30000, "RCUR")).unwrap();
    let xml = dd.export().unwrap();

    assert!(xml.contains("Petra Mueller 14"));
    assert!(!xml.contains("Müller"));
    // User-entered BICs never make it into the document.
    assert!(!xml.contains("BYLADEM1001"));

    let message = PainMessage::parse_str(&xml).unwrap();
    let tx = &message.payment_informations[0].transactions[0];
    assert_eq!(tx.mandate_id.as_deref(), Some("wsjrdp202714"));
    assert_eq!(tx.mandate_date, Some(date(2025, 7, 15)));
    assert_eq!(tx.dbtr_iban.as_deref(), Some("DE02120300000000202051"));
}

#[test]
fn add_payment_rejects_bad_input() {
    let mut dd = SepaDirectDebit::new(&SepaDirectDebitConfig::default());

    let mut bad_iban = payment(1, 30000, "RCUR");
    bad_iban.iban = "DE02120300000000202052".to_string();
    assert!(matches!(
        dd.add_payment(&bad_iban),
        Err(SepaError::InvalidIban { .. })
    ));

    let zero = payment(2, 0, "RCUR");
    assert!(dd.add_payment(&zero).is_err());

    let mut no_mandate = payment(3, 30000, "RCUR");
    no_mandate.mandate_id = String::new();
    assert!(dd.add_payment(&no_mandate).is_err());

    assert!(dd.export().is_err());
}

#[test]
fn tampered_control_sum_is_detected() {
    let mut dd = SepaDirectDebit::new(&SepaDirectDebitConfig::default());
    dd.add_payment(&payment(14, 30000, "RCUR")).unwrap();
    let xml = dd
        .export()
        .unwrap()
        .replace("<CtrlSum>300.00</CtrlSum>", "<CtrlSum>310.00</CtrlSum>");
    let message = PainMessage::parse_str(&xml).unwrap();
    assert!(matches!(
        message.validate_control_sums(),
        Err(SepaError::ControlSumMismatch { .. })
    ));
}

#[test]
fn datev_csv_mirrors_the_collection() {
    let rows = vec![
        DatevBookingRow {
            amount_cents: 30000,
            debit_sequence_type: "RCUR".to_string(),
            collection_date: date(2026, 2, 2),
            description: "YP 14 Anna Müller / WSJ 2027 Beitrag".to_string(),
        },
        DatevBookingRow {
            amount_cents: 45000,
            debit_sequence_type: "RCUR".to_string(),
            collection_date: date(2026, 2, 2),
            description: "3. Rate Februar 2026 UL Ben Meier (id 15)".to_string(),
        },
    ];
    let mut out = Vec::new();
    write_datev_csv(&mut out, &rows, 7).unwrap();
    let csv = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("300,00;8116;"));
    assert!(lines[1].contains("Februar 2026 Einzug RCUR (id=7)"));
    assert!(lines[1].contains("YP 14 Anna Müller / Beitrag"));
    assert!(lines[2].contains("UL 15 Ben Meier / 3. Rate Februar 2026"));
}
