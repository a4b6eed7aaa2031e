//! pain.008.001.02 direct debit initiation documents.
//!
//! The writer produces one `PmtInf` block per (sequence type, collection
//! date) group and checks the document against the schema constraints we
//! can verify structurally (control sums, counts, field lengths, valid
//! IBANs). The reader parses a document back into typed records; it is
//! used to rebuild payment batches for resends and for the round-trip
//! check after export.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use uuid::Uuid;

use crate::error::SepaError;
use crate::sepa::iban::validate_iban;
use crate::sepa::{cents_to_decimal, decimal_to_cents, SepaDirectDebitConfig, XmlNode};
use crate::util::german_transliterate;

pub const PAIN_008_001_02: &str = "pain.008.001.02";

const MAX_NAME_LEN: usize = 70;
const MAX_DESCRIPTION_LEN: usize = 140;
const MAX_ID_LEN: usize = 35;

/// One direct debit transaction to be collected.
#[derive(Debug, Clone)]
pub struct SepaDirectDebitPayment {
    pub name: String,
    pub iban: String,
    /// Dropped on export; user-entered BICs are not reliable enough to
    /// transmit and are not required for EUR SEPA debits.
    pub bic: Option<String>,
    pub amount_cents: i64,
    /// OOFF | FRST | RCUR | FNAL
    pub sequence_type: String,
    pub collection_date: NaiveDate,
    pub mandate_id: String,
    pub mandate_date: NaiveDate,
    pub description: String,
    pub endtoend_id: String,
}

/// Builder for one pain.008 document.
pub struct SepaDirectDebit {
    config: SepaDirectDebitConfig,
    message_identification: String,
    payments: Vec<SepaDirectDebitPayment>,
}

fn truncate(s: &str, max_len: usize) -> String {
    s.chars().take(max_len).collect()
}

impl SepaDirectDebit {
    pub fn new(config: &SepaDirectDebitConfig) -> Self {
        let message_identification = format!(
            "{}-{}",
            Local::now().format("%Y%m%d%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..12]
        );
        SepaDirectDebit {
            config: config.sanitized(),
            message_identification,
            payments: Vec::new(),
        }
    }

    pub fn message_identification(&self) -> &str {
        &self.message_identification
    }

    pub fn num_payments(&self) -> usize {
        self.payments.len()
    }

    pub fn control_sum_cents(&self) -> i64 {
        self.payments.iter().map(|p| p.amount_cents).sum()
    }

    /// Validate and add a payment. The IBAN must pass its checksum, the
    /// amount must be positive; name and description are transliterated
    /// and truncated to the schema limits.
    pub fn add_payment(&mut self, payment: &SepaDirectDebitPayment) -> Result<(), SepaError> {
        let iban = validate_iban(&payment.iban)?;
        if payment.amount_cents <= 0 {
            return Err(SepaError::Malformed(format!(
                "non-positive amount {} for {}",
                payment.amount_cents, payment.endtoend_id
            )));
        }
        if payment.endtoend_id.is_empty() || payment.endtoend_id.len() > MAX_ID_LEN {
            return Err(SepaError::Malformed(format!(
                "invalid end-to-end id '{}'",
                payment.endtoend_id
            )));
        }
        if payment.mandate_id.is_empty() {
            return Err(SepaError::Malformed(format!(
                "missing mandate id for {}",
                payment.endtoend_id
            )));
        }
        self.payments.push(SepaDirectDebitPayment {
            name: truncate(&german_transliterate(&payment.name), MAX_NAME_LEN),
            iban,
            bic: None,
            description: truncate(
                &german_transliterate(&payment.description),
                MAX_DESCRIPTION_LEN,
            ),
            ..payment.clone()
        });
        Ok(())
    }

    /// Payments grouped into `PmtInf` blocks.
    fn payment_groups(&self) -> BTreeMap<(String, NaiveDate), Vec<&SepaDirectDebitPayment>> {
        let mut groups: BTreeMap<(String, NaiveDate), Vec<&SepaDirectDebitPayment>> =
            BTreeMap::new();
        for payment in &self.payments {
            groups
                .entry((payment.sequence_type.clone(), payment.collection_date))
                .or_default()
                .push(payment);
        }
        groups
    }

    /// Serialize to pretty-printed XML.
    pub fn export(&self) -> Result<String, SepaError> {
        if self.payments.is_empty() {
            return Err(SepaError::Malformed("no payments added".to_string()));
        }
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(SepaError::Xml)?;

        let mut document = BytesStart::new("Document");
        document.push_attribute((
            "xmlns",
            format!("urn:iso:std:iso:20022:tech:xsd:{PAIN_008_001_02}").as_str(),
        ));
        document.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
        writer.write_event(Event::Start(document)).map_err(SepaError::Xml)?;
        start(&mut writer, "CstmrDrctDbtInitn")?;

        // Group header
        start(&mut writer, "GrpHdr")?;
        text_el(&mut writer, "MsgId", &self.message_identification)?;
        text_el(
            &mut writer,
            "CreDtTm",
            &Local::now().format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
        )?;
        text_el(&mut writer, "NbOfTxs", &self.payments.len().to_string())?;
        text_el(&mut writer, "CtrlSum", &cents_to_decimal(self.control_sum_cents()))?;
        start(&mut writer, "InitgPty")?;
        text_el(&mut writer, "Nm", &truncate(&self.config.name, MAX_NAME_LEN))?;
        end(&mut writer, "InitgPty")?;
        end(&mut writer, "GrpHdr")?;

        for ((sequence_type, collection_date), group) in self.payment_groups() {
            let group_sum: i64 = group.iter().map(|p| p.amount_cents).sum();
            let payment_info_id = format!(
                "{}-{}-{}",
                self.message_identification,
                sequence_type,
                collection_date.format("%Y%m%d")
            );

            start(&mut writer, "PmtInf")?;
            text_el(&mut writer, "PmtInfId", &truncate(&payment_info_id, MAX_ID_LEN))?;
            text_el(&mut writer, "PmtMtd", "DD")?;
            text_el(&mut writer, "BtchBookg", "true")?;
            text_el(&mut writer, "NbOfTxs", &group.len().to_string())?;
            text_el(&mut writer, "CtrlSum", &cents_to_decimal(group_sum))?;
            start(&mut writer, "PmtTpInf")?;
            start(&mut writer, "SvcLvl")?;
            text_el(&mut writer, "Cd", "SEPA")?;
            end(&mut writer, "SvcLvl")?;
            start(&mut writer, "LclInstrm")?;
            text_el(&mut writer, "Cd", "CORE")?;
            end(&mut writer, "LclInstrm")?;
            text_el(&mut writer, "SeqTp", &sequence_type)?;
            end(&mut writer, "PmtTpInf")?;
            text_el(
                &mut writer,
                "ReqdColltnDt",
                &collection_date.format("%Y-%m-%d").to_string(),
            )?;
            start(&mut writer, "Cdtr")?;
            text_el(&mut writer, "Nm", &truncate(&self.config.name, MAX_NAME_LEN))?;
            end(&mut writer, "Cdtr")?;
            start(&mut writer, "CdtrAcct")?;
            start(&mut writer, "Id")?;
            text_el(&mut writer, "IBAN", &self.config.iban)?;
            end(&mut writer, "Id")?;
            end(&mut writer, "CdtrAcct")?;
            start(&mut writer, "CdtrAgt")?;
            start(&mut writer, "FinInstnId")?;
            text_el(&mut writer, "BIC", &self.config.bic)?;
            end(&mut writer, "FinInstnId")?;
            end(&mut writer, "CdtrAgt")?;
            text_el(&mut writer, "ChrgBr", "SLEV")?;
            start(&mut writer, "CdtrSchmeId")?;
            start(&mut writer, "Id")?;
            start(&mut writer, "PrvtId")?;
            start(&mut writer, "Othr")?;
            text_el(&mut writer, "Id", &self.config.creditor_id)?;
            start(&mut writer, "SchmeNm")?;
            text_el(&mut writer, "Prtry", "SEPA")?;
            end(&mut writer, "SchmeNm")?;
            end(&mut writer, "Othr")?;
            end(&mut writer, "PrvtId")?;
            end(&mut writer, "Id")?;
            end(&mut writer, "CdtrSchmeId")?;

            for payment in group {
                start(&mut writer, "DrctDbtTxInf")?;
                start(&mut writer, "PmtId")?;
                text_el(&mut writer, "EndToEndId", &payment.endtoend_id)?;
                end(&mut writer, "PmtId")?;
                let mut amount = BytesStart::new("InstdAmt");
                amount.push_attribute(("Ccy", self.config.currency.as_str()));
                writer.write_event(Event::Start(amount)).map_err(SepaError::Xml)?;
                writer
                    .write_event(Event::Text(BytesText::new(&cents_to_decimal(
                        payment.amount_cents,
                    ))))
                    .map_err(SepaError::Xml)?;
                end(&mut writer, "InstdAmt")?;
                start(&mut writer, "DrctDbtTx")?;
                start(&mut writer, "MndtRltdInf")?;
                text_el(&mut writer, "MndtId", &payment.mandate_id)?;
                text_el(
                    &mut writer,
                    "DtOfSgntr",
                    &payment.mandate_date.format("%Y-%m-%d").to_string(),
                )?;
                end(&mut writer, "MndtRltdInf")?;
                end(&mut writer, "DrctDbtTx")?;
                start(&mut writer, "DbtrAgt")?;
                start(&mut writer, "FinInstnId")?;
                start(&mut writer, "Othr")?;
                text_el(&mut writer, "Id", "NOTPROVIDED")?;
                end(&mut writer, "Othr")?;
                end(&mut writer, "FinInstnId")?;
                end(&mut writer, "DbtrAgt")?;
                start(&mut writer, "Dbtr")?;
                text_el(&mut writer, "Nm", &payment.name)?;
                end(&mut writer, "Dbtr")?;
                start(&mut writer, "DbtrAcct")?;
                start(&mut writer, "Id")?;
                text_el(&mut writer, "IBAN", &payment.iban)?;
                end(&mut writer, "Id")?;
                end(&mut writer, "DbtrAcct")?;
                start(&mut writer, "RmtInf")?;
                text_el(&mut writer, "Ustrd", &payment.description)?;
                end(&mut writer, "RmtInf")?;
                end(&mut writer, "DrctDbtTxInf")?;
            }
            end(&mut writer, "PmtInf")?;
        }

        end(&mut writer, "CstmrDrctDbtInitn")?;
        end(&mut writer, "Document")?;

        let xml = String::from_utf8(writer.into_inner())
            .map_err(|e| SepaError::Malformed(e.to_string()))?;

        // Round-trip check before handing the document out.
        let parsed = PainMessage::parse_str(&xml)?;
        parsed.validate_control_sums()?;
        Ok(xml)
    }
}

fn start(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<(), SepaError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(SepaError::Xml)
}

fn end(writer: &mut Writer<Vec<u8>>, name: &str) -> Result<(), SepaError> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(SepaError::Xml)
}

fn text_el(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<(), SepaError> {
    start(writer, name)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(SepaError::Xml)?;
    end(writer, name)
}

// ==========================================================================
// Reader
// ==========================================================================

/// Parsed pain.008 group header.
#[derive(Debug, Clone)]
pub struct PainGroupHeader {
    pub message_identification: String,
    pub creation_date_time: String,
    pub number_of_transactions: u32,
    pub control_sum_cents: i64,
    pub initiating_party_name: String,
}

/// Parsed `PmtInf` block.
#[derive(Debug, Clone)]
pub struct PainPaymentInformation {
    pub payment_information_identification: String,
    pub batch_booking: bool,
    pub number_of_transactions: u32,
    pub control_sum_cents: i64,
    pub payment_type_instrument: String,
    pub debit_sequence_type: String,
    pub requested_collection_date: Option<NaiveDate>,
    pub cdtr_name: String,
    pub cdtr_iban: String,
    pub cdtr_bic: Option<String>,
    pub creditor_id: Option<String>,
    pub transactions: Vec<PainTransaction>,
}

/// Parsed `DrctDbtTxInf` block.
#[derive(Debug, Clone)]
pub struct PainTransaction {
    pub endtoend_id: String,
    pub amount_cents: i64,
    pub amount_currency: String,
    pub mandate_id: Option<String>,
    pub mandate_date: Option<NaiveDate>,
    pub dbtr_name: Option<String>,
    pub dbtr_iban: Option<String>,
    pub description: Option<String>,
}

/// A parsed pain.008 document.
#[derive(Debug, Clone)]
pub struct PainMessage {
    pub group_header: PainGroupHeader,
    pub payment_informations: Vec<PainPaymentInformation>,
}

impl PainMessage {
    pub fn parse_str(xml: &str) -> Result<Self, SepaError> {
        let root = XmlNode::parse_str(xml)?;
        Self::from_root(&root)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, SepaError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SepaError::Malformed(format!("cannot read {}: {e}", path.display())))?;
        Self::parse_str(&content)
    }

    fn from_root(root: &XmlNode) -> Result<Self, SepaError> {
        if root.name != "Document" {
            return Err(SepaError::Malformed(format!(
                "expected Document root, found {}",
                root.name
            )));
        }
        let init = root
            .first("CstmrDrctDbtInitn")
            .ok_or_else(|| SepaError::UnsupportedSchema(root.children_names()))?;
        let hdr = init
            .first("GrpHdr")
            .ok_or_else(|| SepaError::Malformed("missing GrpHdr".to_string()))?;
        let group_header = PainGroupHeader {
            message_identification: hdr.required_text_at(&["MsgId"])?.to_string(),
            creation_date_time: hdr.text_at(&["CreDtTm"]).unwrap_or_default().to_string(),
            number_of_transactions: parse_count(hdr.required_text_at(&["NbOfTxs"])?)?,
            control_sum_cents: decimal_to_cents(hdr.required_text_at(&["CtrlSum"])?)?,
            initiating_party_name: hdr
                .text_at(&["InitgPty", "Nm"])
                .unwrap_or_default()
                .to_string(),
        };

        let mut payment_informations = Vec::new();
        for pmt_inf in init.all("PmtInf") {
            let mut transactions = Vec::new();
            for tx in pmt_inf.all("DrctDbtTxInf") {
                let amt = tx
                    .first("InstdAmt")
                    .ok_or_else(|| SepaError::Malformed("missing InstdAmt".to_string()))?;
                transactions.push(PainTransaction {
                    endtoend_id: tx.required_text_at(&["PmtId", "EndToEndId"])?.to_string(),
                    amount_cents: decimal_to_cents(&amt.text)?,
                    amount_currency: amt.attribute("Ccy").unwrap_or("EUR").to_string(),
                    mandate_id: tx
                        .text_at(&["DrctDbtTx", "MndtRltdInf", "MndtId"])
                        .map(String::from),
                    mandate_date: tx
                        .text_at(&["DrctDbtTx", "MndtRltdInf", "DtOfSgntr"])
                        .and_then(parse_iso_date),
                    dbtr_name: tx.text_at(&["Dbtr", "Nm"]).map(String::from),
                    dbtr_iban: tx.text_at(&["DbtrAcct", "Id", "IBAN"]).map(String::from),
                    description: tx.text_at(&["RmtInf", "Ustrd"]).map(String::from),
                });
            }
            let fin_instn = pmt_inf.at(&["CdtrAgt", "FinInstnId"]);
            let cdtr_bic = fin_instn
                .and_then(|n| n.text_at(&["BIC"]).or_else(|| n.text_at(&["BICFI"])))
                .map(String::from);
            payment_informations.push(PainPaymentInformation {
                payment_information_identification: pmt_inf
                    .text_at(&["PmtInfId"])
                    .unwrap_or_default()
                    .to_string(),
                batch_booking: pmt_inf.text_at(&["BtchBookg"]).unwrap_or("true") == "true",
                number_of_transactions: parse_count(pmt_inf.required_text_at(&["NbOfTxs"])?)?,
                control_sum_cents: decimal_to_cents(pmt_inf.required_text_at(&["CtrlSum"])?)?,
                payment_type_instrument: pmt_inf
                    .text_at(&["PmtTpInf", "LclInstrm", "Cd"])
                    .unwrap_or_default()
                    .to_string(),
                debit_sequence_type: pmt_inf
                    .text_at(&["PmtTpInf", "SeqTp"])
                    .unwrap_or_default()
                    .to_string(),
                requested_collection_date: pmt_inf
                    .text_at(&["ReqdColltnDt"])
                    .and_then(parse_iso_date),
                cdtr_name: pmt_inf.text_at(&["Cdtr", "Nm"]).unwrap_or_default().to_string(),
                cdtr_iban: pmt_inf
                    .text_at(&["CdtrAcct", "Id", "IBAN"])
                    .unwrap_or_default()
                    .to_string(),
                cdtr_bic,
                creditor_id: pmt_inf
                    .text_at(&["CdtrSchmeId", "Id", "PrvtId", "Othr", "Id"])
                    .map(String::from),
                transactions,
            });
        }

        Ok(PainMessage {
            group_header,
            payment_informations,
        })
    }

    /// Every `PmtInf` control sum must equal the sum of its
    /// transactions; the header sum must equal the sum of the groups.
    pub fn validate_control_sums(&self) -> Result<(), SepaError> {
        let mut total = 0i64;
        let mut count = 0u32;
        for info in &self.payment_informations {
            let sum: i64 = info.transactions.iter().map(|t| t.amount_cents).sum();
            if sum != info.control_sum_cents {
                return Err(SepaError::ControlSumMismatch {
                    header_cents: info.control_sum_cents,
                    sum_cents: sum,
                });
            }
            if info.transactions.len() as u32 != info.number_of_transactions {
                return Err(SepaError::Malformed(format!(
                    "PmtInf {} declares {} transactions, found {}",
                    info.payment_information_identification,
                    info.number_of_transactions,
                    info.transactions.len()
                )));
            }
            total += sum;
            count += info.transactions.len() as u32;
        }
        if total != self.group_header.control_sum_cents {
            return Err(SepaError::ControlSumMismatch {
                header_cents: self.group_header.control_sum_cents,
                sum_cents: total,
            });
        }
        if count != self.group_header.number_of_transactions {
            return Err(SepaError::Malformed(format!(
                "header declares {} transactions, found {count}",
                self.group_header.number_of_transactions
            )));
        }
        Ok(())
    }
}

impl XmlNode {
    fn children_names(&self) -> String {
        self.children
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn parse_count(s: &str) -> Result<u32, SepaError> {
    s.parse()
        .map_err(|_| SepaError::Malformed(format!("invalid transaction count '{s}'")))
}

fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(endtoend: &str, cents: i64, sequence_type: &str) -> SepaDirectDebitPayment {
        SepaDirectDebitPayment {
            name: "Petra Müller".to_string(),
            iban: "DE02 1203 0000 0000 2020 51".to_string(),
            bic: None,
            amount_cents: cents,
            sequence_type: sequence_type.to_string(),
            collection_date: NaiveDate::from_ymd_opt(2025, 8, 15).unwrap(),
            mandate_id: "wsjrdp202714".to_string(),
            mandate_date: NaiveDate::from_ymd_opt(2025, 7, 15).unwrap(),
            description: "YP 14 Anna Müller / WSJ 2027 Beitrag".to_string(),
            endtoend_id: endtoend.to_string(),
        }
    }

    #[test]
    fn test_writer_round_trip() {
        let mut dd = SepaDirectDebit::new(&SepaDirectDebitConfig::default());
        dd.add_payment(&payment("wsjrdp202714-0-abc", 340000, "OOFF")).unwrap();
        dd.add_payment(&payment("wsjrdp202715-0-def", 50000, "RCUR")).unwrap();
        let xml = dd.export().unwrap();

        let parsed = PainMessage::parse_str(&xml).unwrap();
        assert_eq!(parsed.group_header.number_of_transactions, 2);
        assert_eq!(parsed.group_header.control_sum_cents, 390000);
        assert_eq!(parsed.payment_informations.len(), 2);
        parsed.validate_control_sums().unwrap();

        let ooff = parsed
            .payment_informations
            .iter()
            .find(|p| p.debit_sequence_type == "OOFF")
            .unwrap();
        assert_eq!(ooff.payment_type_instrument, "CORE");
        assert_eq!(ooff.cdtr_iban, "DE34520900000077228802");
        assert_eq!(ooff.creditor_id.as_deref(), Some("DE81WSJ00002017275"));
        assert_eq!(ooff.transactions.len(), 1);
        let tx = &ooff.transactions[0];
        assert_eq!(tx.amount_cents, 340000);
        assert_eq!(tx.mandate_id.as_deref(), Some("wsjrdp202714"));
        // Umlauts transliterated for the wire.
        assert_eq!(tx.dbtr_name.as_deref(), Some("Petra Mueller"));
        assert_eq!(tx.dbtr_iban.as_deref(), Some("DE02120300000000202051"));
    }

    #[test]
    fn test_writer_groups_by_sequence_type_and_date() {
        let mut dd = SepaDirectDebit::new(&SepaDirectDebitConfig::default());
        dd.add_payment(&payment("e1", 100, "RCUR")).unwrap();
        dd.add_payment(&payment("e2", 200, "RCUR")).unwrap();
        let mut other_date = payment("e3", 300, "RCUR");
        other_date.collection_date = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        dd.add_payment(&other_date).unwrap();

        let parsed = PainMessage::parse_str(&dd.export().unwrap()).unwrap();
        assert_eq!(parsed.payment_informations.len(), 2);
        let sums: Vec<i64> = parsed
            .payment_informations
            .iter()
            .map(|p| p.control_sum_cents)
            .collect();
        assert_eq!(sums, vec![300, 300]);
    }

    #[test]
    fn test_writer_rejects_bad_input() {
        let mut dd = SepaDirectDebit::new(&SepaDirectDebitConfig::default());
        let mut bad_iban = payment("e1", 100, "OOFF");
        bad_iban.iban = "DE00123".to_string();
        assert!(dd.add_payment(&bad_iban).is_err());

        let mut zero_amount = payment("e2", 0, "OOFF");
        zero_amount.amount_cents = 0;
        assert!(dd.add_payment(&zero_amount).is_err());

        assert!(dd.export().is_err());
    }

    #[test]
    fn test_reader_detects_control_sum_mismatch() {
        let xml = r#"<Document xmlns="urn:iso:std:iso:20022:tech:xsd:pain.008.001.02">
<CstmrDrctDbtInitn>
  <GrpHdr><MsgId>M</MsgId><NbOfTxs>1</NbOfTxs><CtrlSum>99.00</CtrlSum></GrpHdr>
  <PmtInf>
    <PmtInfId>P</PmtInfId><NbOfTxs>1</NbOfTxs><CtrlSum>1.00</CtrlSum>
    <PmtTpInf><LclInstrm><Cd>CORE</Cd></LclInstrm><SeqTp>OOFF</SeqTp></PmtTpInf>
    <DrctDbtTxInf>
      <PmtId><EndToEndId>E</EndToEndId></PmtId>
      <InstdAmt Ccy="EUR">1.00</InstdAmt>
    </DrctDbtTxInf>
  </PmtInf>
</CstmrDrctDbtInitn>
</Document>"#;
        let parsed = PainMessage::parse_str(xml).unwrap();
        let err = parsed.validate_control_sums().unwrap_err();
        match err {
            SepaError::ControlSumMismatch {
                header_cents,
                sum_cents,
            } => {
                assert_eq!(header_cents, 9900);
                assert_eq!(sum_cents, 100);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
