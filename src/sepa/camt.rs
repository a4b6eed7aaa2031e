//! camt.052 / camt.053 / camt.054 bank statement messages.
//!
//! Entries are flattened into one record per `Ntry` with the references
//! and related parties pulled from the first `TxDtls` block, which is
//! how the bank delivers batch-booked direct debit collections. Amounts
//! are signed cents: credits positive, debits negative.

use chrono::NaiveDate;

use crate::error::SepaError;
use crate::sepa::{currency_exponent, parse_decimal_with_exponent, XmlNode};

/// One `Ntry` with its first transaction details inlined.
#[derive(Debug, Clone)]
pub struct CamtEntry {
    /// IBAN of the statement account.
    pub account_identification: String,
    pub account_servicer_reference: String,
    pub credit_debit_indication: String,
    /// Entry status code, `BOOK` for booked entries.
    pub status: String,
    /// Signed: positive for credits, negative for debits.
    pub amount_cents: i64,
    pub amount_currency: String,
    pub value_date: NaiveDate,
    pub booking_date: NaiveDate,
    pub bank_transaction_code: String,
    pub additional_entry_info: Option<String>,
    pub description: String,
    pub mandate_id: Option<String>,
    pub endtoend_id: Option<String>,
    pub return_reason_code: Option<String>,
    pub dbtr_name: Option<String>,
    pub dbtr_iban: Option<String>,
    pub cdtr_name: Option<String>,
    pub cdtr_iban: Option<String>,
}

impl CamtEntry {
    pub fn is_credit(&self) -> bool {
        self.credit_debit_indication == "CRDT"
    }

    pub fn is_debit(&self) -> bool {
        self.credit_debit_indication == "DBIT"
    }

    pub fn is_booked(&self) -> bool {
        self.status == "BOOK"
    }

    /// Key that identifies this entry across repeated statement uploads.
    /// The bank does not hand out a stable transaction id, but the
    /// account, servicer reference, amount and value date together are
    /// unique in practice.
    pub fn unique_db_key(&self) -> (String, String, i64, NaiveDate) {
        (
            self.account_identification.clone(),
            self.account_servicer_reference.clone(),
            self.amount_cents,
            self.value_date,
        )
    }
}

/// One `Stmt` / `Rpt` / `Ntfctn` block.
#[derive(Debug, Clone)]
pub struct CamtStatement {
    pub identification: String,
    pub electronic_sequence_number: Option<i64>,
    pub creation_date_time: String,
    pub account_identification: String,
    pub entries: Vec<CamtEntry>,
}

impl CamtStatement {
    pub fn booked_entries(&self) -> impl Iterator<Item = &CamtEntry> {
        self.entries.iter().filter(|e| e.is_booked())
    }
}

/// A parsed camt document.
#[derive(Debug, Clone)]
pub struct CamtMessage {
    /// `camt.052`, `camt.053` or `camt.054`.
    pub camt_type: String,
    pub message_identification: String,
    pub creation_date_time: String,
    pub statements: Vec<CamtStatement>,
}

const CAMT_VARIANTS: &[(&str, &str, &str)] = &[
    ("camt.052", "BkToCstmrAcctRpt", "Rpt"),
    ("camt.053", "BkToCstmrStmt", "Stmt"),
    ("camt.054", "BkToCstmrDbtCdtNtfctn", "Ntfctn"),
];

impl CamtMessage {
    pub fn parse_str(xml: &str) -> Result<Self, SepaError> {
        Self::from_root(&XmlNode::parse_str(xml)?)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, SepaError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SepaError::Malformed(format!("cannot read {}: {e}", path.display())))?;
        Self::parse_str(&content)
    }

    fn from_root(root: &XmlNode) -> Result<Self, SepaError> {
        let (camt_type, body, statement_tag) = CAMT_VARIANTS
            .iter()
            .find_map(|(ty, root_tag, stmt_tag)| {
                root.first(root_tag).map(|body| (*ty, body, *stmt_tag))
            })
            .ok_or_else(|| {
                SepaError::UnsupportedSchema(
                    root.children
                        .iter()
                        .map(|c| c.name.clone())
                        .collect::<Vec<_>>()
                        .join(", "),
                )
            })?;

        let hdr = body
            .first("GrpHdr")
            .ok_or_else(|| SepaError::Malformed("missing GrpHdr".to_string()))?;
        let mut statements = Vec::new();
        for stmt in body.all(statement_tag) {
            statements.push(parse_statement(stmt)?);
        }
        Ok(CamtMessage {
            camt_type: camt_type.to_string(),
            message_identification: hdr.required_text_at(&["MsgId"])?.to_string(),
            creation_date_time: hdr.text_at(&["CreDtTm"]).unwrap_or_default().to_string(),
            statements,
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = &CamtEntry> {
        self.statements.iter().flat_map(|s| s.entries.iter())
    }

    pub fn booked_entries(&self) -> impl Iterator<Item = &CamtEntry> {
        self.statements.iter().flat_map(|s| s.booked_entries())
    }
}

fn parse_statement(stmt: &XmlNode) -> Result<CamtStatement, SepaError> {
    let account_identification = stmt
        .required_text_at(&["Acct", "Id", "IBAN"])?
        .to_string();
    let mut entries = Vec::new();
    for entry in stmt.all("Ntry") {
        entries.push(parse_entry(entry, &account_identification)?);
    }
    Ok(CamtStatement {
        identification: stmt.required_text_at(&["Id"])?.to_string(),
        electronic_sequence_number: stmt
            .text_at(&["ElctrncSeqNb"])
            .and_then(|s| s.parse().ok()),
        creation_date_time: stmt.text_at(&["CreDtTm"]).unwrap_or_default().to_string(),
        account_identification,
        entries,
    })
}

fn parse_entry(entry: &XmlNode, account_identification: &str) -> Result<CamtEntry, SepaError> {
    let credit_debit_indication = entry.required_text_at(&["CdtDbtInd"])?.to_string();
    let amount_node = entry
        .first("Amt")
        .ok_or_else(|| SepaError::Malformed("missing Ntry/Amt".to_string()))?;
    let amount_currency = amount_node.attribute("Ccy").unwrap_or("EUR").to_string();
    let magnitude =
        parse_decimal_with_exponent(&amount_node.text, currency_exponent(&amount_currency))?;
    let amount_cents = if credit_debit_indication == "DBIT" {
        -magnitude
    } else {
        magnitude
    };

    // Batch-booked collections carry their references in the first
    // transaction details block.
    let tx_dtls = entry.at(&["NtryDtls", "TxDtls"]);
    let refs = tx_dtls.and_then(|t| t.first("Refs"));
    let reference = |name: &str| {
        refs.and_then(|r| r.text_at(&[name]))
            .filter(|v| *v != "NOTPROVIDED")
            .map(String::from)
    };
    let description = tx_dtls
        .map(|t| {
            t.first("RmtInf")
                .map(|rmt| {
                    rmt.all("Ustrd")
                        .map(|u| u.text.as_str())
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default()
        })
        .unwrap_or_default();

    Ok(CamtEntry {
        account_identification: account_identification.to_string(),
        account_servicer_reference: entry
            .text_at(&["AcctSvcrRef"])
            .unwrap_or_default()
            .to_string(),
        credit_debit_indication,
        status: entry
            .text_at(&["Sts", "Cd"])
            .or_else(|| entry.text_at(&["Sts"]))
            .unwrap_or("INFO")
            .to_string(),
        amount_cents,
        amount_currency,
        value_date: parse_date(entry.required_text_at(&["ValDt", "Dt"])?)?,
        booking_date: parse_date(entry.required_text_at(&["BookgDt", "Dt"])?)?,
        bank_transaction_code: bank_transaction_code(entry),
        additional_entry_info: entry.text_at(&["AddtlNtryInf"]).map(String::from),
        description,
        mandate_id: reference("MndtId"),
        endtoend_id: reference("EndToEndId"),
        return_reason_code: tx_dtls
            .and_then(|t| t.text_at(&["RtrInf", "Rsn", "Cd"]))
            .map(String::from),
        dbtr_name: tx_dtls
            .and_then(|t| t.text_at(&["RltdPties", "Dbtr", "Pty", "Nm"]))
            .or_else(|| tx_dtls.and_then(|t| t.text_at(&["RltdPties", "Dbtr", "Nm"])))
            .map(String::from),
        dbtr_iban: tx_dtls
            .and_then(|t| t.text_at(&["RltdPties", "DbtrAcct", "Id", "IBAN"]))
            .map(String::from),
        cdtr_name: tx_dtls
            .and_then(|t| t.text_at(&["RltdPties", "Cdtr", "Pty", "Nm"]))
            .or_else(|| tx_dtls.and_then(|t| t.text_at(&["RltdPties", "Cdtr", "Nm"])))
            .map(String::from),
        cdtr_iban: tx_dtls
            .and_then(|t| t.text_at(&["RltdPties", "CdtrAcct", "Id", "IBAN"]))
            .map(String::from),
    })
}

/// `MainFamily+Family+SubFamily` joined, empty when only proprietary
/// codes are present.
fn bank_transaction_code(entry: &XmlNode) -> String {
    match entry.at(&["BkTxCd", "Domn"]) {
        Some(domain) => {
            let code = domain.text_at(&["Cd"]).unwrap_or_default();
            let family = domain.text_at(&["Fmly", "Cd"]).unwrap_or_default();
            let sub_family = domain.text_at(&["Fmly", "SubFmlyCd"]).unwrap_or_default();
            format!("{code}+{family}+{sub_family}")
        }
        None => String::new(),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, SepaError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| SepaError::Malformed(format!("invalid date '{s}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:camt.053.001.02">
  <BkToCstmrStmt>
    <GrpHdr><MsgId>STMT-2025-0815</MsgId><CreDtTm>2025-08-15T06:00:00+02:00</CreDtTm></GrpHdr>
    <Stmt>
      <Id>0815-1</Id>
      <ElctrncSeqNb>42</ElctrncSeqNb>
      <CreDtTm>2025-08-15T06:00:00+02:00</CreDtTm>
      <Acct><Id><IBAN>DE34520900000077228802</IBAN></Id></Acct>
      <Ntry>
        <Amt Ccy="EUR">300.00</Amt>
        <CdtDbtInd>CRDT</CdtDbtInd>
        <Sts><Cd>BOOK</Cd></Sts>
        <BookgDt><Dt>2025-08-15</Dt></BookgDt>
        <ValDt><Dt>2025-08-15</Dt></ValDt>
        <AcctSvcrRef>REF-0001</AcctSvcrRef>
        <BkTxCd><Domn><Cd>PMNT</Cd><Fmly><Cd>RDDT</Cd><SubFmlyCd>ESDD</SubFmlyCd></Fmly></Domn></BkTxCd>
        <NtryDtls>
          <TxDtls>
            <Refs>
              <EndToEndId>wsjrdp202714-0-abc</EndToEndId>
              <MndtId>wsjrdp202714</MndtId>
              <InstrId>NOTPROVIDED</InstrId>
            </Refs>
            <RltdPties>
              <Dbtr><Pty><Nm>Petra Mueller</Nm></Pty></Dbtr>
              <DbtrAcct><Id><IBAN>DE02120300000000202051</IBAN></Id></DbtrAcct>
            </RltdPties>
            <RmtInf><Ustrd>YP 14 Anna Mueller /</Ustrd><Ustrd> WSJ 2027 Beitrag</Ustrd></RmtInf>
          </TxDtls>
        </NtryDtls>
      </Ntry>
      <Ntry>
        <Amt Ccy="EUR">500.00</Amt>
        <CdtDbtInd>DBIT</CdtDbtInd>
        <Sts><Cd>BOOK</Cd></Sts>
        <BookgDt><Dt>2025-08-16</Dt></BookgDt>
        <ValDt><Dt>2025-08-16</Dt></ValDt>
        <AcctSvcrRef>REF-0002</AcctSvcrRef>
        <NtryDtls>
          <TxDtls>
            <Refs><EndToEndId>wsjrdp202715-1-def</EndToEndId></Refs>
            <RtrInf><Rsn><Cd>MS03</Cd></Rsn></RtrInf>
          </TxDtls>
        </NtryDtls>
      </Ntry>
      <Ntry>
        <Amt Ccy="EUR">1.00</Amt>
        <CdtDbtInd>CRDT</CdtDbtInd>
        <Sts><Cd>PDNG</Cd></Sts>
        <BookgDt><Dt>2025-08-16</Dt></BookgDt>
        <ValDt><Dt>2025-08-16</Dt></ValDt>
      </Ntry>
    </Stmt>
  </BkToCstmrStmt>
</Document>"#;

    #[test]
    fn test_parse_camt053() {
        let message = CamtMessage::parse_str(SAMPLE).unwrap();
        assert_eq!(message.camt_type, "camt.053");
        assert_eq!(message.message_identification, "STMT-2025-0815");
        assert_eq!(message.statements.len(), 1);
        let statement = &message.statements[0];
        assert_eq!(statement.identification, "0815-1");
        assert_eq!(statement.electronic_sequence_number, Some(42));
        assert_eq!(statement.account_identification, "DE34520900000077228802");
        assert_eq!(statement.entries.len(), 3);
    }

    #[test]
    fn test_entry_fields() {
        let message = CamtMessage::parse_str(SAMPLE).unwrap();
        let credit = &message.statements[0].entries[0];
        assert!(credit.is_credit());
        assert!(credit.is_booked());
        assert_eq!(credit.amount_cents, 30000);
        assert_eq!(credit.endtoend_id.as_deref(), Some("wsjrdp202714-0-abc"));
        assert_eq!(credit.mandate_id.as_deref(), Some("wsjrdp202714"));
        assert_eq!(credit.bank_transaction_code, "PMNT+RDDT+ESDD");
        assert_eq!(credit.dbtr_name.as_deref(), Some("Petra Mueller"));
        // Multiple Ustrd lines are concatenated.
        assert_eq!(credit.description, "YP 14 Anna Mueller / WSJ 2027 Beitrag");

        let debit = &message.statements[0].entries[1];
        assert!(debit.is_debit());
        assert_eq!(debit.amount_cents, -50000);
        assert_eq!(debit.return_reason_code.as_deref(), Some("MS03"));
    }

    #[test]
    fn test_booked_entries_skip_pending() {
        let message = CamtMessage::parse_str(SAMPLE).unwrap();
        assert_eq!(message.entries().count(), 3);
        assert_eq!(message.booked_entries().count(), 2);
    }

    #[test]
    fn test_unique_db_key() {
        let message = CamtMessage::parse_str(SAMPLE).unwrap();
        let entry = &message.statements[0].entries[0];
        assert_eq!(
            entry.unique_db_key(),
            (
                "DE34520900000077228802".to_string(),
                "REF-0001".to_string(),
                30000,
                NaiveDate::from_ymd_opt(2025, 8, 15).unwrap()
            )
        );
    }

    #[test]
    fn test_rejects_unsupported_document() {
        let xml = r#"<Document><CstmrDrctDbtInitn/></Document>"#;
        assert!(matches!(
            CamtMessage::parse_str(xml),
            Err(SepaError::UnsupportedSchema(_))
        ));
    }
}
