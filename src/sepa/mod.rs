//! SEPA ISO 20022 support.
//!
//! `pain008` writes and reads direct debit initiation documents, `camt`
//! reads bank statement messages, `iban` validates account identifiers
//! and `datev` exports booking rows. The readers work on a small
//! namespace-agnostic XML tree because the bank messages arrive with
//! varying namespace versions but stable local element names.

pub mod camt;
pub mod datev;
pub mod iban;
pub mod pain008;

use std::io::BufRead;

use crate::error::SepaError;
use crate::util::german_transliterate;

/// Creditor-side constants for generated pain.008 documents.
#[derive(Debug, Clone)]
pub struct SepaDirectDebitConfig {
    pub name: String,
    pub iban: String,
    pub bic: String,
    pub creditor_id: String,
    pub currency: String,
}

impl Default for SepaDirectDebitConfig {
    fn default() -> Self {
        SepaDirectDebitConfig {
            name: "Ring deutscher Pfadfinder*innenverbände e.V.".to_string(),
            iban: "DE34520900000077228802".to_string(),
            bic: "GENODE51KS1".to_string(),
            creditor_id: "DE81WSJ00002017275".to_string(),
            currency: "EUR".to_string(),
        }
    }
}

impl SepaDirectDebitConfig {
    /// Copy with the name transliterated to the pain.008 Latin subset.
    pub fn sanitized(&self) -> Self {
        SepaDirectDebitConfig {
            name: german_transliterate(&self.name),
            ..self.clone()
        }
    }
}

/// Minimal XML element tree, local names only.
#[derive(Debug, Clone, Default)]
pub struct XmlNode {
    pub name: String,
    pub text: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    /// Parse a document and return the root element. Namespace prefixes
    /// are stripped from element and attribute names.
    pub fn parse(reader: impl BufRead) -> Result<XmlNode, SepaError> {
        use quick_xml::events::Event;
        use quick_xml::Reader;

        let mut xml = Reader::from_reader(reader);
        xml.config_mut().trim_text(true);

        let mut stack: Vec<XmlNode> = Vec::new();
        let mut buf = Vec::new();
        loop {
            match xml.read_event_into(&mut buf) {
                Ok(Event::Start(start)) => {
                    let mut node = XmlNode {
                        name: local_name(&String::from_utf8_lossy(start.name().as_ref())),
                        ..Default::default()
                    };
                    for attr in start.attributes().flatten() {
                        let key = local_name(&String::from_utf8_lossy(attr.key.as_ref()));
                        let value = String::from_utf8_lossy(&attr.value).to_string();
                        node.attributes.push((key, value));
                    }
                    stack.push(node);
                }
                Ok(Event::Empty(start)) => {
                    let mut node = XmlNode {
                        name: local_name(&String::from_utf8_lossy(start.name().as_ref())),
                        ..Default::default()
                    };
                    for attr in start.attributes().flatten() {
                        let key = local_name(&String::from_utf8_lossy(attr.key.as_ref()));
                        let value = String::from_utf8_lossy(&attr.value).to_string();
                        node.attributes.push((key, value));
                    }
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => return Ok(node),
                    }
                }
                Ok(Event::Text(text)) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(
                            &text
                                .unescape()
                                .map_err(|e| SepaError::Malformed(e.to_string()))?,
                        );
                    }
                }
                Ok(Event::End(_)) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| SepaError::Malformed("unbalanced end tag".to_string()))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => return Ok(node),
                    }
                }
                Ok(Event::Eof) => {
                    return Err(SepaError::Malformed("unexpected end of document".to_string()))
                }
                Ok(_) => {}
                Err(e) => return Err(SepaError::Xml(e)),
            }
            buf.clear();
        }
    }

    pub fn parse_str(s: &str) -> Result<XmlNode, SepaError> {
        XmlNode::parse(s.as_bytes())
    }

    pub fn first(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Descend along a path of child names.
    pub fn at(&self, path: &[&str]) -> Option<&XmlNode> {
        let mut node = self;
        for name in path {
            node = node.first(name)?;
        }
        Some(node)
    }

    pub fn text_at(&self, path: &[&str]) -> Option<&str> {
        self.at(path).map(|n| n.text.as_str()).filter(|t| !t.is_empty())
    }

    pub fn required_text_at(&self, path: &[&str]) -> Result<&str, SepaError> {
        self.text_at(path)
            .ok_or_else(|| SepaError::Malformed(format!("missing element {}", path.join("/"))))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn local_name(qualified: &str) -> String {
    match qualified.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => qualified.to_string(),
    }
}

/// Parse a decimal amount like `"3400.00"` into cents.
pub fn decimal_to_cents(s: &str) -> Result<i64, SepaError> {
    parse_decimal_with_exponent(s, 2)
}

/// Parse a decimal amount using a currency exponent (ISO 4217).
pub fn parse_decimal_with_exponent(s: &str, exponent: u32) -> Result<i64, SepaError> {
    let s = s.trim();
    let bad = || SepaError::Malformed(format!("invalid amount '{s}'"));
    let (sign, s) = match s.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, s),
    };
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(bad());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    if frac.len() > exponent as usize {
        return Err(bad());
    }
    let scale = 10i64.pow(exponent);
    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| bad())?
    };
    let mut frac_value: i64 = if frac.is_empty() {
        0
    } else {
        frac.parse().map_err(|_| bad())?
    };
    frac_value *= 10i64.pow(exponent - frac.len() as u32);
    Ok(sign * (whole * scale + frac_value))
}

/// Format cents as a pain.008 decimal string.
pub fn cents_to_decimal(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

/// ISO 4217 minor unit exponent; two unless known otherwise.
pub fn currency_exponent(currency: &str) -> u32 {
    match currency {
        "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
        "JPY" | "KRW" | "HUF" | "ISK" | "CLP" | "VND" => 0,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_node_parse_strips_namespaces() {
        let xml = r#"<?xml version="1.0"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:pain.008.001.02">
  <CstmrDrctDbtInitn>
    <GrpHdr><MsgId>M1</MsgId><CtrlSum>3400.00</CtrlSum></GrpHdr>
    <PmtInf><PmtInfId>P1</PmtInfId></PmtInf>
    <PmtInf><PmtInfId>P2</PmtInfId></PmtInf>
  </CstmrDrctDbtInitn>
</Document>"#;
        let root = XmlNode::parse_str(xml).unwrap();
        assert_eq!(root.name, "Document");
        assert_eq!(
            root.text_at(&["CstmrDrctDbtInitn", "GrpHdr", "MsgId"]),
            Some("M1")
        );
        let init = root.first("CstmrDrctDbtInitn").unwrap();
        assert_eq!(init.all("PmtInf").count(), 2);
    }

    #[test]
    fn test_xml_node_attributes() {
        let root =
            XmlNode::parse_str(r#"<Amt Ccy="EUR">3400.00</Amt>"#).unwrap();
        assert_eq!(root.attribute("Ccy"), Some("EUR"));
        assert_eq!(root.text, "3400.00");
    }

    #[test]
    fn test_decimal_to_cents() {
        assert_eq!(decimal_to_cents("3400.00").unwrap(), 340000);
        assert_eq!(decimal_to_cents("0.5").unwrap(), 50);
        assert_eq!(decimal_to_cents("12").unwrap(), 1200);
        assert_eq!(decimal_to_cents("-3.21").unwrap(), -321);
        assert!(decimal_to_cents("1.234").is_err());
        assert!(decimal_to_cents("abc").is_err());
    }

    #[test]
    fn test_parse_decimal_with_exponent() {
        assert_eq!(parse_decimal_with_exponent("100", 0).unwrap(), 100);
        assert_eq!(parse_decimal_with_exponent("1.234", 3).unwrap(), 1234);
    }

    #[test]
    fn test_cents_to_decimal() {
        assert_eq!(cents_to_decimal(340000), "3400.00");
        assert_eq!(cents_to_decimal(50), "0.50");
        assert_eq!(cents_to_decimal(-321), "-3.21");
    }
}
