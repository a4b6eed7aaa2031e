//! IBAN and BIC validation.
//!
//! Checksum validation is the ISO 13616 mod-97 check. BIC derivation
//! needs a bank directory (German bank code to BIC); the directory is
//! loaded from a CSV file when available, and payments without one fall
//! back to "BIC not present", which the banks accept for SEPA core
//! debits inside the EU.

use std::collections::HashMap;
use std::path::Path;

use crate::error::SepaError;

/// Uppercase and remove spaces.
pub fn normalize_iban(iban: &str) -> String {
    iban.trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

fn expected_iban_length(country: &str) -> Option<usize> {
    Some(match country {
        "AT" => 20,
        "BE" => 16,
        "CH" => 21,
        "DE" => 22,
        "DK" => 18,
        "ES" => 24,
        "FR" => 27,
        "GB" => 22,
        "IT" => 27,
        "LI" => 21,
        "LU" => 20,
        "NL" => 18,
        "NO" => 15,
        "PL" => 28,
        "SE" => 24,
        _ => return None,
    })
}

/// Validate an IBAN: shape, country length if known, mod-97 checksum.
/// Returns the normalized IBAN.
pub fn validate_iban(iban: &str) -> Result<String, SepaError> {
    let normalized = normalize_iban(iban);
    let invalid = |reason: &str| SepaError::InvalidIban {
        iban: normalized.clone(),
        reason: reason.to_string(),
    };

    if normalized.len() < 15 || normalized.len() > 34 {
        return Err(invalid("length out of range"));
    }
    if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid("contains invalid characters"));
    }
    let country = &normalized[..2];
    if !country.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(invalid("missing country code"));
    }
    if let Some(expected) = expected_iban_length(country) {
        if normalized.len() != expected {
            return Err(invalid("wrong length for country"));
        }
    }
    if iban_mod97(&normalized) != 1 {
        return Err(invalid("checksum mismatch"));
    }
    Ok(normalized)
}

/// ISO 13616 check: move the first four characters to the end, map
/// letters to numbers (A=10..Z=35) and reduce mod 97.
fn iban_mod97(iban: &str) -> u32 {
    let rearranged = format!("{}{}", &iban[4..], &iban[..4]);
    let mut remainder: u32 = 0;
    for c in rearranged.chars() {
        let value = c.to_digit(36).unwrap_or(0);
        if value >= 10 {
            remainder = (remainder * 100 + value) % 97;
        } else {
            remainder = (remainder * 10 + value) % 97;
        }
    }
    remainder
}

/// Validate a BIC (ISO 9362): 8 or 11 characters, bank code letters,
/// country letters, alphanumeric location and branch.
pub fn validate_bic(bic: &str) -> Result<String, SepaError> {
    let normalized = bic.trim().to_uppercase().replace(' ', "");
    let invalid = |reason: &str| SepaError::InvalidBic {
        bic: normalized.clone(),
        reason: reason.to_string(),
    };
    if normalized.len() != 8 && normalized.len() != 11 {
        return Err(invalid("must be 8 or 11 characters"));
    }
    let bytes = normalized.as_bytes();
    if !bytes[..6].iter().all(|b| b.is_ascii_uppercase()) {
        return Err(invalid("bank and country code must be letters"));
    }
    if !bytes[6..].iter().all(|b| b.is_ascii_alphanumeric()) {
        return Err(invalid("location and branch must be alphanumeric"));
    }
    Ok(normalized)
}

/// Two BICs are compatible if equal or differing only by the `XXX`
/// default branch suffix.
pub fn is_bic_compatible(bic_a: Option<&str>, bic_b: Option<&str>) -> bool {
    match (bic_a, bic_b) {
        (None, _) | (_, None) => true,
        (Some(a), Some(b)) => {
            a == b || format!("{a}XXX") == b || a == format!("{b}XXX")
        }
    }
}

/// German bank code (Bankleitzahl) embedded in a DE IBAN.
pub fn german_bank_code(iban: &str) -> Option<&str> {
    let iban = iban.trim();
    if iban.len() == 22 && iban.starts_with("DE") {
        Some(&iban[4..12])
    } else {
        None
    }
}

/// Bank code to BIC directory, loaded from a two-column CSV
/// (`bank_code;bic`, separator `;` or `,`).
#[derive(Debug, Default, Clone)]
pub struct BicDirectory {
    map: HashMap<String, String>,
}

impl BicDirectory {
    pub fn from_csv_path(path: &Path) -> Result<Self, SepaError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .has_headers(false)
            .from_path(path)
            .map_err(|e| SepaError::Malformed(format!("cannot read bank directory: {e}")))?;
        let mut map = HashMap::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| SepaError::Malformed(format!("bank directory: {e}")))?;
            let (code, bic) = match (record.get(0), record.get(1)) {
                (Some(code), Some(bic)) => (code.trim(), bic.trim()),
                _ => continue,
            };
            if code.chars().all(|c| c.is_ascii_digit()) && !bic.is_empty() {
                map.insert(code.to_string(), bic.to_uppercase());
            }
        }
        Ok(BicDirectory { map })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// BIC for a German IBAN, if the bank code is known.
    pub fn bic_for_iban(&self, iban: &str) -> Option<&str> {
        german_bank_code(iban).and_then(|code| self.map.get(code)).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_iban_accepts_valid() {
        assert_eq!(
            validate_iban("DE34 5209 0000 0077 2288 02").unwrap(),
            "DE34520900000077228802"
        );
        assert_eq!(
            validate_iban("de02120300000000202051").unwrap(),
            "DE02120300000000202051"
        );
        // Standard test IBANs from other countries.
        assert!(validate_iban("AT611904300234573201").is_ok());
        assert!(validate_iban("NL91ABNA0417164300").is_ok());
    }

    #[test]
    fn test_validate_iban_rejects_invalid() {
        // Flipped digits break the checksum.
        assert!(validate_iban("DE43520900000077228802").is_err());
        assert!(validate_iban("DE3452090000007722880").is_err());
        assert!(validate_iban("XX").is_err());
        assert!(validate_iban("DE34-5209-0000-0077-2288-02").is_err());
    }

    #[test]
    fn test_validate_bic() {
        assert_eq!(validate_bic("GENODE51KS1").unwrap(), "GENODE51KS1");
        assert_eq!(validate_bic("genodef1xxx").unwrap(), "GENODEF1XXX");
        assert_eq!(validate_bic("MARKDEF1").unwrap(), "MARKDEF1");
        assert!(validate_bic("TOOSHORT1").is_err());
        assert!(validate_bic("12345678").is_err());
    }

    #[test]
    fn test_is_bic_compatible() {
        assert!(is_bic_compatible(Some("GENODEF1"), Some("GENODEF1XXX")));
        assert!(is_bic_compatible(Some("GENODEF1XXX"), Some("GENODEF1")));
        assert!(is_bic_compatible(Some("GENODE51KS1"), Some("GENODE51KS1")));
        assert!(is_bic_compatible(None, Some("GENODE51KS1")));
        assert!(!is_bic_compatible(Some("GENODE51KS1"), Some("GENODEF1XXX")));
    }

    #[test]
    fn test_german_bank_code() {
        assert_eq!(
            german_bank_code("DE34520900000077228802"),
            Some("52090000")
        );
        assert_eq!(german_bank_code("NL91ABNA0417164300"), None);
    }

    #[test]
    fn test_bic_directory() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "52090000;GENODE51KS1").unwrap();
        writeln!(file, "12030000;BYLADEM1001").unwrap();
        file.flush().unwrap();

        let directory = BicDirectory::from_csv_path(file.path()).unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(
            directory.bic_for_iban("DE34520900000077228802"),
            Some("GENODE51KS1")
        );
        assert_eq!(
            directory.bic_for_iban("DE02120300000000202051"),
            Some("BYLADEM1001")
        );
        assert_eq!(directory.bic_for_iban("AT611904300234573201"), None);
    }
}
