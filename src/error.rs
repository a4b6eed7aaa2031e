//! # Error Handling
//!
//! Unified error types for the back-office tooling. Every fatal error maps
//! to one of the documented process exit codes: 2 for configuration and
//! argument problems, 0 for a declined production approval, 1 for
//! everything else.

use thiserror::Error;

/// Errors raised while loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Missing required config key '{key}'")]
    MissingKey { key: String },
    #[error("Invalid value for config key '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("No mail account configured for address '{address}'")]
    UnknownMailAccount { address: String },
}

/// Errors raised while building or lowering a people query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown event role '{0}' (expected CMT, UL, YP or IST)")]
    UnknownRole(String),
    #[error("Unknown payment role '{0}'")]
    UnknownPaymentRole(String),
    #[error("Malformed where clause: {0}")]
    Malformed(String),
    #[error("Unsupported comparison operator '{0}'")]
    UnsupportedOperator(String),
}

/// Errors raised while building or parsing SEPA XML documents.
#[derive(Debug, Error)]
pub enum SepaError {
    #[error("Invalid IBAN '{iban}': {reason}")]
    InvalidIban { iban: String, reason: String },
    #[error("Invalid BIC '{bic}': {reason}")]
    InvalidBic { bic: String, reason: String },
    #[error("BIC {bic} not consistent with {derived} derived from the IBAN")]
    InconsistentBic { bic: String, derived: String },
    #[error("Control sum mismatch: header says {header_cents} cents, transactions sum to {sum_cents} cents")]
    ControlSumMismatch { header_cents: i64, sum_cents: i64 },
    #[error("Unsupported SEPA schema '{0}'")]
    UnsupportedSchema(String),
    #[error("Malformed ISO 20022 document: {0}")]
    Malformed(String),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error(
        "Bank statement transaction {reference} conflicts with the stored row: {details}"
    )]
    ReconciliationMismatch { reference: String, details: String },
}

/// Errors raised by the mail client.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("Not connected to SMTP server")]
    NotConnected,
    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("Cannot build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("Invalid mail address '{address}': {reason}")]
    Address { address: String, reason: String },
    #[error("IMAP error: {0}")]
    Imap(String),
}

/// Umbrella error for the CLI tools.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Sepa(#[from] SepaError),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error("Database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Operator declined to run in production")]
    ApprovalDeclined,
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ApprovalDeclined => 0,
            Error::Config(_) => 2,
            _ => 1,
        }
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_mapping() {
        let config_err = Error::Config(ConfigError::MissingKey {
            key: "db_host".into(),
        });
        assert_eq!(config_err.exit_code(), 2);

        assert_eq!(Error::ApprovalDeclined.exit_code(), 0);

        let query_err = Error::Query(QueryError::UnknownRole("XX".into()));
        assert_eq!(query_err.exit_code(), 1);

        let sepa_err = Error::Sepa(SepaError::ControlSumMismatch {
            header_cents: 100,
            sum_cents: 200,
        });
        assert_eq!(sepa_err.exit_code(), 1);
    }

    #[test]
    fn test_display_messages() {
        let err = ConfigError::MissingKey {
            key: "smtp_server".into(),
        };
        assert_eq!(err.to_string(), "Missing required config key 'smtp_server'");

        let err = QueryError::UnknownRole("ZZZ".into());
        assert!(err.to_string().contains("ZZZ"));

        let err = SepaError::InconsistentBic {
            bic: "GENODE51KS1".into(),
            derived: "GENODEF1XXX".into(),
        };
        assert!(err.to_string().contains("GENODE51KS1"));
        assert!(err.to_string().contains("GENODEF1XXX"));
    }
}
