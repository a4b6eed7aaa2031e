//! Configuration loading for the back-office tools.
//!
//! Reads one YAML file per environment (`config.yml`, `config-prod.yml`,
//! ...), producing a typed [`AppConfig`]. The path comes from `--config` or
//! the `WSJRDP_SCRIPTS_CONFIG` environment variable.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_PATH_ENV: &str = "WSJRDP_SCRIPTS_CONFIG";

/// Application configuration loaded from the environment YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Explicit production flag; when absent it is inferred from the file
    /// name (`config-prod.yml` counts as production).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_production: Option<bool>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub use_ssh_tunnel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_host: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_private_key: Option<PathBuf>,

    #[serde(default = "default_db_host")]
    pub db_host: String,
    #[serde(default = "default_db_port")]
    pub db_port: u16,
    pub db_username: String,
    #[serde(default)]
    pub db_password: String,
    pub db_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_server: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imap_server: Option<String>,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imap_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imap_password: Option<String>,

    /// Per-address mail accounts; keys are from addresses. An account that
    /// omits SMTP/IMAP settings falls back to the top-level ones.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mail_accounts: BTreeMap<String, MailAccountConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hitobito_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailAccountConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imap_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imap_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imap_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imap_password: Option<String>,
}

/// Fully resolved settings for one outbound mail account.
#[derive(Debug, Clone)]
pub struct ResolvedMailAccount {
    pub from_addr: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub imap_server: Option<String>,
    pub imap_port: u16,
    pub imap_username: Option<String>,
    pub imap_password: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_smtp_port() -> u16 {
    587
}

fn default_imap_port() -> u16 {
    993
}

impl AppConfig {
    /// Load the configuration from `path`, or from `WSJRDP_SCRIPTS_CONFIG`
    /// when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let path: PathBuf = match path {
            Some(p) => p.to_path_buf(),
            None => env::var(CONFIG_PATH_ENV)
                .map(PathBuf::from)
                .map_err(|_| ConfigError::MissingKey {
                    key: format!("--config / {CONFIG_PATH_ENV}"),
                })?,
        };
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: AppConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        if config.is_production.is_none() {
            config.is_production = Some(Self::infer_production(&path));
        }
        config.validate()?;
        Ok(config)
    }

    fn infer_production(path: &Path) -> bool {
        path.file_stem()
            .and_then(|s| s.to_str())
            .map(|stem| stem.ends_with("-prod") || stem.ends_with("_prod"))
            .unwrap_or(false)
    }

    pub fn is_production(&self) -> bool {
        self.is_production.unwrap_or(false)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_username.is_empty() {
            return Err(ConfigError::MissingKey {
                key: "db_username".into(),
            });
        }
        if self.db_name.is_empty() {
            return Err(ConfigError::MissingKey {
                key: "db_name".into(),
            });
        }
        if self.use_ssh_tunnel {
            if self.ssh_host.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::MissingKey {
                    key: "ssh_host".into(),
                });
            }
            if self.ssh_username.as_deref().unwrap_or("").is_empty() {
                return Err(ConfigError::MissingKey {
                    key: "ssh_username".into(),
                });
            }
        }
        for (addr, account) in &self.mail_accounts {
            if addr.is_empty() || !addr.contains('@') {
                return Err(ConfigError::InvalidValue {
                    key: "mail_accounts".into(),
                    reason: format!("'{addr}' is not a mail address"),
                });
            }
            if account.smtp_server.as_deref().unwrap_or("").is_empty()
                && self.smtp_server.as_deref().unwrap_or("").is_empty()
            {
                return Err(ConfigError::InvalidValue {
                    key: format!("mail_accounts.{addr}"),
                    reason: "no smtp_server configured here or at the top level".into(),
                });
            }
        }
        Ok(())
    }

    /// Resolve the SMTP/IMAP settings for `from_addr`, falling back to the
    /// top-level `smtp_*`/`imap_*` keys for anything the per-account entry
    /// leaves out.
    pub fn mail_account(&self, from_addr: &str) -> Result<ResolvedMailAccount, ConfigError> {
        let account = self.mail_accounts.get(from_addr).cloned();
        if account.is_none() && self.smtp_server.is_none() {
            return Err(ConfigError::UnknownMailAccount {
                address: from_addr.to_string(),
            });
        }
        let account = account.unwrap_or_default();
        let smtp_server = account
            .smtp_server
            .or_else(|| self.smtp_server.clone())
            .ok_or_else(|| ConfigError::MissingKey {
                key: "smtp_server".into(),
            })?;
        Ok(ResolvedMailAccount {
            from_addr: from_addr.to_string(),
            smtp_server,
            smtp_port: account.smtp_port.unwrap_or(self.smtp_port),
            smtp_username: account.smtp_username.or_else(|| self.smtp_username.clone()),
            smtp_password: account.smtp_password.or_else(|| self.smtp_password.clone()),
            imap_server: account.imap_server.or_else(|| self.imap_server.clone()),
            imap_port: account.imap_port.unwrap_or(self.imap_port),
            imap_username: account.imap_username.or_else(|| self.imap_username.clone()),
            imap_password: account.imap_password.or_else(|| self.imap_password.clone()),
        })
    }

    /// PostgreSQL connection URL, pointing at the tunnel endpoint when one
    /// is active.
    pub fn database_url(&self, override_host_port: Option<(&str, u16)>) -> String {
        let (host, port) = match override_host_port {
            Some((h, p)) => (h.to_string(), p),
            None => (self.db_host.clone(), self.db_port),
        };
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_username, self.db_password, host, port, self.db_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_yaml() -> &'static str {
        "db_username: hitobito\ndb_name: hitobito_prod\n"
    }

    #[test]
    fn test_load_minimal_config() {
        let mut file = tempfile::NamedTempFile::with_suffix(".yml").unwrap();
        file.write_all(minimal_yaml().as_bytes()).unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.db_username, "hitobito");
        assert_eq!(config.db_port, 5432);
        assert!(!config.is_production());
    }

    #[test]
    fn test_production_inferred_from_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config-prod.yml");
        std::fs::write(&path, minimal_yaml()).unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert!(config.is_production());

        let path = dir.path().join("config.yml");
        std::fs::write(&path, minimal_yaml()).unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert!(!config.is_production());
    }

    #[test]
    fn test_explicit_production_flag_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, format!("{}is_production: true\n", minimal_yaml())).unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert!(config.is_production());
    }

    #[test]
    fn test_missing_db_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "db_username: ''\ndb_name: x\n").unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_ssh_tunnel_requires_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, format!("{}use_ssh_tunnel: true\n", minimal_yaml())).unwrap();
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_mail_account_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(
            &path,
            format!(
                "{}smtp_server: mail.example.org\nsmtp_username: shared\n\
                 mail_accounts:\n  anmeldung@example.org:\n    smtp_username: anmeldung\n",
                minimal_yaml()
            ),
        )
        .unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();

        let account = config.mail_account("anmeldung@example.org").unwrap();
        assert_eq!(account.smtp_server, "mail.example.org");
        assert_eq!(account.smtp_username.as_deref(), Some("anmeldung"));

        let account = config.mail_account("other@example.org").unwrap();
        assert_eq!(account.smtp_username.as_deref(), Some("shared"));
    }

    #[test]
    fn test_database_url() {
        let mut file = tempfile::NamedTempFile::with_suffix(".yml").unwrap();
        file.write_all(minimal_yaml().as_bytes()).unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(
            config.database_url(None),
            "postgres://hitobito:@localhost:5432/hitobito_prod"
        );
        assert_eq!(
            config.database_url(Some(("127.0.0.1", 15432))),
            "postgres://hitobito:@127.0.0.1:15432/hitobito_prod"
        );
    }
}
