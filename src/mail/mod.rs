//! Outbound mail.
//!
//! One [`MailClient`] per sender address: an SMTP transport for sending
//! and, when the account has IMAP credentials, an IMAP session used to
//! file a copy of every sent message into the account's Sent mailbox.
//! Dry runs never open a connection.

use std::net::TcpStream;

use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};

use crate::config::ResolvedMailAccount;
use crate::error::MailError;

type ImapSession = imap::Session<native_tls::TlsStream<TcpStream>>;

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    DryRun,
    /// Operator declined the once-per-session confirmation.
    Declined,
}

/// Asked once before the first real send.
pub type ConfirmSendCallback = Box<dyn FnMut(&ResolvedMailAccount) -> bool>;

pub struct MailClient {
    account: ResolvedMailAccount,
    dry_run: bool,
    smtp: Option<SmtpTransport>,
    imap: Option<ImapSession>,
    /// `None` until looked up; `Some(None)` when the server has no
    /// mailbox flagged `\Sent`.
    sent_mailbox: Option<Option<String>>,
    confirm_send: Option<ConfirmSendCallback>,
    confirmed: bool,
    declined: bool,
}

impl MailClient {
    pub fn new(account: ResolvedMailAccount, dry_run: bool) -> Self {
        MailClient {
            account,
            dry_run,
            smtp: None,
            imap: None,
            sent_mailbox: None,
            confirm_send: None,
            confirmed: false,
            declined: false,
        }
    }

    pub fn with_confirm_send(mut self, callback: ConfirmSendCallback) -> Self {
        self.confirm_send = Some(callback);
        self
    }

    pub fn account(&self) -> &ResolvedMailAccount {
        &self.account
    }

    /// Open the SMTP transport and, if configured, the IMAP session.
    /// A no-op for dry runs.
    pub fn connect(&mut self) -> Result<(), MailError> {
        if self.dry_run {
            tracing::info!("[MAIL] dry run: no connection to SMTP/IMAP servers");
            return Ok(());
        }
        tracing::info!(
            server = %self.account.smtp_server,
            port = self.account.smtp_port,
            "[MAIL] Connect to SMTP server"
        );
        let tls = TlsParameters::new(self.account.smtp_server.clone())?;
        let mut builder = SmtpTransport::builder_dangerous(self.account.smtp_server.as_str())
            .port(self.account.smtp_port)
            .tls(Tls::Opportunistic(tls));
        match (&self.account.smtp_username, &self.account.smtp_password) {
            (Some(username), Some(password)) if !username.is_empty() => {
                tracing::info!(username = %username, "[MAIL] SMTP login");
                builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
            }
            _ => tracing::info!("[MAIL] Skip SMTP login (credentials empty)"),
        }
        self.smtp = Some(builder.build());

        if let Some(imap_server) = self.account.imap_server.clone() {
            tracing::info!(server = %imap_server, port = self.account.imap_port, "[MAIL] IMAP connect");
            let tls = native_tls::TlsConnector::builder()
                .build()
                .map_err(|e| MailError::Imap(e.to_string()))?;
            let client = imap::connect(
                (imap_server.as_str(), self.account.imap_port),
                imap_server.as_str(),
                &tls,
            )
            .map_err(|e| MailError::Imap(e.to_string()))?;
            let username = self.account.imap_username.clone().unwrap_or_default();
            let password = self.account.imap_password.clone().unwrap_or_default();
            let session = client
                .login(&username, &password)
                .map_err(|(e, _)| MailError::Imap(e.to_string()))?;
            self.imap = Some(session);
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.smtp = None;
        if let Some(mut session) = self.imap.take() {
            if let Err(e) = session.logout() {
                tracing::debug!(error = %e, "[MAIL] IMAP logout failed");
            }
        }
        self.sent_mailbox = None;
    }

    /// Send over SMTP and file a copy into the Sent mailbox. Returns
    /// without sending on dry runs and after a declined confirmation.
    pub fn send_message(&mut self, message: &Message) -> Result<SendOutcome, MailError> {
        if self.dry_run {
            tracing::info!("[MAIL] dry run: skip email sending");
            return Ok(SendOutcome::DryRun);
        }
        if self.declined {
            return Ok(SendOutcome::Declined);
        }
        if !self.confirmed {
            if let Some(confirm) = self.confirm_send.as_mut() {
                if !confirm(&self.account) {
                    tracing::info!("[MAIL] Skip email sending - not confirmed");
                    self.declined = true;
                    return Ok(SendOutcome::Declined);
                }
            }
            self.confirmed = true;
        }

        let smtp = self.smtp.as_ref().ok_or(MailError::NotConnected)?;
        smtp.send(message)?;

        if self.imap.is_some() {
            let eml = message.formatted();
            match self.imap_sent_mailbox()? {
                Some(mailbox) => {
                    tracing::debug!(mailbox = %mailbox, "[MAIL] Append message to IMAP mailbox");
                    if let Some(session) = self.imap.as_mut() {
                        session
                            .append_with_flags(&mailbox, &eml, &[imap::types::Flag::Seen])
                            .map_err(|e| MailError::Imap(e.to_string()))?;
                    }
                }
                None => tracing::debug!("[MAIL] No Sent mailbox, message is not stored"),
            }
        } else {
            tracing::debug!("[MAIL] No IMAP session, message is not stored");
        }
        Ok(SendOutcome::Sent)
    }

    fn imap_sent_mailbox(&mut self) -> Result<Option<String>, MailError> {
        if let Some(cached) = &self.sent_mailbox {
            return Ok(cached.clone());
        }
        let mailbox = self.find_first_imap_mailbox_with_flag("\\Sent")?;
        if mailbox.is_none() {
            tracing::warn!("[MAIL] Could not find Sent mailbox");
        }
        self.sent_mailbox = Some(mailbox.clone());
        Ok(mailbox)
    }

    /// First mailbox in `LIST` order whose attributes contain `flag`.
    pub fn find_first_imap_mailbox_with_flag(
        &mut self,
        flag: &str,
    ) -> Result<Option<String>, MailError> {
        let session = self.imap.as_mut().ok_or(MailError::NotConnected)?;
        let names = session
            .list(None, Some("*"))
            .map_err(|e| MailError::Imap(e.to_string()))?;
        for name in names.iter() {
            let has_flag = name.attributes().iter().any(|attr| match attr {
                imap::types::NameAttribute::Custom(custom) => custom.as_ref() == flag,
                _ => false,
            });
            if has_flag {
                return Ok(Some(name.name().to_string()));
            }
        }
        Ok(None)
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e| MailError::Address {
        address: address.to_string(),
        reason: format!("{e}"),
    })
}

/// Build a message with optional HTML alternative. `lettre` stamps the
/// `Date:` header at build time, so every message leaves with one.
#[allow(clippy::too_many_arguments)]
pub fn build_message(
    from: &str,
    reply_to: &[String],
    to: &[String],
    cc: &[String],
    bcc: &[String],
    subject: &str,
    text_body: &str,
    html_body: Option<&str>,
) -> Result<Message, MailError> {
    let mut builder = Message::builder().from(parse_mailbox(from)?).subject(subject);
    for addr in reply_to {
        builder = builder.reply_to(parse_mailbox(addr)?);
    }
    for addr in to {
        builder = builder.to(parse_mailbox(addr)?);
    }
    for addr in cc {
        builder = builder.cc(parse_mailbox(addr)?);
    }
    for addr in bcc {
        builder = builder.bcc(parse_mailbox(addr)?);
    }

    let message = match html_body {
        Some(html) => builder.multipart(MultiPart::alternative_plain_html(
            text_body.to_string(),
            html.to_string(),
        ))?,
        None => builder.singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(text_body.to_string()),
        )?,
    };
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> ResolvedMailAccount {
        ResolvedMailAccount {
            from_addr: "anmeldung@worldscoutjamboree.de".to_string(),
            smtp_server: "smtp.example.org".to_string(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            imap_server: None,
            imap_port: 993,
            imap_username: None,
            imap_password: None,
        }
    }

    #[test]
    fn test_build_message_plain() {
        let message = build_message(
            "anmeldung@worldscoutjamboree.de",
            &[],
            &["anna@example.org".to_string()],
            &["petra@example.org".to_string()],
            &[],
            "Zahlungserinnerung",
            "Hallo Anna,\n\ndies ist eine Erinnerung.",
            None,
        )
        .unwrap();
        let eml = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(eml.contains("Subject: Zahlungserinnerung"));
        assert!(eml.contains("To: anna@example.org"));
        assert!(eml.contains("Cc: petra@example.org"));
        assert!(eml.contains("Date: "));
    }

    #[test]
    fn test_build_message_html_alternative() {
        let message = build_message(
            "anmeldung@worldscoutjamboree.de",
            &["antwort@example.org".to_string()],
            &["anna@example.org".to_string()],
            &[],
            &[],
            "Info",
            "Hallo",
            Some("<p>Hallo</p>"),
        )
        .unwrap();
        let eml = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(eml.contains("multipart/alternative"));
        assert!(eml.contains("Reply-To: antwort@example.org"));
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let result = build_message(
            "not an address",
            &[],
            &["anna@example.org".to_string()],
            &[],
            &[],
            "x",
            "y",
            None,
        );
        assert!(matches!(result, Err(MailError::Address { .. })));
    }

    #[test]
    fn test_dry_run_needs_no_connection() {
        let mut client = MailClient::new(account(), true);
        client.connect().unwrap();
        let message = build_message(
            "anmeldung@worldscoutjamboree.de",
            &[],
            &["anna@example.org".to_string()],
            &[],
            &[],
            "x",
            "y",
            None,
        )
        .unwrap();
        assert_eq!(client.send_message(&message).unwrap(), SendOutcome::DryRun);
    }

    #[test]
    fn test_send_without_connect_fails() {
        let mut client = MailClient::new(account(), false);
        let message = build_message(
            "anmeldung@worldscoutjamboree.de",
            &[],
            &["anna@example.org".to_string()],
            &[],
            &[],
            "x",
            "y",
            None,
        )
        .unwrap();
        assert!(matches!(
            client.send_message(&message),
            Err(MailError::NotConnected)
        ));
    }

    #[test]
    fn test_declined_confirmation_skips_all_sends() {
        let mut client =
            MailClient::new(account(), false).with_confirm_send(Box::new(|_| false));
        // Fake a connected transport; the callback runs before any send.
        client.smtp = Some(SmtpTransport::builder_dangerous("localhost").build());
        let message = build_message(
            "anmeldung@worldscoutjamboree.de",
            &[],
            &["anna@example.org".to_string()],
            &[],
            &[],
            "x",
            "y",
            None,
        )
        .unwrap();
        assert_eq!(client.send_message(&message).unwrap(), SendOutcome::Declined);
        assert_eq!(client.send_message(&message).unwrap(), SendOutcome::Declined);
    }
}
