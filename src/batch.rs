//! # Batch Runner
//!
//! A batch is one YAML file describing a cohort query, an optional
//! mailing and an optional set of person updates. Preparing a batch is
//! pure: it renders every message and derives every [`PersonUpdate`]
//! up front, so the operator can inspect the artifacts of a dry run
//! before anything is sent or written. Database updates run in a single
//! transaction; mail goes out after the commit, in row order.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use lettre::Message;
use minijinja::{context as template_context, Environment, Value as TemplateValue};
use regex::Regex;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::mail::{self, MailClient};
use crate::people::{write_rows_xlsx, PersonRow};
use crate::query::PeopleQuery;
use crate::repositories::{PersonRepository, PersonUpdate, PrimaryGroupMove};
use crate::util::{dedup, format_eur_de, format_eur_de_compact, SqlValue};

pub const DEFAULT_FROM_ADDR: &str = "anmeldung@worldscoutjamboree.de";

const DEFAULT_SUMMARY: &str = "{{ row.id }} {{ row.short_full_name }}; status: {{ row.status }}\
{% if msg %}; To: {{ msg.to }}; Cc: {{ msg.cc }}{% endif %}";

/// People columns a batch may rewrite through `new_<column>` keys.
const UPDATABLE_COLUMNS: &[&str] = &[
    "status",
    "sepa_status",
    "payment_role",
    "unit_code",
    "primary_group_id",
    "early_payer",
    "print_at",
];

fn is_false(value: &bool) -> bool {
    !*value
}

/// One batch definition as read from its YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Base name for every artifact; defaults to the YAML file stem.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub query: PeopleQuery,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub email_subject: String,
    /// Sender header; defaults to `from_addr`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_from: Option<String>,
    /// Mail account the batch sends through.
    pub from_addr: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub email_reply_to: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_email_to: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_email_cc: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_email_bcc: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Plain text template read from a file next to the YAML.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_content_file: Option<String>,
    /// Per-row log line template.
    pub summary: String,
    /// Free-form driver parameters, carried into the config snapshot.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub action_arguments: BTreeMap<String, JsonValue>,
    /// Person updates: `new_<column>`, `add_tags`, `remove_tags`,
    /// `add_note`, `new_primary_group_id`, `new_primary_group_role_types`.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub updates: BTreeMap<String, JsonValue>,
    #[serde(skip_serializing_if = "is_false")]
    pub dry_run: bool,
    /// Defaults to true when the batch has no mail body at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_email: Option<bool>,
    #[serde(skip_serializing_if = "is_false")]
    pub skip_db_updates: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            name: "batch".to_string(),
            query: PeopleQuery::default(),
            email_subject: String::new(),
            email_from: None,
            from_addr: DEFAULT_FROM_ADDR.to_string(),
            email_reply_to: Vec::new(),
            extra_email_to: Vec::new(),
            extra_email_cc: Vec::new(),
            extra_email_bcc: Vec::new(),
            signature: String::new(),
            content: None,
            content_file: None,
            html_content: None,
            html_content_file: None,
            summary: DEFAULT_SUMMARY.to_string(),
            action_arguments: BTreeMap::new(),
            updates: BTreeMap::new(),
            dry_run: false,
            skip_email: None,
            skip_db_updates: false,
        }
    }
}

impl BatchConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: BatchConfig = serde_yaml::from_str(yaml)?;
        config.check_exclusive_bodies()?;
        Ok(config)
    }

    /// Load a batch file. `content_file`/`html_content_file` are read
    /// relative to the YAML's directory; the batch name defaults to the
    /// file stem.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)?;
        let mut config: BatchConfig = serde_yaml::from_str(&yaml)?;
        if config.name == BatchConfig::default().name {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                config.name = stem.to_string();
            }
        }
        config.check_exclusive_bodies()?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        config.slurp_body_files(dir)?;
        Ok(config)
    }

    fn check_exclusive_bodies(&self) -> Result<()> {
        if self.content.is_some() && self.content_file.is_some() {
            return Err(Error::other(
                "Batch config sets both content and content_file",
            ));
        }
        if self.html_content.is_some() && self.html_content_file.is_some() {
            return Err(Error::other(
                "Batch config sets both html_content and html_content_file",
            ));
        }
        Ok(())
    }

    fn slurp_body_files(&mut self, dir: &Path) -> Result<()> {
        // An html_content value that looks like a file name is one.
        if let Some(html) = &self.html_content {
            if html.ends_with(".html") && !html.contains('<') {
                self.html_content_file = self.html_content.take();
            }
        }
        if let Some(file) = self.content_file.take() {
            self.content = Some(fs::read_to_string(dir.join(file))?);
        }
        if let Some(file) = self.html_content_file.take() {
            self.html_content = Some(fs::read_to_string(dir.join(file))?);
        }
        Ok(())
    }

    pub fn email_from(&self) -> &str {
        self.email_from.as_deref().unwrap_or(&self.from_addr)
    }

    pub fn effective_skip_email(&self) -> bool {
        self.skip_email
            .unwrap_or(self.content.is_none() && self.html_content.is_none())
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Render all messages and derive all person updates for `rows`.
    pub fn prepare(&self, rows: Vec<PersonRow>, now: NaiveDateTime) -> Result<PreparedBatch> {
        let env = template_env();
        let mut messages = Vec::with_capacity(rows.len());
        let mut updates = Vec::new();
        for row in &rows {
            messages.push(self.prepare_row(env, row)?);
            if let Some(update) = derive_person_update(&self.updates, row, env)? {
                updates.push(update);
            }
        }
        Ok(PreparedBatch {
            name: self.name.clone(),
            config_yaml: self.to_yaml()?,
            dry_run: self.dry_run,
            skip_email: self.effective_skip_email(),
            skip_db_updates: self.skip_db_updates,
            now,
            rows,
            unfiltered_rows: None,
            messages,
            updates,
        })
    }

    fn prepare_row(&self, env: &Environment, row: &PersonRow) -> Result<PreparedMessage> {
        let row_value = TemplateValue::from_serialize(row);
        let mut message = None;
        let mut to_joined = String::new();
        let mut cc_joined = String::new();

        if self.content.is_some() || self.html_content.is_some() {
            let to = dedup(
                row.mailing_to
                    .iter()
                    .chain(self.extra_email_to.iter())
                    .cloned(),
            );
            let cc = dedup(
                row.mailing_cc
                    .iter()
                    .chain(self.extra_email_cc.iter())
                    .cloned(),
            );
            let ctx = template_context! { row => row_value.clone() };
            let subject = env.render_str(&self.email_subject, &ctx)?;
            let html = match &self.html_content {
                Some(template) => Some(env.render_str(template, &ctx)?),
                None => None,
            };
            let text = match &self.content {
                Some(template) => env.render_str(template, &ctx)?,
                None => html_to_plain_text(html.as_deref().unwrap_or_default()),
            };
            let signature = env.render_str(&self.signature, &ctx)?;
            let body = apply_signature(&text, &signature);
            message = Some(mail::build_message(
                self.email_from(),
                &self.email_reply_to,
                &to,
                &cc,
                &self.extra_email_bcc,
                &subject,
                &body,
                html.as_deref(),
            )?);
            to_joined = to.join(", ");
            cc_joined = cc.join(", ");
        }

        let summary_ctx = if message.is_some() {
            template_context! {
                row => row_value,
                msg => template_context! { to => to_joined, cc => cc_joined },
            }
        } else {
            template_context! { row => row_value }
        };
        let summary = env.render_str(&self.summary, summary_ctx)?;
        Ok(PreparedMessage {
            person_id: row.id,
            eml_name: format!("{}.{}.eml", self.name, row.id),
            message,
            summary,
        })
    }
}

/// One rendered message, or just a summary line for rows without mail.
pub struct PreparedMessage {
    pub person_id: i64,
    pub eml_name: String,
    pub message: Option<Message>,
    pub summary: String,
}

/// A fully rendered batch, ready to write, update and send.
pub struct PreparedBatch {
    pub name: String,
    pub config_yaml: String,
    pub dry_run: bool,
    pub skip_email: bool,
    pub skip_db_updates: bool,
    pub now: NaiveDateTime,
    pub rows: Vec<PersonRow>,
    /// Cohort before driver-side filtering, when it differs from `rows`.
    pub unfiltered_rows: Option<Vec<PersonRow>>,
    pub messages: Vec<PreparedMessage>,
    pub updates: Vec<PersonUpdate>,
}

impl PreparedBatch {
    pub fn set_unfiltered_rows(&mut self, rows: Vec<PersonRow>) {
        self.unfiltered_rows = Some(rows);
    }

    /// Ids that got database updates, ids that only got mail, and ids
    /// filtered out of the cohort entirely.
    pub fn results_json(&self) -> JsonValue {
        let mut ids: Vec<i64> = self
            .rows
            .iter()
            .filter(|r| !r.skip_db_updates)
            .map(|r| r.id)
            .collect();
        ids.sort_unstable();
        let mut email_only_ids: Vec<i64> = self
            .rows
            .iter()
            .filter(|r| r.skip_db_updates)
            .map(|r| r.id)
            .collect();
        email_only_ids.sort_unstable();
        let mut skipped_ids: Vec<i64> = self
            .unfiltered_rows
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|r| r.id)
            .filter(|id| !ids.contains(id) && !email_only_ids.contains(id))
            .collect();
        skipped_ids.sort_unstable();
        json!({
            "results": {
                "ids": ids,
                "email_only_ids": email_only_ids,
                "skipped_ids": skipped_ids,
            }
        })
    }

    /// Write every artifact into the context's out directory: the EMLs
    /// (zipped or individual), the cohort XLSX, the config snapshot and
    /// the results JSON.
    pub fn write_data(&self, ctx: &Context, zip_eml: bool) -> Result<()> {
        let with_message: Vec<&PreparedMessage> = self
            .messages
            .iter()
            .filter(|m| m.message.is_some())
            .collect();
        if !with_message.is_empty() {
            if zip_eml {
                let path = ctx.make_out_path(&format!("{}.zip", self.name))?;
                let file = fs::File::create(&path)?;
                let mut archive = zip::ZipWriter::new(file);
                let options = zip::write::SimpleFileOptions::default();
                for prepared in &with_message {
                    if let Some(message) = &prepared.message {
                        archive
                            .start_file(prepared.eml_name.as_str(), options)
                            .map_err(|e| Error::other(format!("ZIP write failed: {e}")))?;
                        archive.write_all(&message.formatted())?;
                    }
                }
                archive
                    .finish()
                    .map_err(|e| Error::other(format!("ZIP write failed: {e}")))?;
                tracing::info!(
                    path = %path.display(),
                    count = with_message.len(),
                    "Wrote EML archive"
                );
            } else {
                for prepared in &with_message {
                    if let Some(message) = &prepared.message {
                        let path = ctx.make_out_path(&prepared.eml_name)?;
                        fs::write(&path, message.formatted())?;
                    }
                }
                tracing::info!(count = with_message.len(), "Wrote EML files");
            }
        }

        let path = ctx.make_out_path(&format!("{}.xlsx", self.name))?;
        write_rows_xlsx(&path, &self.rows)?;
        if let Some(unfiltered) = &self.unfiltered_rows {
            if unfiltered.len() != self.rows.len() {
                let path = ctx.make_out_path(&format!("{}.unfiltered.xlsx", self.name))?;
                write_rows_xlsx(&path, unfiltered)?;
            }
        }
        fs::write(
            ctx.make_out_path(&format!("{}.yml", self.name))?,
            &self.config_yaml,
        )?;
        Ok(())
    }

    pub fn write_results(&self, ctx: &Context) -> Result<()> {
        let path = ctx.make_out_path(&format!("{}.json", self.name))?;
        let mut rendered = serde_json::to_string_pretty(&self.results_json())?;
        rendered.push('\n');
        fs::write(&path, rendered)?;
        tracing::info!(path = %path.display(), "Wrote batch results");
        Ok(())
    }

    /// Apply all person updates in one transaction. Elided by `dry_run`
    /// and `skip_db_updates`.
    pub async fn apply_db_updates(&self, conn: &DatabaseConnection) -> Result<()> {
        if self.dry_run {
            tracing::info!(
                count = self.updates.len(),
                "Skip database updates (dry_run is set)"
            );
            return Ok(());
        }
        if self.skip_db_updates {
            tracing::info!(
                count = self.updates.len(),
                "Skip database updates (skip_db_updates is set)"
            );
            return Ok(());
        }
        let pending: Vec<&PersonUpdate> = self.updates.iter().filter(|u| !u.is_empty()).collect();
        if pending.is_empty() {
            tracing::debug!("No database updates to apply");
            return Ok(());
        }
        let txn = conn.begin().await?;
        {
            let repo = PersonRepository::new(&txn);
            for update in &pending {
                repo.apply_update(update, self.now).await?;
            }
        }
        txn.commit().await?;
        tracing::info!(count = pending.len(), "Applied person updates");
        Ok(())
    }

    /// Why sending is elided for this batch, if it is.
    pub fn send_skip_reason(&self) -> Option<&'static str> {
        if self.dry_run {
            Some("dry_run is set")
        } else if self.skip_email {
            Some("skip_email is set")
        } else {
            None
        }
    }

    /// Send the messages in row order. A failed send aborts the
    /// remaining ones.
    pub fn send(&self, client: &mut MailClient) -> Result<()> {
        let total = self.messages.len();
        if let Some(reason) = self.send_skip_reason() {
            tracing::info!("Skip sending {total} messages ({reason})");
            return Ok(());
        }
        for (i, prepared) in self.messages.iter().enumerate() {
            let pcnt = 100.0 * (i + 1) as f64 / total.max(1) as f64;
            tracing::info!("{}/{total} ({pcnt:.1}%) {}", i + 1, prepared.summary);
            let Some(message) = &prepared.message else {
                tracing::debug!(id = prepared.person_id, "No message for row");
                continue;
            };
            if let Err(e) = client.send_message(message) {
                tracing::error!(id = prepared.person_id, error = %e, "Sending failed");
                return Err(e.into());
            }
        }
        Ok(())
    }
}

// ==========================================================================
// Update derivation
// ==========================================================================

/// Turn the batch's `updates` map into one [`PersonUpdate`] for `row`.
/// Values equal to the row's current state are dropped; rows from the
/// email-only slice never get updates. Returns `None` when nothing is
/// left to do.
pub fn derive_person_update(
    updates: &BTreeMap<String, JsonValue>,
    row: &PersonRow,
    env: &Environment,
) -> Result<Option<PersonUpdate>> {
    if updates.is_empty() || row.skip_db_updates {
        return Ok(None);
    }
    let mut update = PersonUpdate {
        person_id: row.id,
        ..Default::default()
    };
    let mut add_tags: Vec<String> = Vec::new();
    let mut remove_tags: Vec<String> = Vec::new();
    let mut role_types: Vec<String> = Vec::new();
    let mut new_group_id: Option<i64> = None;

    for (key, value) in updates {
        match key.as_str() {
            "add_tags" => add_tags = string_list(key, value)?,
            "remove_tags" => remove_tags = string_list(key, value)?,
            "add_note" | "new_note" => {
                let template = value
                    .as_str()
                    .ok_or_else(|| Error::other(format!("Update key '{key}' must be a string")))?;
                let ctx = template_context! { row => TemplateValue::from_serialize(row) };
                update.note = Some(env.render_str(template, ctx)?);
            }
            "new_primary_group_role_types" => role_types = string_list(key, value)?,
            "new_primary_group_id" => {
                new_group_id = Some(value.as_i64().ok_or_else(|| {
                    Error::other(format!("Update key '{key}' must be an integer"))
                })?);
            }
            _ => {
                let column = key.strip_prefix("new_").ok_or_else(|| {
                    Error::other(format!("Unsupported batch update key '{key}'"))
                })?;
                if !UPDATABLE_COLUMNS.contains(&column) {
                    return Err(Error::other(format!(
                        "Unsupported batch update key '{key}'"
                    )));
                }
                let old = current_column_value(row, column);
                if &old == value {
                    continue;
                }
                update
                    .set_columns
                    .push((column.to_string(), sql_value_from_json(key, value)?));
                update
                    .changes
                    .insert(column.to_string(), (old, value.clone()));
            }
        }
    }

    if let Some(group_id) = new_group_id {
        if row.primary_group_id != Some(group_id) {
            update
                .set_columns
                .push(("primary_group_id".to_string(), SqlValue::Int(group_id)));
            update.changes.insert(
                "primary_group_id".to_string(),
                (json!(row.primary_group_id), json!(group_id)),
            );
            if !role_types.is_empty() {
                update.changes.insert(
                    "primary_group_role_types".to_string(),
                    (JsonValue::Null, json!(role_types)),
                );
            }
            update.group_move = Some(PrimaryGroupMove {
                old_group_id: row.primary_group_id,
                new_group_id: group_id,
                role_types,
            });
        }
    } else if !role_types.is_empty() {
        return Err(Error::other(
            "new_primary_group_role_types requires new_primary_group_id",
        ));
    }

    if !add_tags.is_empty() || !remove_tags.is_empty() {
        let new_tags: Vec<String> = dedup(row.tag_list.iter().chain(add_tags.iter()).cloned())
            .into_iter()
            .filter(|tag| !remove_tags.contains(tag))
            .collect();
        if new_tags != row.tag_list {
            update.changes.insert(
                "tag_list".to_string(),
                (json!(row.tag_list), json!(new_tags)),
            );
            update.add_tags = add_tags
                .into_iter()
                .filter(|tag| !row.tag_list.contains(tag))
                .collect();
        }
    }

    if update.is_empty() {
        return Ok(None);
    }
    Ok(Some(update))
}

fn current_column_value(row: &PersonRow, column: &str) -> JsonValue {
    match column {
        "status" => json!(row.status),
        "sepa_status" => json!(row.sepa_status),
        "payment_role" => json!(row.payment_role),
        "unit_code" => json!(row.unit_code),
        "primary_group_id" => json!(row.primary_group_id),
        "early_payer" => json!(row.early_payer),
        "print_at" => json!(row.print_at.map(|d| d.format("%Y-%m-%d").to_string())),
        _ => JsonValue::Null,
    }
}

fn sql_value_from_json(key: &str, value: &JsonValue) -> Result<SqlValue> {
    match value {
        JsonValue::Null => Ok(SqlValue::Null),
        JsonValue::Bool(b) => Ok(SqlValue::Bool(*b)),
        JsonValue::Number(n) => n
            .as_i64()
            .map(SqlValue::Int)
            .ok_or_else(|| Error::other(format!("Update key '{key}' must be an integer"))),
        JsonValue::String(s) => Ok(SqlValue::Str(s.clone())),
        _ => Err(Error::other(format!(
            "Update key '{key}' must be a scalar"
        ))),
    }
}

/// Accept both a single string and a list of strings.
fn string_list(key: &str, value: &JsonValue) -> Result<Vec<String>> {
    match value {
        JsonValue::String(s) => Ok(vec![s.clone()]),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str().map(|s| s.to_string()).ok_or_else(|| {
                    Error::other(format!("Update key '{key}' must contain strings"))
                })
            })
            .collect(),
        _ => Err(Error::other(format!(
            "Update key '{key}' must be a string or a list of strings"
        ))),
    }
}

// ==========================================================================
// Template rendering
// ==========================================================================

fn template_env() -> &'static Environment<'static> {
    static ENV: OnceLock<Environment<'static>> = OnceLock::new();
    ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.add_filter("format_eur_de", format_eur_de);
        env.add_filter("format_eur_de_compact", format_eur_de_compact);
        env
    })
}

fn html_regexes() -> &'static (Regex, Regex, Regex, Regex) {
    static REGEXES: OnceLock<(Regex, Regex, Regex, Regex)> = OnceLock::new();
    REGEXES.get_or_init(|| {
        (
            Regex::new(r"(?is)<style.*?</style>").unwrap(),
            Regex::new(r"(?i)<br\s*/?>").unwrap(),
            Regex::new(r"(?i)</p>").unwrap(),
            Regex::new(r"<[^>]+>").unwrap(),
        )
    })
}

/// Reduce an HTML body to the plain text alternative: styles dropped,
/// `<br>` and `</p>` become line breaks, remaining tags are stripped,
/// entities unescaped, blank lines removed.
pub fn html_to_plain_text(html: &str) -> String {
    let (style, br, p_close, tag) = html_regexes();
    let text = style.replace_all(html, "");
    let text = br.replace_all(&text, "\n");
    let text = p_close.replace_all(&text, "\n");
    let text = tag.replace_all(&text, "");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append a mail signature, inserting the conventional `-- ` separator
/// when the signature does not carry its own.
pub fn apply_signature(content: &str, signature: &str) -> String {
    let signature = signature.trim_start();
    if signature.is_empty() {
        return content.to_string();
    }
    let mut out = content.trim_end().to_string();
    out.push_str("\n\n");
    if !signature.starts_with("-- \n") {
        out.push_str("-- \n");
    }
    out.push_str(signature);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn person(id: i64) -> PersonRow {
        let value = json!({
            "id": id,
            "primary_group_id": 3,
            "status": "registered",
            "status_de": "Angemeldet",
            "first_name": "Anna",
            "last_name": "Müller",
            "nickname": null,
            "short_first_name": "Anna",
            "greeting_name": "Anna",
            "full_name": "Anna Müller",
            "short_full_name": "Anna Müller",
            "birthday": "2010-06-15",
            "birthday_de": "15.06.2010",
            "age": 15,
            "today": "2026-01-05",
            "today_de": "05.01.2026",
            "gender": "w",
            "email": "anna@example.org",
            "additional_contact_email_a": null,
            "additional_contact_email_b": null,
            "additional_emails_mailings": [],
            "tag_list": ["Warteliste"],
            "note_list": [],
            "payment_role": "RegularPayer::Group::Unit::Member",
            "unit_code": "A12",
            "early_payer": false,
            "print_at": "2025-07-15",
            "sepa_status": "ok",
            "sepa_name": "Petra Müller",
            "sepa_mail": "petra@example.org",
            "sepa_iban": "DE02120300000000202051",
            "sepa_bic": null,
            "sepa_mandate_id": format!("wsjrdp2027{id}"),
            "mailing_to": ["anna@example.org"],
            "mailing_cc": ["petra@example.org"],
            "sepa_to": ["petra@example.org"],
            "sepa_cc": [],
            "skip_db_updates": false,
        });
        serde_json::from_value(value).unwrap()
    }

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_skip_email_defaults_to_true_without_body() {
        let config = BatchConfig::from_yaml_str("updates:\n  add_tags: X\n").unwrap();
        assert!(config.effective_skip_email());

        let config = BatchConfig::from_yaml_str("content: Hallo {{ row.greeting_name }}\n").unwrap();
        assert!(!config.effective_skip_email());

        let config = BatchConfig::from_yaml_str("content: Hallo\nskip_email: true\n").unwrap();
        assert!(config.effective_skip_email());
    }

    #[test]
    fn test_content_and_content_file_are_exclusive() {
        let result = BatchConfig::from_yaml_str("content: a\ncontent_file: b.txt\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_email_from_falls_back_to_from_addr() {
        let config = BatchConfig::default();
        assert_eq!(config.email_from(), DEFAULT_FROM_ADDR);
        let config = BatchConfig {
            email_from: Some("WSJ <info@worldscoutjamboree.de>".to_string()),
            ..Default::default()
        };
        assert_eq!(config.email_from(), "WSJ <info@worldscoutjamboree.de>");
    }

    #[test]
    fn test_html_to_plain_text() {
        let html = "<html><style>p { color: red; }</style>\
            <body><p>Hallo &amp; willkommen,<br/>Anna</p><p>Bis bald</p></body></html>";
        assert_eq!(
            html_to_plain_text(html),
            "Hallo & willkommen,\nAnna\nBis bald"
        );
    }

    #[test]
    fn test_apply_signature() {
        assert_eq!(
            apply_signature("Hallo\n", "Dein WSJ-Team"),
            "Hallo\n\n-- \nDein WSJ-Team"
        );
        assert_eq!(
            apply_signature("Hallo", "-- \nDein WSJ-Team"),
            "Hallo\n\n-- \nDein WSJ-Team"
        );
        assert_eq!(apply_signature("Hallo", ""), "Hallo");
    }

    #[test]
    fn test_derive_person_update_confirmation() {
        let mut updates = BTreeMap::new();
        updates.insert("new_status".to_string(), json!("confirmed"));
        updates.insert("add_tags".to_string(), json!("YP-Confirmation-Mail"));
        updates.insert("remove_tags".to_string(), json!(["Warteliste"]));
        updates.insert(
            "add_note".to_string(),
            json!("Bestätigungs-E-Mail am {{ row.today_de }} verschickt"),
        );
        let row = person(42);
        let update = derive_person_update(&updates, &row, template_env())
            .unwrap()
            .unwrap();
        assert_eq!(update.person_id, 42);
        assert_eq!(
            update.set_columns,
            vec![("status".to_string(), SqlValue::Str("confirmed".to_string()))]
        );
        assert_eq!(
            update.changes.get("status"),
            Some(&(json!("registered"), json!("confirmed")))
        );
        assert_eq!(
            update.changes.get("tag_list"),
            Some(&(json!(["Warteliste"]), json!(["YP-Confirmation-Mail"])))
        );
        assert_eq!(update.add_tags, vec!["YP-Confirmation-Mail".to_string()]);
        assert_eq!(
            update.note.as_deref(),
            Some("Bestätigungs-E-Mail am 05.01.2026 verschickt")
        );
    }

    #[test]
    fn test_derive_person_update_drops_no_ops() {
        let mut updates = BTreeMap::new();
        updates.insert("new_status".to_string(), json!("registered"));
        updates.insert("add_tags".to_string(), json!("Warteliste"));
        let row = person(1);
        assert!(derive_person_update(&updates, &row, template_env())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_derive_person_update_group_move() {
        let mut updates = BTreeMap::new();
        updates.insert("new_primary_group_id".to_string(), json!(7));
        updates.insert(
            "new_primary_group_role_types".to_string(),
            json!(["Group::Unit::Member"]),
        );
        updates.insert("new_unit_code".to_string(), json!("B07"));
        let row = person(1);
        let update = derive_person_update(&updates, &row, template_env())
            .unwrap()
            .unwrap();
        let group_move = update.group_move.unwrap();
        assert_eq!(group_move.old_group_id, Some(3));
        assert_eq!(group_move.new_group_id, 7);
        assert_eq!(group_move.role_types, vec!["Group::Unit::Member".to_string()]);
        assert!(update
            .set_columns
            .contains(&("unit_code".to_string(), SqlValue::Str("B07".to_string()))));
        assert!(update
            .set_columns
            .contains(&("primary_group_id".to_string(), SqlValue::Int(7))));
    }

    #[test]
    fn test_derive_person_update_rejects_unknown_key() {
        let mut updates = BTreeMap::new();
        updates.insert("new_first_name".to_string(), json!("Eva"));
        assert!(derive_person_update(&updates, &person(1), template_env()).is_err());
    }

    #[test]
    fn test_email_only_rows_never_get_updates() {
        let mut updates = BTreeMap::new();
        updates.insert("new_status".to_string(), json!("confirmed"));
        let mut row = person(1);
        row.skip_db_updates = true;
        assert!(derive_person_update(&updates, &row, template_env())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_prepare_renders_message_and_summary() {
        let config = BatchConfig {
            name: "erinnerung".to_string(),
            email_subject: "WSJ 2027 - {{ row.short_full_name }}".to_string(),
            content: Some("Hallo {{ row.greeting_name }},\n\ndenk an die Rate.".to_string()),
            signature: "Dein WSJ-Team".to_string(),
            ..Default::default()
        };
        let batch = config.prepare(vec![person(42)], noon()).unwrap();
        assert_eq!(batch.messages.len(), 1);
        let prepared = &batch.messages[0];
        assert_eq!(prepared.eml_name, "erinnerung.42.eml");
        assert!(prepared.summary.contains("42 Anna Müller"));
        assert!(prepared.summary.contains("To: anna@example.org"));
        let eml = String::from_utf8_lossy(&prepared.message.as_ref().unwrap().formatted())
            .to_string();
        assert!(eml.contains("To: anna@example.org"));
        assert!(eml.contains("Cc: petra@example.org"));
    }

    #[test]
    fn test_prepare_without_body_has_no_messages() {
        let config = BatchConfig::default();
        let batch = config.prepare(vec![person(1)], noon()).unwrap();
        assert!(batch.messages[0].message.is_none());
        assert!(batch.skip_email);
    }

    #[test]
    fn test_results_json_partition() {
        let config = BatchConfig::default();
        let mut email_only = person(2);
        email_only.skip_db_updates = true;
        let mut batch = config
            .prepare(vec![person(3), email_only, person(1)], noon())
            .unwrap();
        batch.set_unfiltered_rows(vec![person(1), person(2), person(3), person(4)]);
        assert_eq!(
            batch.results_json(),
            json!({
                "results": {
                    "ids": [1, 3],
                    "email_only_ids": [2],
                    "skipped_ids": [4],
                }
            })
        );
    }

    #[test]
    fn test_config_yaml_round_trip() {
        let config = BatchConfig {
            name: "erinnerung".to_string(),
            email_subject: "Betreff".to_string(),
            content: Some("Hallo".to_string()),
            ..Default::default()
        };
        let yaml = config.to_yaml().unwrap();
        let parsed = BatchConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.name, "erinnerung");
        assert_eq!(parsed.email_subject, "Betreff");
        assert_eq!(parsed.content.as_deref(), Some("Hallo"));
        assert!(!yaml.contains("content_file"));
    }
}
