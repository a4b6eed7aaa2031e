//! End-to-end batch runner tests against a real filesystem: load a
//! batch YAML with an external body file, prepare it for a small
//! cohort and check every artifact written to the output directory.

use std::fs;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{json, Value};
use tempfile::TempDir;
use wsjrdp_backoffice::batch::BatchConfig;
use wsjrdp_backoffice::config::AppConfig;
use wsjrdp_backoffice::context::{Context, ContextOptions};
use wsjrdp_backoffice::people::PersonRow;

fn load_config(dir: &Path) -> AppConfig {
    let path = dir.join("wsjrdp-dev.yml");
    fs::write(&path, "db_username: hitobito\ndb_name: hitobito_development\n").unwrap();
    AppConfig::load(Some(&path)).unwrap()
}

fn make_context(dir: &TempDir) -> Context {
    let out_dir = dir.path().join("out");
    Context::new(
        load_config(dir.path()),
        ContextOptions {
            start_time: Some(noon()),
            out_dir: Some(out_dir.to_string_lossy().into_owned()),
            assume_yes: false,
        },
    )
    .unwrap()
}

fn noon() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 1, 5)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

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
        "email": format!("anna{id}@example.org"),
        "additional_contact_email_a": null,
        "additional_contact_email_b": null,
        "additional_emails_mailings": [],
        "tag_list": [],
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
        "mailing_to": [format!("anna{id}@example.org")],
        "mailing_cc": ["petra@example.org"],
        "sepa_to": ["petra@example.org"],
        "sepa_cc": [],
        "skip_db_updates": false,
    });
    serde_json::from_value(value).unwrap()
}

#[test]
fn batch_name_and_body_come_from_files() {
    let dir = TempDir::new().unwrap();
    let yaml = dir.path().join("erinnerung.yml");
    fs::write(
        &yaml,
        "email_subject: \"WSJ 2027 - {{ row.short_full_name }}\"\n\
         content_file: erinnerung.txt\n\
         signature: Dein WSJ-Team\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("erinnerung.txt"),
        "Hallo {{ row.greeting_name }},\n\ndenk an die nächste Rate.\n",
    )
    .unwrap();

    let config = BatchConfig::from_yaml_file(&yaml).unwrap();
    assert_eq!(config.name, "erinnerung");
    assert!(config.content_file.is_none());
    assert!(config
        .content
        .as_deref()
        .unwrap()
        .starts_with("Hallo {{ row.greeting_name }}"));
    assert!(!config.effective_skip_email());
}

#[test]
fn batch_writes_zip_xlsx_config_and_results() {
    let dir = TempDir::new().unwrap();
    let yaml = dir.path().join("erinnerung.yml");
    fs::write(
        &yaml,
        "email_subject: \"WSJ 2027 - {{ row.short_full_name }}\"\n\
         content: \"Hallo {{ row.greeting_name }}\"\n\
         updates:\n  new_status: confirmed\n",
    )
    .unwrap();
    let config = BatchConfig::from_yaml_file(&yaml).unwrap();
    let ctx = make_context(&dir);

    let mut batch = config.prepare(vec![person(7), person(8)], noon()).unwrap();
    batch.set_unfiltered_rows(vec![person(7), person(8), person(9)]);
    assert_eq!(batch.updates.len(), 2);

    batch.write_data(&ctx, true).unwrap();
    batch.write_results(&ctx).unwrap();

    assert!(ctx.out_dir.join("erinnerung.zip").exists());
    assert!(ctx.out_dir.join("erinnerung.xlsx").exists());
    assert!(ctx.out_dir.join("erinnerung.unfiltered.xlsx").exists());
    assert!(ctx.out_dir.join("erinnerung.yml").exists());

    // The config snapshot is a loadable batch file again.
    let snapshot =
        BatchConfig::from_yaml_file(&ctx.out_dir.join("erinnerung.yml")).unwrap();
    assert_eq!(snapshot.email_subject, "WSJ 2027 - {{ row.short_full_name }}");

    let results: Value =
        serde_json::from_str(&fs::read_to_string(ctx.out_dir.join("erinnerung.json")).unwrap())
            .unwrap();
    assert_eq!(
        results,
        json!({
            "results": {
                "ids": [7, 8],
                "email_only_ids": [],
                "skipped_ids": [9],
            }
        })
    );
}

#[test]
fn batch_writes_individual_eml_files_without_zip() {
    let dir = TempDir::new().unwrap();
    let config = BatchConfig {
        name: "einladung".to_string(),
        email_subject: "WSJ 2027".to_string(),
        content: Some("Hallo {{ row.greeting_name }}".to_string()),
        ..Default::default()
    };
    let ctx = make_context(&dir);

    let batch = config.prepare(vec![person(11)], noon()).unwrap();
    batch.write_data(&ctx, false).unwrap();

    assert!(!ctx.out_dir.join("einladung.zip").exists());
    let eml = fs::read_to_string(ctx.out_dir.join("einladung.11.eml")).unwrap();
    assert!(eml.contains("To: anna11@example.org"));
    assert!(eml.contains("Subject: WSJ 2027"));
}

#[test]
fn batch_without_mail_body_writes_no_eml() {
    let dir = TempDir::new().unwrap();
    let config = BatchConfig {
        name: "statuswechsel".to_string(),
        updates: [("new_status".to_string(), json!("confirmed"))]
            .into_iter()
            .collect(),
        ..Default::default()
    };
    let ctx = make_context(&dir);

    let batch = config.prepare(vec![person(5)], noon()).unwrap();
    assert!(batch.skip_email);
    batch.write_data(&ctx, true).unwrap();

    assert!(!ctx.out_dir.join("statuswechsel.zip").exists());
    assert!(ctx.out_dir.join("statuswechsel.xlsx").exists());
}

#[test]
fn out_dir_template_is_rendered() {
    let dir = TempDir::new().unwrap();
    let config = load_config(dir.path());
    let template = format!(
        "{}/{{{{ start_time_for_filename }}}}",
        dir.path().to_string_lossy()
    );
    let ctx = Context::new(
        config,
        ContextOptions {
            start_time: Some(noon()),
            out_dir: Some(template),
            assume_yes: false,
        },
    )
    .unwrap();
    assert!(ctx.out_dir.ends_with("20260105-120000"));
    assert!(ctx.out_dir.is_dir());
}

#[test]
fn make_out_path_rejects_escaping_paths() {
    let dir = TempDir::new().unwrap();
    let ctx = make_context(&dir);
    assert!(ctx.make_out_path("../evil.txt").is_err());
    assert!(ctx.make_out_path("sub/dir/ok.txt").is_ok());
}
