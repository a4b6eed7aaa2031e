//! Command line entry point for the WSJ 2027 back-office tools.

use std::fs;
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use sea_orm::{DatabaseConnection, TransactionTrait};
use uuid::Uuid;

use wsjrdp_backoffice::batch::{BatchConfig, DEFAULT_FROM_ADDR};
use wsjrdp_backoffice::config::AppConfig;
use wsjrdp_backoffice::context::{self, Context, ContextOptions};
use wsjrdp_backoffice::db::{self, SshTunnel};
use wsjrdp_backoffice::error::{Error, Result};
use wsjrdp_backoffice::logging;
use wsjrdp_backoffice::mail::{self, MailClient};
use wsjrdp_backoffice::payment::{
    load_payment_rows, load_payment_rows_from_payment_initiation, PaymentOptions, PaymentRow,
};
use wsjrdp_backoffice::payment_role::WsjRole;
use wsjrdp_backoffice::people::{self, write_rows_xlsx};
use wsjrdp_backoffice::query::{PeopleQuery, PeopleWhere};
use wsjrdp_backoffice::repositories::{
    AccountingRepository, CamtIngestOutcome, PRE_NOTIFICATION_STATUS_RETURNED,
};
use wsjrdp_backoffice::sepa::camt::CamtMessage;
use wsjrdp_backoffice::sepa::datev::{write_datev_csv, DatevBookingRow};
use wsjrdp_backoffice::sepa::iban::BicDirectory;
use wsjrdp_backoffice::sepa::pain008::{PainMessage, SepaDirectDebit, SepaDirectDebitPayment};
use wsjrdp_backoffice::sepa::SepaDirectDebitConfig;
use wsjrdp_backoffice::util::{
    format_date_de, format_eur_de, format_eur_de_compact, format_iban_masked,
};

const PRE_NOTIFY_REPLY_TO: &str = "info@worldscoutjamboree.de";

#[derive(Parser)]
#[command(
    name = "wsjrdp-backoffice",
    version,
    about = "Batch mailings and SEPA direct debits for the WSJ 2027 registration database"
)]
struct Cli {
    /// Config file; falls back to the well-known locations and the
    /// environment.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Output directory template.
    #[arg(long, global = true)]
    out_dir: Option<String>,
    /// Override the run's reference time.
    #[arg(long, global = true, value_parser = parse_start_time_arg)]
    start_time: Option<NaiveDateTime>,
    /// Answer production confirmations with yes.
    #[arg(long, global = true)]
    yes: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one batch file: mailing, person updates and artifacts.
    RunBatch(RunBatchArgs),
    /// Announce the next direct debit collection to the cohort.
    PreNotify(PreNotifyArgs),
    /// Generate the pain.008 document for an announced collection.
    SepaXml(SepaXmlArgs),
    /// Reconcile camt bank statement files against announced debits.
    IngestCamt(IngestCamtArgs),
    /// Export a cohort as XLSX.
    ExportPeople(ExportPeopleArgs),
}

#[derive(Args)]
struct RunBatchArgs {
    /// Batch definition YAML.
    batch_file: PathBuf,
    /// Render everything, send and write nothing.
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    skip_email: bool,
    #[arg(long)]
    skip_db_updates: bool,
    /// Cap the cohort size.
    #[arg(long)]
    limit: Option<u64>,
    #[arg(long, value_parser = parse_date_arg)]
    collection_date: Option<NaiveDate>,
    /// Reference time for fee and age computations.
    #[arg(long, value_parser = parse_start_time_arg)]
    now: Option<NaiveDateTime>,
    /// Write individual .eml files instead of one archive.
    #[arg(long)]
    no_zip_eml: bool,
}

#[derive(Args)]
struct PreNotifyArgs {
    #[arg(long, value_parser = parse_date_arg)]
    collection_date: NaiveDate,
    /// Skip the payment initiation and pre-notification inserts.
    #[arg(long)]
    no_accounting: bool,
    /// Write the announcement mails without sending them.
    #[arg(long)]
    no_email: bool,
    #[arg(long)]
    limit: Option<u64>,
    /// Bank code CSV for deriving BICs from German IBANs.
    #[arg(long)]
    bic_directory: Option<PathBuf>,
}

#[derive(Args)]
struct SepaXmlArgs {
    /// Payment initiation id from the pre-notify run.
    #[arg(long)]
    payment_initiation: i64,
    /// Skip status flips and accounting entries.
    #[arg(long)]
    no_accounting: bool,
    #[arg(long)]
    bic_directory: Option<PathBuf>,
}

#[derive(Args)]
struct IngestCamtArgs {
    /// camt.052/camt.053 statement files.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Args)]
struct ExportPeopleArgs {
    /// Cohort query YAML; defaults to all non-deregistered people.
    #[arg(long)]
    query_file: Option<PathBuf>,
    #[arg(long)]
    limit: Option<u64>,
}

fn parse_start_time_arg(s: &str) -> std::result::Result<NaiveDateTime, String> {
    context::parse_start_time(s).ok_or_else(|| format!("invalid start time '{s}'"))
}

fn parse_date_arg(s: &str) -> std::result::Result<NaiveDate, String> {
    context::parse_date(s).ok_or_else(|| format!("invalid date '{s}'"))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        match e {
            Error::ApprovalDeclined => tracing::info!("{e}"),
            _ => eprintln!("Error: {e}"),
        }
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    // Install the subscriber before the context so its startup events
    // are not lost; the log file is attached once out_dir is known.
    let log_file = logging::init_subscriber(&config.log_level);
    let ctx = Context::new(
        config,
        ContextOptions {
            start_time: cli.start_time,
            out_dir: cli.out_dir,
            assume_yes: cli.yes,
        },
    )?;
    let label = match &cli.command {
        Command::RunBatch(args) => args
            .batch_file
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("run_batch")
            .to_string(),
        Command::PreNotify(_) => "pre_notify".to_string(),
        Command::SepaXml(_) => "sepa_xml".to_string(),
        Command::IngestCamt(_) => "ingest_camt".to_string(),
        Command::ExportPeople(_) => "export_people".to_string(),
    };
    log_file.open(&ctx.make_out_path(&format!("{label}.log"))?)?;
    tracing::info!(
        start_time = %ctx.start_time,
        out_dir = %ctx.out_dir.display(),
        is_production = ctx.is_production(),
        "Starting {label}"
    );

    match cli.command {
        Command::RunBatch(args) => run_batch(&ctx, args).await,
        Command::PreNotify(args) => pre_notify(&ctx, args).await,
        Command::SepaXml(args) => sepa_xml(&ctx, args).await,
        Command::IngestCamt(args) => ingest_camt(&ctx, args).await,
        Command::ExportPeople(args) => export_people(&ctx, args).await,
    }
}

/// Open the tunnel (when configured) and the database connection, and
/// verify the schema is reachable.
async fn connect_db(ctx: &Context) -> Result<(DatabaseConnection, Option<SshTunnel>)> {
    let tunnel = if ctx.config.use_ssh_tunnel {
        Some(SshTunnel::open(&ctx.config).await?)
    } else {
        None
    };
    let conn = db::connect(&ctx.config, tunnel.as_ref()).await?;
    people::check_people_table(&conn).await?;
    Ok((conn, tunnel))
}

async fn close_db(conn: DatabaseConnection, tunnel: Option<SshTunnel>) {
    let _ = conn.close().await;
    if let Some(tunnel) = tunnel {
        tunnel.close().await;
    }
}

// ==========================================================================
// run-batch
// ==========================================================================

async fn run_batch(ctx: &Context, args: RunBatchArgs) -> Result<()> {
    let mut config = BatchConfig::from_yaml_file(&args.batch_file)?;
    if args.dry_run {
        config.dry_run = true;
    }
    if args.skip_email {
        config.skip_email = Some(true);
    }
    if args.skip_db_updates {
        config.skip_db_updates = true;
    }
    if let Some(limit) = args.limit {
        config.query.limit = Some(limit);
    }
    if let Some(collection_date) = args.collection_date {
        config.query.collection_date = Some(collection_date);
    }
    if let Some(now) = args.now {
        config.query.now = Some(now);
    }

    if !config.dry_run {
        ctx.require_approval_to_run_in_prod(Some(&format!(
            "Run batch '{}' against the production database?",
            config.name
        )))?;
    }

    let (conn, tunnel) = connect_db(ctx).await?;
    let query = config.query.clone().or_now(ctx.start_time);
    let rows = people::load_cohort(&conn, &query, ctx.today()).await?;
    tracing::info!(count = rows.len(), batch = %config.name, "Loaded cohort");

    let batch = config.prepare(rows, ctx.start_time)?;
    batch.write_data(ctx, !args.no_zip_eml)?;
    batch.apply_db_updates(&conn).await?;

    let send_result = match batch.send_skip_reason() {
        Some(reason) => {
            tracing::info!("Skip sending {} messages ({reason})", batch.messages.len());
            Ok(())
        }
        None => {
            ctx.require_approval_to_send_email_in_prod()?;
            let mut client = MailClient::new(ctx.config.mail_account(&config.from_addr)?, false);
            client.connect()?;
            let result = batch.send(&mut client);
            client.disconnect();
            result
        }
    };
    batch.write_results(ctx)?;
    close_db(conn, tunnel).await;
    send_result
}

// ==========================================================================
// pre-notify
// ==========================================================================

const PRE_NOTIFY_BODY: &str = "\
wir kündigen hiermit an, dass wir den offenen Teilnahmebeitrag für das
World Scout Jamboree 2027 per SEPA-Lastschrift einziehen werden.

    Betrag:        {amount}
    Einzug ab:     {collection_date}
    Konto:         {iban}
    Mandat:        {mandate_id}
    Gläubiger-ID:  {creditor_id}
    Verwendung:    {description}

Bitte sorge für ausreichende Deckung des Kontos. Bei Fragen zum Einzug
antworte einfach auf diese E-Mail.";

fn pre_notification_message(
    row: &PaymentRow,
    from: &str,
    reply_to: &[String],
    config: &SepaDirectDebitConfig,
) -> Result<lettre::Message> {
    let subject = format!(
        "WSJ 2027 - {} (id {}) - Ankündigung SEPA Lastschrifteinzug ab {}",
        row.person.short_full_name,
        row.person.id,
        format_date_de(row.collection_date)
    );
    let body = format!(
        "Liebe*r {},\n\n{}\n\n-- \nDein Team des World Scout Jamboree 2027\nanmeldung@worldscoutjamboree.de",
        row.person.greeting_name,
        PRE_NOTIFY_BODY
            .replace("{amount}", &format_eur_de(row.open_amount_cents))
            .replace("{collection_date}", &format_date_de(row.collection_date))
            .replace(
                "{iban}",
                &format_iban_masked(row.person.sepa_iban.as_deref().unwrap_or_default()),
            )
            .replace("{mandate_id}", &row.person.sepa_mandate_id)
            .replace("{creditor_id}", &config.creditor_id)
            .replace("{description}", &row.sepa_dd_description)
    );
    Ok(mail::build_message(
        from,
        reply_to,
        &row.person.sepa_to,
        &row.person.sepa_cc,
        &[],
        &subject,
        &body,
        None,
    )?)
}

fn payment_options(ctx: &Context, bic_directory: Option<&PathBuf>) -> Result<PaymentOptions> {
    Ok(PaymentOptions {
        booking_at: Some(ctx.start_time),
        bic_directory: bic_directory.map(|p| BicDirectory::from_csv_path(p)).transpose()?,
        ..PaymentOptions::default()
    })
}

async fn pre_notify(ctx: &Context, args: PreNotifyArgs) -> Result<()> {
    ctx.require_approval_to_run_in_prod(Some(
        "Announce a SEPA collection against the production database?",
    ))?;
    let (conn, tunnel) = connect_db(ctx).await?;

    let query = PeopleQuery {
        limit: args.limit,
        ..PeopleQuery::with_where(PeopleWhere {
            status: Some(vec!["reviewed".to_string(), "confirmed".to_string()]),
            sepa_status: Some(vec!["ok".to_string()]),
            role: Some(vec![WsjRole::Cmt, WsjRole::Ist, WsjRole::Yp, WsjRole::Ul]),
            ..PeopleWhere::new()
        })
    }
    .with_collection_date(args.collection_date)
    .or_now(ctx.start_time);
    let options = payment_options(ctx, args.bic_directory.as_ref())?;
    let mut rows = load_payment_rows(&conn, &query, ctx.today(), &options).await?;

    let ok_count = rows.iter().filter(|r| r.is_ok()).count();
    let sum_ok: i64 = rows
        .iter()
        .filter(|r| r.is_ok())
        .map(|r| r.open_amount_cents)
        .sum();
    let sum_not_ok: i64 = rows
        .iter()
        .filter(|r| !r.is_ok())
        .map(|r| r.open_amount_cents)
        .sum();
    tracing::info!(
        rows = rows.len(),
        ok = ok_count,
        sum_ok = %format_eur_de_compact(sum_ok),
        sum_not_ok = %format_eur_de_compact(sum_not_ok),
        "Collection cohort"
    );
    write_rows_xlsx(&ctx.make_out_path("pre_notifications.xlsx")?, &rows)?;
    if sum_not_ok > 0 {
        close_db(conn, tunnel).await;
        return Err(Error::other(format!(
            "{} open on rows that cannot be collected, resolve them first",
            format_eur_de_compact(sum_not_ok)
        )));
    }
    if sum_ok == 0 {
        tracing::warn!("Nothing to collect, no announcement needed");
        close_db(conn, tunnel).await;
        return Ok(());
    }

    let sepa_config = SepaDirectDebitConfig::default().sanitized();
    let reply_to = vec![PRE_NOTIFY_REPLY_TO.to_string()];

    if !args.no_accounting {
        let message_identification = format!(
            "{}-{}",
            ctx.start_time.format("%Y%m%d%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..12]
        );
        let sequence_types: std::collections::BTreeSet<String> = rows
            .iter()
            .filter(|r| r.is_ok())
            .map(|r| r.sepa_dd_sequence_type.clone())
            .collect();
        let debit_sequence_type = match sequence_types.iter().next() {
            Some(only) if sequence_types.len() == 1 => only.clone(),
            _ => "RCUR".to_string(),
        };
        let txn = conn.begin().await?;
        let payment_initiation_id;
        {
            let repo = AccountingRepository::new(&txn);
            payment_initiation_id = repo
                .insert_payment_initiation(&sepa_config, &message_identification, ctx.start_time)
                .await?;
            let payment_info_id = repo
                .insert_payment_info(
                    payment_initiation_id,
                    &message_identification,
                    &debit_sequence_type,
                    args.collection_date,
                    ok_count as i32,
                    sum_ok,
                    &sepa_config,
                    ctx.start_time,
                )
                .await?;
            for row in rows.iter_mut().filter(|r| r.is_ok()) {
                let id = repo
                    .insert_pre_notification(
                        row,
                        payment_initiation_id,
                        payment_info_id,
                        DEFAULT_FROM_ADDR,
                        &reply_to,
                        &sepa_config,
                        ctx.start_time,
                    )
                    .await?;
                row.payment_initiation_id = Some(payment_initiation_id);
                row.direct_debit_payment_info_id = Some(payment_info_id);
                row.pre_notification_id = Some(id);
            }
        }
        txn.commit().await?;
        tracing::info!(
            payment_initiation_id,
            count = ok_count,
            sum = %format_eur_de_compact(sum_ok),
            "Announced collection recorded"
        );
    }

    let messages: Vec<(i64, lettre::Message)> = rows
        .iter()
        .filter(|r| r.is_ok())
        .map(|row| {
            pre_notification_message(row, DEFAULT_FROM_ADDR, &reply_to, &sepa_config)
                .map(|m| (row.person.id, m))
        })
        .collect::<Result<_>>()?;
    for (person_id, message) in &messages {
        let path = ctx.make_out_path(&format!("pre_notification.{person_id}.eml"))?;
        fs::write(&path, message.formatted())?;
    }
    tracing::info!(count = messages.len(), "Wrote announcement mails");

    if !args.no_email {
        ctx.require_approval_to_send_email_in_prod()?;
        let mut client = MailClient::new(ctx.config.mail_account(DEFAULT_FROM_ADDR)?, false);
        client.connect()?;
        let total = messages.len();
        for (i, (person_id, message)) in messages.iter().enumerate() {
            tracing::info!(
                "{}/{total} ({:.1}%) announce collection to id {person_id}",
                i + 1,
                100.0 * (i + 1) as f64 / total.max(1) as f64
            );
            if let Err(e) = client.send_message(message) {
                client.disconnect();
                close_db(conn, tunnel).await;
                return Err(e.into());
            }
        }
        client.disconnect();
    }
    close_db(conn, tunnel).await;
    Ok(())
}

// ==========================================================================
// sepa-xml
// ==========================================================================

async fn sepa_xml(ctx: &Context, args: SepaXmlArgs) -> Result<()> {
    ctx.require_approval_to_run_in_prod(Some(
        "Generate the collection document against the production database?",
    ))?;
    let (conn, tunnel) = connect_db(ctx).await?;

    let options = payment_options(ctx, args.bic_directory.as_ref())?;
    let rows = load_payment_rows_from_payment_initiation(
        &conn,
        args.payment_initiation,
        ctx.today(),
        &options,
    )
    .await?;
    if rows.is_empty() {
        close_db(conn, tunnel).await;
        return Err(Error::other(format!(
            "Payment initiation {} has no pre-notifications",
            args.payment_initiation
        )));
    }
    write_rows_xlsx(
        &ctx.make_out_path(&format!("sepa_dd_{}.xlsx", args.payment_initiation))?,
        &rows,
    )?;

    let sepa_config = SepaDirectDebitConfig::default().sanitized();
    let mut document = SepaDirectDebit::new(&sepa_config);
    let mut bookings = Vec::new();
    for row in rows.iter().filter(|r| r.is_ok()) {
        // Collect what was announced, not what is open today.
        let amount_cents = row.pre_notified_amount_cents.unwrap_or(row.open_amount_cents);
        let mandate_date = row.sepa_mandate_date.ok_or_else(|| {
            Error::other(format!("Person {} has no mandate date", row.person.id))
        })?;
        document.add_payment(&SepaDirectDebitPayment {
            name: row.person.sepa_name.clone().unwrap_or_default(),
            iban: row.person.sepa_iban.clone().unwrap_or_default(),
            bic: row.person.sepa_bic.clone(),
            amount_cents,
            sequence_type: row.sepa_dd_sequence_type.clone(),
            collection_date: row.collection_date,
            mandate_id: row.person.sepa_mandate_id.clone(),
            mandate_date,
            description: row.sepa_dd_description.clone(),
            endtoend_id: row.sepa_dd_endtoend_id.clone(),
        })?;
        bookings.push(DatevBookingRow {
            amount_cents,
            debit_sequence_type: row.sepa_dd_sequence_type.clone(),
            collection_date: row.collection_date,
            description: row.sepa_dd_description.clone(),
        });
    }
    if document.num_payments() == 0 {
        close_db(conn, tunnel).await;
        return Err(Error::other(
            "No collectable rows left in this payment initiation",
        ));
    }

    let xml = document.export()?;
    // Round-trip the document before anything leaves the machine.
    PainMessage::parse_str(&xml)?.validate_control_sums()?;
    let xml_path = ctx.make_out_path(&format!("sepa_dd_{}.xml", args.payment_initiation))?;
    fs::write(&xml_path, &xml)?;
    let csv_path = ctx.make_out_path(&format!("sepa_dd_{}.csv", args.payment_initiation))?;
    write_datev_csv(
        fs::File::create(&csv_path)?,
        &bookings,
        args.payment_initiation,
    )?;
    tracing::info!(
        xml = %xml_path.display(),
        csv = %csv_path.display(),
        transactions = document.num_payments(),
        control_sum = %format_eur_de_compact(document.control_sum_cents()),
        "Wrote collection documents"
    );

    if !args.no_accounting {
        let txn = conn.begin().await?;
        {
            let repo = AccountingRepository::new(&txn);
            repo.write_payment_rows(&rows).await?;
            repo.mark_payment_initiation_generated(
                args.payment_initiation,
                document.message_identification(),
                document.num_payments() as i32,
                document.control_sum_cents(),
                ctx.start_time,
            )
            .await?;
        }
        txn.commit().await?;
        tracing::info!(
            payment_initiation_id = args.payment_initiation,
            "Booked collection run"
        );
    }
    close_db(conn, tunnel).await;
    Ok(())
}

// ==========================================================================
// ingest-camt
// ==========================================================================

async fn ingest_camt(ctx: &Context, args: IngestCamtArgs) -> Result<()> {
    ctx.require_approval_to_run_in_prod(Some(
        "Ingest bank statements into the production database?",
    ))?;
    let (conn, tunnel) = connect_db(ctx).await?;

    let txn = conn.begin().await?;
    let mut inserted = 0usize;
    let mut known = 0usize;
    let mut returned = 0usize;
    {
        let repo = AccountingRepository::new(&txn);
        let fin_accounts = repo.load_fin_accounts().await?;
        for file in &args.files {
            let message = CamtMessage::load(file)?;
            tracing::info!(
                file = %file.display(),
                camt_type = %message.camt_type,
                message_identification = %message.message_identification,
                "Ingest statement file"
            );
            for entry in message.booked_entries() {
                let fin_account_id = fin_accounts
                    .get(&entry.account_identification)
                    .copied()
                    .ok_or_else(|| {
                        Error::other(format!(
                            "No fin account for {} in {}",
                            entry.account_identification,
                            file.display()
                        ))
                    })?;
                match repo
                    .ingest_camt_entry(fin_account_id, entry, ctx.start_time)
                    .await?
                {
                    CamtIngestOutcome::Inserted(_) => inserted += 1,
                    CamtIngestOutcome::AlreadyPresent(_) => known += 1,
                }
                if let Some(link) = repo
                    .update_pre_notification_for_camt(entry, ctx.start_time)
                    .await?
                {
                    if link.changed && link.status == PRE_NOTIFICATION_STATUS_RETURNED {
                        repo.insert_return_entry(link.pre_notification_id, entry, ctx.start_time)
                            .await?;
                        returned += 1;
                    }
                }
            }
        }
    }
    txn.commit().await?;
    tracing::info!(inserted, known, returned, "Statement ingest finished");
    close_db(conn, tunnel).await;
    Ok(())
}

// ==========================================================================
// export-people
// ==========================================================================

async fn export_people(ctx: &Context, args: ExportPeopleArgs) -> Result<()> {
    let mut query = match &args.query_file {
        Some(path) => serde_yaml::from_str::<PeopleQuery>(&fs::read_to_string(path)?)?,
        None => PeopleQuery::default(),
    };
    if let Some(limit) = args.limit {
        query.limit = Some(limit);
    }
    let query = query.or_now(ctx.start_time);

    let (conn, tunnel) = connect_db(ctx).await?;
    let rows = people::load_cohort(&conn, &query, ctx.today()).await?;
    let path = ctx.make_out_path("people.xlsx")?;
    write_rows_xlsx(&path, &rows)?;
    tracing::info!(count = rows.len(), path = %path.display(), "Exported cohort");
    close_db(conn, tunnel).await;
    Ok(())
}
