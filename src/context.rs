//! Script execution context.
//!
//! Every CLI tool starts by building a [`Context`]: it loads the config,
//! pins a single `start_time` that is used wherever a "now" is needed
//! (making batch output names and fee computations deterministic across
//! retries), and resolves the output directory from a small template.

use std::io::{BufRead, Write};
use std::path::{Component, Path, PathBuf};

use chrono::{Local, NaiveDate, NaiveDateTime};
use minijinja::{context as template_context, Environment};

use crate::config::AppConfig;
use crate::error::{Error, Result};

pub const START_TIME_ENV: &str = "WSJRDP_SCRIPTS_START_TIME";
pub const OUT_DIR_ENV: &str = "WSJRDP_SCRIPTS_OUTPUT_DIR";
pub const OUT_DIR_OVERRIDE_ENV: &str = "WSJRDP_SCRIPTS_OUTPUT_DIR__OVERRIDE";

/// Options for building a [`Context`]; everything is optional.
#[derive(Debug, Default, Clone)]
pub struct ContextOptions {
    /// Explicit start time, overriding the environment and the clock.
    pub start_time: Option<NaiveDateTime>,
    /// Output directory template; `{{ filename_suffix }}` and friends
    /// are available. Defaults to the current directory.
    pub out_dir: Option<String>,
    /// Skip interactive production approval prompts.
    pub assume_yes: bool,
}

pub struct Context {
    pub config: AppConfig,
    pub start_time: NaiveDateTime,
    pub out_dir: PathBuf,
    assume_yes: bool,
}

impl Context {
    pub fn new(config: AppConfig, opts: ContextOptions) -> Result<Self> {
        let is_production = config.is_production();
        let start_time = determine_start_time(opts.start_time, is_production);
        tracing::info!(start_time = %start_time, is_production, "Context initialized");

        let mut ctx = Context {
            config,
            start_time,
            out_dir: PathBuf::from("."),
            assume_yes: opts.assume_yes,
        };
        // The override env var beats the CLI option, the plain one is a
        // default for runs without --out-dir.
        let template = std::env::var(OUT_DIR_OVERRIDE_ENV)
            .ok()
            .or(opts.out_dir)
            .or_else(|| std::env::var(OUT_DIR_ENV).ok());
        let out_dir = match &template {
            None => PathBuf::from("."),
            Some(template) => PathBuf::from(ctx.render_template(template)?),
        };
        std::fs::create_dir_all(&out_dir)?;
        ctx.out_dir = out_dir.canonicalize()?;
        tracing::info!(out_dir = %ctx.out_dir.display(), "Output directory resolved");
        Ok(ctx)
    }

    pub fn is_production(&self) -> bool {
        self.config.is_production()
    }

    pub fn today(&self) -> NaiveDate {
        self.start_time.date()
    }

    /// `start_time` formatted for filenames, e.g. `20250815-103027`.
    pub fn start_time_for_filename(&self) -> String {
        self.start_time.format("%Y%m%d-%H%M%S").to_string()
    }

    /// Filename suffix encoding the start time, with a `_PROD` marker in
    /// production so output files are unmistakable.
    pub fn filename_suffix(&self) -> String {
        let mut suffix = self.start_time_for_filename();
        if self.is_production() {
            suffix.push_str("_PROD");
        }
        suffix
    }

    /// Render a small filename or directory template.
    ///
    /// Variables: `filename_suffix`, `is_production`, `start_time`
    /// (ISO), `start_time_for_filename`, `out_dir`. Filters:
    /// `to_ext` (prefix a dot if non-empty), `omit_if_prod`,
    /// `omit_unless_prod`.
    pub fn render_template(&self, template: &str) -> Result<String> {
        let mut env = Environment::new();
        let is_production = self.is_production();
        env.add_filter("to_ext", |value: String| {
            if value.is_empty() {
                value
            } else {
                format!(".{value}")
            }
        });
        env.add_filter("omit_if_prod", move |value: String| {
            if is_production {
                String::new()
            } else {
                value
            }
        });
        env.add_filter("omit_unless_prod", move |value: String| {
            if is_production {
                value
            } else {
                String::new()
            }
        });
        let rendered = env.render_str(
            template,
            template_context! {
                filename_suffix => self.filename_suffix(),
                is_production => is_production,
                start_time => self.start_time.format("%Y-%m-%dT%H:%M:%S").to_string(),
                start_time_for_filename => self.start_time_for_filename(),
                out_dir => self.out_dir.display().to_string(),
            },
        )?;
        Ok(rendered)
    }

    /// Render `template` below `out_dir` and create parent directories.
    /// Paths escaping `out_dir` are rejected.
    pub fn make_out_path(&self, template: &str) -> Result<PathBuf> {
        let rendered = self.render_template(template)?;
        if path_escapes_base(Path::new(&rendered)) {
            return Err(Error::other(format!(
                "Invalid out path '{rendered}', not under {}",
                self.out_dir.display()
            )));
        }
        let path = self.out_dir.join(&rendered);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    /// In production, ask the operator for confirmation on the console
    /// (default No). A decline ends the run cleanly. Outside production
    /// this is a no-op.
    pub fn require_approval_to_run_in_prod(&self, prompt: Option<&str>) -> Result<()> {
        if !self.is_production() {
            tracing::debug!("Not running in production, no approval required");
            return Ok(());
        }
        if self.assume_yes {
            tracing::warn!("Production run approved via --yes");
            return Ok(());
        }
        tracing::warn!("Running in production, asking for operator consent");
        let prompt = prompt.unwrap_or(
            "Do you want to continue running this script in a PRODUCTION environment?",
        );
        let stdin = std::io::stdin();
        if console_confirm(prompt, false, &mut stdin.lock(), &mut std::io::stderr())? {
            tracing::debug!("Operator approved to continue");
            Ok(())
        } else {
            tracing::info!("Ending script: no operator approval given");
            Err(Error::ApprovalDeclined)
        }
    }

    pub fn require_approval_to_send_email_in_prod(&self) -> Result<()> {
        let prompt = format!(
            "Do you want to send email messages in a PRODUCTION environment via SMTP server {}:{}?",
            self.config.smtp_server.as_deref().unwrap_or(""),
            self.config.smtp_port
        );
        self.require_approval_to_run_in_prod(Some(&prompt))
    }
}

fn determine_start_time(explicit: Option<NaiveDateTime>, is_production: bool) -> NaiveDateTime {
    let mut env_val = std::env::var(START_TIME_ENV).ok();
    if is_production && env_val.is_some() {
        tracing::warn!("Production run: ignoring {START_TIME_ENV}");
        env_val = None;
    }
    if let Some(start_time) = explicit {
        tracing::info!(start_time = %start_time, "start_time explicitly given");
        return start_time;
    }
    if let Some(raw) = env_val {
        if let Some(start_time) = parse_start_time(&raw) {
            tracing::info!(start_time = %start_time, "start_time from {START_TIME_ENV}");
            return start_time;
        }
        tracing::warn!(value = raw, "Cannot parse {START_TIME_ENV}, using current time");
    }
    Local::now().naive_local()
}

/// Parse a start time given as ISO datetime, ISO date or German date.
pub fn parse_start_time(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    parse_date(s).and_then(|d| d.and_hms_opt(12, 0, 0))
}

/// Parse a date given as ISO (`2025-06-01`) or German (`01.06.2025`).
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d.%m.%Y"))
        .ok()
}

fn path_escapes_base(path: &Path) -> bool {
    if path.is_absolute() {
        return true;
    }
    let mut depth: i32 = 0;
    for component in path.components() {
        match component {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return true;
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

/// y/N console prompt. Empty input takes the default; anything else must
/// be a yes/no variant.
pub fn console_confirm(
    question: &str,
    default: bool,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<bool> {
    let choices = if default { "Y/n" } else { "y/N" };
    loop {
        write!(output, "{question} [{choices}] ")?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            // EOF counts as taking the default.
            return Ok(default);
        }
        match line.trim().to_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => {
                writeln!(output, "Please respond with 'yes' or 'no' (or 'y' or 'n').")?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_time() {
        assert_eq!(
            parse_start_time("2025-08-15T10:30:27"),
            NaiveDate::from_ymd_opt(2025, 8, 15).and_then(|d| d.and_hms_opt(10, 30, 27))
        );
        assert_eq!(
            parse_start_time("2025-08-15"),
            NaiveDate::from_ymd_opt(2025, 8, 15).and_then(|d| d.and_hms_opt(12, 0, 0))
        );
        assert_eq!(
            parse_start_time("15.08.2025"),
            NaiveDate::from_ymd_opt(2025, 8, 15).and_then(|d| d.and_hms_opt(12, 0, 0))
        );
        assert_eq!(parse_start_time("nope"), None);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2026-01-05"), NaiveDate::from_ymd_opt(2026, 1, 5));
        assert_eq!(parse_date("05.01.2026"), NaiveDate::from_ymd_opt(2026, 1, 5));
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_path_escapes_base() {
        assert!(!path_escapes_base(Path::new("foo/bar.xlsx")));
        assert!(!path_escapes_base(Path::new("foo/../bar.xlsx")));
        assert!(path_escapes_base(Path::new("../escape.xlsx")));
        assert!(path_escapes_base(Path::new("foo/../../escape.xlsx")));
        assert!(path_escapes_base(Path::new("/absolute/escape.xlsx")));
    }

    #[test]
    fn test_console_confirm() {
        let mut out = Vec::new();
        let mut input = "y\n".as_bytes();
        assert!(console_confirm("Continue?", false, &mut input, &mut out).unwrap());

        let mut input = "\n".as_bytes();
        assert!(!console_confirm("Continue?", false, &mut input, &mut out).unwrap());

        let mut input = "maybe\nno\n".as_bytes();
        assert!(!console_confirm("Continue?", true, &mut input, &mut out).unwrap());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[y/N]"));
        assert!(text.contains("Please respond"));
    }
}
