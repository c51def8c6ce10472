//! Binary entrypoint: digest failing cases, diff digests, extract
//! fingerprints, summarize history trends, and inspect path normalization.
//!
//! Machine output goes to stdout; logs go to stderr (`RUST_LOG`).

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use digest_engine::engine::{read_digest, write_digest};
use digest_engine::hint::{case_id, triage_hint};
use digest_engine::normalize::{normalize_path_detailed, NormalizedPath};
use digest_engine::types::CaseStatus;
use digest_engine::{
  compare_digests, records, report, trends, CaseInput, DigestConfig, DigestEngine, NormalizeOptions,
};

#[derive(Parser, Debug)]
#[command(name = "digest-engine")]
#[command(about = "Deterministic failure digests, fingerprints and regression diffs")]
struct Cli {
  /// Rules document (budget, rules, redaction, project roots, gate).
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Generate digests for failing cases.
  Digest(DigestArgs),
  /// Compare two digest files.
  Diff(DiffArgs),
  /// Fingerprint every failed case under a reports directory.
  Extract(ExtractArgs),
  /// Summarize failure trends from a history file.
  Trends(TrendsArgs),
  /// Show how stack paths normalize.
  Normalize(NormalizeArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
  Json,
  Markdown,
}

#[derive(Args, Debug)]
struct DigestArgs {
  /// JSON array of cases: `[{"case", "status", "duration", "location", "logPath", "error"}]`.
  #[arg(long, conflicts_with = "log")]
  manifest: Option<PathBuf>,

  /// Event log of a single case.
  #[arg(long, requires = "case")]
  log: Option<PathBuf>,

  #[arg(long)]
  case: Option<String>,

  #[arg(long, default_value = "fail")]
  status: String,

  #[arg(long, default_value_t = 0)]
  duration: u64,

  #[arg(long, default_value = "")]
  location: String,

  #[arg(long)]
  error: Option<String>,

  /// Directory stack paths are resolved against for code frames.
  #[arg(long, default_value = ".")]
  source_root: PathBuf,

  /// Write `<stem>.digest.json` beside each log instead of printing.
  #[arg(long)]
  write: bool,

  /// Print a triage hint per digest to stderr.
  #[arg(long)]
  hints: bool,
}

#[derive(Args, Debug)]
struct DiffArgs {
  left: PathBuf,
  right: PathBuf,
  #[arg(long, value_enum, default_value_t = Format::Json)]
  format: Format,
  #[arg(long)]
  output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ExtractArgs {
  #[arg(long, default_value = "reports")]
  reports: PathBuf,
  /// Write the fingerprint array here instead of stdout.
  #[arg(long)]
  output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TrendsArgs {
  #[arg(long, default_value = "reports/history.jsonl")]
  history: PathBuf,
  /// RFC3339 timestamp or YYYY-MM-DD.
  #[arg(long, value_parser = parse_time)]
  since: Option<DateTime<Utc>>,
  #[arg(long, value_parser = parse_time)]
  until: Option<DateTime<Utc>>,
  #[arg(long, default_value_t = 10)]
  top: usize,
  #[arg(long)]
  json: bool,
}

#[derive(Args, Debug)]
struct NormalizeArgs {
  #[arg(required = true)]
  paths: Vec<PathBuf>,
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|dt| dt.and_utc())
    .ok_or_else(|| format!("expected RFC3339 or YYYY-MM-DD, got {:?}", s))
}

fn load_config(path: Option<&Path>) -> Result<DigestConfig> {
  match path {
    Some(p) => DigestConfig::from_file(p).with_context(|| format!("loading {}", p.display())),
    None => Ok(DigestConfig::default()),
  }
}

fn emit(text: &str, output: Option<&Path>) -> Result<()> {
  match output {
    Some(path) => {
      std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
      info!(path = %path.display(), "output written");
    }
    None => {
      let mut out = io::stdout().lock();
      writeln!(out, "{}", text)?;
    }
  }
  Ok(())
}

fn run_digest(config: DigestConfig, args: DigestArgs) -> Result<()> {
  let cases: Vec<CaseInput> = match (&args.manifest, &args.log) {
    (Some(manifest), _) => {
      let raw = std::fs::read_to_string(manifest)
        .with_context(|| format!("reading {}", manifest.display()))?;
      serde_json::from_str(&raw).with_context(|| format!("parsing {}", manifest.display()))?
    }
    (None, Some(log)) => {
      let Some(status) = CaseStatus::from_str_loose(&args.status) else {
        bail!("unknown status {:?}", args.status);
      };
      vec![CaseInput {
        case: args.case.clone().unwrap_or_default(),
        status,
        duration: args.duration,
        location: args.location.clone(),
        log_path: log.clone(),
        error: args.error.clone(),
      }]
    }
    (None, None) => bail!("either --manifest or --log is required"),
  };

  let opts = NormalizeOptions::from_env(config.project_roots.clone());
  let engine = DigestEngine::new(config, opts, args.source_root)?;
  let digests = engine.generate_all(&cases);

  let mut out = io::stdout().lock();
  for (case, digest) in cases.iter().zip(digests) {
    let Some(digest) = digest else {
      warn!(case = %case.case, "no digest produced");
      continue;
    };
    if args.hints {
      let hint = triage_hint(&digest, &case_id(&case.location, &case.case));
      eprintln!("{}", hint);
    }
    if args.write {
      let path = write_digest(&digest, &case.log_path)?;
      info!(case = %case.case, path = %path.display(), "digest written");
    } else {
      serde_json::to_writer(&mut out, &digest)?;
      writeln!(out)?;
    }
  }
  Ok(())
}

fn run_diff(args: DiffArgs) -> Result<()> {
  let left = read_digest(&args.left)?;
  let right = read_digest(&args.right)?;
  let diff = compare_digests(&left, &right);
  let text = match args.format {
    Format::Json => report::to_json(&diff, true)?,
    Format::Markdown => report::digest_diff_markdown(&diff),
  };
  emit(&text, args.output.as_deref())
}

fn run_extract(config: DigestConfig, args: ExtractArgs) -> Result<()> {
  let opts = NormalizeOptions::from_env(config.project_roots.clone());
  let records = records::extract_records(&args.reports, &opts);
  info!(count = records.len(), dir = %args.reports.display(), "fingerprints extracted");
  match &args.output {
    Some(path) => records::save_records(path, &records)?,
    None => emit(&report::to_json(&records, true)?, None)?,
  }
  Ok(())
}

fn run_trends(args: TrendsArgs) -> Result<()> {
  let entries = trends::read_history(&args.history)?;
  let summary = trends::summarize(&entries, args.since, args.until, args.top);
  let text = if args.json {
    report::to_json(&summary, true)?
  } else {
    trends::render_text(&summary)
  };
  emit(&text, None)
}

fn run_normalize(config: DigestConfig, args: NormalizeArgs) -> Result<()> {
  let opts = NormalizeOptions::from_env(config.project_roots);
  let mut out = io::stdout().lock();
  for path in &args.paths {
    let raw = path.to_string_lossy();
    match normalize_path_detailed(&raw, &opts) {
      NormalizedPath::Normalized { path, rule } => writeln!(out, "{}\t{}", path, rule.as_str())?,
      NormalizedPath::Passthrough(path) => writeln!(out, "{}\tpassthrough", path)?,
    }
  }
  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .with_target(false)
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();
  let config = load_config(cli.config.as_deref())?;

  match cli.command {
    Command::Digest(args) => run_digest(config, args),
    Command::Diff(args) => run_diff(args),
    Command::Extract(args) => run_extract(config, args),
    Command::Trends(args) => run_trends(args),
    Command::Normalize(args) => run_normalize(config, args),
  }
}
