//! fp-compare: fingerprint regression gate for CI
//!
//! Usage:
//!   fp-compare <base.json> <head.json>                  # JSON report on stdout
//!   fp-compare <base.json> <head.json> --format markdown --output report.md
//!   fp-compare <base.json> <head.json> --policy rules.json -q
//!
//! Exit codes: 0 = no blocking regression, 1 = regression, 2 = usage or input error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use digest_engine::records::load_records;
use digest_engine::report::{fingerprint_report_markdown, to_json};
use digest_engine::{compare_fingerprints, DiffResult, DigestConfig, GatePolicy, GateVerdict};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Markdown,
}

#[derive(Parser, Debug)]
#[command(name = "fp-compare")]
#[command(about = "Compare base and head failure fingerprints; fail on regressions")]
struct Cli {
    base: PathBuf,
    head: PathBuf,

    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Also write the report to this file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Rules document whose `gate` section sets the policy (default: strict).
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Quiet: only the exit code.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Serialize)]
struct GateReport<'a> {
    #[serde(flatten)]
    diff: &'a DiffResult,
    gate: &'a GateVerdict,
}

struct Outcome {
    report: String,
    verdict: GateVerdict,
}

fn load_existing(path: &Path) -> Result<Vec<digest_engine::FingerprintRecord>> {
    if !path.is_file() {
        bail!("fingerprint file not found: {}", path.display());
    }
    load_records(path).with_context(|| format!("cannot read {}", path.display()))
}

fn load_policy(path: Option<&Path>) -> Result<GatePolicy> {
    match path {
        Some(p) => Ok(DigestConfig::from_file(p)
            .with_context(|| format!("invalid policy in {}", p.display()))?
            .gate),
        None => Ok(GatePolicy::default()),
    }
}

fn run(cli: &Cli) -> Result<Outcome> {
    let base = load_existing(&cli.base)?;
    let head = load_existing(&cli.head)?;
    let policy = load_policy(cli.policy.as_deref())?;

    let diff = compare_fingerprints(&base, &head);
    let verdict = policy.evaluate(&diff);

    let report = match cli.format {
        Format::Json => to_json(
            &GateReport {
                diff: &diff,
                gate: &verdict,
            },
            true,
        )?,
        Format::Markdown => {
            let mut md = fingerprint_report_markdown(&diff);
            if !verdict.allowed.is_empty() {
                md.push_str("## Allowed by Policy\n\n");
                for record in &verdict.allowed {
                    md.push_str(&format!("- `{}` {}\n", record.fingerprint, record.test_name));
                }
                md.push('\n');
            }
            md
        }
    };
    Ok(Outcome { report, verdict })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = run(&cli).unwrap_or_else(|e| {
        eprintln!("fp-compare: {:#}", e);
        process::exit(2);
    });

    if let Some(path) = &cli.output {
        if let Err(e) = fs::write(path, &outcome.report) {
            eprintln!("fp-compare: cannot write {}: {}", path.display(), e);
            process::exit(2);
        }
        info!(path = %path.display(), "comparison written");
    }

    if !cli.quiet {
        println!("{}", outcome.report);
    }

    if outcome.verdict.regressed {
        if !cli.quiet {
            eprintln!(
                "fp-compare: regression detected ({} blocking fingerprint(s))",
                outcome.verdict.blocking.len()
            );
        }
        process::exit(1);
    }
    process::exit(0);
}
