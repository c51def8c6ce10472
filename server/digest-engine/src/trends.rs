//! Failure trends over a run-history file (JSON Lines, one case result per
//! line). Groups failures by fingerprint and ranks the top offenders.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::EngineError;
use crate::types::CaseStatus;

const MAX_ERROR_SAMPLES: usize = 3;
const SAMPLE_PREVIEW_CHARS: usize = 100;

/// One normalized history line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
  pub ts: DateTime<Utc>,
  pub fingerprint: String,
  pub case_name: String,
  pub status: CaseStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Offender {
  pub fingerprint: String,
  pub case_name: String,
  pub count: usize,
  pub first_seen: DateTime<Utc>,
  pub last_seen: DateTime<Utc>,
  pub locations: Vec<String>,
  pub error_samples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub since: Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub until: Option<DateTime<Utc>>,
  pub total_runs: usize,
  pub total_failures: usize,
  /// Percentage, one decimal.
  pub failure_rate: f64,
  pub unique_fingerprints: usize,
  pub offenders: Vec<Offender>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn first_str(raw: &Value, keys: &[&str]) -> Option<String> {
  keys
    .iter()
    .filter_map(|k| raw.get(*k).and_then(Value::as_str))
    .find(|s| !s.is_empty())
    .map(str::to_string)
}

fn millis(value: &Value) -> Option<DateTime<Utc>> {
  let ms = value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))?;
  Utc.timestamp_millis_opt(ms).single()
}

fn rfc3339(value: &Value) -> Option<DateTime<Utc>> {
  let s = value.as_str()?;
  DateTime::parse_from_rfc3339(s)
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

fn entry_time(raw: &Value) -> Option<DateTime<Utc>> {
  raw
    .get("ts")
    .and_then(|v| millis(v).or_else(|| rfc3339(v)))
    .or_else(|| raw.get("timestamp").and_then(rfc3339))
    .or_else(|| raw.get("time").and_then(millis))
}

/// Normalize one raw history object. `None` when it carries no usable time.
pub fn normalize_entry(raw: &Value) -> Option<HistoryEntry> {
  let ts = entry_time(raw)?;
  let status = raw
    .get("status")
    .and_then(Value::as_str)
    .and_then(CaseStatus::from_str_loose)
    .unwrap_or(CaseStatus::Pass);
  Some(HistoryEntry {
    ts,
    fingerprint: first_str(raw, &["fingerprint", "fp"]).unwrap_or_default(),
    case_name: first_str(raw, &["caseName", "testName", "name"])
      .unwrap_or_else(|| "unknown.case".to_string()),
    status,
    location: first_str(raw, &["location", "file"]),
    error_message: first_str(raw, &["errorMessage", "error"]),
  })
}

/// Parse history JSON Lines; malformed or timeless lines are dropped.
pub fn parse_history(raw: &str) -> Vec<HistoryEntry> {
  let mut entries = Vec::new();
  for (line_no, line) in raw.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let entry = serde_json::from_str::<Value>(line)
      .ok()
      .and_then(|v| normalize_entry(&v));
    match entry {
      Some(e) => entries.push(e),
      None => debug!(line = line_no + 1, "dropping unusable history line"),
    }
  }
  entries
}

pub fn read_history(path: &Path) -> Result<Vec<HistoryEntry>, EngineError> {
  let raw = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
  Ok(parse_history(&raw))
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Summarize entries within `[since, until]` (either bound optional) and
/// keep the `top` most frequent failure fingerprints.
pub fn summarize(
  entries: &[HistoryEntry],
  since: Option<DateTime<Utc>>,
  until: Option<DateTime<Utc>>,
  top: usize,
) -> TrendReport {
  let in_window: Vec<&HistoryEntry> = entries
    .iter()
    .filter(|e| since.map_or(true, |s| e.ts >= s) && until.map_or(true, |u| e.ts <= u))
    .collect();

  let mut groups: HashMap<&str, Offender> = HashMap::new();
  let mut total_failures = 0;
  for entry in in_window.iter().filter(|e| e.status == CaseStatus::Fail) {
    total_failures += 1;
    let group = groups
      .entry(entry.fingerprint.as_str())
      .or_insert_with(|| Offender {
        fingerprint: entry.fingerprint.clone(),
        case_name: entry.case_name.clone(),
        count: 0,
        first_seen: entry.ts,
        last_seen: entry.ts,
        locations: Vec::new(),
        error_samples: Vec::new(),
      });
    group.count += 1;
    group.first_seen = group.first_seen.min(entry.ts);
    group.last_seen = group.last_seen.max(entry.ts);
    if let Some(loc) = &entry.location {
      if !group.locations.contains(loc) {
        group.locations.push(loc.clone());
      }
    }
    if let Some(msg) = &entry.error_message {
      if group.error_samples.len() < MAX_ERROR_SAMPLES {
        group.error_samples.push(msg.clone());
      }
    }
  }

  let unique_fingerprints = groups.len();
  let mut offenders: Vec<Offender> = groups.into_values().collect();
  offenders.sort_by(|a, b| {
    b.count
      .cmp(&a.count)
      .then_with(|| a.fingerprint.cmp(&b.fingerprint))
  });
  offenders.truncate(top);

  let total_runs = in_window.len();
  let failure_rate = if total_runs > 0 {
    (total_failures as f64 / total_runs as f64 * 1000.0).round() / 10.0
  } else {
    0.0
  };

  TrendReport {
    since,
    until,
    total_runs,
    total_failures,
    failure_rate,
    unique_fingerprints,
    offenders,
  }
}

/// Human-readable rendering for terminals.
pub fn render_text(report: &TrendReport) -> String {
  let fmt_bound = |b: Option<DateTime<Utc>>| b.map_or_else(|| "*".to_string(), |t| t.to_rfc3339());
  let mut out = String::new();
  out.push_str("=== Failure Trends ===\n");
  let _ = writeln!(out, "Period: {} -> {}", fmt_bound(report.since), fmt_bound(report.until));
  let _ = writeln!(out, "Total test runs: {}", report.total_runs);
  let _ = writeln!(out, "Total failures: {}", report.total_failures);
  let _ = writeln!(out, "Failure rate: {:.1}%", report.failure_rate);
  let _ = writeln!(out, "Unique failure fingerprints: {}", report.unique_fingerprints);
  let _ = writeln!(out, "\n=== Top {} Offenders ===\n", report.offenders.len());
  for (i, o) in report.offenders.iter().enumerate() {
    let _ = writeln!(out, "#{} {} ({} failures)", i + 1, o.case_name, o.count);
    let _ = writeln!(out, "   Fingerprint: {}", o.fingerprint);
    let _ = writeln!(out, "   First seen:  {}", o.first_seen.to_rfc3339());
    let _ = writeln!(out, "   Last seen:   {}", o.last_seen.to_rfc3339());
    if !o.locations.is_empty() {
      let _ = writeln!(out, "   Locations:   {}", o.locations.join(", "));
    }
    if let Some(sample) = o.error_samples.first() {
      let preview: String = sample.chars().take(SAMPLE_PREVIEW_CHARS).collect();
      let ellipsis = if sample.chars().count() > SAMPLE_PREVIEW_CHARS { "..." } else { "" };
      let _ = writeln!(out, "   Error:       {}{}", preview, ellipsis);
    }
    out.push('\n');
  }
  out
}
