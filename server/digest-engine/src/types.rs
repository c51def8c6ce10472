//! Core types for the digest engine (JSON contracts + internal models).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Inbound types (JSON contract: one line of a case's event log)
// ---------------------------------------------------------------------------

/// One raw event-log line. Unknown fields are silently ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundEvent {
  /// Epoch milliseconds or an RFC3339 string.
  #[serde(default)]
  pub ts: Option<Value>,
  #[serde(default)]
  pub lvl: Option<String>,
  #[serde(default)]
  pub case: Option<String>,
  #[serde(default)]
  pub phase: Option<String>,
  #[serde(default)]
  pub evt: Option<String>,
  #[serde(default)]
  pub payload: Option<Value>,
}

// ---------------------------------------------------------------------------
// Level enum (normalized)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
  Trace,
  Debug,
  Info,
  Warn,
  Error,
  Fatal,
}

impl Level {
  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.to_ascii_lowercase().as_str() {
      "trace" => Some(Self::Trace),
      "debug" => Some(Self::Debug),
      "info" | "log" => Some(Self::Info),
      "warn" | "warning" => Some(Self::Warn),
      "error" | "err" => Some(Self::Error),
      "fatal" | "critical" | "crit" => Some(Self::Fatal),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Trace => "trace",
      Self::Debug => "debug",
      Self::Info => "info",
      Self::Warn => "warn",
      Self::Error => "error",
      Self::Fatal => "fatal",
    }
  }
}

// ---------------------------------------------------------------------------
// Internal normalized event
// ---------------------------------------------------------------------------

/// One logged instant of a test case. `seq` is the zero-based line order
/// within the case's log and never changes after reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  #[serde(default)]
  pub seq: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ts: Option<i64>,
  pub lvl: Level,
  pub evt: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub case: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phase: Option<String>,
  #[serde(default, skip_serializing_if = "Value::is_null")]
  pub payload: Value,
}

impl Event {
  /// String field from the payload object, if present.
  pub fn payload_str(&self, key: &str) -> Option<&str> {
    self.payload.get(key).and_then(Value::as_str)
  }

  /// True when this event marks the case as failed.
  pub fn is_failure(&self) -> bool {
    self.lvl >= Level::Error
      || self
        .payload_str("status")
        .is_some_and(|s| s.eq_ignore_ascii_case("fail"))
  }
}

// ---------------------------------------------------------------------------
// Case status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
  #[serde(alias = "PASS")]
  Pass,
  #[serde(alias = "FAIL")]
  Fail,
  #[serde(alias = "SKIP")]
  Skip,
}

impl CaseStatus {
  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.to_ascii_lowercase().as_str() {
      "pass" | "passed" | "ok" => Some(Self::Pass),
      "fail" | "failed" | "error" => Some(Self::Fail),
      "skip" | "skipped" | "todo" => Some(Self::Skip),
      _ => None,
    }
  }
}

impl fmt::Display for CaseStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Pass => "pass",
      Self::Fail => "fail",
      Self::Skip => "skip",
    })
  }
}

// ---------------------------------------------------------------------------
// Failure identity
// ---------------------------------------------------------------------------

/// Minimal description of one failure, derived per failing case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureInfo {
  pub test_name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error_type: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub stack_location: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error_message: Option<String>,
  /// False when the stack file went through the normalizer unchanged.
  #[serde(skip)]
  pub location_normalized: bool,
}

/// A stable hex string identifying a failure across runs and checkouts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// One failing case of one run, as persisted in `fingerprints.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FingerprintRecord {
  pub test_name: String,
  pub fingerprint: Fingerprint,
  #[serde(default)]
  pub location: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error_type: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stack_location: Option<String>,
}

// ---------------------------------------------------------------------------
// Digest (output contract: one JSON object per failing case)
// ---------------------------------------------------------------------------

/// Source lines around one stack location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFrame {
  pub file: String,
  pub line: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub column: Option<u32>,
  pub snippet: String,
}

/// A retained event ranked as likely relevant to the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suspect {
  pub seq: usize,
  pub evt: String,
  pub lvl: Level,
  pub score: f64,
  #[serde(default)]
  pub reasons: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestSummary {
  pub total_events: usize,
  pub retained_events: usize,
  /// Serialized bytes of the digest, after redaction and truncation.
  pub budget_used: usize,
  pub budget_limit: usize,
  pub line_limit: usize,
  pub redacted_fields: usize,
  #[serde(default)]
  pub dropped_lines: usize,
  /// Set when selected events were left out for lack of budget.
  #[serde(default)]
  pub clipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Digest {
  pub case: String,
  pub status: CaseStatus,
  pub duration: u64,
  pub location: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  pub failure: Event,
  /// Retained context events in log order, failure event excluded.
  #[serde(default)]
  pub events: Vec<Event>,
  #[serde(default)]
  pub code_frames: Vec<CodeFrame>,
  #[serde(default)]
  pub suspects: Vec<Suspect>,
  pub summary: DigestSummary,
}

// ---------------------------------------------------------------------------
// Fingerprint comparison result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
  pub base_count: usize,
  pub head_count: usize,
  pub added: usize,
  pub removed: usize,
  pub unchanged: usize,
  pub regression_detected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
  pub summary: DiffSummary,
  pub added_fingerprints: Vec<FingerprintRecord>,
  pub removed_fingerprints: Vec<FingerprintRecord>,
  pub unchanged_fingerprints: Vec<FingerprintRecord>,
}
