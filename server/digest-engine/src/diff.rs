//! Diff engine: fingerprint-set comparison (the regression signal) and a
//! structural comparison of two digests.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::*;

// ---------------------------------------------------------------------------
// Fingerprint sets
// ---------------------------------------------------------------------------

/// One record per fingerprint: a later duplicate replaces the earlier record
/// but keeps its position.
fn dedupe(records: &[FingerprintRecord]) -> Vec<&FingerprintRecord> {
  let mut slots: HashMap<&str, usize> = HashMap::new();
  let mut out: Vec<&FingerprintRecord> = Vec::new();
  for record in records {
    match slots.get(record.fingerprint.as_str()) {
      Some(&i) => out[i] = record,
      None => {
        slots.insert(record.fingerprint.as_str(), out.len());
        out.push(record);
      }
    }
  }
  out
}

/// Compare two runs purely by fingerprint identity.
///
/// Added and unchanged entries follow head order (unchanged entries carry
/// the head record); removed entries follow base order. Counts in the
/// summary's `baseCount`/`headCount` are the raw input lengths.
pub fn compare_fingerprints(base: &[FingerprintRecord], head: &[FingerprintRecord]) -> DiffResult {
  let base_set: HashSet<&str> = base.iter().map(|r| r.fingerprint.as_str()).collect();
  let head_set: HashSet<&str> = head.iter().map(|r| r.fingerprint.as_str()).collect();

  let mut added = Vec::new();
  let mut unchanged = Vec::new();
  for record in dedupe(head) {
    if base_set.contains(record.fingerprint.as_str()) {
      unchanged.push(record.clone());
    } else {
      added.push(record.clone());
    }
  }
  let removed: Vec<FingerprintRecord> = dedupe(base)
    .into_iter()
    .filter(|r| !head_set.contains(r.fingerprint.as_str()))
    .cloned()
    .collect();

  DiffResult {
    summary: DiffSummary {
      base_count: base.len(),
      head_count: head.len(),
      added: added.len(),
      removed: removed.len(),
      unchanged: unchanged.len(),
      regression_detected: !added.is_empty(),
    },
    added_fingerprints: added,
    removed_fingerprints: removed,
    unchanged_fingerprints: unchanged,
  }
}

// ---------------------------------------------------------------------------
// Digest comparison
// ---------------------------------------------------------------------------

/// One scalar field that differs between two digests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
  pub field: String,
  pub left: Value,
  pub right: Value,
}

/// Right-minus-left deltas of the summary counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDelta {
  pub total_events: i64,
  pub retained_events: i64,
  pub budget_used: i64,
  pub redacted_fields: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestDiff {
  pub left_case: String,
  pub right_case: String,
  pub identical: bool,
  pub changes: Vec<FieldChange>,
  /// Retained events present only in the right digest.
  pub added_events: Vec<Event>,
  /// Retained events present only in the left digest.
  pub removed_events: Vec<Event>,
  pub common_events: usize,
  pub added_suspects: Vec<Suspect>,
  pub removed_suspects: Vec<Suspect>,
  pub summary_delta: SummaryDelta,
}

/// Content signature of an event; position and timestamp are ignored so
/// the same log line matches across runs.
fn event_signature(event: &Event) -> String {
  let mut hasher = blake3::Hasher::new();
  hasher.update(event.evt.as_bytes());
  hasher.update(b"|");
  hasher.update(event.lvl.as_str().as_bytes());
  hasher.update(b"|");
  hasher.update(event.payload.to_string().as_bytes());
  hasher.finalize().to_hex().to_string()
}

fn suspect_key(s: &Suspect) -> (String, Option<String>) {
  (s.evt.clone(), s.message.clone())
}

fn push_change(changes: &mut Vec<FieldChange>, field: &str, left: Value, right: Value) {
  if left != right {
    changes.push(FieldChange {
      field: field.to_string(),
      left,
      right,
    });
  }
}

fn retained(digest: &Digest) -> impl Iterator<Item = &Event> {
  std::iter::once(&digest.failure).chain(digest.events.iter())
}

fn delta(left: usize, right: usize) -> i64 {
  right as i64 - left as i64
}

/// Structural diff of two digests (typically base vs head of one case).
pub fn compare_digests(left: &Digest, right: &Digest) -> DigestDiff {
  let mut changes = Vec::new();
  push_change(&mut changes, "case", left.case.clone().into(), right.case.clone().into());
  push_change(
    &mut changes,
    "status",
    left.status.to_string().into(),
    right.status.to_string().into(),
  );
  push_change(&mut changes, "duration", left.duration.into(), right.duration.into());
  push_change(
    &mut changes,
    "location",
    left.location.clone().into(),
    right.location.clone().into(),
  );
  push_change(&mut changes, "error", left.error.clone().into(), right.error.clone().into());
  push_change(
    &mut changes,
    "failure.evt",
    left.failure.evt.clone().into(),
    right.failure.evt.clone().into(),
  );
  push_change(
    &mut changes,
    "failure.message",
    left.failure.payload_str("message").into(),
    right.failure.payload_str("message").into(),
  );

  let left_sigs: HashSet<String> = retained(left).map(event_signature).collect();
  let right_sigs: HashSet<String> = retained(right).map(event_signature).collect();

  let added_events: Vec<Event> = retained(right)
    .filter(|e| !left_sigs.contains(&event_signature(e)))
    .cloned()
    .collect();
  let removed_events: Vec<Event> = retained(left)
    .filter(|e| !right_sigs.contains(&event_signature(e)))
    .cloned()
    .collect();
  let common_events = left_sigs.intersection(&right_sigs).count();

  let left_suspects: HashSet<_> = left.suspects.iter().map(suspect_key).collect();
  let right_suspects: HashSet<_> = right.suspects.iter().map(suspect_key).collect();
  let added_suspects: Vec<Suspect> = right
    .suspects
    .iter()
    .filter(|s| !left_suspects.contains(&suspect_key(s)))
    .cloned()
    .collect();
  let removed_suspects: Vec<Suspect> = left
    .suspects
    .iter()
    .filter(|s| !right_suspects.contains(&suspect_key(s)))
    .cloned()
    .collect();

  let summary_delta = SummaryDelta {
    total_events: delta(left.summary.total_events, right.summary.total_events),
    retained_events: delta(left.summary.retained_events, right.summary.retained_events),
    budget_used: delta(left.summary.budget_used, right.summary.budget_used),
    redacted_fields: delta(left.summary.redacted_fields, right.summary.redacted_fields),
  };

  let identical = changes.is_empty()
    && added_events.is_empty()
    && removed_events.is_empty()
    && added_suspects.is_empty()
    && removed_suspects.is_empty();

  DigestDiff {
    left_case: left.case.clone(),
    right_case: right.case.clone(),
    identical,
    changes,
    added_events,
    removed_events,
    common_events,
    added_suspects,
    removed_suspects,
    summary_delta,
  }
}
