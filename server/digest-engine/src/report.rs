//! Renderers for digests and diff results: JSON (compact or pretty) and
//! Markdown.
//!
//! Both renderers read the same structure, so every count and fingerprint
//! in the Markdown report is also present in the JSON one.

use std::fmt::Write as _;

use serde::Serialize;

use crate::diff::DigestDiff;
use crate::error::EngineError;
use crate::rank::first_line;
use crate::types::{Digest, DiffResult, Event, FingerprintRecord};

const ERROR_PREVIEW_CHARS: usize = 100;

pub fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, EngineError> {
  let out = if pretty {
    serde_json::to_string_pretty(value)?
  } else {
    serde_json::to_string(value)?
  };
  Ok(out)
}

fn push_record(md: &mut String, record: &FingerprintRecord, detailed: bool) {
  let _ = writeln!(md, "### {}", record.test_name);
  let _ = writeln!(md, "- **Fingerprint**: `{}`", record.fingerprint);
  let _ = writeln!(md, "- **Location**: {}", record.location);
  if let Some(t) = &record.error_type {
    let _ = writeln!(md, "- **Error Type**: {}", t);
  }
  if detailed {
    if let Some(loc) = &record.stack_location {
      let _ = writeln!(md, "- **Stack Location**: {}", loc);
    }
    if let Some(err) = &record.error {
      let _ = writeln!(md, "- **Error**: {}", first_line(err, ERROR_PREVIEW_CHARS));
    }
  }
  md.push('\n');
}

/// Markdown regression report for a fingerprint comparison.
pub fn fingerprint_report_markdown(diff: &DiffResult) -> String {
  let s = &diff.summary;
  let mut md = String::new();
  md.push_str("# Digest/Fingerprint Regression Report\n\n");
  md.push_str("## Summary\n");
  let _ = writeln!(md, "- Base failures: {}", s.base_count);
  let _ = writeln!(md, "- Head failures: {}", s.head_count);
  let _ = writeln!(md, "- Added failures: {}", s.added);
  let _ = writeln!(md, "- Removed failures: {}", s.removed);
  let _ = writeln!(md, "- Unchanged failures: {}", s.unchanged);
  md.push('\n');

  if s.regression_detected {
    md.push_str("## ⚠️ Regression Detected\n\n");
    md.push_str("New failure fingerprints were detected. This change introduces regressions.\n\n");
  } else if s.removed > 0 {
    md.push_str("## ✅ Improvements Detected\n\n");
    md.push_str("Some failure fingerprints were removed. This change fixes issues.\n\n");
  } else {
    md.push_str("## ✅ No Changes Detected\n\n");
    md.push_str("Failure fingerprints are unchanged.\n\n");
  }

  if !diff.added_fingerprints.is_empty() {
    md.push_str("## Added Fingerprints\n\n");
    for record in &diff.added_fingerprints {
      push_record(&mut md, record, true);
    }
  }
  if !diff.removed_fingerprints.is_empty() {
    md.push_str("## Removed Fingerprints (Fixes)\n\n");
    for record in &diff.removed_fingerprints {
      push_record(&mut md, record, false);
    }
  }
  md
}

fn event_line(event: &Event) -> String {
  let mut line = format!("- `#{}` **{}** ({})", event.seq, event.evt, event.lvl.as_str());
  if let Some(msg) = event.payload_str("message") {
    let _ = write!(line, ": {}", first_line(msg, ERROR_PREVIEW_CHARS));
  }
  line
}

fn signed(n: i64) -> String {
  if n > 0 {
    format!("+{}", n)
  } else {
    n.to_string()
  }
}

/// Human-readable digest for one case, written beside the JSON digest.
pub fn digest_markdown(digest: &Digest) -> String {
  let s = &digest.summary;
  let mut md = String::new();
  let _ = writeln!(md, "# Digest: {}
", digest.case);
  let _ = writeln!(md, "- Status: {}", digest.status);
  let _ = writeln!(md, "- Duration: {}ms", digest.duration);
  if !digest.location.is_empty() {
    let _ = writeln!(md, "- Location: {}", digest.location);
  }
  if let Some(err) = &digest.error {
    let _ = writeln!(md, "- Error: {}", first_line(err, ERROR_PREVIEW_CHARS));
  }
  md.push('\n');

  md.push_str("## Failure\n\n");
  md.push_str(&event_line(&digest.failure));
  md.push_str("\n\n");

  if !digest.suspects.is_empty() {
    md.push_str("## Suspects\n\n");
    for (i, suspect) in digest.suspects.iter().enumerate() {
      let _ = write!(md, "{}. `#{}` **{}** (score {:.3})", i + 1, suspect.seq, suspect.evt, suspect.score);
      if !suspect.reasons.is_empty() {
        let _ = write!(md, " [{}]", suspect.reasons.join(", "));
      }
      md.push('\n');
    }
    md.push('\n');
  }

  if !digest.code_frames.is_empty() {
    md.push_str("## Code Frames\n\n");
    for frame in &digest.code_frames {
      let _ = writeln!(md, "`{}:{}`\n", frame.file, frame.line);
      let _ = writeln!(md, "```\n{}\n```\n", frame.snippet);
    }
  }

  if !digest.events.is_empty() {
    let _ = writeln!(md, "## Context Events ({})\n", digest.events.len());
    for event in &digest.events {
      md.push_str(&event_line(event));
      md.push('\n');
    }
    md.push('\n');
  }

  md.push_str("## Summary\n\n");
  let _ = writeln!(md, "- Events: {}/{} retained", s.retained_events, s.total_events);
  let _ = writeln!(md, "- Budget: {}/{} bytes, {} lines max", s.budget_used, s.budget_limit, s.line_limit);
  let _ = writeln!(md, "- Redacted fields: {}", s.redacted_fields);
  if s.dropped_lines > 0 {
    let _ = writeln!(md, "- Dropped lines: {}", s.dropped_lines);
  }
  if s.clipped {
    md.push_str("- Clipped: yes\n");
  }
  md
}

/// Markdown rendering of a digest-to-digest comparison.
pub fn digest_diff_markdown(diff: &DigestDiff) -> String {
  let mut md = String::new();
  md.push_str("# Digest Diff\n\n");
  let _ = writeln!(md, "- Left: {}", diff.left_case);
  let _ = writeln!(md, "- Right: {}", diff.right_case);
  let _ = writeln!(md, "- Common events: {}", diff.common_events);
  md.push('\n');

  if diff.identical {
    md.push_str("## ✅ No Differences\n\nThe digests carry the same failure and events.\n");
    return md;
  }

  if !diff.changes.is_empty() {
    md.push_str("## Changed Fields\n\n");
    md.push_str("| Field | Left | Right |\n|---|---|---|\n");
    for change in &diff.changes {
      let _ = writeln!(md, "| {} | `{}` | `{}` |", change.field, change.left, change.right);
    }
    md.push('\n');
  }

  for (title, events) in [
    ("Added Events", &diff.added_events),
    ("Removed Events", &diff.removed_events),
  ] {
    if events.is_empty() {
      continue;
    }
    let _ = writeln!(md, "## {} ({})\n", title, events.len());
    for event in events {
      md.push_str(&event_line(event));
      md.push('\n');
    }
    md.push('\n');
  }

  for (title, suspects) in [
    ("New Suspects", &diff.added_suspects),
    ("Resolved Suspects", &diff.removed_suspects),
  ] {
    if suspects.is_empty() {
      continue;
    }
    let _ = writeln!(md, "## {}\n", title);
    for s in suspects {
      let _ = write!(md, "- **{}** (score {:.3})", s.evt, s.score);
      if let Some(msg) = &s.message {
        let _ = write!(md, ": {}", msg);
      }
      md.push('\n');
    }
    md.push('\n');
  }

  let d = &diff.summary_delta;
  md.push_str("## Summary Delta\n\n");
  let _ = writeln!(md, "- Total events: {}", signed(d.total_events));
  let _ = writeln!(md, "- Retained events: {}", signed(d.retained_events));
  let _ = writeln!(md, "- Budget used: {} bytes", signed(d.budget_used));
  let _ = writeln!(md, "- Redacted fields: {}", signed(d.redacted_fields));
  md
}
