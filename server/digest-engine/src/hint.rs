//! One-line triage hints derived from a digest's summary and suspects.

use std::fmt;

use serde::Serialize;

use crate::rank::first_line;
use crate::types::Digest;

/// Digests using at least this share of their byte budget count as clipped.
pub const CLIPPED_RATIO: f64 = 0.9;
const SIGNAL_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HintKind {
  BudgetClipped,
  RedactionMismatch,
  ErrorSignal,
  Unknown,
}

impl HintKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::BudgetClipped => "budget-clipped",
      Self::RedactionMismatch => "redaction-mismatch",
      Self::ErrorSignal => "error-signal",
      Self::Unknown => "unknown",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriageHint {
  pub kind: HintKind,
  pub case_id: String,
  pub message: String,
}

impl fmt::Display for TriageHint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}] {} ({})", self.kind.as_str(), self.message, self.case_id)
  }
}

/// `<file stem>/<test name with whitespace as _>`, e.g. `a.test/should_fail`.
pub fn case_id(location: &str, test_name: &str) -> String {
  let file = location
    .rsplit(['/', '\\'])
    .next()
    .filter(|f| !f.is_empty())
    .map(|f| f.strip_suffix(".ts").or_else(|| f.strip_suffix(".js")).unwrap_or(f))
    .unwrap_or("unknown");
  let name: String = test_name.split_whitespace().collect::<Vec<_>>().join("_");
  format!("{}/{}", file, name)
}

/// Classify a digest. Checks run in order; the first that applies wins.
pub fn triage_hint(digest: &Digest, case_id: &str) -> TriageHint {
  let s = &digest.summary;
  let hint = |kind, message: String| TriageHint {
    kind,
    case_id: case_id.to_string(),
    message,
  };

  if s.budget_limit > 0 && s.budget_used as f64 >= s.budget_limit as f64 * CLIPPED_RATIO {
    return hint(
      HintKind::BudgetClipped,
      format!(
        "budget={}/{}; widen the budget or narrow the rules",
        s.budget_used, s.budget_limit
      ),
    );
  }

  if s.redacted_fields == 0 && s.total_events > 0 {
    return hint(
      HintKind::RedactionMismatch,
      format!("no redactions across {} events; check the redact keys", s.total_events),
    );
  }

  if let Some(top) = digest.suspects.first() {
    let text = top
      .message
      .as_deref()
      .or(digest.error.as_deref())
      .unwrap_or("unknown error");
    return hint(
      HintKind::ErrorSignal,
      format!("{}: {}...", top.evt, first_line(text, SIGNAL_CHARS)),
    );
  }

  hint(HintKind::Unknown, "no signal in digest".to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::*;
  use serde_json::Value;

  fn digest(used: usize, redacted: usize, suspects: Vec<Suspect>) -> Digest {
    Digest {
      case: "c".into(),
      status: CaseStatus::Fail,
      duration: 0,
      location: "tests/a.test.ts".into(),
      error: Some("AssertionError: expected 500 to be 200 but the server said no\nstack".into()),
      failure: Event {
        seq: 0,
        ts: None,
        lvl: Level::Error,
        evt: "assert.fail".into(),
        case: None,
        phase: None,
        payload: Value::Null,
      },
      events: Vec::new(),
      code_frames: Vec::new(),
      suspects,
      summary: DigestSummary {
        total_events: 12,
        retained_events: 5,
        budget_used: used,
        budget_limit: 1000,
        line_limit: 200,
        redacted_fields: redacted,
        dropped_lines: 0,
        clipped: false,
      },
    }
  }

  fn suspect(message: Option<&str>) -> Suspect {
    Suspect {
      seq: 0,
      evt: "assert.fail".into(),
      lvl: Level::Error,
      score: 1.0,
      reasons: Vec::new(),
      message: message.map(Into::into),
    }
  }

  #[test]
  fn case_id_from_location_and_name() {
    assert_eq!(case_id("tests/a.test.ts", "should fail  now"), "a.test/should_fail_now");
    assert_eq!(case_id("", "x"), "unknown/x");
  }

  #[test]
  fn budget_clipped_wins_first() {
    let h = triage_hint(&digest(900, 0, vec![suspect(None)]), "a/b");
    assert_eq!(h.kind, HintKind::BudgetClipped);
    assert!(h.message.contains("900/1000"));
  }

  #[test]
  fn no_redactions_flags_mismatch() {
    let h = triage_hint(&digest(100, 0, Vec::new()), "a/b");
    assert_eq!(h.kind, HintKind::RedactionMismatch);
  }

  #[test]
  fn error_signal_uses_top_suspect_then_case_error() {
    let h = triage_hint(&digest(100, 1, vec![suspect(Some("boom"))]), "a/b");
    assert_eq!(h.kind, HintKind::ErrorSignal);
    assert_eq!(h.message, "assert.fail: boom...");

    let h = triage_hint(&digest(100, 1, vec![suspect(None)]), "a/b");
    assert_eq!(h.message, "assert.fail: AssertionError: expected 500 to be 200 b...");
    assert_eq!(h.to_string(), format!("[error-signal] {} (a/b)", h.message));
  }

  #[test]
  fn unknown_fallback() {
    let h = triage_hint(&digest(100, 1, Vec::new()), "a/b");
    assert_eq!(h.kind, HintKind::Unknown);
  }
}
