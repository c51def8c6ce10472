//! Rank retained events into suspects.
//!
//! Scoring: weighted combination of event-type relevance (assertions and
//! error-level events outrank informational ones) and proximity to the
//! failure event in log order.

use serde_json::Value;

use crate::types::{Event, Level, Suspect};

const RELEVANCE_WEIGHT: f64 = 0.6;
const PROXIMITY_WEIGHT: f64 = 0.4;
const MESSAGE_MAX_CHARS: usize = 120;

const FAILURE_WORDS: &[&str] = &["error", "fail", "exception", "timeout", "reject", "panic"];

/// First line of a message, char-truncated.
pub fn first_line(text: &str, max_chars: usize) -> String {
  let line = text.lines().next().unwrap_or("");
  line.chars().take(max_chars).collect()
}

fn message_of(event: &Event) -> Option<String> {
  let text = match &event.payload {
    Value::String(s) => Some(s.as_str()),
    Value::Object(_) => event
      .payload_str("message")
      .or_else(|| event.payload_str("error"))
      .or_else(|| event.payload_str("msg")),
    _ => None,
  }?;
  let line = first_line(text, MESSAGE_MAX_CHARS);
  (!line.is_empty()).then_some(line)
}

/// Relevance in 0..=1 plus the evidence behind it.
fn relevance(event: &Event) -> (f64, Vec<String>) {
  let mut evidence = Vec::new();
  let evt = event.evt.to_ascii_lowercase();

  let mut score: f64 = match event.lvl {
    Level::Fatal | Level::Error => 0.9,
    Level::Warn => 0.5,
    Level::Info => 0.2,
    Level::Debug | Level::Trace => 0.1,
  };
  if event.lvl >= Level::Warn {
    evidence.push(format!("{} level", event.lvl.as_str()));
  }

  if evt.contains("assert") {
    score = 1.0;
    evidence.push("assertion event".into());
  } else if FAILURE_WORDS.iter().any(|w| evt.contains(w)) {
    score = score.max(0.8);
    evidence.push("failure-like event type".into());
  }

  if event.payload.get("stack").is_some() {
    score = (score + 0.1).min(1.0);
    evidence.push("carries stack trace".into());
  }

  (score, evidence)
}

/// Rank `retained` events (failure included) against the failure at
/// `failure_seq`. Sorted by score desc, then distance asc, then seq asc.
pub fn rank_suspects(
  retained: &[&Event],
  failure_seq: usize,
  case_error: Option<&str>,
  max: usize,
) -> Vec<Suspect> {
  let mut scored: Vec<(Suspect, usize)> = retained
    .iter()
    .map(|event| {
      let (rel, mut reasons) = relevance(event);
      let distance = event.seq.abs_diff(failure_seq);
      let proximity = 1.0 / (1.0 + distance as f64);
      if distance == 0 {
        reasons.insert(0, "failure event".into());
      } else {
        reasons.push(format!("{} event(s) from failure", distance));
      }

      let mut message = message_of(event);
      if message.is_none() && distance == 0 {
        message = case_error
          .map(|e| first_line(e, MESSAGE_MAX_CHARS))
          .filter(|m| !m.is_empty());
      }

      let total = RELEVANCE_WEIGHT * rel + PROXIMITY_WEIGHT * proximity;
      let suspect = Suspect {
        seq: event.seq,
        evt: event.evt.clone(),
        lvl: event.lvl,
        score: (total * 1000.0).round() / 1000.0,
        reasons,
        message,
      };
      (suspect, distance)
    })
    .collect();

  scored.sort_by(|(a, da), (b, db)| {
    b.score
      .partial_cmp(&a.score)
      .unwrap_or(std::cmp::Ordering::Equal)
      .then_with(|| da.cmp(db))
      .then_with(|| a.seq.cmp(&b.seq))
  });

  scored.into_iter().take(max).map(|(s, _)| s).collect()
}
