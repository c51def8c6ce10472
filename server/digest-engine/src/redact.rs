//! Redaction of sensitive payload fields.
//!
//! Two passes: values stored under a sensitive key are collected from the
//! whole log, then every retained event has those keys masked and any copy
//! of a collected value scrubbed from its other strings. Redaction always
//! runs before an event is sized against the budget.

use serde_json::Value;

use crate::types::Event;

pub const REDACTED: &str = "[REDACTED]";

/// Collected values shorter than this are scrubbed from free text only
/// where they stand as a whole word.
const MIN_SCRUB_LEN: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct Redactor {
  keys: Vec<String>,
  secrets: Vec<String>,
}

impl Redactor {
  /// `keys` are matched case-insensitively against object keys.
  pub fn new(keys: Vec<String>) -> Self {
    Self {
      keys: keys.into_iter().map(|k| k.to_ascii_lowercase()).collect(),
      secrets: Vec::new(),
    }
  }

  fn is_sensitive(&self, key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    self.keys.iter().any(|k| *k == key)
  }

  /// Remember raw values of sensitive fields found anywhere in `events`.
  pub fn collect(&mut self, events: &[Event]) {
    for event in events {
      self.collect_value(&event.payload);
    }
    // Longest first so a secret containing another is scrubbed whole.
    self.secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    self.secrets.dedup();
  }

  fn collect_value(&mut self, value: &Value) {
    match value {
      Value::Object(map) => {
        for (k, v) in map {
          if self.is_sensitive(k) {
            gather_strings(v, &mut self.secrets);
          } else {
            self.collect_value(v);
          }
        }
      }
      Value::Array(items) => items.iter().for_each(|v| self.collect_value(v)),
      _ => {}
    }
  }

  /// Redact one event in place; returns the number of fields changed.
  pub fn redact_event(&self, event: &mut Event) -> usize {
    self.redact_value(&mut event.payload)
  }

  /// Redact a JSON value in place; returns the number of fields changed.
  pub fn redact_value(&self, value: &mut Value) -> usize {
    match value {
      Value::Object(map) => {
        let mut count = 0;
        for (k, v) in map.iter_mut() {
          if self.is_sensitive(k) {
            if v.as_str() != Some(REDACTED) {
              *v = Value::String(REDACTED.to_string());
              count += 1;
            }
          } else {
            count += self.redact_value(v);
          }
        }
        count
      }
      Value::Array(items) => items.iter_mut().map(|v| self.redact_value(v)).sum(),
      Value::String(s) => match self.scrub(s) {
        Some(clean) => {
          *s = clean;
          1
        }
        None => 0,
      },
      _ => 0,
    }
  }

  /// Replace collected secret values inside free text.
  pub fn scrub(&self, text: &str) -> Option<String> {
    let mut out: Option<String> = None;
    for secret in &self.secrets {
      let current = out.as_deref().unwrap_or(text);
      let replaced = if secret.chars().count() >= MIN_SCRUB_LEN {
        current
          .contains(secret.as_str())
          .then(|| current.replace(secret.as_str(), REDACTED))
      } else {
        replace_whole_words(current, secret)
      };
      if replaced.is_some() {
        out = replaced;
      }
    }
    out
  }
}

fn is_word_char(c: char) -> bool {
  c.is_alphanumeric() || c == '_'
}

/// Replace occurrences of `word` not flanked by word characters.
fn replace_whole_words(text: &str, word: &str) -> Option<String> {
  let mut out = String::with_capacity(text.len());
  let mut last = 0;
  for (at, _) in text.match_indices(word) {
    if at < last {
      continue;
    }
    let end = at + word.len();
    let before = text[..at].chars().next_back();
    let after = text[end..].chars().next();
    if before.is_some_and(is_word_char) || after.is_some_and(is_word_char) {
      continue;
    }
    out.push_str(&text[last..at]);
    out.push_str(REDACTED);
    last = end;
  }
  if last == 0 {
    return None;
  }
  out.push_str(&text[last..]);
  Some(out)
}

fn gather_strings(value: &Value, out: &mut Vec<String>) {
  match value {
    Value::String(s) if !s.trim().is_empty() && s != REDACTED => out.push(s.clone()),
    Value::Number(n) => out.push(n.to_string()),
    Value::Array(items) => items.iter().for_each(|v| gather_strings(v, out)),
    Value::Object(map) => map.values().for_each(|v| gather_strings(v, out)),
    _ => {}
  }
}
