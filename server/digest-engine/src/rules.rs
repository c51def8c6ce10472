//! Digest rules: a small predicate language over event fields plus a closed
//! set of selection actions.
//!
//! Rules are data. They are evaluated in document order, and the order in
//! which events are admitted is the priority order used when the budget runs
//! out: events picked by earlier rules win over later, broader ones.

use serde::{Deserialize, Serialize};

use crate::types::Event;

/// One or several accepted values; `*` matches any run of characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pattern {
  One(String),
  Any(Vec<String>),
}

impl Pattern {
  pub fn matches(&self, value: &str) -> bool {
    match self {
      Self::One(p) => wildcard_match(p, value),
      Self::Any(ps) => ps.iter().any(|p| wildcard_match(p, value)),
    }
  }

  fn validate(&self, field: &str) -> Result<(), String> {
    let values: &[String] = match self {
      Self::One(p) => std::slice::from_ref(p),
      Self::Any(ps) => ps,
    };
    if values.is_empty() {
      return Err(format!("match.{}: needs at least one value", field));
    }
    if values.iter().any(|v| v.is_empty()) {
      return Err(format!("match.{}: values must not be empty", field));
    }
    Ok(())
  }
}

/// Glob-style match supporting only `*`.
fn wildcard_match(pattern: &str, text: &str) -> bool {
  let parts: Vec<&str> = pattern.split('*').collect();
  if parts.len() == 1 {
    return pattern == text;
  }
  let (first, rest) = (parts[0], &parts[1..]);
  let Some(mut remaining) = text.strip_prefix(first) else {
    return false;
  };
  let (last, middle) = rest.split_last().map_or(("", &[][..]), |(l, m)| (*l, m));
  for part in middle {
    match remaining.find(part) {
      Some(pos) => remaining = &remaining[pos + part.len()..],
      None => return false,
    }
  }
  remaining.ends_with(last)
}

/// Predicate over event fields. Every present field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Match {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub evt: Option<Pattern>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub lvl: Option<Pattern>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub phase: Option<Pattern>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub case: Option<Pattern>,
  /// Substring searched for in the serialized payload.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub text: Option<String>,
}

impl Match {
  pub fn matches(&self, event: &Event) -> bool {
    if let Some(p) = &self.evt {
      if !p.matches(&event.evt) {
        return false;
      }
    }
    if let Some(p) = &self.lvl {
      if !p.matches(event.lvl.as_str()) {
        return false;
      }
    }
    if let Some(p) = &self.phase {
      if !event.phase.as_deref().is_some_and(|v| p.matches(v)) {
        return false;
      }
    }
    if let Some(p) = &self.case {
      if !event.case.as_deref().is_some_and(|v| p.matches(v)) {
        return false;
      }
    }
    if let Some(needle) = &self.text {
      if event.payload.is_null() || !event.payload.to_string().contains(needle.as_str()) {
        return false;
      }
    }
    true
  }

  fn validate(&self) -> Result<(), String> {
    let mut any = false;
    for (field, pattern) in [
      ("evt", &self.evt),
      ("lvl", &self.lvl),
      ("phase", &self.phase),
      ("case", &self.case),
    ] {
      if let Some(p) = pattern {
        p.validate(field)?;
        any = true;
      }
    }
    match &self.text {
      Some(t) if t.is_empty() => return Err("match.text: must not be empty".into()),
      Some(_) => any = true,
      None => {}
    }
    if !any {
      return Err("match: needs at least one field".into());
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
  /// Retain exactly the matched event.
  Include,
  /// Drop the matched event and keep later rules from re-adding it.
  Exclude,
  /// Retain the matched event plus `window` neighbors on each side.
  Slice { window: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
  #[serde(rename = "match")]
  pub matcher: Match,
  pub actions: Vec<Action>,
  #[serde(rename = "_comment", default, skip_serializing_if = "Option::is_none")]
  pub comment: Option<String>,
}

impl Rule {
  pub fn validate(&self) -> Result<(), String> {
    self.matcher.validate()?;
    if self.actions.is_empty() {
      return Err("actions: needs at least one action".into());
    }
    Ok(())
  }
}

/// Event indices chosen for a digest, in admission priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
  /// Failure index first, then rule picks; excluded events are absent.
  pub order: Vec<usize>,
  /// Number of (rule, event) matches observed.
  pub matches: usize,
  /// True when no rule matched and the default window was used.
  pub fallback: bool,
}

struct Picker {
  order: Vec<usize>,
  kept: Vec<bool>,
  blocked: Vec<bool>,
  failure: usize,
}

impl Picker {
  fn admit(&mut self, i: usize) {
    if !self.blocked[i] && !self.kept[i] {
      self.kept[i] = true;
      self.order.push(i);
    }
  }

  /// Admit `center` then its neighbors, nearest first, clipped to the log.
  fn admit_window(&mut self, center: usize, window: usize) {
    let len = self.kept.len();
    self.admit(center);
    for d in 1..=window {
      if let Some(before) = center.checked_sub(d) {
        self.admit(before);
      }
      if center + d < len {
        self.admit(center + d);
      }
      if center < d && center + d >= len {
        break;
      }
    }
  }

  fn exclude(&mut self, i: usize) {
    if i == self.failure {
      return;
    }
    self.blocked[i] = true;
    self.kept[i] = false;
  }
}

/// Apply `rules` to `events` and return the admission order.
///
/// The failure event always comes first and cannot be excluded.
pub fn select(events: &[Event], failure: usize, rules: &[Rule], default_window: usize) -> Selection {
  let len = events.len();
  if len == 0 {
    return Selection {
      order: Vec::new(),
      matches: 0,
      fallback: true,
    };
  }
  let failure = failure.min(len - 1);
  let mut picker = Picker {
    order: Vec::with_capacity(len.min(64)),
    kept: vec![false; len],
    blocked: vec![false; len],
    failure,
  };
  picker.admit(failure);

  let mut matches = 0;
  for rule in rules {
    for (i, event) in events.iter().enumerate() {
      if !rule.matcher.matches(event) {
        continue;
      }
      matches += 1;
      for action in &rule.actions {
        match *action {
          Action::Include => picker.admit(i),
          Action::Slice { window } => picker.admit_window(i, window),
          Action::Exclude => picker.exclude(i),
        }
      }
    }
  }

  let fallback = matches == 0;
  if fallback {
    picker.admit_window(failure, default_window);
  }

  let Picker { order, kept, .. } = picker;
  Selection {
    order: order.into_iter().filter(|&i| kept[i]).collect(),
    matches,
    fallback,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::Level;
  use serde_json::json;

  fn event(seq: usize, evt: &str, lvl: Level) -> Event {
    Event {
      seq,
      ts: None,
      lvl,
      evt: evt.into(),
      case: Some("suite/case".into()),
      phase: None,
      payload: json!({"n": seq}),
    }
  }

  fn log() -> Vec<Event> {
    vec![
      event(0, "case.begin", Level::Info),
      event(1, "db.query", Level::Debug),
      event(2, "http.request", Level::Info),
      event(3, "db.query", Level::Debug),
      event(4, "assert.fail", Level::Error),
      event(5, "case.end", Level::Error),
    ]
  }

  fn rule(matcher: Match, actions: Vec<Action>) -> Rule {
    Rule {
      matcher,
      actions,
      comment: None,
    }
  }

  #[test]
  fn wildcard_patterns() {
    assert!(wildcard_match("db.*", "db.query"));
    assert!(wildcard_match("*.fail", "assert.fail"));
    assert!(wildcard_match("a*c*e", "abcde"));
    assert!(!wildcard_match("db.*", "http.db"));
    assert!(wildcard_match("exact", "exact"));
    assert!(!wildcard_match("exact", "exactly"));
  }

  #[test]
  fn include_keeps_only_matched_events() {
    let rules = vec![rule(
      Match {
        evt: Some(Pattern::One("db.query".into())),
        ..Match::default()
      },
      vec![Action::Include],
    )];
    let sel = select(&log(), 5, &rules, 10);
    assert_eq!(sel.order, vec![5, 1, 3]);
    assert!(!sel.fallback);
    assert_eq!(sel.matches, 2);
  }

  #[test]
  fn slice_is_clipped_and_nearest_first() {
    let rules = vec![rule(
      Match {
        evt: Some(Pattern::One("case.begin".into())),
        ..Match::default()
      },
      vec![Action::Slice { window: 2 }],
    )];
    let sel = select(&log(), 5, &rules, 10);
    assert_eq!(sel.order, vec![5, 0, 1, 2]);
  }

  #[test]
  fn exclude_blocks_later_rules_but_not_failure() {
    let rules = vec![
      rule(
        Match {
          lvl: Some(Pattern::One("debug".into())),
          ..Match::default()
        },
        vec![Action::Exclude],
      ),
      rule(
        Match {
          evt: Some(Pattern::One("case.end".into())),
          ..Match::default()
        },
        vec![Action::Exclude, Action::Slice { window: 5 }],
      ),
    ];
    let sel = select(&log(), 5, &rules, 10);
    assert_eq!(sel.order, vec![5, 4, 2, 0]);
  }

  #[test]
  fn no_match_falls_back_to_default_window() {
    let rules = vec![rule(
      Match {
        evt: Some(Pattern::One("never".into())),
        ..Match::default()
      },
      vec![Action::Include],
    )];
    let sel = select(&log(), 4, &rules, 1);
    assert!(sel.fallback);
    assert_eq!(sel.order, vec![4, 3, 5]);
  }

  #[test]
  fn text_and_any_patterns() {
    let m = Match {
      lvl: Some(Pattern::Any(vec!["warn".into(), "error".into()])),
      text: Some("\"n\":4".into()),
      ..Match::default()
    };
    let events = log();
    assert!(m.matches(&events[4]));
    assert!(!m.matches(&events[5]));
    assert!(!m.matches(&events[2]));
  }

  #[test]
  fn empty_log_selects_nothing() {
    let sel = select(&[], 0, &[], 10);
    assert!(sel.order.is_empty());
  }

  #[test]
  fn empty_predicate_fails_validation() {
    let r = rule(Match::default(), vec![Action::Include]);
    assert!(r.validate().is_err());
  }
}
