//! Read one test case's ordered event log (JSON Lines).
//!
//! Reading is best-effort: blank lines are skipped, lines that are not a JSON
//! object are dropped and counted, and the rest of the stream still loads.

use std::path::Path;

use chrono::DateTime;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{Event, InboundEvent, Level};

/// Events of one case plus read diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
  pub events: Vec<Event>,
  /// Lines dropped because they did not parse.
  pub dropped_lines: usize,
}

impl EventLog {
  pub fn is_empty(&self) -> bool {
    self.events.is_empty()
  }

  /// Index of the event that terminated the case: the last error-level
  /// event, else the last `payload.status == "fail"` event, else the last.
  pub fn failure_index(&self) -> Option<usize> {
    let last = self.events.len().checked_sub(1)?;
    self
      .events
      .iter()
      .rposition(|e| e.lvl >= Level::Error)
      .or_else(|| self.events.iter().rposition(Event::is_failure))
      .or(Some(last))
  }
}

fn parse_ts(raw: &Value) -> Option<i64> {
  match raw {
    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
    Value::String(s) => DateTime::parse_from_rfc3339(s)
      .ok()
      .map(|dt| dt.timestamp_millis()),
    _ => None,
  }
}

/// Convert one inbound line into a canonical event at position `seq`.
pub fn normalize_event(raw: InboundEvent, seq: usize) -> Event {
  Event {
    seq,
    ts: raw.ts.as_ref().and_then(parse_ts),
    lvl: raw
      .lvl
      .as_deref()
      .and_then(Level::from_str_loose)
      .unwrap_or(Level::Info),
    evt: raw
      .evt
      .filter(|e| !e.is_empty())
      .unwrap_or_else(|| "unknown".to_string()),
    case: raw.case,
    phase: raw.phase,
    payload: raw.payload.unwrap_or(Value::Null),
  }
}

/// Parse JSON Lines text into an event log.
pub fn parse_event_log(raw: &str) -> EventLog {
  let mut log = EventLog::default();
  for (line_no, line) in raw.lines().enumerate() {
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }
    match serde_json::from_str::<InboundEvent>(trimmed) {
      Ok(inbound) => {
        let seq = log.events.len();
        log.events.push(normalize_event(inbound, seq));
      }
      Err(e) => {
        debug!(line = line_no + 1, error = %e, "dropping malformed event line");
        log.dropped_lines += 1;
      }
    }
  }
  log
}

/// Load a case's event log. `None` when the file is missing or unreadable.
pub fn read_event_log(path: &Path) -> Option<EventLog> {
  let raw = match std::fs::read_to_string(path) {
    Ok(raw) => raw,
    Err(e) => {
      debug!(path = %path.display(), error = %e, "event log not readable");
      return None;
    }
  };
  let log = parse_event_log(&raw);
  if log.dropped_lines > 0 {
    warn!(
      path = %path.display(),
      dropped = log.dropped_lines,
      kept = log.events.len(),
      "event log contained malformed lines"
    );
  }
  Some(log)
}
