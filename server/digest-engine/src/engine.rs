//! Core engine: turn a failing case's event log into a bounded digest.
//!
//! Admission order comes from the rule engine; every candidate is redacted
//! before it is sized, and events are admitted until either the kilobyte or
//! the line budget would be exceeded. `summary.budgetUsed` is the exact
//! compact-JSON size of the returned digest.

use std::path::{Path, PathBuf};
use std::thread;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::codeframe;
use crate::config::DigestConfig;
use crate::error::EngineError;
use crate::events::{read_event_log, EventLog};
use crate::normalize::NormalizeOptions;
use crate::rank;
use crate::report;
use crate::redact::Redactor;
use crate::rules;
use crate::types::*;

/// Preview lengths tried, in order, when the failure payload alone is too big.
const PREVIEW_STEPS: [usize; 5] = [512, 256, 128, 64, 0];
/// Escaped-byte caps tried, in order, for identity strings when nothing else
/// brings the digest under budget. At 0 only the fixed-width skeleton is
/// left, which fits the smallest valid budget (1 KB).
const IDENT_BYTE_STEPS: [usize; 4] = [64, 32, 8, 0];
const ERROR_MAX_CHARS: usize = 200;

/// One failing case to digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseInput {
  pub case: String,
  pub status: CaseStatus,
  #[serde(default)]
  pub duration: u64,
  #[serde(default)]
  pub location: String,
  pub log_path: PathBuf,
  #[serde(default)]
  pub error: Option<String>,
}

/// Digest generator. Stateless between calls; safe to share across threads.
#[derive(Debug, Clone)]
pub struct DigestEngine {
  config: DigestConfig,
  redact_keys: Vec<String>,
  normalize: NormalizeOptions,
  source_root: PathBuf,
}

fn compact_len<T: Serialize>(value: &T) -> usize {
  serde_json::to_vec(value).map(|b| b.len()).unwrap_or(usize::MAX)
}

fn truncate_chars(s: &str, max: usize) -> String {
  s.chars().take(max).collect()
}

/// Bytes `c` occupies inside a JSON string literal.
fn escaped_len(c: char) -> usize {
  match c {
    '"' | '\\' | '\n' | '\r' | '\t' | '\u{8}' | '\u{c}' => 2,
    c if (c as u32) < 0x20 => 6,
    c => c.len_utf8(),
  }
}

/// Longest prefix of `s` whose JSON-escaped form fits in `max_bytes`.
fn truncate_escaped(s: &str, max_bytes: usize) -> String {
  let mut used = 0;
  s.chars()
    .take_while(|&c| {
      used += escaped_len(c);
      used <= max_bytes
    })
    .collect()
}

/// Upper bound on the digest size with no context, frames or suspects:
/// unknown counters are sized at their widest.
fn envelope_len(digest: &Digest) -> usize {
  let probe = Digest {
    events: Vec::new(),
    code_frames: Vec::new(),
    suspects: Vec::new(),
    summary: DigestSummary {
      retained_events: usize::MAX,
      budget_used: usize::MAX,
      redacted_fields: usize::MAX,
      clipped: false,
      ..digest.summary.clone()
    },
    ..digest.clone()
  };
  compact_len(&probe)
}

/// Shrink the failure side of `digest` until its envelope fits `limit`.
/// Returns the final envelope size.
fn shrink_to_fit(digest: &mut Digest, limit: usize) -> usize {
  let mut used = envelope_len(digest);
  if used <= limit {
    return used;
  }

  let original = std::mem::take(&mut digest.failure.payload);
  let preview = match &original {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  };
  for step in PREVIEW_STEPS {
    digest.failure.payload = if step == 0 {
      Value::Null
    } else {
      Value::String(truncate_chars(&preview, step))
    };
    used = envelope_len(digest);
    if used <= limit {
      return used;
    }
  }

  if let Some(error) = digest.error.take() {
    let line = rank::first_line(&error, ERROR_MAX_CHARS);
    digest.error = (!line.is_empty()).then_some(line);
    used = envelope_len(digest);
    if used <= limit {
      return used;
    }
    digest.error = None;
  }

  digest.failure.case = None;
  digest.failure.phase = None;
  for cap in IDENT_BYTE_STEPS {
    digest.failure.evt = truncate_escaped(&digest.failure.evt, cap);
    digest.case = truncate_escaped(&digest.case, cap);
    digest.location = truncate_escaped(&digest.location, cap);
    used = envelope_len(digest);
    if used <= limit {
      return used;
    }
  }
  warn!(used, limit, "digest skeleton exceeds budget");
  used
}

impl DigestEngine {
  /// Build an engine; the configuration is validated here.
  pub fn new(
    config: DigestConfig,
    normalize: NormalizeOptions,
    source_root: impl Into<PathBuf>,
  ) -> Result<Self, EngineError> {
    config.validate()?;
    Ok(Self {
      redact_keys: config.redact_keys(),
      config,
      normalize,
      source_root: source_root.into(),
    })
  }

  pub fn with_defaults() -> Self {
    let config = DigestConfig::default();
    Self {
      redact_keys: config.redact_keys(),
      config,
      normalize: NormalizeOptions::default(),
      source_root: PathBuf::from("."),
    }
  }

  pub fn config(&self) -> &DigestConfig {
    &self.config
  }

  pub fn normalize_options(&self) -> &NormalizeOptions {
    &self.normalize
  }

  /// Digest one case. `None` when the log is absent, or empty with no
  /// error to report.
  pub fn generate(&self, input: &CaseInput) -> Option<Digest> {
    let Some(log) = read_event_log(&input.log_path) else {
      debug!(case = %input.case, path = %input.log_path.display(), "skipping case without event log");
      return None;
    };
    self.digest_log(input, log)
  }

  /// Digest an already-read event log.
  pub fn digest_log(&self, input: &CaseInput, mut log: EventLog) -> Option<Digest> {
    let total_events = log.events.len();
    if log.events.is_empty() {
      let error = input.error.as_deref().filter(|e| !e.is_empty())?;
      log.events.push(Event {
        seq: 0,
        ts: None,
        lvl: Level::Error,
        evt: "case.fail".into(),
        case: Some(input.case.clone()),
        phase: None,
        payload: serde_json::json!({ "message": error }),
      });
    }
    let failure = log.failure_index()?;
    let EventLog {
      events,
      dropped_lines,
    } = log;

    let selection = rules::select(&events, failure, &self.config.rules, self.config.window);
    debug!(
      case = %input.case,
      candidates = selection.order.len(),
      matches = selection.matches,
      fallback = selection.fallback,
      "selected digest candidates"
    );

    let mut redactor = Redactor::new(self.redact_keys.clone());
    redactor.collect(&events);

    let mut redacted_fields = 0;
    let mut failure_event = events[failure].clone();
    redacted_fields += redactor.redact_event(&mut failure_event);
    let stack = failure_event.payload_str("stack").map(str::to_string);

    let error = input.error.as_ref().map(|e| match redactor.scrub(e) {
      Some(clean) => {
        redacted_fields += 1;
        clean
      }
      None => e.clone(),
    });

    let budget = self.config.budget;
    let limit = budget.limit_bytes();

    let mut digest = Digest {
      case: input.case.clone(),
      status: input.status,
      duration: input.duration,
      location: input.location.clone(),
      error,
      failure: failure_event,
      events: Vec::new(),
      code_frames: Vec::new(),
      suspects: Vec::new(),
      summary: DigestSummary {
        total_events,
        retained_events: 1,
        budget_used: 0,
        budget_limit: limit,
        line_limit: budget.max_lines,
        redacted_fields: 0,
        dropped_lines,
        clipped: false,
      },
    };

    let envelope = envelope_len(&digest);
    let mut used = shrink_to_fit(&mut digest, limit);
    let mut clipped = used != envelope;

    for &idx in selection.order.iter().skip(1) {
      if digest.events.len() + 1 >= budget.max_lines {
        debug!(case = %input.case, seq = idx, "line budget reached");
        clipped = true;
        break;
      }
      let mut event = events[idx].clone();
      let changed = redactor.redact_event(&mut event);
      let cost = compact_len(&event) + 1;
      if used + cost > limit {
        debug!(case = %input.case, seq = idx, cost, used, limit, "byte budget reached");
        clipped = true;
        break;
      }
      used += cost;
      redacted_fields += changed;
      digest.events.push(event);
    }
    digest.events.sort_by_key(|e| e.seq);

    let suspects = {
      let mut retained: Vec<&Event> = digest.events.iter().collect();
      retained.push(&digest.failure);
      rank::rank_suspects(
        &retained,
        digest.failure.seq,
        digest.error.as_deref(),
        self.config.suspects.max,
      )
    };
    for suspect in suspects {
      let cost = compact_len(&suspect) + 1;
      if used + cost > limit {
        break;
      }
      used += cost;
      digest.suspects.push(suspect);
    }

    if let Some(stack) = stack {
      let frames = codeframe::extract_code_frames(
        &stack,
        &self.source_root,
        &self.normalize,
        &self.config.code_frame,
      );
      for frame in frames {
        let cost = compact_len(&frame) + 1;
        if used + cost > limit {
          break;
        }
        used += cost;
        digest.code_frames.push(frame);
      }
    }

    digest.summary.retained_events = digest.events.len() + 1;
    digest.summary.redacted_fields = redacted_fields;
    digest.summary.clipped = clipped;
    for _ in 0..4 {
      let len = compact_len(&digest);
      if len == digest.summary.budget_used {
        break;
      }
      digest.summary.budget_used = len;
    }

    debug!(
      case = %digest.case,
      retained = digest.summary.retained_events,
      total = total_events,
      bytes = digest.summary.budget_used,
      clipped,
      "digest generated"
    );
    Some(digest)
  }

  /// Digest many cases in parallel. Results keep the input order.
  pub fn generate_all(&self, cases: &[CaseInput]) -> Vec<Option<Digest>> {
    if cases.is_empty() {
      return Vec::new();
    }
    let workers = thread::available_parallelism()
      .map(|n| n.get())
      .unwrap_or(1)
      .min(cases.len());
    let chunk_size = cases.len().div_ceil(workers);

    thread::scope(|scope| {
      let handles: Vec<_> = cases
        .chunks(chunk_size)
        .map(|chunk| {
          let handle = scope.spawn(move || {
            chunk.iter().map(|case| self.generate(case)).collect::<Vec<_>>()
          });
          (chunk.len(), handle)
        })
        .collect();

      handles
        .into_iter()
        .flat_map(|(len, handle)| match handle.join() {
          Ok(digests) => digests,
          Err(_) => {
            warn!(cases = len, "digest worker panicked; skipping its cases");
            vec![None; len]
          }
        })
        .collect()
    })
  }
}

/// Where the digest for a log lives: `<stem>.digest.json` beside it.
pub fn digest_path(log_path: &Path) -> PathBuf {
  let stem = log_path
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| "case".to_string());
  log_path.with_file_name(format!("{}.digest.json", stem))
}

/// Markdown companion of [`digest_path`]: `<stem>.digest.md`.
pub fn digest_markdown_path(log_path: &Path) -> PathBuf {
  digest_path(log_path).with_extension("md")
}

/// Write `digest` as compact JSON next to its log, plus a Markdown rendering.
/// Returns the JSON path.
pub fn write_digest(digest: &Digest, log_path: &Path) -> Result<PathBuf, EngineError> {
  let path = digest_path(log_path);
  let bytes = serde_json::to_vec(digest)?;
  std::fs::write(&path, bytes).map_err(|e| EngineError::io(&path, e))?;
  let md_path = digest_markdown_path(log_path);
  std::fs::write(&md_path, report::digest_markdown(digest)).map_err(|e| EngineError::io(&md_path, e))?;
  Ok(path)
}

/// Load a digest previously written by [`write_digest`].
pub fn read_digest(path: &Path) -> Result<Digest, EngineError> {
  let raw = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
  serde_json::from_str(&raw).map_err(|e| EngineError::parse(format!("{}: {}", path.display(), e)))
}
