//! Digest configuration with sane defaults.
//!
//! The document is the project's rules file (`{"budget": .., "rules": [..]}`).
//! Locating it is the caller's job; this module only parses and validates.
//! Unknown top-level keys are tolerated because the same file carries
//! settings for other tools; rule and predicate objects are strict.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::gate::GatePolicy;
use crate::normalize::NormalizeOptions;
use crate::rules::Rule;

/// Field names redacted in every retained event unless `redactDefaults` is false.
pub const DEFAULT_REDACT_KEYS: &[&str] = &[
  "password",
  "passwd",
  "secret",
  "token",
  "apiKey",
  "api_key",
  "authorization",
  "cookie",
  "accessToken",
  "refreshToken",
  "privateKey",
];

/// Size caps for one digest. Either key may be omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Budget {
  /// Max serialized digest size in kilobytes (1 KB = 1024 bytes).
  #[serde(rename = "kb")]
  pub max_kilobytes: usize,
  /// Max number of events retained (failure event included).
  #[serde(rename = "lines")]
  pub max_lines: usize,
}

impl Budget {
  pub fn limit_bytes(&self) -> usize {
    self.max_kilobytes.saturating_mul(1024)
  }
}

impl Default for Budget {
  fn default() -> Self {
    Self {
      max_kilobytes: 10,
      max_lines: 200,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeFrameConfig {
  /// Source lines shown on each side of the failing line.
  pub context: usize,
  /// Max frames resolved per digest (0 disables code frames).
  pub max_frames: usize,
}

impl Default for CodeFrameConfig {
  fn default() -> Self {
    Self {
      context: 2,
      max_frames: 3,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuspectConfig {
  pub max: usize,
}

impl Default for SuspectConfig {
  fn default() -> Self {
    Self { max: 5 }
  }
}

/// Largest accepted `codeFrame.context`.
pub const MAX_FRAME_CONTEXT: usize = 50;

/// Tunable digest, normalization and gate settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DigestConfig {
  pub budget: Budget,
  /// Events kept on each side of the failure when no rule matches.
  pub window: usize,
  /// Extra payload field names to redact (case-insensitive).
  pub redact: Vec<String>,
  pub redact_defaults: bool,
  /// Directory names that mark a checkout root inside absolute stack paths.
  pub project_roots: Vec<String>,
  pub code_frame: CodeFrameConfig,
  pub suspects: SuspectConfig,
  pub rules: Vec<Rule>,
  pub gate: GatePolicy,
  #[serde(rename = "_comment", skip_serializing_if = "Option::is_none")]
  pub comment: Option<String>,
}

impl Default for DigestConfig {
  fn default() -> Self {
    Self {
      budget: Budget::default(),
      window: 10,
      redact: Vec::new(),
      redact_defaults: true,
      project_roots: Vec::new(),
      code_frame: CodeFrameConfig::default(),
      suspects: SuspectConfig::default(),
      rules: Vec::new(),
      gate: GatePolicy::default(),
      comment: None,
    }
  }
}

impl DigestConfig {
  /// Parse and validate a rules document.
  pub fn from_json(raw: &str) -> Result<Self, EngineError> {
    let config: Self = serde_json::from_str(raw)
      .map_err(|e| EngineError::config("document", &e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  /// Read, parse and validate a rules document from disk.
  pub fn from_file(path: &Path) -> Result<Self, EngineError> {
    let raw = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
    Self::from_json(&raw)
  }

  pub fn validate(&self) -> Result<(), EngineError> {
    if self.budget.max_kilobytes == 0 {
      return Err(EngineError::config("budget.kb", "must be at least 1"));
    }
    if self.budget.max_lines == 0 {
      return Err(EngineError::config("budget.lines", "must be at least 1"));
    }
    if self.code_frame.context > MAX_FRAME_CONTEXT {
      return Err(EngineError::config(
        "codeFrame.context",
        &format!("must be at most {}", MAX_FRAME_CONTEXT),
      ));
    }
    if self.suspects.max == 0 {
      return Err(EngineError::config("suspects.max", "must be at least 1"));
    }
    if self.redact.iter().any(|k| k.trim().is_empty()) {
      return Err(EngineError::config("redact", "field names must not be empty"));
    }
    if self.project_roots.iter().any(|r| r.is_empty() || r.contains(['/', '\\'])) {
      return Err(EngineError::config(
        "projectRoots",
        "entries must be single non-empty path components",
      ));
    }
    for (i, rule) in self.rules.iter().enumerate() {
      rule
        .validate()
        .map_err(|reason| EngineError::config(&format!("rules[{}]", i), &reason))?;
    }
    self.gate.validate()?;
    Ok(())
  }

  /// Effective lowercase redaction key set.
  pub fn redact_keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = if self.redact_defaults {
      DEFAULT_REDACT_KEYS.iter().map(|k| k.to_ascii_lowercase()).collect()
    } else {
      Vec::new()
    };
    keys.extend(self.redact.iter().map(|k| k.trim().to_ascii_lowercase()));
    keys.sort();
    keys.dedup();
    keys
  }

  /// Normalizer settings for this project, anchored at `cwd`.
  pub fn normalize_options(&self, cwd: Option<String>) -> NormalizeOptions {
    NormalizeOptions {
      project_roots: self.project_roots.clone(),
      cwd,
    }
  }
}
