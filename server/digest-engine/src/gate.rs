//! Regression gate: decide whether a fingerprint diff should fail the run.
//!
//! The default policy is strict: any added fingerprint blocks. Projects can
//! allow known-flaky fingerprints or tolerate a number of new failures.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::fingerprint::FINGERPRINT_LEN;
use crate::types::{DiffResult, Fingerprint, FingerprintRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct GatePolicy {
  /// Fingerprints that never block, even when newly added.
  pub allow: Vec<Fingerprint>,
  /// Blocking additions tolerated before the gate fails.
  pub max_added: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateVerdict {
  pub regressed: bool,
  pub blocking: Vec<FingerprintRecord>,
  pub allowed: Vec<FingerprintRecord>,
}

impl GatePolicy {
  pub fn validate(&self) -> Result<(), EngineError> {
    for (i, fp) in self.allow.iter().enumerate() {
      let s = fp.as_str();
      let well_formed = s.len() == FINGERPRINT_LEN
        && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
      if !well_formed {
        return Err(EngineError::config(
          &format!("gate.allow[{}]", i),
          &format!("expected {} lowercase hex chars, got {:?}", FINGERPRINT_LEN, s),
        ));
      }
    }
    Ok(())
  }

  pub fn is_strict(&self) -> bool {
    self.allow.is_empty() && self.max_added == 0
  }

  /// Split added fingerprints into blocking and allowed ones.
  pub fn evaluate(&self, diff: &DiffResult) -> GateVerdict {
    let (allowed, blocking): (Vec<_>, Vec<_>) = diff
      .added_fingerprints
      .iter()
      .cloned()
      .partition(|r| self.allow.contains(&r.fingerprint));
    GateVerdict {
      regressed: blocking.len() > self.max_added,
      blocking,
      allowed,
    }
  }
}
