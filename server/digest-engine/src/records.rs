//! Fingerprint records: derive them from written digests, persist them as a
//! JSON array (`fingerprints.json`).

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::read_digest;
use crate::error::EngineError;
use crate::extract::extract_failure_info;
use crate::fingerprint;
use crate::normalize::NormalizeOptions;
use crate::types::{CaseStatus, Digest, FingerprintRecord, Level};

const DIGEST_SUFFIX: &str = ".digest.json";

/// Payload carrying the failure's stack: the failure event's own, else the
/// first error-level retained event with an object payload.
fn failure_payload(digest: &Digest) -> Option<&Value> {
  if digest.failure.payload.is_object() {
    return Some(&digest.failure.payload);
  }
  digest
    .events
    .iter()
    .find(|e| e.lvl >= Level::Error && e.payload.is_object())
    .map(|e| &e.payload)
}

/// Fingerprint record for one digest; `None` unless the case failed.
pub fn record_from_digest(digest: &Digest, opts: &NormalizeOptions) -> Option<FingerprintRecord> {
  if digest.status != CaseStatus::Fail {
    return None;
  }
  let payload = failure_payload(digest);
  let error = digest.error.clone().or_else(|| {
    payload
      .and_then(|p| p.get("message"))
      .and_then(Value::as_str)
      .map(str::to_string)
  });
  let info = extract_failure_info(&digest.case, error.as_deref(), payload, opts);
  if !info.location_normalized && info.stack_location.is_some() {
    debug!(case = %digest.case, location = ?info.stack_location, "stack location left unnormalized");
  }
  Some(FingerprintRecord {
    fingerprint: fingerprint::generate(&info),
    test_name: info.test_name,
    location: digest.location.clone(),
    error,
    error_type: info.error_type,
    stack_location: info.stack_location,
  })
}

fn digest_files(reports_dir: &Path) -> Vec<PathBuf> {
  let walker = WalkBuilder::new(reports_dir)
    .standard_filters(false)
    .follow_links(false)
    .build();
  let mut files: Vec<PathBuf> = walker
    .flatten()
    .map(|entry| entry.into_path())
    .filter(|p| {
      p.is_file()
        && p
          .file_name()
          .is_some_and(|n| n.to_string_lossy().ends_with(DIGEST_SUFFIX))
    })
    .collect();
  files.sort();
  files
}

/// Walk `reports_dir` for `*.digest.json` and fingerprint every failed case.
/// Unreadable digests are logged and skipped; a missing directory yields none.
pub fn extract_records(reports_dir: &Path, opts: &NormalizeOptions) -> Vec<FingerprintRecord> {
  if !reports_dir.is_dir() {
    debug!(dir = %reports_dir.display(), "reports directory not found");
    return Vec::new();
  }
  let mut records = Vec::new();
  for path in digest_files(reports_dir) {
    match read_digest(&path) {
      Ok(digest) => records.extend(record_from_digest(&digest, opts)),
      Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable digest"),
    }
  }
  records
}

/// Load a fingerprint file. A missing file is an empty set.
pub fn load_records(path: &Path) -> Result<Vec<FingerprintRecord>, EngineError> {
  let raw = match std::fs::read_to_string(path) {
    Ok(raw) => raw,
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
      debug!(path = %path.display(), "fingerprint file missing; treating as empty");
      return Ok(Vec::new());
    }
    Err(e) => return Err(EngineError::io(path, e)),
  };
  serde_json::from_str(&raw).map_err(|e| EngineError::parse(format!("{}: {}", path.display(), e)))
}

/// Write records as a pretty-printed JSON array.
pub fn save_records(path: &Path, records: &[FingerprintRecord]) -> Result<(), EngineError> {
  let mut out = serde_json::to_string_pretty(records)?;
  out.push('\n');
  std::fs::write(path, out).map_err(|e| EngineError::io(path, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::engine::{write_digest, CaseInput, DigestEngine};
  use crate::types::Fingerprint;
  use pretty_assertions::assert_eq;

  fn write_case(dir: &Path, name: &str, status: CaseStatus, log: &str) {
    let log_path = dir.join(format!("{}.jsonl", name));
    std::fs::write(&log_path, log).unwrap();
    let input = CaseInput {
      case: format!("tests/a.test.ts > {}", name),
      status,
      duration: 10,
      location: "tests/a.test.ts".into(),
      log_path: log_path.clone(),
      error: Some("TypeError: cannot read properties of undefined".into()),
    };
    let digest = DigestEngine::with_defaults().generate(&input).unwrap();
    write_digest(&digest, &log_path).unwrap();
  }

  const FAIL_LOG: &str = r#"{"lvl":"info","evt":"case.begin"}
{"lvl":"error","evt":"case.fail","payload":{"name":"TypeError","stack":"TypeError: x\n    at Object.<anonymous> (/ci/head/tests/a.test.ts:20:15)"}}
"#;

  #[test]
  fn extracts_failed_cases_only() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("suite");
    std::fs::create_dir_all(&nested).unwrap();
    write_case(&nested, "breaks", CaseStatus::Fail, FAIL_LOG);
    write_case(dir.path(), "passes", CaseStatus::Pass, FAIL_LOG);
    std::fs::write(dir.path().join("junk.digest.json"), "{not json").unwrap();

    let records = extract_records(dir.path(), &NormalizeOptions::default());
    assert_eq!(records.len(), 1);
    let r = &records[0];
    assert_eq!(r.test_name, "tests/a.test.ts > breaks");
    assert_eq!(r.error_type.as_deref(), Some("TypeError"));
    assert_eq!(r.stack_location.as_deref(), Some("tests/a.test.ts:20"));
    assert_eq!(r.fingerprint.as_str().len(), fingerprint::FINGERPRINT_LEN);
  }

  #[test]
  fn missing_reports_dir_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    assert!(extract_records(&dir.path().join("nope"), &NormalizeOptions::default()).is_empty());
  }

  #[test]
  fn records_persist_and_missing_file_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fingerprints.json");
    assert!(load_records(&path).unwrap().is_empty());

    let records = vec![FingerprintRecord {
      test_name: "t".into(),
      fingerprint: Fingerprint("0123456789abcdef".into()),
      location: "tests/a.test.ts".into(),
      error: Some("boom".into()),
      error_type: None,
      stack_location: None,
    }];
    save_records(&path, &records).unwrap();
    assert_eq!(load_records(&path).unwrap(), records);
  }

  #[test]
  fn malformed_fingerprint_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fingerprints.json");
    std::fs::write(&path, "[{\"oops\": 1}]").unwrap();
    assert!(matches!(load_records(&path), Err(EngineError::Parse(_))));
  }
}
