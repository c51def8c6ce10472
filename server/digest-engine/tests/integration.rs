//! Integration tests for the digest engine.

use std::path::Path;

use digest_engine::engine::write_digest;
use digest_engine::records::{extract_records, load_records, save_records};
use digest_engine::report::{fingerprint_report_markdown, to_json};
use digest_engine::types::CaseStatus;
use digest_engine::{
  compare_digests, compare_fingerprints, extract_failure_info, CaseInput, DigestConfig,
  DigestEngine, NormalizeOptions,
};
use pretty_assertions::assert_eq;

/// A noisy log: setup chatter, a login carrying a secret, an assertion
/// failure with a stack, then teardown.
fn fixture_log(checkout: &str, noise: usize) -> String {
  let mut lines = Vec::new();
  lines.push(r#"{"ts":1760000000000,"lvl":"info","phase":"setup","evt":"case.begin"}"#.to_string());
  for i in 0..noise {
    lines.push(format!(
      r#"{{"lvl":"debug","evt":"http.request","payload":{{"i":{},"url":"/api/items/{}","body":"{}"}}}}"#,
      i,
      i,
      "x".repeat(64)
    ));
  }
  lines.push(
    r#"{"lvl":"info","evt":"auth.login","payload":{"user":"ann","password":"hunter2-very-secret"}}"#
      .to_string(),
  );
  lines.push(format!(
    r#"{{"lvl":"error","evt":"assert.fail","payload":{{"name":"AssertionError","message":"expected 500 to be 200","stack":"AssertionError: expected 500 to be 200\n    at Object.<anonymous> (/ci/{}/tests/a.test.ts:20:15)\n    at processTicksAndRejections (node:internal/process/task_queues:95:5)"}}}}"#,
    checkout
  ));
  lines.push(r#"{"lvl":"info","phase":"teardown","evt":"case.end","payload":{"status":"fail"}}"#.to_string());
  lines.join("\n") + "\n"
}

fn write_case(dir: &Path, name: &str, log: &str) -> CaseInput {
  std::fs::create_dir_all(dir).unwrap();
  let log_path = dir.join(format!("{}.jsonl", name));
  std::fs::write(&log_path, log).unwrap();
  CaseInput {
    case: format!("tests/a.test.ts > {}", name),
    status: CaseStatus::Fail,
    duration: 120,
    location: "tests/a.test.ts".into(),
    log_path,
    error: Some("AssertionError: expected 500 to be 200".into()),
  }
}

fn engine(config: DigestConfig) -> DigestEngine {
  DigestEngine::new(config, NormalizeOptions::default(), ".").unwrap()
}

#[test]
fn budget_is_never_exceeded() {
  let dir = tempfile::tempdir().unwrap();
  let case = write_case(dir.path(), "noisy", &fixture_log("head", 500));
  for kb in [1, 2, 4, 8, 32] {
    let config = DigestConfig::from_json(&format!(
      r#"{{"budget": {{"kb": {}, "lines": 1000}}, "window": 400}}"#,
      kb
    ))
    .unwrap();
    let digest = engine(config).generate(&case).unwrap();
    let bytes = serde_json::to_vec(&digest).unwrap();
    assert_eq!(digest.summary.budget_used, bytes.len(), "kb={}", kb);
    assert!(bytes.len() <= kb * 1024, "kb={} used={}", kb, bytes.len());
    assert_eq!(digest.summary.budget_limit, kb * 1024);
    assert!(digest.summary.retained_events < digest.summary.total_events);
    assert!(digest.summary.clipped);
  }
}

#[test]
fn secrets_never_leak_even_when_they_fit() {
  let dir = tempfile::tempdir().unwrap();
  let case = write_case(dir.path(), "secret", &fixture_log("head", 2));
  let config = DigestConfig::from_json(
    r#"{
      "budget": {"kb": 64, "lines": 500},
      "rules": [{"match": {"evt": "auth.*"}, "actions": [{"type": "include"}]}]
    }"#,
  )
  .unwrap();
  let digest = engine(config).generate(&case).unwrap();
  assert!(digest.events.iter().any(|e| e.evt == "auth.login"));
  let text = serde_json::to_string(&digest).unwrap();
  assert!(!text.contains("hunter2-very-secret"));
  assert!(digest.summary.redacted_fields >= 1);
}

#[test]
fn rules_shape_the_retained_events() {
  let dir = tempfile::tempdir().unwrap();
  let case = write_case(dir.path(), "rules", &fixture_log("head", 30));
  let config = DigestConfig::from_json(
    r#"{
      "budget": {"kb": 64, "lines": 500},
      "rules": [
        {"match": {"evt": "assert.fail"}, "actions": [{"type": "slice", "window": 3}]},
        {"match": {"evt": "http.*"}, "actions": [{"type": "exclude"}]},
        {"match": {"phase": "setup"}, "actions": [{"type": "include"}], "_comment": "keep the start"}
      ]
    }"#,
  )
  .unwrap();
  let digest = engine(config).generate(&case).unwrap();
  let evts: Vec<&str> = digest.events.iter().map(|e| e.evt.as_str()).collect();
  assert_eq!(evts, vec!["case.begin", "auth.login", "case.end"]);
  assert_eq!(digest.failure.evt, "assert.fail");
}

#[test]
fn digests_are_deterministic() {
  let dir = tempfile::tempdir().unwrap();
  let case = write_case(dir.path(), "det", &fixture_log("head", 40));
  let engine = engine(DigestConfig::default());
  let a = serde_json::to_vec(&engine.generate(&case).unwrap()).unwrap();
  let b = serde_json::to_vec(&engine.generate(&case).unwrap()).unwrap();
  assert_eq!(a, b);
}

#[test]
fn base_and_head_runs_compare_end_to_end() {
  let root = tempfile::tempdir().unwrap();
  let base_dir = root.path().join("base-reports");
  let head_dir = root.path().join("head-reports");
  let engine = engine(DigestConfig::default());

  for (dir, checkout) in [(&base_dir, "base"), (&head_dir, "head")] {
    let case = write_case(dir, "shared", &fixture_log(checkout, 3));
    let digest = engine.generate(&case).unwrap();
    write_digest(&digest, &case.log_path).unwrap();
  }
  let mut extra = write_case(&head_dir, "fresh", &fixture_log("head", 1));
  extra.error = Some("TypeError: cannot read properties of undefined".into());
  let digest = engine.generate(&extra).unwrap();
  write_digest(&digest, &extra.log_path).unwrap();

  let opts = NormalizeOptions::default();
  let base = extract_records(&base_dir, &opts);
  let head = extract_records(&head_dir, &opts);
  assert_eq!(base.len(), 1);
  assert_eq!(head.len(), 2);

  let fp_path = root.path().join("base-fingerprints.json");
  save_records(&fp_path, &base).unwrap();
  let base = load_records(&fp_path).unwrap();

  let diff = compare_fingerprints(&base, &head);
  assert_eq!(diff.summary.unchanged, 1);
  assert_eq!(diff.summary.added, 1);
  assert!(diff.summary.regression_detected);
  assert_eq!(diff.added_fingerprints[0].test_name, "tests/a.test.ts > fresh");

  let json = to_json(&diff, false).unwrap();
  let md = fingerprint_report_markdown(&diff);
  let added_fp = diff.added_fingerprints[0].fingerprint.as_str();
  assert!(json.contains(added_fp));
  assert!(md.contains(added_fp));

  let gate = DigestConfig::from_json(&format!(r#"{{"gate": {{"allow": ["{}"]}}}}"#, added_fp))
    .unwrap()
    .gate;
  assert!(!gate.evaluate(&diff).regressed);
  assert!(DigestConfig::default().gate.evaluate(&diff).regressed);
}

#[test]
fn identical_runs_have_no_regression() {
  let root = tempfile::tempdir().unwrap();
  let engine = engine(DigestConfig::default());
  let case = write_case(root.path(), "same", &fixture_log("head", 3));
  let digest = engine.generate(&case).unwrap();
  write_digest(&digest, &case.log_path).unwrap();

  let records = extract_records(root.path(), &NormalizeOptions::default());
  let diff = compare_fingerprints(&records, &records);
  assert_eq!(diff.summary.added, 0);
  assert_eq!(diff.summary.removed, 0);
  assert_eq!(diff.summary.unchanged, records.len());
  assert!(!diff.summary.regression_detected);
  assert!(compare_digests(&digest, &digest).identical);
}

#[test]
fn type_error_is_extracted_from_message() {
  let info = extract_failure_info(
    "t",
    Some("TypeError: Cannot read properties of undefined"),
    None,
    &NormalizeOptions::default(),
  );
  assert_eq!(info.error_type.as_deref(), Some("TypeError"));
  assert_eq!(info.stack_location, None);
}

#[test]
fn absent_log_produces_no_digest() {
  let dir = tempfile::tempdir().unwrap();
  let mut case = write_case(dir.path(), "gone", "");
  std::fs::remove_file(&case.log_path).unwrap();
  case.error = None;
  assert!(DigestEngine::with_defaults().generate(&case).is_none());
}
