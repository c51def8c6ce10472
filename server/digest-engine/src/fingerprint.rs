//! Stable fingerprint computation for identifying a failure across runs.

use crate::types::{FailureInfo, Fingerprint};

/// Hex characters kept in a fingerprint (64 bits).
pub const FINGERPRINT_LEN: usize = 16;

/// Canonical hash input: present fields joined with `::`.
///
/// Absent fields are omitted rather than rendered empty, so "no error type"
/// and "empty error type" never produce the same key.
pub fn canonical_key(info: &FailureInfo) -> String {
  let mut parts: Vec<&str> = vec![info.test_name.as_str()];
  if let Some(t) = &info.error_type {
    parts.push(t);
  }
  if let Some(loc) = &info.stack_location {
    parts.push(loc);
  }
  parts.join("::")
}

/// Full 64-hex blake3 digest of the canonical key.
pub fn full_fingerprint(info: &FailureInfo) -> String {
  blake3::hash(canonical_key(info).as_bytes()).to_hex().to_string()
}

/// Compute the failure's fingerprint. Pure; identical inputs give identical output.
pub fn generate(info: &FailureInfo) -> Fingerprint {
  let hex = full_fingerprint(info);
  Fingerprint(hex[..FINGERPRINT_LEN].to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::extract::extract_failure_info;
  use crate::normalize::NormalizeOptions;
  use proptest::prelude::*;
  use serde_json::json;

  fn info(name: &str, error_type: Option<&str>, loc: Option<&str>) -> FailureInfo {
    FailureInfo {
      test_name: name.into(),
      error_type: error_type.map(Into::into),
      stack_location: loc.map(Into::into),
      ..FailureInfo::default()
    }
  }

  #[test]
  fn same_input_same_fingerprint() {
    let a = info("suite > case", Some("TypeError"), Some("tests/a.test.ts:20"));
    let b = info("suite > case", Some("TypeError"), Some("tests/a.test.ts:20"));
    assert_eq!(generate(&a), generate(&b));
  }

  #[test]
  fn message_does_not_affect_fingerprint() {
    let mut a = info("t", Some("TypeError"), None);
    let b = a.clone();
    a.error_message = Some("different text".into());
    assert_eq!(generate(&a), generate(&b));
  }

  #[test]
  fn different_error_type_different_fingerprint() {
    let a = info("t", Some("TypeError"), Some("tests/a.test.ts:1"));
    let b = info("t", Some("RangeError"), Some("tests/a.test.ts:1"));
    assert_ne!(generate(&a), generate(&b));
  }

  #[test]
  fn absent_and_empty_fields_do_not_collide() {
    let absent = info("t", None, Some("x"));
    let empty = info("t", Some(""), Some("x"));
    assert_eq!(canonical_key(&absent), "t::x");
    assert_eq!(canonical_key(&empty), "t::::x");
    assert_ne!(generate(&absent), generate(&empty));
  }

  #[test]
  fn fingerprint_is_16_hex_chars() {
    let fp = generate(&info("t", None, None));
    assert_eq!(fp.as_str().len(), FINGERPRINT_LEN);
    assert!(fp.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    assert!(full_fingerprint(&info("t", None, None)).starts_with(fp.as_str()));
  }

  #[test]
  fn base_and_head_checkouts_fingerprint_identically() {
    let opts = NormalizeOptions::default();
    let name = "tests/a.test.ts > should fail deterministically";
    let err = "AssertionError: expected 500 to be 200";
    let base = json!({"stack": format!("Error: {}\n    at Object.<anonymous> (/x/Laminar/base/tests/a.test.ts:20:15)", err)});
    let head = json!({"stack": format!("Error: {}\n    at Object.<anonymous> (/x/Laminar/head/tests/a.test.ts:20:15)", err)});

    let base_info = extract_failure_info(name, Some(err), Some(&base), &opts);
    let head_info = extract_failure_info(name, Some(err), Some(&head), &opts);
    assert_eq!(base_info.stack_location.as_deref(), Some("tests/a.test.ts:20"));
    assert_eq!(head_info.stack_location.as_deref(), Some("tests/a.test.ts:20"));
    assert_eq!(generate(&base_info), generate(&head_info));
  }

  #[test]
  fn local_checkouts_fingerprint_identically_with_project_root() {
    let opts = NormalizeOptions {
      project_roots: vec!["Laminar".into()],
      cwd: None,
    };
    let a = json!({"stack": "at Object.<anonymous> (/Users/alice/projects/Laminar/tests/example.test.ts:10:5)"});
    let b = json!({"stack": "at Object.<anonymous> (/Users/bob/code/Laminar/tests/example.test.ts:10:5)"});
    let fa = generate(&extract_failure_info("t", Some("TypeError: x"), Some(&a), &opts));
    let fb = generate(&extract_failure_info("t", Some("TypeError: x"), Some(&b), &opts));
    assert_eq!(fa, fb);
  }

  proptest! {
    #[test]
    fn generation_is_deterministic(
      name in ".{0,40}",
      error_type in proptest::option::of("[A-Za-z]{0,12}Error"),
      loc in proptest::option::of("[a-z/]{1,20}\\.test\\.ts:[0-9]{1,4}"),
    ) {
      let a = info(&name, error_type.as_deref(), loc.as_deref());
      let b = a.clone();
      prop_assert_eq!(generate(&a), generate(&b));
      prop_assert_eq!(generate(&a).as_str().len(), FINGERPRINT_LEN);
    }
  }
}
