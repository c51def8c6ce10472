//! Reduce a raw failure (test name, error text, structured payload) to the
//! minimal `FailureInfo` triple used for fingerprinting.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::normalize::{normalize_path_detailed, NormalizeOptions};
use crate::types::FailureInfo;

macro_rules! cached_regex {
  ($pat:expr) => {{
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new($pat).unwrap())
  }};
}

/// Leading `<Word>Error` token of an error message.
fn leading_error_type(error: &str) -> Option<&str> {
  cached_regex!(r"^(\w+Error)")
    .captures(error)
    .and_then(|c| c.get(1))
    .map(|m| m.as_str())
}

/// Stack lines that point into test sources, by file naming convention.
fn is_test_source_line(line: &str) -> bool {
  cached_regex!(r"[._-](test|spec)\.[cm]?[jt]sx?\b").is_match(line)
}

/// A location parsed from one stack line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSite {
  pub file: String,
  pub line: u32,
  pub column: Option<u32>,
}

/// Parse `(<file>:<line>:<col>)` or `at <file>:<line>:<col>` from a stack line.
pub fn parse_stack_line(line: &str) -> Option<StackSite> {
  let caps = cached_regex!(r"\(([^)]+):(\d+):(\d+)\)")
    .captures(line)
    .or_else(|| cached_regex!(r"at ([^:\s()]+):(\d+):(\d+)").captures(line))?;
  let file = caps.get(1)?.as_str().trim().to_string();
  let line_no = caps.get(2)?.as_str().parse().ok()?;
  let column = caps.get(3).and_then(|m| m.as_str().parse().ok());
  if file.is_empty() {
    return None;
  }
  Some(StackSite {
    file,
    line: line_no,
    column,
  })
}

/// Every parseable site in a stack, outermost-last as printed.
pub fn stack_sites(stack: &str) -> Vec<StackSite> {
  stack.lines().filter_map(parse_stack_line).collect()
}

/// Build `FailureInfo` for one failing case.
///
/// `errorType`: `payload.name` (if a string), else the leading `<Word>Error`
/// token of `error`. `stackLocation`: first test-source line of
/// `payload.stack`, as `<normalized file>:<line>`. Missing or malformed
/// input leaves fields unset.
pub fn extract_failure_info(
  test_name: &str,
  error: Option<&str>,
  payload: Option<&Value>,
  opts: &NormalizeOptions,
) -> FailureInfo {
  let mut info = FailureInfo {
    test_name: test_name.to_string(),
    ..FailureInfo::default()
  };

  if let Some(error) = error.filter(|e| !e.is_empty()) {
    info.error_message = Some(error.to_string());
    info.error_type = leading_error_type(error).map(str::to_string);
  }

  let Some(payload) = payload.filter(|p| p.is_object()) else {
    return info;
  };

  if let Some(stack) = payload.get("stack").and_then(Value::as_str) {
    let site = stack
      .lines()
      .find(|l| is_test_source_line(l))
      .and_then(parse_stack_line);
    if let Some(site) = site {
      let normalized = normalize_path_detailed(&site.file, opts);
      info.location_normalized = normalized.is_normalized();
      info.stack_location = Some(format!("{}:{}", normalized.as_str(), site.line));
    }
  }

  if let Some(name) = payload.get("name").and_then(Value::as_str) {
    info.error_type = Some(name.to_string());
  }

  info
}
