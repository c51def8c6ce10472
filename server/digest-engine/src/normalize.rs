//! Canonicalize stack-trace file paths so one failure fingerprints the same
//! on every machine, checkout directory and CI leg.
//!
//! Steps, first hit wins:
//! 1. unify separators to `/`
//! 2. relative paths are already canonical
//! 3. `.../base/<rest>` or `.../head/<rest>` (CI dual-checkout) -> `<rest>`
//! 4. `.../<project root marker>/<rest>` -> `<rest>`
//! 5. descendant of the working directory -> path relative to it
//! 6. anything else passes through
//!
//! Normalization never fails; an unnormalized path still fingerprints.

use serde::Serialize;

const DUAL_CHECKOUT_DIRS: [&str; 2] = ["base", "head"];

/// Explicit inputs for normalization; nothing is read from the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeOptions {
  /// Directory names marking a checkout root (e.g. the repository name).
  pub project_roots: Vec<String>,
  /// Working directory to relativize against, if known.
  pub cwd: Option<String>,
}

impl NormalizeOptions {
  /// Options anchored at the current process directory. Adapter use only.
  pub fn from_env(project_roots: Vec<String>) -> Self {
    let cwd = std::env::current_dir()
      .ok()
      .map(|p| p.to_string_lossy().into_owned());
    Self { project_roots, cwd }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeRule {
  AlreadyRelative,
  DualCheckout,
  ProjectRoot,
  WorkingDir,
}

impl NormalizeRule {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::AlreadyRelative => "already_relative",
      Self::DualCheckout => "dual_checkout",
      Self::ProjectRoot => "project_root",
      Self::WorkingDir => "working_dir",
    }
  }
}

/// Outcome of normalization, keeping passthrough distinguishable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedPath {
  Normalized { path: String, rule: NormalizeRule },
  Passthrough(String),
}

impl NormalizedPath {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Normalized { path, .. } => path,
      Self::Passthrough(path) => path,
    }
  }

  pub fn into_string(self) -> String {
    match self {
      Self::Normalized { path, .. } => path,
      Self::Passthrough(path) => path,
    }
  }

  pub fn is_normalized(&self) -> bool {
    matches!(self, Self::Normalized { .. })
  }
}

fn unify_separators(p: &str) -> String {
  p.replace('\\', "/")
}

fn is_absolute(p: &str) -> bool {
  let bytes = p.as_bytes();
  p.starts_with('/')
    || (bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/')
}

/// Non-empty remainders following components equal to one of `names`,
/// in path order.
fn remainders<'a>(path: &'a str, names: &'a [&'a str]) -> impl Iterator<Item = &'a str> + 'a {
  let mut offset = 0;
  path.split('/').filter_map(move |component| {
    let next = offset + component.len() + 1;
    offset = next;
    if !names.contains(&component) || next >= path.len() {
      return None;
    }
    let rest = path[next..].trim_start_matches('/');
    (!rest.is_empty()).then_some(rest)
  })
}

/// Wrap a stripped remainder. A remainder that is itself absolute goes
/// through the pipeline again so the result is a fixed point.
fn finish(rest: &str, rule: NormalizeRule, opts: &NormalizeOptions) -> NormalizedPath {
  if is_absolute(rest) {
    return match normalize_path_detailed(rest, opts) {
      NormalizedPath::Passthrough(path) => NormalizedPath::Normalized { path, rule },
      normalized => normalized,
    };
  }
  NormalizedPath::Normalized {
    path: rest.to_string(),
    rule,
  }
}

/// Normalize `path`, reporting which step (if any) canonicalized it.
pub fn normalize_path_detailed(path: &str, opts: &NormalizeOptions) -> NormalizedPath {
  let unified = unify_separators(path);
  if unified.is_empty() {
    return NormalizedPath::Passthrough(unified);
  }
  if !is_absolute(&unified) {
    return NormalizedPath::Normalized {
      path: unified,
      rule: NormalizeRule::AlreadyRelative,
    };
  }

  if let Some(rest) = remainders(&unified, &DUAL_CHECKOUT_DIRS).next() {
    return finish(rest, NormalizeRule::DualCheckout, opts);
  }

  // Last occurrence wins: handles `work/<repo>/<repo>/...` CI layouts.
  let roots: Vec<&str> = opts.project_roots.iter().map(String::as_str).collect();
  if let Some(rest) = remainders(&unified, &roots).last() {
    return finish(rest, NormalizeRule::ProjectRoot, opts);
  }

  if let Some(cwd) = &opts.cwd {
    let cwd = unify_separators(cwd);
    let cwd = cwd.trim_end_matches('/');
    if !cwd.is_empty() {
      if let Some(rest) = unified.strip_prefix(cwd).and_then(|r| r.strip_prefix('/')) {
        let rest = rest.trim_start_matches('/');
        if !rest.is_empty() {
          return finish(rest, NormalizeRule::WorkingDir, opts);
        }
      }
    }
  }

  NormalizedPath::Passthrough(unified)
}

/// Best-effort canonical relative path for fingerprinting.
pub fn normalize_path(path: &str, opts: &NormalizeOptions) -> String {
  normalize_path_detailed(path, opts).into_string()
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  fn opts() -> NormalizeOptions {
    NormalizeOptions {
      project_roots: vec!["Laminar".into()],
      cwd: Some("/workspace/app".into()),
    }
  }

  #[test]
  fn strips_dual_checkout_prefix() {
    let o = opts();
    assert_eq!(
      normalize_path("/home/runner/work/Laminar/Laminar/base/tests/regression/fixture.test.ts", &o),
      "tests/regression/fixture.test.ts"
    );
    assert_eq!(
      normalize_path("/home/runner/work/Laminar/Laminar/head/tests/regression/fixture.test.ts", &o),
      "tests/regression/fixture.test.ts"
    );
    assert_eq!(
      normalize_path("/some/other/path/Laminar/base/src/utils/helper.ts", &o),
      "src/utils/helper.ts"
    );
  }

  #[test]
  fn windows_paths_are_unified() {
    let o = opts();
    assert_eq!(
      normalize_path("C:\\Users\\dev\\Laminar\\base\\tests\\example.test.ts", &o),
      "tests/example.test.ts"
    );
    assert_eq!(normalize_path("src\\auth\\jwt.ts", &o), "src/auth/jwt.ts");
  }

  #[test]
  fn relative_paths_are_unchanged() {
    let detailed = normalize_path_detailed("tests/regression/fixture.test.ts", &opts());
    assert_eq!(detailed.as_str(), "tests/regression/fixture.test.ts");
    assert!(detailed.is_normalized());
  }

  #[test]
  fn project_root_marker_uses_last_occurrence() {
    let o = opts();
    assert_eq!(
      normalize_path("/Users/alice/projects/Laminar/tests/example.test.ts", &o),
      "tests/example.test.ts"
    );
    assert_eq!(
      normalize_path("/home/runner/work/Laminar/Laminar/tests/example.test.ts", &o),
      "tests/example.test.ts"
    );
  }

  #[test]
  fn working_directory_descendant() {
    let detailed = normalize_path_detailed("/workspace/app/src/lib.test.ts", &opts());
    assert_eq!(
      detailed,
      NormalizedPath::Normalized {
        path: "src/lib.test.ts".into(),
        rule: NormalizeRule::WorkingDir
      }
    );
    // Sibling with a shared prefix is not a descendant.
    assert!(!normalize_path_detailed("/workspace/application/x.ts", &opts()).is_normalized());
  }

  #[test]
  fn unknown_absolute_path_passes_through() {
    let detailed = normalize_path_detailed("/some/absolute/path/to/file.ts", &opts());
    assert_eq!(detailed, NormalizedPath::Passthrough("/some/absolute/path/to/file.ts".into()));
  }

  #[test]
  fn marker_without_remainder_is_not_a_match() {
    let o = opts();
    assert_eq!(normalize_path("/x/base/", &o), "/x/base/");
    assert_eq!(normalize_path("/x/head", &o), "/x/head");
  }

  #[test]
  fn empty_input_passes_through() {
    assert_eq!(normalize_path("", &opts()), "");
  }

  proptest! {
    #[test]
    fn normalization_is_idempotent(path in "[A-Za-z:/\\\\._ -]{0,60}") {
      let o = opts();
      let once = normalize_path(&path, &o);
      let twice = normalize_path(&once, &o);
      prop_assert_eq!(once, twice);
    }

    #[test]
    fn base_and_head_agree(suffix in "[a-z]{1,8}(/[a-z]{1,8}){0,3}\\.test\\.ts") {
      let o = opts();
      let base = normalize_path(&format!("/x/Laminar/base/{}", suffix), &o);
      let head = normalize_path(&format!("/x/Laminar/head/{}", suffix), &o);
      prop_assert_eq!(base, head);
    }
  }
}
