//! Best-effort source excerpts for stack locations.
//!
//! A missing or unreadable source file simply yields no frame.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::CodeFrameConfig;
use crate::extract::{stack_sites, StackSite};
use crate::normalize::{normalize_path_detailed, NormalizeOptions};
use crate::types::CodeFrame;

/// Runtime-internal frames that never resolve to project sources.
fn is_internal(file: &str) -> bool {
  file.starts_with("node:") || file.contains("node_modules/") || file.starts_with("internal/")
}

fn resolve(site: &StackSite, source_root: &Path, opts: &NormalizeOptions) -> (String, PathBuf) {
  let normalized = normalize_path_detailed(&site.file, opts);
  let display = normalized.as_str().to_string();
  let on_disk = if normalized.is_normalized() {
    source_root.join(&display)
  } else {
    PathBuf::from(&display)
  };
  (display, on_disk)
}

/// Render `context` lines around 1-based `line`, marking the failing line.
pub fn render_snippet(source: &str, line: u32, context: usize) -> Option<String> {
  let lines: Vec<&str> = source.lines().collect();
  let target = usize::try_from(line).ok()?;
  if target == 0 || target > lines.len() {
    return None;
  }
  let start = target.saturating_sub(context).max(1);
  let end = target.saturating_add(context).min(lines.len());
  let width = end.to_string().len();
  let snippet = (start..=end)
    .map(|n| {
      let marker = if n == target { '>' } else { ' ' };
      format!("{} {:>width$} | {}", marker, n, lines[n - 1], width = width)
    })
    .collect::<Vec<_>>()
    .join("\n");
  Some(snippet)
}

/// Resolve up to `cfg.max_frames` frames from a stack trace.
pub fn extract_code_frames(
  stack: &str,
  source_root: &Path,
  opts: &NormalizeOptions,
  cfg: &CodeFrameConfig,
) -> Vec<CodeFrame> {
  let mut frames = Vec::new();
  let mut seen = HashSet::new();
  for site in stack_sites(stack) {
    if frames.len() >= cfg.max_frames {
      break;
    }
    let unified = site.file.replace('\\', "/");
    if is_internal(&unified) {
      continue;
    }
    let (file, on_disk) = resolve(&site, source_root, opts);
    if !seen.insert((file.clone(), site.line)) {
      continue;
    }
    let source = match std::fs::read_to_string(&on_disk) {
      Ok(s) => s,
      Err(e) => {
        debug!(path = %on_disk.display(), error = %e, "code frame source unavailable");
        continue;
      }
    };
    if let Some(snippet) = render_snippet(&source, site.line, cfg.context) {
      frames.push(CodeFrame {
        file,
        line: site.line,
        column: site.column,
        snippet,
      });
    }
  }
  frames
}
