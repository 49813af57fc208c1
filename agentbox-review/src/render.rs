//! Terminal rendering of pending changes.

use std::io::Write;
use std::time::Duration;

use agentbox::core::review::ReviewState;
use agentbox::core::reveal::{RevealToken, Revealer};
use agentbox::core::types::ChangeSet;
use similar::TextDiff;

const NULL_PATH: &str = "/dev/null";

/// Unified diff of one path. `None` on either side means the file is absent.
pub fn file_diff(path: &str, original: Option<&str>, modified: Option<&str>) -> String {
    let old_header = match original {
        Some(_) => format!("a/{path}"),
        None => NULL_PATH.to_string(),
    };
    let new_header = match modified {
        Some(_) => format!("b/{path}"),
        None => NULL_PATH.to_string(),
    };
    let diff = TextDiff::from_lines(original.unwrap_or(""), modified.unwrap_or(""));
    let mut unified = diff.unified_diff();
    unified.context_radius(3).header(&old_header, &new_header);
    unified.to_string()
}

/// Diff of `path` against `original`, its submitted content.
pub fn change_diff(changes: &ChangeSet, path: &str, original: Option<&str>) -> String {
    let modified = changes
        .modified(path)
        .map(|file| file.modified_content.as_str());
    file_diff(path, original, modified)
}

/// Active path and its diff against the content it was submitted with.
pub fn active_diff(state: &ReviewState) -> Option<(&str, String)> {
    let changes = state.pending()?;
    let active = state.active()?;
    Some((active, change_diff(changes, active, state.original(active))))
}

/// One line per pending path, the active one marked with `*`.
pub fn status_lines(state: &ReviewState) -> Vec<String> {
    let (Some(changes), Some(active)) = (state.pending(), state.active()) else {
        return vec!["no pending changes".to_string()];
    };
    let mut lines = Vec::with_capacity(changes.len() + 1);
    lines.push(format!("{} pending change(s)", changes.len()));
    for file in &changes.modified_files {
        let marker = if file.path == active { '*' } else { ' ' };
        lines.push(format!("{marker} M {}", file.path));
    }
    for path in &changes.deleted_files {
        let marker = if path == active { '*' } else { ' ' };
        lines.push(format!("{marker} D {path}"));
    }
    lines
}

/// Write `text` line by line, pausing `delay` between lines.
///
/// Returns `false` as soon as `token` is superseded; nothing more is written
/// for it after that.
pub async fn reveal<W: Write>(
    revealer: &Revealer,
    token: &RevealToken,
    text: &str,
    delay: Duration,
    out: &mut W,
) -> std::io::Result<bool> {
    for line in text.lines() {
        if !revealer.is_current(token) {
            return Ok(false);
        }
        writeln!(out, "{line}")?;
        out.flush()?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    let finished = revealer.is_current(token);
    revealer.finish(token);
    Ok(finished)
}
