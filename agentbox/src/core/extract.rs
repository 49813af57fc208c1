//! JSON extraction from model-produced text.
//!
//! Accepted grammar: optional surrounding whitespace, then either a bare JSON
//! value or a Markdown code fence (```` ``` ```` with an optional info string
//! such as `json`) whose body is a JSON value.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no JSON content found")]
    Empty,
    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A\s*```[A-Za-z0-9_+.-]*[ \t]*\r?\n(.*?)\r?\n?[ \t]*```\s*\z").unwrap()
});

/// Parse `text` as JSON, unwrapping a single surrounding code fence if present.
pub fn extract_json(text: &str) -> Result<Value, ExtractError> {
    let body = match FENCE_RE.captures(text).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str(),
        None => text,
    };
    let body = body.trim();
    if body.is_empty() {
        return Err(ExtractError::Empty);
    }
    Ok(serde_json::from_str(body)?)
}
