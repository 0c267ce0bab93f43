//! Recovery of the analysis object from raw model output.
//!
//! Models are told to answer with bare JSON, but regularly wrap it in
//! code fences or add a sentence before or after. The cleaning here strips
//! that wrapping and cuts out the outermost balanced object.

use super::error::BackendError;
use crate::enrichment::job::Analysis;

/// Parses raw model output into an [`Analysis`].
pub fn parse_analysis(raw: &str) -> Result<Analysis, BackendError> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Err(BackendError::EmptyResponse);
    }

    let json = extract_json(cleaned).ok_or_else(|| {
        BackendError::MalformedOutput(format!(
            "no JSON object in response: {}",
            preview(cleaned)
        ))
    })?;

    serde_json::from_str(json).map_err(|e| BackendError::MalformedOutput(e.to_string()))
}

/// Trims the response and removes a leading ```` ``` ```` / ```` ```json ````
/// fence and a trailing ```` ``` ```` fence.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string ("json", "JSON", ...) up to the first newline.
        text = match rest.find('\n') {
            Some(idx) if rest[..idx].chars().all(|c| c.is_ascii_alphanumeric()) => {
                &rest[idx + 1..]
            }
            _ => rest.strip_prefix("json").unwrap_or(rest),
        };
    }

    if let Some(rest) = text.trim_end().strip_suffix("```") {
        text = rest;
    }

    text.trim()
}

/// Returns the outermost balanced `{...}` object in `text`.
///
/// Braces inside string literals (including escaped quotes) are ignored.
/// If the first object never closes, falls back to the span from the first
/// `{` to the last `}`.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                depth += 1;
            }
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX).collect();
        format!("{}...", head)
    }
}
