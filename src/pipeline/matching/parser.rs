use serde::Deserialize;
use serde_json::Value;

use super::types::{InsertionPoint, MatchResult, MatchSource};
use super::ResponseError;
use crate::pipeline::checkbox::CheckboxDecision;

/// Matches and checkbox decisions recovered from one oracle answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    pub matches: Vec<MatchResult>,
    pub checkboxes: Vec<CheckboxDecision>,
    /// Entries dropped as incomplete or below the confidence threshold.
    pub discarded: usize,
}

/// Parse the oracle's answer. Markdown fences and surrounding prose are
/// tolerated; entries without a tag, without a non-negative index, or below
/// `threshold` are dropped one by one.
pub fn parse_matching_response(text: &str, threshold: f32) -> Result<ParsedResponse, ResponseError> {
    let value = extract_json(text)?;

    #[derive(Deserialize, Default)]
    struct RawResponse {
        #[serde(default)]
        matches: Vec<Value>,
        #[serde(default)]
        checkboxes: Vec<Value>,
    }

    let raw: RawResponse = match value {
        Value::Array(items) => RawResponse {
            matches: items,
            checkboxes: Vec::new(),
        },
        Value::Object(_) => serde_json::from_value(value).map_err(|e| ResponseError::Json(e.to_string()))?,
        _ => return Err(ResponseError::Json("expected an object or an array".into())),
    };

    let mut parsed = ParsedResponse::default();
    for item in &raw.matches {
        match parse_match(item, threshold) {
            Some(m) => parsed.matches.push(m),
            None => parsed.discarded += 1,
        }
    }
    for item in &raw.checkboxes {
        match parse_checkbox(item) {
            Some(c) => parsed.checkboxes.push(c),
            None => parsed.discarded += 1,
        }
    }

    if parsed.discarded > 0 {
        tracing::debug!(
            kept = parsed.matches.len(),
            discarded = parsed.discarded,
            "Oracle entries discarded"
        );
    }
    Ok(parsed)
}

/// Locate the JSON payload: fenced blocks first, then every balanced
/// object or array left to right. The first candidate that parses wins.
fn extract_json(text: &str) -> Result<Value, ResponseError> {
    let mut first_error = None;
    for candidate in fenced_bodies(text).chain(balanced_spans(text)) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }
    Err(first_error.map_or(ResponseError::NoJson, ResponseError::Json))
}

fn fenced_bodies(text: &str) -> impl Iterator<Item = &str> {
    ["```json", "```JSON", "```"].into_iter().filter_map(move |fence| {
        let body_start = text.find(fence)? + fence.len();
        let len = text[body_start..].find("```")?;
        let body = text[body_start..body_start + len].trim();
        (body.starts_with('{') || body.starts_with('[')).then_some(body)
    })
}

/// Balanced `{...}` or `[...]` spans by opening position.
fn balanced_spans(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|(_, ch)| matches!(ch, '{' | '['))
        .filter_map(move |(start, _)| balanced_from(text, start))
}

/// Balanced span opening at `start`, ignoring brackets inside strings.
fn balanced_from(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_match(item: &Value, threshold: f32) -> Option<MatchResult> {
    let tag = item
        .get("tag")
        .and_then(Value::as_str)
        .map(|t| t.trim().trim_start_matches("{{").trim_end_matches("}}").trim().to_string())
        .filter(|t| !t.is_empty())?;

    let target_index = item
        .get("target_index")
        .or_else(|| item.get("index"))
        .and_then(as_index)?;

    let mut confidence = item.get("confidence").and_then(as_number)? as f32;
    if confidence > 1.0 && confidence <= 100.0 {
        confidence /= 100.0;
    }
    if !(0.0..=1.0).contains(&confidence) || confidence < threshold {
        return None;
    }

    let insertion_point = item
        .get("insertion_point")
        .and_then(Value::as_str)
        .and_then(InsertionPoint::parse)
        .unwrap_or(InsertionPoint::Inline);

    let reason = item
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|r| !r.is_empty());

    Some(MatchResult {
        tag,
        target_index,
        confidence,
        insertion_point,
        reason,
        source: MatchSource::Oracle,
    })
}

fn parse_checkbox(item: &Value) -> Option<CheckboxDecision> {
    let index = item
        .get("index")
        .or_else(|| item.get("checkbox"))
        .and_then(as_index)?;
    let checked = match item.get("checked")? {
        Value::Bool(b) => *b,
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "oui" | "checked" => true,
            "false" | "no" | "non" | "unchecked" => false,
            _ => return None,
        },
        _ => return None,
    };
    Some(CheckboxDecision { index, checked })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Non-negative integral index, from a number or a numeric string.
fn as_index(value: &Value) -> Option<usize> {
    let n = as_number(value)?;
    (n >= 0.0 && n.fract() == 0.0).then_some(n as usize)
}
