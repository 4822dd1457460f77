//! Output normalization — turns raw model text into the canonical reply.
//!
//! JSON extraction runs an ordered list of parse strategies, short-circuits
//! on the first success, and falls back to a defined sentinel on total
//! failure — no error-based control flow. Normalization never fails the
//! turn: structured extraction that cannot be satisfied degrades to
//! pass-through with a logged warning.

use serde_json::Value;
use tracing::warn;
use troupe_core::assistant::{OutputFormat, StructuredSchema};

/// Shape raw model output according to the active output format.
///
/// Deterministic: the same (raw, format) pair always yields the same
/// canonical text. Never errors.
pub fn normalize(raw: &str, format: &OutputFormat) -> String {
    match format {
        OutputFormat::None => raw.to_string(),
        OutputFormat::Json => normalize_json(raw),
        OutputFormat::Structured(schema) => normalize_structured(raw, schema),
    }
}

/// The ordered JSON parse strategies: whole text, then fenced block, then
/// the sentinel fallback `{"response": raw, "format": "text"}`.
fn parse_with_fallback(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return value;
    }

    if let Some(block) = extract_fenced_json(raw) {
        if let Ok(value) = serde_json::from_str::<Value>(&block) {
            return value;
        }
    }

    serde_json::json!({ "response": raw, "format": "text" })
}

fn normalize_json(raw: &str) -> String {
    let value = parse_with_fallback(raw);
    reply_from_value(value)
}

/// Pull the canonical reply out of a parsed value: a mapping's `response`
/// string when present, the string form of the value otherwise.
fn reply_from_value(value: Value) -> String {
    if let Some(response) = value.get("response").and_then(Value::as_str) {
        return response.to_string();
    }
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn normalize_structured(raw: &str, schema: &StructuredSchema) -> String {
    match extract_structured(raw, schema) {
        Some(canonical) => canonical,
        None => {
            warn!("Structured extraction failed, passing raw text through");
            raw.to_string()
        }
    }
}

/// Extract the declared fields from a structured reply. `None` on any
/// shortfall: unparseable text, a non-object value, or a missing field.
fn extract_structured(raw: &str, schema: &StructuredSchema) -> Option<String> {
    let value = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(v) => v,
        Err(_) => {
            let block = extract_fenced_json(raw)?;
            serde_json::from_str::<Value>(&block).ok()?
        }
    };

    let object = value.as_object()?;

    let mut extracted = serde_json::Map::new();
    for field in &schema.fields {
        let field_value = object.get(&field.name)?;
        extracted.insert(field.name.clone(), field_value.clone());
    }

    serde_json::to_string(&Value::Object(extracted)).ok()
}

/// Find the first fenced ```json block and return its contents.
///
/// The closing fence must be a line that is exactly ``` (plus whitespace),
/// so stray backticks inside string values don't truncate the block.
fn extract_fenced_json(text: &str) -> Option<String> {
    let mut in_block = false;
    let mut block = String::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if !in_block {
            if trimmed.eq_ignore_ascii_case("```json") {
                in_block = true;
            }
            continue;
        }
        if trimmed == "```" {
            return Some(block);
        }
        if !block.is_empty() {
            block.push('\n');
        }
        block.push_str(line);
    }

    // Unterminated fence: take what we collected, some models drop the
    // closing marker.
    if in_block && !block.is_empty() {
        return Some(block);
    }
    None
}
