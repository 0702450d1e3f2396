//! Text extraction from intercepted structured payloads
//!
//! The browser fallback observes whatever structured responses the page
//! loads; the record for the target post can sit at any nesting depth and
//! in several shapes. This module walks the whole payload looking for a
//! record whose id matches, preferring the long-form note text over the
//! standard text no matter where either appears.

use serde_json::Value;

/// Find the text of the post with `item_id` anywhere inside `payload`.
///
/// Precedence: if any matching record carries long-form note text, that
/// wins; otherwise the first standard text seen is returned. `None` when
/// no matching record carries any text.
pub fn extract_status_text(payload: &Value, item_id: &str) -> Option<String> {
    let mut standard: Option<String> = None;
    if let Some(note) = walk(payload, item_id, &mut standard) {
        return Some(note);
    }
    standard
}

/// Recursive walk. Returns long-form text as soon as it is found; standard
/// text is only remembered, never returned early, so a note field deeper in
/// the tree still wins.
fn walk(value: &Value, item_id: &str, standard: &mut Option<String>) -> Option<String> {
    match value {
        Value::Object(map) => {
            if record_matches(map, item_id) {
                if let Some(note) = note_text(map) {
                    return Some(note);
                }
                if standard.is_none() {
                    *standard = standard_text(map);
                }
            }
            for child in map.values() {
                if let Some(note) = walk(child, item_id, standard) {
                    return Some(note);
                }
            }
            None
        }
        Value::Array(items) => {
            for child in items {
                if let Some(note) = walk(child, item_id, standard) {
                    return Some(note);
                }
            }
            None
        }
        _ => None,
    }
}

/// A record represents the target post when any of its id fields equals the
/// item id. Numeric ids are compared through their decimal form.
fn record_matches(map: &serde_json::Map<String, Value>, item_id: &str) -> bool {
    for key in ["rest_id", "id_str", "id"] {
        match map.get(key) {
            Some(Value::String(s)) if s == item_id => return true,
            Some(Value::Number(n)) if n.to_string() == item_id => return true,
            _ => {}
        }
    }
    false
}

/// Long-form note text: `note_tweet.note_tweet_results.result.text`.
fn note_text(map: &serde_json::Map<String, Value>) -> Option<String> {
    let text = map
        .get("note_tweet")?
        .get("note_tweet_results")?
        .get("result")?
        .get("text")?
        .as_str()?;
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Standard text: `legacy.full_text`, then a direct `full_text`.
fn standard_text(map: &serde_json::Map<String, Value>) -> Option<String> {
    if let Some(text) = map
        .get("legacy")
        .and_then(|l| l.get("full_text"))
        .and_then(Value::as_str)
    {
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }
    if let Some(text) = map.get("full_text").and_then(Value::as_str) {
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }
    None
}
