//! Input-reference parsing
//!
//! Batch input references arrive in several shapes: canonical status URLs,
//! share/intent-style URLs carrying the id in a query parameter, or the raw
//! numeric id itself. This module normalizes all of them to the numeric
//! item id and builds the canonical URL used by the browser fallback.
//!
//! # Supported Formats
//!
//! - Status URLs: `https://example.social/someone/status/1234567890123456789`
//! - Intent URLs: `...?in_reply_to=1234567890123456789`
//! - Intent URLs: `...?post_id=1234567890123456789`
//! - Raw ids: 15-20 digit strings

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{ReplycastError, Result};

fn status_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/status(?:es)?/(\d+)").unwrap())
}

fn reply_param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"in_reply_to=(\d+)").unwrap())
}

fn id_param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"post_id=(\d+)").unwrap())
}

fn raw_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{15,20}$").unwrap())
}

/// Extract the numeric item id from a raw input reference.
///
/// Checks, in order: status-path URLs, `in_reply_to=` intent URLs,
/// `post_id=` intent URLs, and bare 15-20 digit ids. The digit-range guard
/// on raw ids keeps short numbers (ports, counts) from being mistaken for
/// post ids.
///
/// # Errors
///
/// Returns `ReplycastError::InvalidInput` when no id can be extracted.
pub fn extract_post_id(reference: &str) -> Result<String> {
    let trimmed = reference.trim();

    if let Some(caps) = status_re().captures(trimmed) {
        return Ok(caps[1].to_string());
    }
    if let Some(caps) = reply_param_re().captures(trimmed) {
        return Ok(caps[1].to_string());
    }
    if let Some(caps) = id_param_re().captures(trimmed) {
        return Ok(caps[1].to_string());
    }
    if raw_id_re().is_match(trimmed) {
        return Ok(trimmed.to_string());
    }

    Err(ReplycastError::InvalidInput(format!(
        "could not extract a post id from '{}'",
        reference
    )))
}

/// Build the canonical status URL for an item id, for the browser fallback
/// when the caller did not supply a source URL.
pub fn canonical_status_url(base: &str, item_id: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), item_id)
}
