//! Input normalization for memory writes
//!
//! Rules:
//! - category: trim + lowercase, empty falls back to "general"
//! - tags: trim each, drop blanks, deduplicate preserving first occurrence
//! - content: trim, reject empty and oversized
//! - project: trim, empty falls back to "default"
//! - timestamps: normalized to the store's `datetime('now')` format

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::{EngramError, Result};
use crate::types::MAX_CONTENT_CHARS;

/// Timestamp format used everywhere in the store
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Generate a fresh memory id (UUID v4, textual form)
pub fn new_memory_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Normalize a category token
pub fn normalize_category(category: Option<&str>) -> String {
    let normalized = category.unwrap_or("").trim().to_lowercase();
    if normalized.is_empty() {
        "general".to_string()
    } else {
        normalized
    }
}

/// Normalize a project namespace token
pub fn normalize_project(project: Option<&str>) -> String {
    let normalized = project.unwrap_or("").trim().to_string();
    if normalized.is_empty() {
        "default".to_string()
    } else {
        normalized
    }
}

/// Normalize a tag list: trim, drop blanks, dedup keeping first occurrence
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            result.push(trimmed.to_string());
        }
    }
    result
}

/// Normalize content: trim, reject empty or oversized input
pub fn normalize_content(content: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(EngramError::InvalidInput(
            "content must not be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_CONTENT_CHARS {
        return Err(EngramError::InvalidInput(format!(
            "content exceeds {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

/// Parse a caller-supplied timestamp and render it in store format (UTC)
///
/// Accepts the store format itself, RFC 3339, and bare dates (midnight).
pub fn normalize_timestamp(input: &str) -> Result<String> {
    let trimmed = input.trim();

    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT) {
        return Ok(dt.format(TIMESTAMP_FORMAT).to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc).format(TIMESTAMP_FORMAT).to_string());
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let midnight = NaiveDateTime::new(date, NaiveTime::MIN);
        return Ok(midnight.format(TIMESTAMP_FORMAT).to_string());
    }

    Err(EngramError::InvalidInput(format!(
        "invalid timestamp: {}",
        input
    )))
}

/// Stable digest of trimmed content, used for optional same-project dedup
pub fn content_fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.trim().as_bytes());
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_defaults_to_general() {
        assert_eq!(normalize_category(None), "general");
        assert_eq!(normalize_category(Some("  ")), "general");
        assert_eq!(normalize_category(Some(" CODE ")), "code");
    }

    #[test]
    fn test_tags_dedup_preserves_first() {
        let tags = vec![
            " ts ".to_string(),
            "ts".to_string(),
            "".to_string(),
            "rust".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["ts", "rust"]);
    }

    #[test]
    fn test_content_rejects_empty() {
        assert!(normalize_content("   ").is_err());
        assert_eq!(normalize_content(" hi ").unwrap(), "hi");
    }

    #[test]
    fn test_content_rejects_oversized() {
        let long = "x".repeat(MAX_CONTENT_CHARS + 1);
        assert!(normalize_content(&long).is_err());
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(
            normalize_timestamp("2026-01-15 10:30:00").unwrap(),
            "2026-01-15 10:30:00"
        );
        assert_eq!(
            normalize_timestamp("2026-01-15T10:30:00Z").unwrap(),
            "2026-01-15 10:30:00"
        );
        assert_eq!(
            normalize_timestamp("2026-01-15").unwrap(),
            "2026-01-15 00:00:00"
        );
        assert!(normalize_timestamp("not a date").is_err());
    }

    #[test]
    fn test_fingerprint_ignores_surrounding_whitespace() {
        assert_eq!(content_fingerprint("  hello  "), content_fingerprint("hello"));
        assert_ne!(content_fingerprint("hello"), content_fingerprint("Hello"));
    }

    #[test]
    fn test_memory_id_is_uuid() {
        let id = new_memory_id();
        assert_eq!(id.len(), 36);
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }
}
