/// Shared utility functions

use crate::error::{validation, DeskflowResult};

/// Safely truncate a string at a UTF-8 boundary
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if max_bytes >= s.len() { return s; }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Check that `value` is a hyphenated 36-char UUID. `field` names the argument in the error.
pub fn validate_id(field: &str, value: &str) -> DeskflowResult<()> {
    if value.len() != 36 || uuid::Uuid::parse_str(value).is_err() {
        return Err(validation(format!("{} must be a valid UUID", field)));
    }
    Ok(())
}

/// Trim `value` and require it to be non-empty and at most `max_chars` characters.
pub fn require_text(field: &str, value: &str, max_chars: usize) -> DeskflowResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(validation(format!("{} is required", field)));
    }
    if value.chars().count() > max_chars {
        return Err(validation(format!("{} cannot exceed {} characters", field, max_chars)));
    }
    Ok(trimmed.to_string())
}

/// Clamp an optional caller-supplied limit into `1..=max`.
pub fn clamp_limit(limit: Option<i64>, default: usize, max: usize) -> usize {
    match limit {
        Some(n) if n < 1 => 1,
        Some(n) => (n as usize).min(max),
        None => default,
    }
}
