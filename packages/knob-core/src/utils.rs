//! General utilities shared across the crate.

use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::Url;

// ─────────────────────────────────────────────────────────────────────────────
// Time Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge Address Utilities
// ─────────────────────────────────────────────────────────────────────────────

/// Trims whitespace and trailing slashes from a bridge base address.
#[must_use]
pub fn normalize_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}

/// Returns the host component of a base address, if it has a non-empty one.
#[must_use]
pub fn host_of(base: &str) -> Option<String> {
    Url::parse(base.trim())
        .ok()?
        .host_str()
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

/// Validates and normalizes a bridge address received from discovery or the user.
///
/// Bare `host[:port]` values get an `http://` scheme. Returns `None` when
/// there is no usable host.
#[must_use]
pub fn sanitize_bridge_base(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };
    host_of(&candidate)?;
    Some(normalize_base(&candidate))
}
