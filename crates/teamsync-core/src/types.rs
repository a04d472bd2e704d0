//! Small shared helpers: identifiers, timestamps and endpoint strings.

use chrono::{DateTime, Utc};
use ulid::Ulid;

/// Timestamp type used in every persisted and wire record.
pub type Timestamp = DateTime<Utc>;

/// Current time.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Generate a new unique identifier (ULID string, lexicographically sortable).
pub fn new_id() -> String {
    Ulid::new().to_string()
}

/// Normalize a peer endpoint to bare `host:port`.
///
/// Accepts values pasted with a scheme or trailing slash
/// (`http://10.0.0.2:19960/`).
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .or_else(|| trimmed.strip_prefix("ws://"))
        .unwrap_or(trimmed);
    without_scheme.trim_end_matches('/').to_string()
}

/// Build an `http://` URL on a peer endpoint.
pub fn http_url(endpoint: &str, path: &str) -> String {
    format!("http://{}{}", normalize_endpoint(endpoint), path)
}

/// Build a `ws://` URL on a peer endpoint.
pub fn ws_url(endpoint: &str, path: &str) -> String {
    format!("ws://{}{}", normalize_endpoint(endpoint), path)
}
