//! Shared HTTP utilities for the shopping list workspace.
//!
//! Provides JSON error bodies and timestamp helpers used by the api-server.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::SystemTime;

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Create a structured error JSON with a default message based on the code.
///
/// Returns: `{"error": {"code": "<code>", "message": "<default message>"}}`
pub fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "not_found" => "Resource not found",
        "bad_request" | "invalid_request" => "Bad request",
        "invalid_id" => "Invalid document id",
        "conflict" => "Resource already exists",
        "purchased" => "Purchased products cannot be deleted",
        "error" | "internal" => "Internal server error",
        _ => code,
    };
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Create a structured error JSON with a custom message.
///
/// Returns: `{"error": {"code": "<code>", "message": "<message>"}}`
pub fn json_error_with_message(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

// ============================================================================
// Time Utilities
// ============================================================================

/// Convert SystemTime to RFC3339 string (seconds precision, UTC).
pub fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================================================
// Query Parsing
// ============================================================================

/// Clamp a client-supplied `limit` into 1..=max, falling back to `default`.
pub fn clamp_limit(limit: Option<usize>, default: usize, max: usize) -> usize {
    match limit {
        Some(0) | None => default,
        Some(n) => n.min(max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn json_err_default_messages() {
        let v = json_err("not_found");
        assert_eq!(v["error"]["code"], "not_found");
        assert_eq!(v["error"]["message"], "Resource not found");
        let v = json_err("weird");
        assert_eq!(v["error"]["message"], "weird");
    }

    #[test]
    fn custom_message() {
        let v = json_error_with_message("invalid_request", "name: empty");
        assert_eq!(v["error"]["message"], "name: empty");
    }

    #[test]
    fn rfc3339_seconds_utc() {
        let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_900);
        assert_eq!(system_time_to_rfc3339(t), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn limit_clamping() {
        assert_eq!(clamp_limit(None, 20, 100), 20);
        assert_eq!(clamp_limit(Some(0), 20, 100), 20);
        assert_eq!(clamp_limit(Some(5), 20, 100), 5);
        assert_eq!(clamp_limit(Some(500), 20, 100), 100);
    }
}
