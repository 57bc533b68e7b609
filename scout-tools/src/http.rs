//! Shared HTTP plumbing: client construction, argument helpers, and the
//! mapping from transport failures to typed action errors.

use reqwest::{Client, StatusCode};
use scout_core::error::ActionError;
use std::time::Duration;

/// Per-request timeout. The registry's own timeout still applies on top.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(12);

pub(crate) fn build_client(name: &str, user_agent: &str) -> Result<Client, ActionError> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| ActionError::ExecutionFailed {
            name: name.to_string(),
            message: format!("Failed to create HTTP client: {e}"),
        })
}

pub(crate) fn send_error(name: &str, err: reqwest::Error) -> ActionError {
    if err.is_timeout() {
        ActionError::Timeout {
            name: name.to_string(),
            timeout_secs: REQUEST_TIMEOUT.as_secs(),
        }
    } else {
        ActionError::Unreachable {
            name: name.to_string(),
            message: err.to_string(),
        }
    }
}

/// Non-success statuses become failures. Credential rejections are not
/// worth retrying, so they are execution failures rather than unreachable.
pub(crate) fn check_status(name: &str, status: StatusCode) -> Result<(), ActionError> {
    if status.is_success() {
        return Ok(());
    }
    let message = format!("HTTP {status}");
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ActionError::ExecutionFailed {
            name: name.to_string(),
            message: format!("{message}: credentials rejected"),
        },
        _ => ActionError::Unreachable {
            name: name.to_string(),
            message,
        },
    })
}

pub(crate) fn decode_json(name: &str, body: &str) -> Result<serde_json::Value, ActionError> {
    serde_json::from_str(body).map_err(|e| ActionError::Malformed {
        name: name.to_string(),
        message: format!("Invalid JSON: {e}"),
    })
}

/// A required, non-blank string argument.
pub(crate) fn required_str<'a>(
    args: &'a serde_json::Value,
    name: &str,
    key: &str,
) -> Result<&'a str, ActionError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ActionError::InvalidArguments {
            name: name.to_string(),
            reason: format!("Missing required parameter: {key}"),
        })
}

pub(crate) fn optional_str<'a>(args: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `count` argument clamped to `1..=max`.
pub(crate) fn count_arg(args: &serde_json::Value, default: u64, max: u64) -> u64 {
    args.get("count")
        .and_then(|v| v.as_u64())
        .unwrap_or(default)
        .clamp(1, max)
}

/// Host part of a URL, or empty.
pub(crate) fn domain(raw: &str) -> String {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .unwrap_or_default()
}

/// First `max` characters of `text`, on a char boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    match text.char_indices().nth(max) {
        Some((cut, _)) => (text[..cut].to_string(), true),
        None => (text.to_string(), false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_str() {
        let args = json!({"query": "  Acme Corp  ", "blank": "  "});
        assert_eq!(required_str(&args, "web_search", "query").unwrap(), "Acme Corp");
        assert!(matches!(
            required_str(&args, "web_search", "blank"),
            Err(ActionError::InvalidArguments { .. })
        ));
        assert!(required_str(&args, "web_search", "missing").is_err());
    }

    #[test]
    fn test_check_status() {
        assert!(check_status("x", StatusCode::OK).is_ok());
        assert!(matches!(
            check_status("x", StatusCode::UNAUTHORIZED),
            Err(ActionError::ExecutionFailed { .. })
        ));
        assert!(matches!(
            check_status("x", StatusCode::SERVICE_UNAVAILABLE),
            Err(ActionError::Unreachable { .. })
        ));
    }

    #[test]
    fn test_decode_json_malformed() {
        assert!(matches!(
            decode_json("x", "<html>"),
            Err(ActionError::Malformed { .. })
        ));
    }

    #[test]
    fn test_count_arg_clamped() {
        assert_eq!(count_arg(&json!({}), 10, 20), 10);
        assert_eq!(count_arg(&json!({"count": 50}), 10, 20), 20);
        assert_eq!(count_arg(&json!({"count": 0}), 10, 20), 1);
    }

    #[test]
    fn test_domain() {
        assert_eq!(domain("https://www.acme.com/careers/123"), "acme.com");
        assert_eq!(domain("not a url"), "");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        let (cut, truncated) = truncate_chars("Zürich office", 2);
        assert_eq!(cut, "Zü");
        assert!(truncated);
        let (whole, truncated) = truncate_chars("short", 10);
        assert_eq!(whole, "short");
        assert!(!truncated);
    }
}
