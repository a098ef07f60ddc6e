// --- File: crates/venuebook_common/src/http.rs ---
use reqwest::StatusCode;
use serde_json::Value;

use crate::error::{external_service_error, VenuebookError};

// Include the client module
pub mod client;

/// Name used for errors raised by the remote booking service.
pub const SERVICE_NAME: &str = "booking service";

/// Formats an `Authorization` header value.
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

/// Extracts the human readable message from an error body.
///
/// The server reports `{"message": "..."}` or, for field validation,
/// `{"message": ["...", "..."]}`; `error` is used when `message` is missing.
/// Non-JSON bodies are returned trimmed, empty bodies yield `None`.
pub fn server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(json) = serde_json::from_str::<Value>(trimmed) else {
        return Some(trimmed.to_string());
    };
    let pick = |value: &Value| -> Option<String> {
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Array(items) => {
                let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                (!parts.is_empty()).then(|| parts.join("; "))
            }
            _ => None,
        }
    };
    json.get("message")
        .and_then(pick)
        .or_else(|| json.get("error").and_then(pick))
}

/// Maps a non-success status and its body to the error taxonomy.
pub fn error_from_status(status: StatusCode, body: &str) -> VenuebookError {
    let message = server_message(body)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            VenuebookError::ValidationError(message)
        }
        StatusCode::UNAUTHORIZED => VenuebookError::AuthError(message),
        StatusCode::FORBIDDEN => VenuebookError::ForbiddenError(message),
        StatusCode::NOT_FOUND => VenuebookError::NotFoundError(message),
        StatusCode::CONFLICT => VenuebookError::ConflictError(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            VenuebookError::TimeoutError(message)
        }
        _ => external_service_error(SERVICE_NAME, format!("{} ({})", message, status.as_u16())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_variants() {
        assert_eq!(
            server_message(r#"{"statusCode":409,"message":"Slot already taken"}"#),
            Some("Slot already taken".to_string())
        );
        assert_eq!(
            server_message(r#"{"message":["startAt must be a date","endAt must be a date"],"error":"Bad Request"}"#),
            Some("startAt must be a date; endAt must be a date".to_string())
        );
        assert_eq!(
            server_message(r#"{"error":"Unauthorized"}"#),
            Some("Unauthorized".to_string())
        );
        assert_eq!(server_message("  upstream down \n"), Some("upstream down".to_string()));
        assert_eq!(server_message(""), None);
    }

    #[test]
    fn test_error_from_status_taxonomy() {
        assert!(matches!(
            error_from_status(StatusCode::BAD_REQUEST, r#"{"message":["title too long"]}"#),
            VenuebookError::ValidationError(ref m) if m == "title too long"
        ));
        assert!(matches!(
            error_from_status(StatusCode::UNAUTHORIZED, ""),
            VenuebookError::AuthError(ref m) if m == "Unauthorized"
        ));
        assert!(matches!(
            error_from_status(StatusCode::FORBIDDEN, "{}"),
            VenuebookError::ForbiddenError(_)
        ));
        assert!(matches!(
            error_from_status(StatusCode::CONFLICT, r#"{"message":"overlap"}"#),
            VenuebookError::ConflictError(_)
        ));
        assert!(matches!(
            error_from_status(StatusCode::BAD_GATEWAY, ""),
            VenuebookError::ExternalServiceError { .. }
        ));
    }

    #[test]
    fn test_bearer_header() {
        assert_eq!(bearer("abc"), "Bearer abc");
    }
}
