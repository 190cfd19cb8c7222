use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API returned error (HTTP {status}): {message}")]
    Api { status: StatusCode, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Failed to encode request: {0}")]
    Encode(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// True for a 404 from Kibana; the object is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// Kibana's JSON error envelope
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Prefer Kibana's message; fall back to the raw body text
    pub(crate) fn describe(text: &str) -> String {
        match serde_json::from_str::<ErrorBody>(text) {
            Ok(ErrorBody {
                message: Some(message),
                error,
            }) => match error {
                Some(error) => format!("{}: {}", error, message),
                None => message,
            },
            _ if text.trim().is_empty() => "empty response body".to_string(),
            _ => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_detected_by_status() {
        let err = ApiError::Api {
            status: StatusCode::NOT_FOUND,
            message: "Saved object [action/abc] not found".to_string(),
        };
        assert!(err.is_not_found());

        let err = ApiError::Api {
            status: StatusCode::BAD_REQUEST,
            message: "not found in message only".to_string(),
        };
        assert!(!err.is_not_found());
        assert!(!ApiError::Parse("x".to_string()).is_not_found());
    }

    #[test]
    fn error_body_prefers_kibana_message() {
        let text = r#"{"statusCode":400,"error":"Bad Request","message":"[request body.name]: expected value of type [string]"}"#;
        assert_eq!(
            ErrorBody::describe(text),
            "Bad Request: [request body.name]: expected value of type [string]"
        );
        assert_eq!(ErrorBody::describe("gateway exploded"), "gateway exploded");
        assert_eq!(ErrorBody::describe(""), "empty response body");
    }
}
