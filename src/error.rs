use reqwest::StatusCode;
use serde_json::Value;

/// Every way a relay exchange can end other than `Done`.
///
/// Classified where the failure happens (status code, transport error kind,
/// deadline) so callers never have to inspect message text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RelayError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// A 2xx JSON body carrying an `error` envelope.
    #[error("{0}")]
    Provider(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("empty response")]
    EmptyResponse,

    #[error("request cancelled")]
    Cancelled,
}

impl RelayError {
    /// Transient faults the UI can offer to retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Network(_) | RelayError::Timeout | RelayError::EmptyResponse => true,
            RelayError::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Faults only the user (sign in, fix the key) or an operator can resolve.
    pub fn requires_action(&self) -> bool {
        match self {
            RelayError::Unauthenticated | RelayError::Configuration(_) => true,
            RelayError::Upstream { status, .. } => matches!(*status, 401 | 402 | 403),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Timeout
        } else if err.is_connect() {
            RelayError::Network(format!("connection failed: {err}"))
        } else if err.is_body() || err.is_decode() {
            RelayError::Network(format!("response interrupted: {err}"))
        } else if err.is_builder() {
            RelayError::Configuration(err.to_string())
        } else {
            RelayError::Network(err.to_string())
        }
    }
}

/// Pulls the message out of `{"error": "..."}` or `{"error": {"message": "..."}}`.
pub(crate) fn error_envelope_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    match value.get("error")? {
        Value::String(message) if !message.is_empty() => Some(message.clone()),
        Value::Object(object) => object
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

/// Builds the failure for a non-2xx response: envelope message, else raw
/// body, else the status line.
pub fn upstream_error(status: StatusCode, body: &str) -> RelayError {
    let message = error_envelope_message(body)
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| status.to_string());
    RelayError::Upstream {
        status: status.as_u16(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_message_wins() {
        let err = upstream_error(StatusCode::BAD_REQUEST, r#"{"error":"bad request"}"#);
        assert_eq!(err.to_string(), "bad request");
        assert_eq!(
            err,
            RelayError::Upstream {
                status: 400,
                message: "bad request".into()
            }
        );
    }

    #[test]
    fn nested_envelope_message() {
        let err = upstream_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Authentication Fails","type":"authentication_error"}}"#,
        );
        assert_eq!(err.to_string(), "Authentication Fails");
        assert!(err.requires_action());
    }

    #[test]
    fn falls_back_to_body_then_status() {
        let err = upstream_error(StatusCode::BAD_GATEWAY, "upstream down\n");
        assert_eq!(err.to_string(), "upstream down");
        assert!(err.is_retryable());

        let err = upstream_error(StatusCode::NOT_FOUND, "");
        assert_eq!(err.to_string(), "404 Not Found");
        assert!(!err.is_retryable());
    }

    #[test]
    fn framing() {
        assert!(RelayError::Timeout.is_retryable());
        assert!(RelayError::Network("reset".into()).is_retryable());
        assert!(RelayError::Unauthenticated.requires_action());
        assert!(!RelayError::Cancelled.is_retryable());
        assert!(!RelayError::Cancelled.requires_action());
    }
}
