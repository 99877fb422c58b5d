//! Evaluation error types.

use mlquery_core::ErrorSource;
use thiserror::Error;

/// Error returned when a remote evaluation fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// The server evaluated the request and rejected it.
    #[error("{message}")]
    Application {
        /// HTTP status of the rejection.
        status: u16,
        /// Message taken from the structured error body.
        message: String,
    },
    /// The server could not be reached or the call failed before evaluation.
    #[error("{0}")]
    Transport(String),
    /// The server answered with a body that could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
    /// The client handle was released before the call was made.
    #[error("connection released")]
    Released,
}

impl EvalError {
    /// Which side of the exchange failed.
    pub const fn error_source(&self) -> ErrorSource {
        match self {
            Self::Application { .. } => ErrorSource::Application,
            Self::Transport(_) | Self::Decode(_) | Self::Released => ErrorSource::Transport,
        }
    }

    /// Build an application error from a response body.
    ///
    /// Uses `errorResponse.message` when the body is the structured error
    /// document, otherwise the raw body, otherwise the status code.
    pub fn from_error_body(status: u16, body: &str) -> Self {
        let structured = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|json| {
                json.get("errorResponse")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
            });
        let message = structured.unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("server returned HTTP {status}")
            } else {
                trimmed.to_string()
            }
        });
        Self::Application { status, message }
    }
}
