//! HTTP evaluator for the REST `/v1/eval` endpoint.

use crate::error::EvalError;
use crate::multipart;
use crate::request::EvalRequest;
use crate::Evaluator;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mlquery_core::{ConnectionSettings, ResultRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Path of the evaluation endpoint.
const EVAL_PATH: &str = "/v1/eval";

/// Largest response body read by default.
pub const DEFAULT_RESPONSE_LIMIT: u64 = 1024 * 1024 * 1024;

/// Evaluator talking to a live server.
pub struct HttpEvaluator {
    /// Full URL of the eval endpoint.
    endpoint: String,
    /// Precomputed `Authorization` header value.
    authorization: String,
    /// Pooled HTTP agent.
    agent: ureq::Agent,
    /// Largest response body accepted, in bytes.
    response_limit: u64,
    /// Set once the handle has been released.
    released: AtomicBool,
}

impl HttpEvaluator {
    /// Create an evaluator for the server described by `settings`.
    ///
    /// No request is made here; connection problems surface on the first
    /// evaluation.
    pub fn new(settings: &ConnectionSettings) -> Result<Self, EvalError> {
        if settings.host.trim().is_empty() {
            return Err(EvalError::Transport("no host configured".to_string()));
        }
        if settings.port == 0 {
            return Err(EvalError::Transport("no port configured".to_string()));
        }

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_millis(settings.timeout_ms)))
            .http_status_as_error(false)
            .build()
            .into();

        let credentials = format!("{}:{}", settings.username, settings.password);
        Ok(Self {
            endpoint: format!("http://{}{EVAL_PATH}", settings.authority()),
            authorization: format!("Basic {}", STANDARD.encode(credentials)),
            agent,
            response_limit: DEFAULT_RESPONSE_LIMIT,
            released: AtomicBool::new(false),
        })
    }

    /// Set the largest response body accepted. Larger bodies fail with
    /// [`EvalError::Decode`].
    pub fn with_response_limit(mut self, bytes: u64) -> Self {
        self.response_limit = bytes;
        self
    }

    /// URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Evaluator for HttpEvaluator {
    fn evaluate(&self, request: &EvalRequest) -> Result<ResultRecord, EvalError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(EvalError::Released);
        }

        tracing::debug!(
            "POST {} ({}, {} variables)",
            self.endpoint,
            request.dialect,
            request.variables.len()
        );

        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("Authorization", &self.authorization)
            .header("Accept", "multipart/mixed")
            .send_form(request.form_fields())
            .map_err(|e| EvalError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = response
            .body_mut()
            .with_config()
            .limit(self.response_limit)
            .read_to_vec()
            .map_err(read_error)?;
        let body = String::from_utf8_lossy(&bytes);

        if !(200..300).contains(&status) {
            return Err(EvalError::from_error_body(status, &body));
        }

        decode_success(&content_type, &body)
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            tracing::debug!("Released client for {}", self.endpoint);
        }
    }
}

/// Classify a failure while reading the response body.
fn read_error(error: ureq::Error) -> EvalError {
    match error {
        ureq::Error::BodyExceedsLimit(limit) => {
            EvalError::Decode(format!("response body exceeds {limit} bytes"))
        }
        other => EvalError::Transport(format!("failed to read response: {other}")),
    }
}

/// Decode a 2xx response body into a record.
fn decode_success(content_type: &str, body: &str) -> Result<ResultRecord, EvalError> {
    // An empty sequence comes back without a multipart body.
    if body.trim().is_empty() {
        return Ok(ResultRecord::default());
    }
    let boundary = multipart::boundary(content_type).ok_or_else(|| {
        EvalError::Decode(format!("expected a multipart body, got {content_type:?}"))
    })?;
    let entries = multipart::parse(body, boundary)?
        .into_iter()
        .map(multipart::Part::into_entry)
        .collect();
    Ok(ResultRecord::new(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlquery_core::{ResultEntry, ResultFormat};

    #[test]
    fn test_endpoint_from_settings() {
        let settings = ConnectionSettings {
            host: "db.internal".to_string(),
            port: 8010,
            ..ConnectionSettings::default()
        };
        let evaluator = HttpEvaluator::new(&settings).unwrap();
        assert_eq!(evaluator.endpoint(), "http://db.internal:8010/v1/eval");
        assert_eq!(evaluator.authorization, "Basic YWRtaW46YWRtaW4=");
    }

    #[test]
    fn test_rejects_missing_host() {
        let settings = ConnectionSettings {
            host: String::new(),
            ..ConnectionSettings::default()
        };
        assert!(HttpEvaluator::new(&settings).is_err());
    }

    #[test]
    fn test_released_evaluator_refuses_calls() {
        let evaluator = HttpEvaluator::new(&ConnectionSettings::default()).unwrap();
        evaluator.release();
        let result = evaluator.evaluate(&EvalRequest::database_lookup("Documents"));
        assert_eq!(result, Err(EvalError::Released));
    }

    #[test]
    fn test_decode_success() {
        let body = "--X\r\nContent-Type: text/plain\r\nX-Primitive: integer\r\n\r\n2\r\n--X--\r\n";
        let record = decode_success("multipart/mixed; boundary=X", body).unwrap();
        assert_eq!(
            record.entries(),
            &[ResultEntry::success("2", ResultFormat::Text, "integer")]
        );
    }

    #[test]
    fn test_oversized_body_is_decode_error() {
        let error = read_error(ureq::Error::BodyExceedsLimit(64));
        assert_eq!(
            error,
            EvalError::Decode("response body exceeds 64 bytes".to_string())
        );
        assert_eq!(error.error_source(), mlquery_core::ErrorSource::Transport);
    }

    #[test]
    fn test_decode_empty_sequence() {
        let record = decode_success("", "").unwrap();
        assert!(record.entries().is_empty());
    }

    #[test]
    fn test_decode_unexpected_body() {
        let result = decode_success("text/html", "<html/>");
        assert!(matches!(result, Err(EvalError::Decode(_))));
    }
}
