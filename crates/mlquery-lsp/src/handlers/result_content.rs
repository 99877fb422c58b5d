//! Custom protocol extensions for virtual result documents.
//!
//! - `mlquery/resultContent` (request): text of a result location
//! - `mlquery/resultChanged` (notification): a result location has new content
//! - `mlquery/connectionInfo` (request): the live connection, if any

use crate::provider::ContentProvider;
use lsp_types::notification::Notification;
use lsp_types::request::Request;
use mlquery_core::VirtualLocation;
use serde::{Deserialize, Serialize};

/// Pull the rendered content of a result location.
#[derive(Debug)]
pub enum ResultContentRequest {}

impl Request for ResultContentRequest {
    type Params = ResultLocationParams;
    type Result = ResultContentResponse;
    const METHOD: &'static str = "mlquery/resultContent";
}

/// Announce that a result location has new content.
#[derive(Debug)]
pub enum ResultChanged {}

impl Notification for ResultChanged {
    type Params = ResultLocationParams;
    const METHOD: &'static str = "mlquery/resultChanged";
}

/// Describe the live connection.
#[derive(Debug)]
pub enum ConnectionInfoRequest {}

impl Request for ConnectionInfoRequest {
    type Params = ();
    type Result = Option<serde_json::Value>;
    const METHOD: &'static str = "mlquery/connectionInfo";
}

/// A result location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultLocationParams {
    /// The `mlquery-result:` URI.
    pub uri: String,
}

/// Rendered content of a result location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultContentResponse {
    /// The text.
    pub text: String,
}

/// Handle a `mlquery/resultContent` request.
pub fn handle_result_content(
    params: &ResultLocationParams,
    provider: &ContentProvider,
) -> Result<ResultContentResponse, String> {
    let location = VirtualLocation::parse(&params.uri).map_err(|e| e.to_string())?;
    Ok(ResultContentResponse {
        text: provider.provide_content(&location),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlquery_core::PENDING_PLACEHOLDER;

    #[test]
    fn test_unknown_location_is_pending() {
        let provider = ContentProvider::new();
        let params = ResultLocationParams {
            uri: "mlquery-result://abc@localhost:8000/q.xqy?%5B%22file%3A%2F%2F%2Fq.xqy%22%5D"
                .to_string(),
        };
        let response = handle_result_content(&params, &provider).unwrap();
        assert_eq!(response.text, PENDING_PLACEHOLDER);
    }

    #[test]
    fn test_rejects_foreign_scheme() {
        let provider = ContentProvider::new();
        let params = ResultLocationParams {
            uri: "file:///q.xqy".to_string(),
        };
        assert!(handle_result_content(&params, &provider).is_err());
    }
}
