//! Execute command handler for running queries.
//!
//! Provides commands:
//! - mlquery.sendXQuery: Run the document as XQuery
//! - mlquery.sendJavaScript: Run the document as server-side JavaScript

use lsp_types::ExecuteCommandParams;
use mlquery_core::Dialect;
use serde::{Deserialize, Serialize};

/// Run the document as XQuery.
pub const SEND_XQUERY: &str = "mlquery.sendXQuery";
/// Run the document as server-side JavaScript.
pub const SEND_JAVASCRIPT: &str = "mlquery.sendJavaScript";

/// Available commands.
pub const COMMANDS: &[&str] = &[SEND_XQUERY, SEND_JAVASCRIPT];

/// Arguments of the run commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryArgs {
    /// URI of the document to run.
    pub uri: String,
    /// Query text. Taken from the open document when absent.
    #[serde(default)]
    pub text: Option<String>,
}

/// Answer to a run command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    /// Location that shows `pending...` until the result lands.
    pub uri: String,
    /// Sequence number of this run for that location.
    pub ticket: u64,
}

/// Dialect a command runs the document as.
pub fn command_dialect(command: &str) -> Option<Dialect> {
    match command {
        SEND_XQUERY => Some(Dialect::XQuery),
        SEND_JAVASCRIPT => Some(Dialect::JavaScript),
        _ => None,
    }
}

/// Read the arguments of a run command.
pub fn parse_run_query_args(params: &ExecuteCommandParams) -> Result<RunQueryArgs, String> {
    let arg = params
        .arguments
        .first()
        .ok_or_else(|| format!("{} requires a document argument", params.command))?;

    // A bare string is accepted as the document URI.
    if let Some(uri) = arg.as_str() {
        return Ok(RunQueryArgs {
            uri: uri.to_string(),
            text: None,
        });
    }

    serde_json::from_value(arg.clone()).map_err(|e| format!("invalid arguments: {e}"))
}
