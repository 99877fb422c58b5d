//! Decoding of `multipart/mixed` evaluation responses.
//!
//! The eval endpoint returns one part per result item. The part's
//! `Content-Type` gives the item format and `X-Primitive` its datatype.

use crate::error::EvalError;
use mlquery_core::{ResultEntry, ResultFormat};

/// Datatype used when a part carries no `X-Primitive` header.
const UNKNOWN_DATATYPE: &str = "node()";

/// One body part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Header name/value pairs, names lowercased.
    pub headers: Vec<(String, String)>,
    /// Raw part content.
    pub body: String,
}

impl Part {
    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Convert the part into a result entry.
    pub fn into_entry(self) -> ResultEntry {
        let format = self
            .header("content-type")
            .map_or(ResultFormat::Text, ResultFormat::from_content_type);
        let datatype = self
            .header("x-primitive")
            .unwrap_or(UNKNOWN_DATATYPE)
            .to_string();
        let value = match format {
            ResultFormat::Json => serde_json::from_str(&self.body)
                .unwrap_or(serde_json::Value::String(self.body)),
            _ => serde_json::Value::String(self.body),
        };
        ResultEntry::Success {
            value,
            format,
            datatype,
        }
    }
}

/// Extract the boundary parameter of a `multipart/*` content type.
pub fn boundary(content_type: &str) -> Option<&str> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.to_ascii_lowercase().starts_with("multipart/") {
        return None;
    }
    params.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"'))
    })
}

/// Split a multipart body into its parts.
pub fn parse(body: &str, boundary: &str) -> Result<Vec<Part>, EvalError> {
    let delimiter = format!("--{boundary}");
    let mut segments = body.split(delimiter.as_str());

    // Anything before the first delimiter is preamble.
    if segments.next().is_none() {
        return Ok(Vec::new());
    }

    let mut parts = Vec::new();
    let mut closed = false;
    for segment in segments {
        if segment.starts_with("--") {
            closed = true;
            break;
        }
        parts.push(parse_part(segment)?);
    }

    if !closed && !parts.is_empty() {
        tracing::warn!("multipart body ended without closing delimiter");
    }
    Ok(parts)
}

fn parse_part(segment: &str) -> Result<Part, EvalError> {
    let segment = strip_line_break_prefix(segment);
    let segment = strip_line_break_suffix(segment);

    let (head, body) = segment
        .split_once("\r\n\r\n")
        .or_else(|| segment.split_once("\n\n"))
        .ok_or_else(|| EvalError::Decode("multipart part without header block".to_string()))?;

    let headers = head
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_once(':')
                .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
                .ok_or_else(|| EvalError::Decode(format!("malformed part header: {line}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Part {
        headers,
        body: body.to_string(),
    })
}

fn strip_line_break_prefix(s: &str) -> &str {
    s.strip_prefix("\r\n")
        .or_else(|| s.strip_prefix('\n'))
        .unwrap_or(s)
}

fn strip_line_break_suffix(s: &str) -> &str {
    s.strip_suffix("\r\n")
        .or_else(|| s.strip_suffix('\n'))
        .unwrap_or(s)
}
