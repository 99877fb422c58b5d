//! Query result records and their text rendering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Text shown for a location that has no result yet.
pub const PENDING_PLACEHOLDER: &str = "pending...";

/// Datatype reported for synthesized error entries.
pub const ERROR_DATATYPE: &str = "node()";

/// Query language a document is evaluated as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// XQuery 1.0-ml.
    XQuery,
    /// Server-side JavaScript.
    JavaScript,
}

impl Dialect {
    /// Name of the form field carrying a query of this dialect.
    pub const fn field_name(self) -> &'static str {
        match self {
            Self::XQuery => "xquery",
            Self::JavaScript => "javascript",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Serialization format of a single result item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    /// XML markup.
    Xml,
    /// JSON document or value.
    Json,
    /// Plain text (atomic values).
    Text,
    /// Binary content.
    Binary,
}

impl ResultFormat {
    /// All formats, used when stripping location suffixes.
    pub const ALL: [Self; 4] = [Self::Xml, Self::Json, Self::Text, Self::Binary];

    /// Lowercase name, also used as the location suffix.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Json => "json",
            Self::Text => "text",
            Self::Binary => "binary",
        }
    }

    /// Whether entries of this format are markup that renders as raw text.
    pub const fn is_markup(self) -> bool {
        matches!(self, Self::Xml)
    }

    /// Guess the format of a part from its MIME type.
    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if mime.ends_with("xml") {
            Self::Xml
        } else if mime.ends_with("json") {
            Self::Json
        } else if mime.starts_with("text/") {
            Self::Text
        } else {
            Self::Binary
        }
    }
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| format!("unknown result format: {s}"))
    }
}

/// Where a failed evaluation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    /// The server evaluated the request and rejected it.
    Application,
    /// The server could not be reached or the exchange broke down.
    Transport,
}

/// One item of a result record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResultEntry {
    /// An item returned by a successful evaluation.
    Success {
        /// The item value.
        value: serde_json::Value,
        /// Serialization format of the item.
        format: ResultFormat,
        /// Schema type reported by the server (e.g. `integer`).
        datatype: String,
    },
    /// A synthesized entry describing a failed evaluation.
    Error {
        /// Human readable message.
        message: String,
        /// Which side failed.
        source: ErrorSource,
    },
}

impl ResultEntry {
    /// Create a success entry.
    pub fn success(
        value: impl Into<serde_json::Value>,
        format: ResultFormat,
        datatype: impl Into<String>,
    ) -> Self {
        Self::Success {
            value: value.into(),
            format,
            datatype: datatype.into(),
        }
    }

    /// Format the entry reports. Error entries are JSON.
    pub const fn format(&self) -> ResultFormat {
        match self {
            Self::Success { format, .. } => *format,
            Self::Error { .. } => ResultFormat::Json,
        }
    }

    /// Datatype the entry reports. Error entries are `node()`.
    pub fn datatype(&self) -> &str {
        match self {
            Self::Success { datatype, .. } => datatype,
            Self::Error { .. } => ERROR_DATATYPE,
        }
    }

    /// Render the entry as text.
    ///
    /// Markup is returned raw, everything else as its JSON serialization.
    /// An error entry renders as its serialized message.
    pub fn render(&self) -> String {
        match self {
            Self::Success { value, format, .. } => match (format.is_markup(), value) {
                (true, serde_json::Value::String(raw)) => raw.clone(),
                _ => value.to_string(),
            },
            Self::Error { message, .. } => serde_json::Value::from(message.as_str()).to_string(),
        }
    }
}

/// The last known result for a location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    entries: Vec<ResultEntry>,
}

impl ResultRecord {
    /// A successful result.
    pub const fn new(entries: Vec<ResultEntry>) -> Self {
        Self { entries }
    }

    /// A record made of a single error entry.
    pub fn error(message: impl Into<String>, source: ErrorSource) -> Self {
        Self {
            entries: vec![ResultEntry::Error {
                message: message.into(),
                source,
            }],
        }
    }

    /// The entries in server order.
    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    /// Whether this record describes a failure.
    pub fn is_error(&self) -> bool {
        matches!(self.entries.as_slice(), [ResultEntry::Error { .. }])
    }

    /// Format used to address the rendered result: the first entry's format,
    /// or text for an empty result.
    pub fn primary_format(&self) -> ResultFormat {
        self.entries
            .first()
            .map_or(ResultFormat::Text, ResultEntry::format)
    }

    /// Render all entries, one per line.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(ResultEntry::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Render an optional record, substituting the pending placeholder.
pub fn render_or_pending(record: Option<&ResultRecord>) -> String {
    record.map_or_else(|| PENDING_PLACEHOLDER.to_string(), ResultRecord::render)
}
