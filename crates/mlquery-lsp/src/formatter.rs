//! Best-effort formatting of freshly displayed results.
//!
//! After a result is shown the server asks a [`ResultFormatter`] for a
//! prettier rendering and, if one is produced, sends it to the client as a
//! workspace edit. Failures are logged and never reach the user.

use lsp_types::{Position, Range, TextEdit};
use mlquery_core::ResultFormat;
use ropey::Rope;
use thiserror::Error;

/// Error produced by a formatter.
#[derive(Debug, Error)]
#[error("cannot format {format} result: {reason}")]
pub struct FormatError {
    /// Format of the text that failed to format.
    pub format: ResultFormat,
    /// Why it failed.
    pub reason: String,
}

/// Reformats rendered result text.
pub trait ResultFormatter: Send {
    /// Return the formatted text, or `None` when there is nothing to change.
    fn format(&self, text: &str, format: ResultFormat) -> Result<Option<String>, FormatError>;
}

/// Pretty-prints JSON results, one value per line. Other formats are left
/// untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPrettyFormatter;

impl ResultFormatter for JsonPrettyFormatter {
    fn format(&self, text: &str, format: ResultFormat) -> Result<Option<String>, FormatError> {
        if format != ResultFormat::Json || text.trim().is_empty() {
            return Ok(None);
        }

        let mut pretty = Vec::new();
        for line in text.lines() {
            let value: serde_json::Value =
                serde_json::from_str(line).map_err(|e| FormatError {
                    format,
                    reason: e.to_string(),
                })?;
            let formatted = serde_json::to_string_pretty(&value).map_err(|e| FormatError {
                format,
                reason: e.to_string(),
            })?;
            pretty.push(formatted);
        }

        let pretty = pretty.join("\n");
        Ok((pretty != text).then_some(pretty))
    }
}

/// Edit replacing the whole of `old` with `new`.
pub fn full_replacement(old: &str, new: String) -> TextEdit {
    let rope = Rope::from_str(old);
    let last_line = rope.len_lines().saturating_sub(1);
    let last_len = rope.line(last_line).len_utf16_cu();

    TextEdit {
        range: Range {
            start: Position::new(0, 0),
            end: Position::new(last_line as u32, last_len as u32),
        },
        new_text: new,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pretty_prints_json_lines() {
        let formatted = JsonPrettyFormatter
            .format("{\"a\":1}\n[2]", ResultFormat::Json)
            .unwrap()
            .unwrap();
        assert_eq!(formatted, "{\n  \"a\": 1\n}\n[\n  2\n]");
    }

    #[test]
    fn test_leaves_other_formats() {
        assert!(JsonPrettyFormatter
            .format("<a><b/></a>", ResultFormat::Xml)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_already_pretty_is_unchanged() {
        assert!(JsonPrettyFormatter
            .format("1", ResultFormat::Json)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let result = JsonPrettyFormatter.format("{oops", ResultFormat::Json);
        assert!(result.is_err());
    }

    #[test]
    fn test_full_replacement_range() {
        let edit = full_replacement("ab\ncdé", "x".to_string());
        assert_eq!(edit.range.start, Position::new(0, 0));
        assert_eq!(edit.range.end, Position::new(1, 3));
        assert_eq!(edit.new_text, "x");
    }
}
