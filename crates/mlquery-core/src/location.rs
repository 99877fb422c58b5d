//! Virtual locations for query results.
//!
//! A request location names "the result of running document D against
//! connection C":
//!
//! ```text
//! mlquery-result://<fingerprint>@<host>:<port>/<document path>?<encoded ["<document uri>"]>
//! ```
//!
//! The response location appends the result format to the path
//! (`/<document path>.<format>`) and keeps the query unchanged, so the
//! request location and the source document can always be recovered from it.

use crate::result::ResultFormat;
use crate::settings::ConnectionIdentity;
use std::fmt;
use thiserror::Error;
use url::Url;
use url::form_urlencoded;

/// URI scheme of all virtual result locations.
pub const SCHEME: &str = "mlquery-result";

/// Error building or reading a virtual location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The connection host cannot appear in a URI authority.
    #[error("invalid connection authority {authority}: {reason}")]
    InvalidAuthority {
        /// The offending `host:port`.
        authority: String,
        /// Parser message.
        reason: String,
    },
    /// The string is not a URI of the result scheme.
    #[error("not a mlquery-result location: {0}")]
    WrongScheme(String),
    /// The query component does not hold an encoded source URI.
    #[error("location has no source document reference: {0}")]
    MissingSource(String),
}

/// A synthetic address under which a query result is readable.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VirtualLocation(Url);

impl VirtualLocation {
    /// Parse a location string produced by this codec.
    pub fn parse(s: &str) -> Result<Self, LocationError> {
        let url = Url::parse(s).map_err(|_| LocationError::WrongScheme(s.to_string()))?;
        if url.scheme() != SCHEME {
            return Err(LocationError::WrongScheme(s.to_string()));
        }
        Ok(Self(url))
    }

    /// Canonical string form, used as the cache key.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// `host:port` of the connection that produced the result.
    pub fn authority(&self) -> String {
        match self.0.port() {
            Some(port) => format!("{}:{}", self.0.host_str().unwrap_or_default(), port),
            None => self.0.host_str().unwrap_or_default().to_string(),
        }
    }

    /// Path component.
    pub fn path(&self) -> &str {
        self.0.path()
    }

    /// URI of the document the query was read from.
    pub fn source_uri(&self) -> Result<String, LocationError> {
        let query = self
            .0
            .query()
            .ok_or_else(|| LocationError::MissingSource(self.as_str().to_string()))?;
        let (encoded, _) = form_urlencoded::parse(query.as_bytes())
            .next()
            .ok_or_else(|| LocationError::MissingSource(self.as_str().to_string()))?;
        let uris: Vec<String> = serde_json::from_str(&encoded)
            .map_err(|_| LocationError::MissingSource(self.as_str().to_string()))?;
        uris.into_iter()
            .next()
            .ok_or_else(|| LocationError::MissingSource(self.as_str().to_string()))
    }

    /// Format suffix carried by a response location, if any.
    pub fn format_suffix(&self) -> Option<ResultFormat> {
        let (_, ext) = self.path().rsplit_once('.')?;
        ext.parse().ok()
    }
}

impl fmt::Display for VirtualLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for VirtualLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualLocation({})", self.as_str())
    }
}

/// Path of the source document as it appears inside a location.
fn document_path(source_uri: &str) -> String {
    let path = Url::parse(source_uri)
        .map_or_else(|_| source_uri.to_string(), |url| url.path().to_string());
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

/// Derive the location that holds the result of running `source_uri` against
/// the connection `identity`.
///
/// Deterministic: the same inputs always give the same location, and distinct
/// documents or distinct connections give distinct locations.
pub fn encode_request_location(
    source_uri: &str,
    identity: &ConnectionIdentity,
) -> Result<VirtualLocation, LocationError> {
    let host = identity.host();
    let authority = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{}", identity.port())
    } else {
        format!("{host}:{}", identity.port())
    };
    let base = format!("{SCHEME}://{}@{authority}/", identity.fingerprint());
    let mut url = Url::parse(&base).map_err(|e| LocationError::InvalidAuthority {
        authority: authority.clone(),
        reason: e.to_string(),
    })?;

    url.set_path(&document_path(source_uri));

    // The JSON array is form-encoded so the query survives any URI round trip.
    let reference = serde_json::Value::from(vec![source_uri]).to_string();
    let encoded: String = form_urlencoded::byte_serialize(reference.as_bytes()).collect();
    url.set_query(Some(&encoded));

    Ok(VirtualLocation(url))
}

/// Derive the location the rendered result of `request` is stored under once
/// its format is known.
pub fn encode_response_location(
    request: &VirtualLocation,
    format: ResultFormat,
) -> VirtualLocation {
    let mut url = request.0.clone();
    let path = format!("{}.{}", request.path(), format.as_str());
    url.set_path(&path);
    VirtualLocation(url)
}

/// Recover the request location from a response location.
///
/// A location without a format suffix is returned unchanged.
pub fn decode_request_location(response: &VirtualLocation) -> VirtualLocation {
    let Some(format) = response.format_suffix() else {
        return response.clone();
    };
    let mut url = response.0.clone();
    let path = response.path();
    let stripped = &path[..path.len() - format.as_str().len() - 1];
    url.set_path(stripped);
    VirtualLocation(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ConnectionSettings;

    fn identity() -> ConnectionIdentity {
        ConnectionSettings::default().identity()
    }

    #[test]
    fn test_request_location_shape() {
        let location = encode_request_location("file:///home/me/query.xqy", &identity()).unwrap();
        assert!(location.as_str().starts_with("mlquery-result://"));
        assert_eq!(location.authority(), "localhost:8000");
        assert_eq!(location.path(), "/home/me/query.xqy");
        assert_eq!(location.source_uri().unwrap(), "file:///home/me/query.xqy");
    }

    #[test]
    fn test_untitled_document() {
        let location = encode_request_location("untitled:Untitled-1", &identity()).unwrap();
        assert_eq!(location.path(), "/Untitled-1");
        assert_eq!(location.source_uri().unwrap(), "untitled:Untitled-1");
    }

    #[test]
    fn test_source_with_spaces_and_query() {
        let source = "file:///tmp/my%20queries/q.xqy?x=1&y=2";
        let location = encode_request_location(source, &identity()).unwrap();
        assert_eq!(location.source_uri().unwrap(), source);

        let reparsed = VirtualLocation::parse(location.as_str()).unwrap();
        assert_eq!(reparsed, location);
    }

    #[test]
    fn test_deterministic() {
        let a = encode_request_location("file:///q.xqy", &identity()).unwrap();
        let b = encode_request_location("file:///q.xqy", &identity()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_response_round_trip() {
        let request = encode_request_location("file:///work/q.xqy", &identity()).unwrap();
        let response = encode_response_location(&request, ResultFormat::Xml);
        assert_eq!(response.path(), "/work/q.xqy.xml");
        assert_eq!(response.format_suffix(), Some(ResultFormat::Xml));
        assert_eq!(response.source_uri().unwrap(), "file:///work/q.xqy");
        assert_eq!(decode_request_location(&response), request);
    }

    #[test]
    fn test_decode_without_suffix_is_identity() {
        let request = encode_request_location("file:///work/q.xqy", &identity()).unwrap();
        assert_eq!(decode_request_location(&request), request);
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        assert!(matches!(
            VirtualLocation::parse("file:///a.xqy"),
            Err(LocationError::WrongScheme(_))
        ));
        assert!(VirtualLocation::parse("not a uri").is_err());
    }

    #[test]
    fn test_missing_source() {
        let location = VirtualLocation::parse("mlquery-result://localhost:8000/a").unwrap();
        assert!(matches!(
            location.source_uri(),
            Err(LocationError::MissingSource(_))
        ));
    }
}
