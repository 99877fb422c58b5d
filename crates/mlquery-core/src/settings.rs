//! Connection settings and connection identity.
//!
//! Settings are read from the editor configuration (the `marklogic` section).
//! Two settings values describe the same connection iff their
//! [`ConnectionIdentity`] strings are equal.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters kept from the identity hash.
const FINGERPRINT_LEN: usize = 12;

/// Configuration section holding the connection settings.
pub const SECTION: &str = "marklogic";

/// Keys of the configuration section.
const FIELDS: [&str; 7] = [
    "host",
    "port",
    "username",
    "password",
    "documentsDb",
    "modulesDb",
    "timeoutMs",
];

/// How to reach the database server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionSettings {
    /// Server host name.
    pub host: String,
    /// Port of the app server exposing the REST API.
    pub port: u16,
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
    /// Database queries are evaluated against.
    pub documents_db: String,
    /// Database holding library modules imported by queries.
    pub modules_db: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            username: "admin".to_string(),
            password: "admin".to_string(),
            documents_db: "Documents".to_string(),
            modules_db: "Modules".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl ConnectionSettings {
    /// Read settings from a configuration object.
    ///
    /// Accepts either an object containing the `marklogic` section or the
    /// section itself. Returns `None` when the object carries neither, so a
    /// payload for some other section leaves the current settings alone.
    /// Missing fields fall back to their defaults.
    pub fn from_json(value: &serde_json::Value) -> Result<Option<Self>, serde_json::Error> {
        let section = match value.get(SECTION) {
            Some(section) => section,
            None if is_section(value) => value,
            None => return Ok(None),
        };
        if section.is_null() {
            return Ok(Some(Self::default()));
        }
        serde_json::from_value(section.clone()).map(Some)
    }

    /// The identity tuple of these settings.
    pub fn identity(&self) -> ConnectionIdentity {
        ConnectionIdentity::new(self)
    }

    /// `host:port` authority string.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Identity of a connection: host, port, user, password, content database and
/// modules database joined with `:`.
///
/// The timeout is not part of the identity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ConnectionIdentity {
    key: String,
    host: String,
    port: u16,
}

impl ConnectionIdentity {
    /// Build the identity of a settings value.
    pub fn new(settings: &ConnectionSettings) -> Self {
        let key = [
            settings.host.as_str(),
            &settings.port.to_string(),
            &settings.username,
            &settings.password,
            &settings.documents_db,
            &settings.modules_db,
        ]
        .join(":");
        Self {
            key,
            host: settings.host.clone(),
            port: settings.port,
        }
    }

    /// The colon-joined identity string.
    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Server host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Server port.
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Short stable hash of the identity, safe to embed in URIs.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.key.as_bytes());
        let mut hex = format!("{digest:x}");
        hex.truncate(FINGERPRINT_LEN);
        hex
    }
}

// The identity string carries the password, keep it out of logs.
impl fmt::Debug for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionIdentity")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Whether `value` is itself a settings section.
fn is_section(value: &serde_json::Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| FIELDS.iter().any(|field| object.contains_key(*field)))
}
