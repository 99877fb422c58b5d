//! Core types for mlquery
//!
//! This crate provides the data model shared by the client and the language
//! server:
//!
//! - [`ConnectionSettings`] - How to reach the database, read from configuration
//! - [`ConnectionIdentity`] - The tuple that decides whether two settings are the same connection
//! - [`VirtualLocation`] - Synthetic address of a query result
//! - [`ResultRecord`] - Last known result of a query, success or error
//!
//! # Example
//!
//! ```
//! use mlquery_core::{
//!     encode_request_location, encode_response_location, ConnectionSettings, ResultEntry,
//!     ResultFormat, ResultRecord,
//! };
//!
//! let identity = ConnectionSettings::default().identity();
//! let request = encode_request_location("file:///work/hello.xqy", &identity).unwrap();
//!
//! let record = ResultRecord::new(vec![ResultEntry::success("<hello/>", ResultFormat::Xml, "element()")]);
//! let response = encode_response_location(&request, record.primary_format());
//!
//! assert_eq!(response.path(), "/work/hello.xqy.xml");
//! assert_eq!(record.render(), "<hello/>");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod location;
pub mod result;
pub mod settings;

pub use location::{
    decode_request_location, encode_request_location, encode_response_location, LocationError,
    VirtualLocation, SCHEME,
};
pub use result::{
    render_or_pending, Dialect, ErrorSource, ResultEntry, ResultFormat, ResultRecord,
    ERROR_DATATYPE, PENDING_PLACEHOLDER,
};
pub use settings::{ConnectionIdentity, ConnectionSettings, SECTION};
