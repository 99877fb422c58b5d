//! Remote query evaluation for mlquery.
//!
//! The database server is reached through the [`Evaluator`] trait. The HTTP
//! implementation posts to the REST `/v1/eval` endpoint and decodes the
//! `multipart/mixed` answer into a [`ResultRecord`].
//!
//! # Example
//!
//! ```no_run
//! use mlquery_client::{EvalRequest, Evaluator, HttpEvaluator};
//! use mlquery_core::{ConnectionSettings, Dialect};
//!
//! let settings = ConnectionSettings::default();
//! let evaluator = HttpEvaluator::new(&settings).unwrap();
//! let request = EvalRequest::for_query(Dialect::XQuery, "1 + 1", &settings);
//! let record = evaluator.evaluate(&request).unwrap();
//! println!("{}", record.render());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod http;
pub mod multipart;
pub mod request;

pub use error::EvalError;
pub use http::HttpEvaluator;
pub use request::EvalRequest;

use mlquery_core::ResultRecord;

/// A handle able to evaluate requests on the database server.
///
/// Calls block until the server answers; callers run them off the main loop.
pub trait Evaluator: Send + Sync {
    /// Evaluate a request.
    fn evaluate(&self, request: &EvalRequest) -> Result<ResultRecord, EvalError>;

    /// Release the underlying resources. Later calls fail.
    fn release(&self) {}
}
