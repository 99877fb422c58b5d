//! Background tasks and their results.
//!
//! Remote calls run on the rayon pool. Each finished call is posted back to
//! the main loop as a [`Task`], and the main loop applies it in one step.

use crate::dispatcher::SourceContext;
use crossbeam_channel::Sender;
use mlquery_client::EvalError;
use mlquery_core::{Dialect, ResultRecord, VirtualLocation};

/// A finished background call.
#[derive(Debug)]
pub enum Task {
    /// A query evaluation settled.
    Evaluated(Settled),
    /// The content database id lookup of a connection settled.
    DatabaseResolved {
        /// Generation of the connection that asked.
        generation: u64,
        /// The id, or why it could not be resolved.
        result: Result<String, EvalError>,
    },
}

/// Outcome of one dispatched query.
#[derive(Debug)]
pub struct Settled {
    /// Location the query was dispatched for.
    pub request_location: VirtualLocation,
    /// Per-location sequence number of the dispatch.
    pub ticket: u64,
    /// Dialect the query was run as.
    pub dialect: Dialect,
    /// Editor context of the originating document.
    pub context: SourceContext,
    /// Result record or the evaluation error.
    pub result: Result<ResultRecord, EvalError>,
}

/// Run `job` on the worker pool and post its result to `sender`.
pub fn spawn<F>(sender: &Sender<Task>, job: F)
where
    F: FnOnce() -> Task + Send + 'static,
{
    let sender = sender.clone();
    rayon::spawn(move || {
        let task = job();
        if sender.send(task).is_err() {
            tracing::debug!("Main loop gone, dropping task result");
        }
    });
}
