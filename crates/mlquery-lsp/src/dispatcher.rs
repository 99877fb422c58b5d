//! Query dispatcher.
//!
//! Sends a query to the server without blocking the main loop and applies the
//! settled result to the content provider. Every dispatch takes a ticket for
//! its request location; a result carrying an older ticket than the last one
//! applied for that location is dropped, so a slow earlier run can never
//! overwrite a newer result.

use crate::provider::ContentProvider;
use crate::registry::ConnectionRegistry;
use crate::task::{self, Settled, Task};
use crossbeam_channel::Sender;
use mlquery_client::{EvalError, EvalRequest};
use mlquery_core::{
    encode_response_location, ConnectionSettings, Dialect, ErrorSource, ResultFormat,
    ResultRecord, VirtualLocation,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Editor context of the document a query was read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContext {
    /// URI of the source document.
    pub uri: String,
    /// Document version the query text was taken from.
    pub version: Option<i32>,
}

/// What applying a settled dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The record was stored under the response location.
    Succeeded {
        /// Where the result can be read.
        response_location: VirtualLocation,
        /// Format the location was derived from.
        format: ResultFormat,
        /// Context of the originating document.
        context: SourceContext,
    },
    /// An error record was stored under the request location.
    Failed {
        /// Where the error can be read.
        request_location: VirtualLocation,
        /// Message shown to the user.
        message: String,
        /// Which side failed.
        source: ErrorSource,
    },
    /// A newer dispatch for the same location already landed.
    Stale,
}

/// Ticket counters of one request location.
#[derive(Debug, Default, Clone, Copy)]
struct Tickets {
    issued: u64,
    applied: u64,
}

/// Fire-and-forget query dispatch.
pub struct Dispatcher {
    tasks: Sender<Task>,
    tickets: HashMap<String, Tickets>,
}

impl Dispatcher {
    /// Create a dispatcher posting settled queries to `tasks`.
    pub fn new(tasks: Sender<Task>) -> Self {
        Self {
            tasks,
            tickets: HashMap::new(),
        }
    }

    /// Send `query` for evaluation. The result is delivered to the main loop
    /// as a [`Task::Evaluated`]; the returned ticket identifies this dispatch.
    ///
    /// The connection is looked up on every call, so a settings change is
    /// picked up by the next dispatch.
    pub fn dispatch(
        &mut self,
        registry: &mut ConnectionRegistry,
        settings: &ConnectionSettings,
        query: &str,
        dialect: Dialect,
        request_location: VirtualLocation,
        context: SourceContext,
    ) -> u64 {
        let ticket = self.issue(&request_location);

        let Some(connection) = registry.get_connection(settings) else {
            let settled = Settled {
                request_location,
                ticket,
                dialect,
                context,
                result: Err(EvalError::Transport(format!(
                    "no connection to {}",
                    settings.authority()
                ))),
            };
            if self.tasks.send(Task::Evaluated(settled)).is_err() {
                tracing::debug!("Main loop gone, dropping failed dispatch");
            }
            return ticket;
        };

        tracing::info!(
            "Dispatching {} query for {} (ticket {})",
            dialect,
            context.uri,
            ticket
        );

        let request = EvalRequest::for_query(dialect, query, connection.settings());
        let client = connection.client();
        task::spawn(&self.tasks, move || {
            Task::Evaluated(Settled {
                result: client.evaluate(&request),
                request_location,
                ticket,
                dialect,
                context,
            })
        });

        ticket
    }

    /// Apply a settled dispatch: store the record and announce the change.
    pub fn settle(&mut self, settled: Settled, provider: &mut ContentProvider) -> Outcome {
        let Settled {
            request_location,
            ticket,
            dialect,
            context,
            result,
        } = settled;

        let tickets = self
            .tickets
            .entry(request_location.as_str().to_string())
            .or_default();
        if ticket <= tickets.applied {
            tracing::warn!(
                "Dropping stale result for {} (ticket {}, already applied {})",
                request_location,
                ticket,
                tickets.applied
            );
            return Outcome::Stale;
        }
        tickets.applied = ticket;

        match result {
            Ok(record) => {
                let format = record.primary_format();
                let response_location = encode_response_location(&request_location, format);
                tracing::debug!(
                    "{} query for {} returned {} entries",
                    dialect,
                    context.uri,
                    record.entries().len()
                );
                provider.update_results(&response_location, record);
                Outcome::Succeeded {
                    response_location,
                    format,
                    context,
                }
            }
            Err(e) => {
                let message = e.to_string();
                let source = e.error_source();
                tracing::error!("{} query for {} failed: {}", dialect, context.uri, message);
                provider.update_results(&request_location, ResultRecord::error(&message, source));
                Outcome::Failed {
                    request_location,
                    message,
                    source,
                }
            }
        }
    }

    fn issue(&mut self, location: &VirtualLocation) -> u64 {
        let tickets = self.tickets.entry(location.as_str().to_string()).or_default();
        tickets.issued += 1;
        tickets.issued
    }
}
