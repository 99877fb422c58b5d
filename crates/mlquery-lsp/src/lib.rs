//! Language server that runs MarkLogic queries and serves their results as
//! virtual documents.
//!
//! - `mlquery.sendXQuery` / `mlquery.sendJavaScript` commands evaluate the
//!   current document on the configured server
//! - Results are cached per `mlquery-result:` location and read back with the
//!   `mlquery/resultContent` request
//! - `mlquery/resultChanged` tells the client a location has new content
//!
//! # Architecture
//!
//! The server follows rust-analyzer's architecture:
//! - **Main loop**: Owns all state and applies every change on one thread
//! - **Tasks**: Remote evaluations run on a worker pool and report back as events
//! - **Handlers**: Decode protocol parameters and build responses

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatcher;
pub mod formatter;
pub mod handlers;
pub mod main_loop;
pub mod provider;
pub mod registry;
pub mod task;

mod server;
mod vfs;

pub use dispatcher::{Dispatcher, Outcome, SourceContext};
pub use main_loop::{run_main_loop, Event, MainLoopState, Message};
pub use provider::{ContentProvider, ResultCache};
pub use registry::{ClientFactory, ConnectionDescriptor, ConnectionRegistry, HttpClientFactory};
pub use server::{capabilities, initial_settings, start_stdio, Server};
pub use task::{Settled, Task};
pub use vfs::Vfs;

/// LSP server version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
