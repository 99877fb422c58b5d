//! LSP request and notification handlers.
//!
//! Handlers translate protocol parameters into calls on the query pipeline.

pub mod execute_command;
pub mod result_content;
