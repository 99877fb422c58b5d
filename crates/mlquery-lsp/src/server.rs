//! Main LSP server implementation.

use crate::handlers::execute_command::COMMANDS;
use crate::main_loop::run_main_loop;
use lsp_server::Connection;
use lsp_types::InitializeParams;
use mlquery_core::{ConnectionSettings, SCHEME};

/// The LSP server.
pub struct Server {
    /// Connection to the LSP client.
    connection: Connection,
    /// Initialize parameters from client.
    init_params: InitializeParams,
}

impl Server {
    /// Create a new LSP server from a connection.
    pub fn new(connection: Connection, init_params: InitializeParams) -> Self {
        Self {
            connection,
            init_params,
        }
    }

    /// Run the server's main loop.
    pub fn run(self) {
        tracing::info!("Starting MarkLogic query server v{}", crate::VERSION);

        let settings = initial_settings(&self.init_params);
        tracing::info!("Target server: {}", settings.authority());

        let (sender, receiver) = (self.connection.sender, self.connection.receiver);
        run_main_loop(receiver, sender, settings);

        tracing::info!("Server shutdown complete");
    }
}

/// Connection settings from `initializationOptions`, defaults if absent or
/// invalid.
pub fn initial_settings(init_params: &InitializeParams) -> ConnectionSettings {
    let Some(options) = &init_params.initialization_options else {
        return ConnectionSettings::default();
    };
    match ConnectionSettings::from_json(options) {
        Ok(settings) => settings.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Invalid initializationOptions, using defaults: {}", e);
            ConnectionSettings::default()
        }
    }
}

/// Capabilities announced to the client.
pub fn capabilities() -> lsp_types::ServerCapabilities {
    lsp_types::ServerCapabilities {
        text_document_sync: Some(lsp_types::TextDocumentSyncCapability::Kind(
            lsp_types::TextDocumentSyncKind::FULL,
        )),
        execute_command_provider: Some(lsp_types::ExecuteCommandOptions {
            commands: COMMANDS.iter().map(ToString::to_string).collect(),
            work_done_progress_options: Default::default(),
        }),
        experimental: Some(serde_json::json!({
            "virtualDocuments": { "scheme": SCHEME }
        })),
        ..Default::default()
    }
}

/// Start the LSP server using stdio transport.
pub fn start_stdio() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing::info!("Starting LSP server on stdio");

    // Create connection using stdio
    let (connection, io_threads) = Connection::stdio();

    // Wait for initialize request
    let (id, params) = connection.initialize_start()?;
    let init_params: InitializeParams = serde_json::from_value(params)?;

    let server_info = lsp_types::ServerInfo {
        name: "mlquery-lsp".to_string(),
        version: Some(crate::VERSION.to_string()),
    };

    let init_result = lsp_types::InitializeResult {
        capabilities: capabilities(),
        server_info: Some(server_info),
    };

    // Complete initialization handshake
    connection.initialize_finish(id, serde_json::to_value(init_result)?)?;

    tracing::info!("LSP initialized successfully");

    let server = Server::new(connection, init_params);
    server.run();

    // Wait for IO threads to finish
    io_threads.join()?;

    Ok(())
}
