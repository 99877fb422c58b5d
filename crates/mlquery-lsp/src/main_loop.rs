//! Main event loop for the LSP server.
//!
//! Follows rust-analyzer's architecture:
//! - Notifications and requests handled synchronously on this thread
//! - Remote evaluations run on the worker pool and come back as tasks
//! - A settled task is applied in one step: cache write, change
//!   notification, then a `window/showDocument` request
//! - The formatting edit waits for the client to confirm the document is shown

use crate::dispatcher::{Dispatcher, Outcome, SourceContext};
use crate::formatter::{full_replacement, JsonPrettyFormatter, ResultFormatter};
use crate::handlers::execute_command::{
    command_dialect, parse_run_query_args, RunQueryResponse,
};
use crate::handlers::result_content::{
    handle_result_content, ConnectionInfoRequest, ResultChanged, ResultContentRequest,
    ResultLocationParams,
};
use crate::provider::ContentProvider;
use crate::registry::{ClientFactory, ConnectionRegistry, HttpClientFactory};
use crate::task::Task;
use crate::vfs::Vfs;
use crossbeam_channel::{Receiver, Sender};
use lsp_types::notification::{
    DidChangeConfiguration, DidChangeTextDocument, DidCloseTextDocument, DidOpenTextDocument,
    Notification, ShowMessage,
};
use lsp_types::request::{ApplyWorkspaceEdit, ExecuteCommand, Request, ShowDocument, Shutdown};
use lsp_types::{
    ApplyWorkspaceEditParams, ExecuteCommandParams, MessageType, ShowDocumentParams,
    ShowDocumentResult, ShowMessageParams, Uri, WorkspaceEdit,
};
use mlquery_core::{
    encode_request_location, ConnectionSettings, ResultFormat, VirtualLocation, SECTION,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Events processed by the main loop.
#[derive(Debug)]
pub enum Event {
    /// LSP message from the client.
    Message(Message),
    /// Result from a background task.
    Task(Task),
}

/// LSP message types.
#[derive(Debug)]
pub enum Message {
    /// Request from client (expects response).
    Request(lsp_server::Request),
    /// Notification from client (no response).
    Notification(lsp_server::Notification),
    /// Response from client (for server-initiated requests).
    Response(lsp_server::Response),
}

impl From<lsp_server::Message> for Message {
    fn from(msg: lsp_server::Message) -> Self {
        match msg {
            lsp_server::Message::Request(req) => Self::Request(req),
            lsp_server::Message::Notification(notif) => Self::Notification(notif),
            lsp_server::Message::Response(resp) => Self::Response(resp),
        }
    }
}

/// A server-initiated request awaiting the client's answer.
#[derive(Debug)]
enum PendingRequest {
    /// A result being opened; it is formatted once the client has shown it.
    ShowResult {
        location: VirtualLocation,
        format: ResultFormat,
    },
    /// Any other request, tracked for logging.
    Other(&'static str),
}

/// State managed by the main loop.
pub struct MainLoopState {
    /// Virtual file system for open documents.
    pub vfs: Arc<RwLock<Vfs>>,
    /// Sender for outgoing LSP messages.
    pub sender: Sender<lsp_server::Message>,
    /// Current connection settings.
    settings: ConnectionSettings,
    /// Owner of the live connection.
    registry: ConnectionRegistry,
    /// Query dispatch and ticket bookkeeping.
    dispatcher: Dispatcher,
    /// Result cache and renderer.
    provider: ContentProvider,
    /// Change events from the provider, forwarded to the client.
    changes: Receiver<VirtualLocation>,
    /// Formatter run on freshly shown results.
    formatter: Box<dyn ResultFormatter>,
    /// Server-initiated requests awaiting a response.
    pending_requests: HashMap<lsp_server::RequestId, PendingRequest>,
    /// Id of the next server-initiated request.
    next_request_id: i32,
    /// Whether shutdown was requested.
    pub shutdown_requested: bool,
    /// Whether the exit notification arrived.
    pub exit_requested: bool,
}

impl MainLoopState {
    /// Create a new main loop state.
    ///
    /// Background tasks post their results to `tasks`; the caller feeds them
    /// back through [`MainLoopState::handle_event`].
    pub fn new(
        sender: Sender<lsp_server::Message>,
        tasks: Sender<Task>,
        settings: ConnectionSettings,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        let mut provider = ContentProvider::new();
        let changes = provider.subscribe();
        Self {
            vfs: Arc::new(RwLock::new(Vfs::new())),
            sender,
            settings,
            registry: ConnectionRegistry::new(factory, tasks.clone()),
            dispatcher: Dispatcher::new(tasks),
            provider,
            changes,
            formatter: Box::new(JsonPrettyFormatter),
            pending_requests: HashMap::new(),
            next_request_id: 0,
            shutdown_requested: false,
            exit_requested: false,
        }
    }

    /// Replace the result formatter.
    pub fn with_formatter(mut self, formatter: Box<dyn ResultFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// The content provider.
    pub const fn provider(&self) -> &ContentProvider {
        &self.provider
    }

    /// The connection registry.
    pub const fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Current connection settings.
    pub const fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Handle an incoming event.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Message(msg) => self.handle_message(msg),
            Event::Task(task) => self.handle_task(task),
        }
    }

    /// Handle an LSP message.
    fn handle_message(&mut self, msg: Message) {
        match msg {
            Message::Request(req) => self.handle_request(req),
            Message::Notification(notif) => self.handle_notification(notif),
            Message::Response(resp) => self.handle_response(resp),
        }
    }

    /// Handle an LSP request (expects response).
    fn handle_request(&mut self, req: lsp_server::Request) {
        let id = req.id.clone();

        // Dispatch based on method
        let result = match req.method.as_str() {
            Shutdown::METHOD => {
                self.shutdown_requested = true;
                self.registry.release();
                Ok(serde_json::Value::Null)
            }
            ExecuteCommand::METHOD => self.handle_execute_command_request(req),
            ResultContentRequest::METHOD => self.handle_result_content_request(req),
            ConnectionInfoRequest::METHOD => self.handle_connection_info_request(),
            _ => {
                tracing::warn!("Unhandled request: {}", req.method);
                Err(format!("Unhandled request: {}", req.method))
            }
        };

        // Send response
        let response = match result {
            Ok(value) => lsp_server::Response::new_ok(id, value),
            Err(msg) => {
                // Use MethodNotFound only for truly unknown methods,
                // InternalError for handler failures
                let error_code = if msg.starts_with("Unhandled request") {
                    lsp_server::ErrorCode::MethodNotFound
                } else {
                    lsp_server::ErrorCode::InternalError
                };
                lsp_server::Response::new_err(id, error_code as i32, msg)
            }
        };

        self.send(lsp_server::Message::Response(response));
    }

    /// Handle the workspace/executeCommand request.
    fn handle_execute_command_request(
        &mut self,
        req: lsp_server::Request,
    ) -> Result<serde_json::Value, String> {
        let params: ExecuteCommandParams =
            serde_json::from_value(req.params).map_err(|e| e.to_string())?;

        let dialect = command_dialect(&params.command)
            .ok_or_else(|| format!("Unknown command: {}", params.command))?;
        let args = parse_run_query_args(&params)?;

        let (text, version) = {
            let vfs = self.vfs.read();
            let document = vfs.get(&args.uri);
            let text = args
                .text
                .clone()
                .or_else(|| document.map(|doc| doc.text()))
                .ok_or_else(|| format!("Document is not open: {}", args.uri))?;
            (text, document.map(|doc| doc.version()))
        };

        let request_location = encode_request_location(&args.uri, &self.settings.identity())
            .map_err(|e| e.to_string())?;

        let ticket = self.dispatcher.dispatch(
            &mut self.registry,
            &self.settings,
            &text,
            dialect,
            request_location.clone(),
            SourceContext {
                uri: args.uri,
                version,
            },
        );

        serde_json::to_value(RunQueryResponse {
            uri: request_location.as_str().to_string(),
            ticket,
        })
        .map_err(|e| e.to_string())
    }

    /// Handle the mlquery/resultContent request.
    fn handle_result_content_request(
        &self,
        req: lsp_server::Request,
    ) -> Result<serde_json::Value, String> {
        let params: ResultLocationParams =
            serde_json::from_value(req.params).map_err(|e| e.to_string())?;

        let response = handle_result_content(&params, &self.provider)?;

        serde_json::to_value(response).map_err(|e| e.to_string())
    }

    /// Handle the mlquery/connectionInfo request.
    fn handle_connection_info_request(&self) -> Result<serde_json::Value, String> {
        Ok(self
            .registry
            .current()
            .map_or(serde_json::Value::Null, |connection| connection.info()))
    }

    /// Handle a response to a server-initiated request.
    fn handle_response(&mut self, resp: lsp_server::Response) {
        let Some(pending) = self.pending_requests.remove(&resp.id) else {
            tracing::debug!("Response to unknown request {:?}", resp.id);
            return;
        };

        match (pending, resp.error) {
            (PendingRequest::ShowResult { location, .. }, Some(error)) => {
                tracing::warn!("Client could not show {}: {}", location, error.message);
            }
            (PendingRequest::ShowResult { location, format }, None) => {
                let shown = resp
                    .result
                    .and_then(|value| serde_json::from_value::<ShowDocumentResult>(value).ok())
                    .is_some_and(|result| result.success);
                if shown {
                    self.format_result(&location, format);
                } else {
                    tracing::debug!("Client did not open {}, skipping formatting", location);
                }
            }
            (PendingRequest::Other(method), Some(error)) => {
                tracing::warn!("{} request failed: {}", method, error.message);
            }
            (PendingRequest::Other(method), None) => {
                tracing::debug!("{} request completed", method);
            }
        }
    }

    /// Handle an LSP notification (no response expected).
    fn handle_notification(&mut self, notif: lsp_server::Notification) {
        // Notifications are handled synchronously - this is critical for correctness
        match notif.method.as_str() {
            DidOpenTextDocument::METHOD => {
                if let Ok(params) =
                    serde_json::from_value::<lsp_types::DidOpenTextDocumentParams>(notif.params)
                {
                    self.on_did_open(params);
                }
            }
            DidChangeTextDocument::METHOD => {
                if let Ok(params) =
                    serde_json::from_value::<lsp_types::DidChangeTextDocumentParams>(notif.params)
                {
                    self.on_did_change(params);
                }
            }
            DidCloseTextDocument::METHOD => {
                if let Ok(params) =
                    serde_json::from_value::<lsp_types::DidCloseTextDocumentParams>(notif.params)
                {
                    self.on_did_close(params);
                }
            }
            DidChangeConfiguration::METHOD => {
                if let Ok(params) =
                    serde_json::from_value::<lsp_types::DidChangeConfigurationParams>(notif.params)
                {
                    self.on_did_change_configuration(params);
                }
            }
            "initialized" => {
                tracing::info!("Client initialized");
            }
            "exit" => {
                tracing::info!("Exit notification received");
                self.registry.release();
                self.exit_requested = true;
            }
            _ => {
                tracing::debug!("Unhandled notification: {}", notif.method);
            }
        }
    }

    /// Handle textDocument/didOpen notification.
    fn on_did_open(&mut self, params: lsp_types::DidOpenTextDocumentParams) {
        let doc = params.text_document;
        tracing::info!("Document opened: {}", doc.uri.as_str());
        self.vfs.write().open(doc.uri.as_str(), &doc.text, doc.version);
    }

    /// Handle textDocument/didChange notification.
    fn on_did_change(&mut self, params: lsp_types::DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;

        // For full sync, take the last change (which is the full content)
        if let Some(change) = params.content_changes.into_iter().last() {
            tracing::debug!("Document changed: {}", uri.as_str());
            self.vfs.write().update(uri.as_str(), &change.text, version);
        }
    }

    /// Handle textDocument/didClose notification.
    fn on_did_close(&mut self, params: lsp_types::DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        tracing::info!("Document closed: {}", uri.as_str());
        self.vfs.write().close(uri.as_str());
    }

    /// Handle workspace/didChangeConfiguration notification.
    ///
    /// The live connection is left alone; the next run notices the drift.
    fn on_did_change_configuration(&mut self, params: lsp_types::DidChangeConfigurationParams) {
        match ConnectionSettings::from_json(&params.settings) {
            Ok(Some(settings)) => {
                tracing::info!(
                    "Configuration changed: {} as {}",
                    settings.authority(),
                    settings.username
                );
                self.settings = settings;
            }
            Ok(None) => tracing::debug!("Configuration change has no {} section", SECTION),
            Err(e) => tracing::warn!("Ignoring invalid configuration: {}", e),
        }
    }

    /// Apply a finished background task.
    fn handle_task(&mut self, task: Task) {
        match task {
            Task::Evaluated(settled) => {
                let outcome = self.dispatcher.settle(settled, &mut self.provider);
                self.flush_changes();
                self.after_settle(outcome);
            }
            Task::DatabaseResolved { generation, result } => {
                self.registry.apply_database_id(generation, result);
            }
        }
    }

    /// Follow-up requests once a result is cached and announced.
    fn after_settle(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Succeeded {
                response_location,
                format,
                ..
            } => {
                self.show_result(response_location, format);
            }
            Outcome::Failed { message, .. } => {
                self.show_message(MessageType::ERROR, message);
            }
            Outcome::Stale => {}
        }
    }

    /// Forward pending change events to the client.
    fn flush_changes(&self) {
        for location in self.changes.try_iter() {
            let notif = lsp_server::Notification::new(
                ResultChanged::METHOD.to_string(),
                ResultLocationParams {
                    uri: location.as_str().to_string(),
                },
            );
            self.send(lsp_server::Message::Notification(notif));
        }
    }

    /// Ask the client to open a result location. Formatting follows once
    /// the client confirms.
    fn show_result(&mut self, location: VirtualLocation, format: ResultFormat) {
        let Some(uri) = to_lsp_uri(&location) else {
            return;
        };
        let params = ShowDocumentParams {
            uri,
            external: Some(false),
            take_focus: Some(false),
            selection: None,
        };
        self.send_request(
            ShowDocument::METHOD,
            params,
            PendingRequest::ShowResult { location, format },
        );
    }

    /// Best-effort formatting pass over a result the client has shown.
    fn format_result(&mut self, location: &VirtualLocation, format: ResultFormat) {
        let text = self.provider.provide_content(location);
        let formatted = match self.formatter.format(&text, format) {
            Ok(Some(formatted)) => formatted,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Formatting {} failed: {}", location, e);
                return;
            }
        };
        let Some(uri) = to_lsp_uri(location) else {
            return;
        };

        #[allow(clippy::mutable_key_type)]
        let mut changes = HashMap::new();
        changes.insert(uri, vec![full_replacement(&text, formatted)]);

        let params = ApplyWorkspaceEditParams {
            label: Some("Format query result".to_string()),
            edit: WorkspaceEdit {
                changes: Some(changes),
                document_changes: None,
                change_annotations: None,
            },
        };
        self.send_request(
            ApplyWorkspaceEdit::METHOD,
            params,
            PendingRequest::Other(ApplyWorkspaceEdit::METHOD),
        );
    }

    /// Show a message to the user.
    fn show_message(&self, typ: MessageType, message: String) {
        let notif = lsp_server::Notification::new(
            ShowMessage::METHOD.to_string(),
            ShowMessageParams { typ, message },
        );
        self.send(lsp_server::Message::Notification(notif));
    }

    /// Send a server-initiated request.
    fn send_request<P: serde::Serialize>(
        &mut self,
        method: &'static str,
        params: P,
        pending: PendingRequest,
    ) {
        self.next_request_id += 1;
        let id = lsp_server::RequestId::from(self.next_request_id);
        self.pending_requests.insert(id.clone(), pending);

        let request = lsp_server::Request::new(id, method.to_string(), params);
        self.send(lsp_server::Message::Request(request));
    }

    /// Send a message to the client.
    fn send(&self, msg: lsp_server::Message) {
        if let Err(e) = self.sender.send(msg) {
            tracing::error!("Failed to send message: {}", e);
        }
    }
}

/// Convert a virtual location into a protocol URI.
fn to_lsp_uri(location: &VirtualLocation) -> Option<Uri> {
    match location.as_str().parse::<Uri>() {
        Ok(uri) => Some(uri),
        Err(e) => {
            tracing::error!("Location {} is not a valid URI: {:?}", location, e);
            None
        }
    }
}

/// Run the main event loop.
pub fn run_main_loop(
    receiver: Receiver<lsp_server::Message>,
    sender: Sender<lsp_server::Message>,
    settings: ConnectionSettings,
) {
    let (task_sender, task_receiver) = crossbeam_channel::unbounded::<Task>();
    let mut state = MainLoopState::new(
        sender,
        task_sender,
        settings,
        Arc::new(HttpClientFactory),
    );

    tracing::info!("Main loop started");

    loop {
        let event = crossbeam_channel::select! {
            recv(receiver) -> msg => match msg {
                Ok(msg) => Event::Message(msg.into()),
                Err(_) => break,
            },
            recv(task_receiver) -> task => match task {
                Ok(task) => Event::Task(task),
                Err(_) => continue,
            },
        };

        state.handle_event(event);

        if state.exit_requested {
            break;
        }
    }

    tracing::info!("Main loop ended");
}
