//! Connection registry.
//!
//! Holds at most one live connection. Every lookup compares the current
//! settings against the live connection's identity; on drift the old client
//! is released before a new one is created.

use crate::task::{self, Task};
use crossbeam_channel::Sender;
use mlquery_client::{EvalError, EvalRequest, Evaluator, HttpEvaluator};
use mlquery_core::{ConnectionIdentity, ConnectionSettings};
use std::sync::Arc;
use thiserror::Error;

/// Content database id before it has been resolved.
pub const UNRESOLVED_DATABASE_ID: &str = "0";

/// Error creating a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The client handle could not be created.
    #[error("failed to create client: {0}")]
    Client(#[from] EvalError),
}

/// Creates client handles for settings.
pub trait ClientFactory: Send + Sync {
    /// Open a client for the server described by `settings`.
    fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn Evaluator>, ConnectionError>;
}

/// Factory producing [`HttpEvaluator`] clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn Evaluator>, ConnectionError> {
        Ok(Arc::new(HttpEvaluator::new(settings)?))
    }
}

/// A live connection.
pub struct ConnectionDescriptor {
    settings: ConnectionSettings,
    identity: ConnectionIdentity,
    /// Filled in asynchronously; `"0"` until the lookup lands.
    resolved_content_database_id: String,
    client: Arc<dyn Evaluator>,
    generation: u64,
    connected_at: chrono::DateTime<chrono::Utc>,
}

impl ConnectionDescriptor {
    /// Settings the connection was created from.
    pub const fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Identity of the connection.
    pub const fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    /// Numeric id of the content database, `"0"` while unresolved.
    pub fn resolved_content_database_id(&self) -> &str {
        &self.resolved_content_database_id
    }

    /// The underlying client handle.
    pub fn client(&self) -> Arc<dyn Evaluator> {
        Arc::clone(&self.client)
    }

    /// Sequence number distinguishing this connection from earlier ones.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Summary safe to show to the user (no password).
    pub fn info(&self) -> serde_json::Value {
        serde_json::json!({
            "host": self.settings.host,
            "port": self.settings.port,
            "username": self.settings.username,
            "documentsDb": self.settings.documents_db,
            "modulesDb": self.settings.modules_db,
            "documentsDbId": self.resolved_content_database_id,
            "connectedAt": self.connected_at.to_rfc3339(),
        })
    }
}

impl std::fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("identity", &self.identity)
            .field("resolved_content_database_id", &self.resolved_content_database_id)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Single-slot owner of the live connection.
pub struct ConnectionRegistry {
    factory: Arc<dyn ClientFactory>,
    tasks: Sender<Task>,
    slot: Option<ConnectionDescriptor>,
    generations: u64,
}

impl ConnectionRegistry {
    /// Create an empty registry. Database id lookups are posted to `tasks`.
    pub fn new(factory: Arc<dyn ClientFactory>, tasks: Sender<Task>) -> Self {
        Self {
            factory,
            tasks,
            slot: None,
            generations: 0,
        }
    }

    /// Return the connection for `settings`, replacing the live one if the
    /// settings drifted.
    ///
    /// Creation failures are logged and leave the slot empty.
    pub fn get_connection(
        &mut self,
        settings: &ConnectionSettings,
    ) -> Option<&ConnectionDescriptor> {
        let identity = settings.identity();

        if self
            .slot
            .as_ref()
            .is_some_and(|live| live.identity != identity)
        {
            tracing::info!("Connection settings changed, releasing previous client");
            self.release();
        }

        if self.slot.is_none() {
            match self.connect(settings, identity) {
                Ok(descriptor) => self.slot = Some(descriptor),
                Err(e) => tracing::error!("Error creating connection: {}", e),
            }
        }

        self.slot.as_ref()
    }

    /// The live connection, if any, without checking for drift.
    pub const fn current(&self) -> Option<&ConnectionDescriptor> {
        self.slot.as_ref()
    }

    /// Record the outcome of a content database id lookup.
    ///
    /// Results for a connection that has since been replaced are ignored.
    pub fn apply_database_id(&mut self, generation: u64, result: Result<String, EvalError>) {
        let Some(live) = self.slot.as_mut().filter(|live| live.generation == generation) else {
            tracing::debug!("Ignoring database id for retired connection #{}", generation);
            return;
        };
        match result {
            Ok(id) => {
                tracing::info!("Database {} has id {}", live.settings.documents_db, id);
                live.resolved_content_database_id = id;
            }
            Err(e) => tracing::warn!(
                "Could not resolve database {}: {}",
                live.settings.documents_db,
                e
            ),
        }
    }

    /// Release the live client and clear the slot.
    pub fn release(&mut self) {
        if let Some(old) = self.slot.take() {
            tracing::debug!("Releasing connection #{}", old.generation);
            old.client.release();
        }
    }

    fn connect(
        &mut self,
        settings: &ConnectionSettings,
        identity: ConnectionIdentity,
    ) -> Result<ConnectionDescriptor, ConnectionError> {
        let client = self.factory.connect(settings)?;
        self.generations += 1;
        let generation = self.generations;

        tracing::info!(
            "Connected to {} as {} (#{})",
            settings.authority(),
            settings.username,
            generation
        );

        let lookup_client = Arc::clone(&client);
        let request = EvalRequest::database_lookup(&settings.documents_db);
        task::spawn(&self.tasks, move || Task::DatabaseResolved {
            generation,
            result: lookup_client.evaluate(&request).and_then(|record| {
                record
                    .entries()
                    .first()
                    .map(database_id_text)
                    .ok_or_else(|| EvalError::Decode("empty database id lookup".to_string()))
            }),
        });

        Ok(ConnectionDescriptor {
            settings: settings.clone(),
            identity,
            resolved_content_database_id: UNRESOLVED_DATABASE_ID.to_string(),
            client,
            generation,
            connected_at: chrono::Utc::now(),
        })
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        self.release();
    }
}

/// Text of a database id entry, without JSON quoting.
fn database_id_text(entry: &mlquery_core::ResultEntry) -> String {
    match entry {
        mlquery_core::ResultEntry::Success {
            value: serde_json::Value::String(id),
            ..
        } => id.clone(),
        other => other.render(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlquery_core::{ResultEntry, ResultFormat, ResultRecord};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeClient {
        released: AtomicBool,
    }

    impl Evaluator for FakeClient {
        fn evaluate(&self, _request: &EvalRequest) -> Result<ResultRecord, EvalError> {
            Ok(ResultRecord::new(vec![ResultEntry::success(
                "1234",
                ResultFormat::Text,
                "unsignedLong",
            )]))
        }

        fn release(&self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeFactory {
        connects: AtomicUsize,
        fail: AtomicBool,
        clients: parking_lot::Mutex<Vec<Arc<FakeClient>>>,
    }

    impl ClientFactory for FakeFactory {
        fn connect(
            &self,
            _settings: &ConnectionSettings,
        ) -> Result<Arc<dyn Evaluator>, ConnectionError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(EvalError::Transport("boom".to_string()).into());
            }
            self.connects.fetch_add(1, Ordering::SeqCst);
            let client = Arc::new(FakeClient::default());
            self.clients.lock().push(Arc::clone(&client));
            Ok(client)
        }
    }

    fn registry() -> (
        ConnectionRegistry,
        Arc<FakeFactory>,
        crossbeam_channel::Receiver<Task>,
    ) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let factory = Arc::new(FakeFactory::default());
        (ConnectionRegistry::new(factory.clone(), tx), factory, rx)
    }

    #[test]
    fn test_reuses_connection_for_same_settings() {
        let (mut registry, factory, _rx) = registry();
        let settings = ConnectionSettings::default();

        let first = registry.get_connection(&settings).unwrap().generation();
        let second = registry.get_connection(&settings).unwrap().generation();

        assert_eq!(first, second);
        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drift_releases_old_client() {
        let (mut registry, factory, _rx) = registry();
        let c1 = ConnectionSettings::default();
        let c2 = ConnectionSettings {
            documents_db: "Other".to_string(),
            ..ConnectionSettings::default()
        };

        registry.get_connection(&c1).unwrap();
        let live = registry.get_connection(&c2).unwrap();
        assert_eq!(live.identity(), &c2.identity());

        let clients = factory.clients.lock();
        assert_eq!(clients.len(), 2);
        assert!(clients[0].released.load(Ordering::SeqCst));
        assert!(!clients[1].released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_construction_failure_leaves_slot_empty() {
        let (mut registry, factory, _rx) = registry();
        factory.fail.store(true, Ordering::SeqCst);

        assert!(registry.get_connection(&ConnectionSettings::default()).is_none());
        assert!(registry.current().is_none());

        factory.fail.store(false, Ordering::SeqCst);
        assert!(registry.get_connection(&ConnectionSettings::default()).is_some());
    }

    #[test]
    fn test_database_id_resolves_asynchronously() {
        let (mut registry, _factory, rx) = registry();
        let live = registry.get_connection(&ConnectionSettings::default()).unwrap();
        assert_eq!(live.resolved_content_database_id(), UNRESOLVED_DATABASE_ID);

        let Task::DatabaseResolved { generation, result } =
            rx.recv_timeout(Duration::from_secs(5)).unwrap()
        else {
            panic!("expected a database lookup");
        };
        registry.apply_database_id(generation, result);

        assert_eq!(registry.current().unwrap().resolved_content_database_id(), "1234");
    }

    #[test]
    fn test_database_id_for_retired_connection_is_ignored() {
        let (mut registry, _factory, _rx) = registry();
        let settings = ConnectionSettings::default();
        let old = registry.get_connection(&settings).unwrap().generation();

        registry.get_connection(&ConnectionSettings {
            port: 8002,
            ..settings
        });
        registry.apply_database_id(old, Ok("999".to_string()));

        assert_eq!(
            registry.current().unwrap().resolved_content_database_id(),
            UNRESOLVED_DATABASE_ID
        );
    }

    #[test]
    fn test_release_on_drop() {
        let (mut registry, factory, _rx) = registry();
        registry.get_connection(&ConnectionSettings::default());
        drop(registry);

        assert!(factory.clients.lock()[0].released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_info_hides_password() {
        let (mut registry, _factory, _rx) = registry();
        let settings = ConnectionSettings {
            password: "hunter2".to_string(),
            ..ConnectionSettings::default()
        };
        let info = registry.get_connection(&settings).unwrap().info();

        assert_eq!(info["host"], "localhost");
        assert_eq!(info["documentsDbId"], UNRESOLVED_DATABASE_ID);
        assert!(!info.to_string().contains("hunter2"));
    }
}
