//! Virtual content provider.
//!
//! Owns the result cache and turns cached records into text on demand. Every
//! cache write is followed by a change event for the written location, sent
//! to all subscribers. Hosts re-read a location only after seeing its event.

use crossbeam_channel::{Receiver, Sender};
use mlquery_core::{render_or_pending, ResultRecord, VirtualLocation};
use std::collections::HashMap;

/// Last known result per location.
#[derive(Debug, Default)]
pub struct ResultCache {
    /// Records keyed by the canonical location string.
    entries: HashMap<String, ResultRecord>,
}

impl ResultCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record, replacing any previous one.
    pub fn put(&mut self, location: &VirtualLocation, record: ResultRecord) {
        self.entries.insert(location.as_str().to_string(), record);
    }

    /// Look up the record for a location.
    pub fn get(&self, location: &VirtualLocation) -> Option<&ResultRecord> {
        self.entries.get(location.as_str())
    }

    /// Render a location, or the pending placeholder if nothing is cached.
    pub fn render(&self, location: &VirtualLocation) -> String {
        render_or_pending(self.get(location))
    }

    /// Number of cached locations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Pull-based provider for `mlquery-result` documents.
#[derive(Debug, Default)]
pub struct ContentProvider {
    cache: ResultCache,
    subscribers: Vec<Sender<VirtualLocation>>,
}

impl ContentProvider {
    /// Create a provider with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to change events.
    pub fn subscribe(&mut self) -> Receiver<VirtualLocation> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.subscribers.push(sender);
        receiver
    }

    /// Store a record and announce the change.
    ///
    /// The record is in the cache before any subscriber sees the event.
    pub fn update_results(&mut self, location: &VirtualLocation, record: ResultRecord) {
        tracing::debug!(
            "Caching {} entries for {}",
            record.entries().len(),
            location
        );
        self.cache.put(location, record);
        self.fire(location);
    }

    /// Text content of a location. Never blocks and has no side effects.
    pub fn provide_content(&self, location: &VirtualLocation) -> String {
        self.cache.render(location)
    }

    /// The underlying cache.
    pub const fn cache(&self) -> &ResultCache {
        &self.cache
    }

    fn fire(&mut self, location: &VirtualLocation) {
        self.subscribers
            .retain(|subscriber| subscriber.send(location.clone()).is_ok());
    }
}
