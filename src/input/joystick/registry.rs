//! Registry of devices currently open and dispatched to
//!
//! A device id is present here if and only if it is open and its sink is
//! receiving events. The registry itself is not synchronized; the dispatch
//! manager keeps it behind the lock it shares with the dispatch thread.

use std::collections::HashMap;
use std::sync::Arc;

use super::event::Session;
use super::slots::DeviceSink;
use super::types::{DeviceCapabilities, DeviceId};

/// One registered device
pub struct RegistryEntry<H> {
    /// Native handle returned by the subsystem's `open`
    pub handle: H,
    /// Session of `handle`; events from other sessions are stale
    pub session: Session,
    /// Where dispatched state is written
    pub sink: Arc<dyn DeviceSink>,
    /// Captured at registration, never updated afterwards
    pub capabilities: DeviceCapabilities,
}

/// Map from device id to its native handle and sink
pub struct Registry<H> {
    entries: HashMap<DeviceId, RegistryEntry<H>>,
}

impl<H> Registry<H> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: DeviceId) -> Option<&RegistryEntry<H>> {
        self.entries.get(&id)
    }

    /// Owner name of the sink registered for `id`
    pub fn owner_of(&self, id: DeviceId) -> Option<String> {
        self.entries.get(&id).map(|e| e.sink.owner().to_string())
    }

    /// Id under which this exact sink is registered
    pub fn id_of_sink(&self, sink: &Arc<dyn DeviceSink>) -> Option<DeviceId> {
        self.entries
            .iter()
            .find(|(_, e)| Arc::as_ptr(&e.sink) as *const () == Arc::as_ptr(sink) as *const ())
            .map(|(&id, _)| id)
    }

    /// Insert a new entry
    ///
    /// # Returns
    /// The registry size after the insert
    ///
    /// Callers check for duplicates first; an existing entry is never replaced.
    pub fn insert(&mut self, id: DeviceId, entry: RegistryEntry<H>) -> usize {
        self.entries.entry(id).or_insert(entry);
        self.entries.len()
    }

    pub fn remove(&mut self, id: DeviceId) -> Option<RegistryEntry<H>> {
        self.entries.remove(&id)
    }

    /// Registered ids in ascending order
    pub fn ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}
