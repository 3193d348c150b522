use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use super::{CredentialStorage, StorageError, StorageEvent, EVENT_CAPACITY};

/// In-process credential storage.
///
/// Clones share one map and one event channel, so each clone behaves like
/// another context (tab) attached to the same durable storage.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
    events: broadcast::Sender<StorageEvent>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Backend("memory storage lock poisoned".to_string()))
    }

    fn notify(&self) {
        // No subscribers is fine.
        let _ = self.events.send(StorageEvent);
    }
}

impl CredentialStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let previous = self.entries()?.insert(key.to_string(), value.to_string());
        if previous.as_deref() != Some(value) {
            self.notify();
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.entries()?.remove(key).is_some() {
            self.notify();
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}
