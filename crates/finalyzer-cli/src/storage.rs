//! Credential storage in the OS keychain, one entry per profile.
//!
//! Other processes may log in or out of the same profile at any time; a change
//! monitor polls the entry and emits [`StorageEvent`]s when it moves.

use std::collections::HashMap;
#[cfg(test)]
use std::sync::OnceLock;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[cfg(not(test))]
use keyring::Entry;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use finalyzer_core::session::{CredentialStorage, StorageError, StorageEvent};

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "finalyzer-cli";

const EVENT_CAPACITY: usize = 16;

#[derive(Clone)]
pub struct KeyringStorage {
    profile: String,
    events: broadcast::Sender<StorageEvent>,
    /// Last value observed per key, shared with the change monitor.
    observed: Arc<Mutex<HashMap<String, Option<String>>>>,
}

impl KeyringStorage {
    pub fn new(profile_name: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            profile: profile_name.to_string(),
            events,
            observed: Arc::default(),
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    fn username(&self, key: &str) -> String {
        format!("{key}:{}", self.profile)
    }

    fn remember(&self, key: &str, value: Option<String>) -> bool {
        let Ok(mut observed) = self.observed.lock() else {
            return true;
        };
        let previous = observed.insert(key.to_string(), value.clone());
        previous.map_or(true, |previous| previous != value)
    }

    fn notify(&self) {
        let _ = self.events.send(StorageEvent);
    }

    /// Polls `key` every `interval` and reports changes made elsewhere.
    pub fn spawn_change_monitor(&self, key: &str, interval: Duration) -> ChangeMonitor {
        let storage = self.clone();
        let key = key.to_string();
        if let Ok(current) = storage.read(&key) {
            storage.remember(&key, current);
        }

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match storage.read(&key) {
                    Ok(current) => {
                        if storage.remember(&key, current) {
                            tracing::debug!("Keychain entry for profile {} changed", storage.profile);
                            storage.notify();
                        }
                    }
                    Err(error) => {
                        tracing::warn!("Failed to poll keychain entry: {}", error);
                    }
                }
            }
        });
        ChangeMonitor { handle }
    }

    #[cfg(not(test))]
    fn entry(&self, key: &str) -> Result<Entry, StorageError> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username(key))
            .map_err(|error| StorageError::Unavailable(error.to_string()))
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(test)]
    fn test_guard() -> Result<std::sync::MutexGuard<'static, HashMap<String, String>>, StorageError> {
        Self::test_store()
            .lock()
            .map_err(|error| StorageError::Backend(error.to_string()))
    }

    #[cfg(not(test))]
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(StorageError::Backend(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(Self::test_guard()?.get(&self.username(key)).cloned())
    }

    #[cfg(not(test))]
    fn store(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|error| StorageError::Backend(error.to_string()))
    }

    #[cfg(test)]
    fn store(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Self::test_guard()?.insert(self.username(key), value.to_string());
        Ok(())
    }

    #[cfg(not(test))]
    fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(StorageError::Backend(error.to_string())),
        }
    }

    #[cfg(test)]
    fn delete(&self, key: &str) -> Result<(), StorageError> {
        Self::test_guard()?.remove(&self.username(key));
        Ok(())
    }
}

impl CredentialStorage for KeyringStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.load(key)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.store(key, value)?;
        if self.remember(key, Some(value.to_string())) {
            self.notify();
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.delete(key)?;
        if self.remember(key, None) {
            self.notify();
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }
}

/// Background poller started by [`KeyringStorage::spawn_change_monitor`].
/// Stops when dropped.
pub struct ChangeMonitor {
    handle: JoinHandle<()>,
}

impl Drop for ChangeMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
