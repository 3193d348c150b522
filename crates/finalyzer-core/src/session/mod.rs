//! Session store.
//!
//! The credential lives in durable storage shared by every context. The
//! [`SessionStore`] keeps an in-memory copy for cheap reads, writes through on
//! login/logout, and re-reads the storage whenever it reports a change so that
//! a logout in another context is picked up without polling.

mod memory;

use std::sync::{Arc, Weak};

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::models::{Credential, SessionState};
use crate::router::{Navigator, Route};

pub use memory::MemoryStorage;

/// Storage key holding the bearer token.
pub const CREDENTIAL_KEY: &str = "access_token";

pub(crate) const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Credential storage is unavailable: {0}")]
    Unavailable(String),
    #[error("Credential storage failed: {0}")]
    Backend(String),
}

/// "Something changed" notification from the storage; carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageEvent;

/// Durable key/value storage shared across contexts.
pub trait CredentialStorage: Send + Sync + 'static {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    /// Change notifications, including changes made through `self`.
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}

struct SessionInner<S> {
    storage: S,
    credential: watch::Sender<Option<Credential>>,
    navigator: Navigator,
    cancel: CancellationToken,
}

impl<S> Drop for SessionInner<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Sole owner of the credential within one context.
pub struct SessionStore<S> {
    inner: Arc<SessionInner<S>>,
}

impl<S> Clone for SessionStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: CredentialStorage> SessionStore<S> {
    /// Reads the stored credential and starts listening for storage changes.
    ///
    /// Must be called within a Tokio runtime. The listener stops once the
    /// last clone of the store is dropped.
    pub fn open(storage: S, navigator: Navigator) -> Self {
        let events = storage.subscribe();
        let initial = read_credential(&storage);
        let (credential, _) = watch::channel(initial);
        let cancel = CancellationToken::new();

        let inner = Arc::new(SessionInner {
            storage,
            credential,
            navigator,
            cancel: cancel.clone(),
        });
        tokio::spawn(listen(Arc::downgrade(&inner), events, cancel));

        Self { inner }
    }

    /// Persists `credential` and navigates to the dashboard.
    ///
    /// Repeating a login with the current credential changes nothing. If the
    /// storage write fails the session ends up unauthenticated.
    pub fn login(&self, credential: Credential) -> Result<(), StorageError> {
        if let Err(error) = self.inner.storage.write(CREDENTIAL_KEY, credential.expose()) {
            tracing::warn!("Failed to persist credential: {}", error);
            self.set(None);
            return Err(error);
        }

        if self.set(Some(credential)) {
            tracing::info!("Session authenticated");
        }
        self.inner.navigator.navigate(Route::DEFAULT_PROTECTED);
        Ok(())
    }

    /// Removes the credential and navigates to the login view.
    ///
    /// The session is unauthenticated afterwards even when the removal fails;
    /// the failure is still reported.
    pub fn logout(&self) -> Result<(), StorageError> {
        let removed = self.inner.storage.remove(CREDENTIAL_KEY);
        if let Err(error) = &removed {
            tracing::warn!("Failed to remove stored credential: {}", error);
        }
        if self.set(None) {
            tracing::info!("Session ended");
        }
        self.inner.navigator.navigate(Route::PUBLIC_ENTRY);
        removed
    }

    /// Re-reads the credential from storage.
    pub fn resync(&self) {
        self.inner.resync();
    }

    pub fn storage(&self) -> &S {
        &self.inner.storage
    }
}

impl<S> SessionStore<S> {
    /// In-memory read; never touches storage.
    pub fn state(&self) -> SessionState {
        SessionState::from(self.inner.credential.borrow().as_ref())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.inner.credential.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.inner.credential.subscribe()
    }

    pub fn navigator(&self) -> &Navigator {
        &self.inner.navigator
    }

    fn set(&self, credential: Option<Credential>) -> bool {
        self.inner.set(credential)
    }
}

impl<S> SessionInner<S> {
    fn set(&self, credential: Option<Credential>) -> bool {
        self.credential.send_if_modified(|current| {
            if *current == credential {
                false
            } else {
                *current = credential;
                true
            }
        })
    }
}

impl<S: CredentialStorage> SessionInner<S> {
    fn resync(&self) {
        let stored = read_credential(&self.storage);
        let before = SessionState::from(self.credential.borrow().as_ref());
        let after = SessionState::from(stored.as_ref());
        if self.set(stored) {
            tracing::info!("Session resynchronized from storage: {} -> {}", before, after);
        }
    }
}

/// Storage failures read as "no credential".
fn read_credential<S: CredentialStorage>(storage: &S) -> Option<Credential> {
    match storage.read(CREDENTIAL_KEY) {
        Ok(value) => value.and_then(Credential::new),
        Err(error) => {
            tracing::warn!("Failed to read stored credential: {}", error);
            None
        }
    }
}

async fn listen<S: CredentialStorage>(
    inner: Weak<SessionInner<S>>,
    mut events: broadcast::Receiver<StorageEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(StorageEvent) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Missed {} storage events, resynchronizing", skipped);
            }
            Err(RecvError::Closed) => break,
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.resync();
    }
}
