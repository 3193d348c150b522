//! Bearer credential and the session state derived from it

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque bearer token proving authentication.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wraps a raw token, returning `None` when it is blank.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Raw token value, for the `Authorization` header and storage.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_tuple("Credential")
            .field(&"[REDACTED]")
            .finish()
    }
}

/// Authenticated/unauthenticated flag, always derived from credential presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Authenticated,
    Unauthenticated,
}

impl SessionState {
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

impl From<Option<&Credential>> for SessionState {
    fn from(value: Option<&Credential>) -> Self {
        if value.is_some() {
            Self::Authenticated
        } else {
            Self::Unauthenticated
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticated => write!(f, "authenticated"),
            Self::Unauthenticated => write!(f, "unauthenticated"),
        }
    }
}
