//! Error types for finalyzer-core

use thiserror::Error;

use crate::api::ApiError;
use crate::config::ConfigError;
use crate::session::StorageError;
use crate::upload::UploadError;

/// Result type alias using finalyzer-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in finalyzer-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Remote API error
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Credential storage error
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Upload submission error
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
