use std::io;

use finalyzer_core::api::ApiError;
use finalyzer_core::config::ConfigError;
use finalyzer_core::session::StorageError;
use finalyzer_core::upload::UploadError;
use thiserror::Error;

use crate::config_profiles::ProfileStoreError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] finalyzer_core::Error),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    ClientConfig(#[from] ConfigError),
    #[error(transparent)]
    Profiles(#[from] ProfileStoreError),
    #[error("Credential storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("{0}")]
    Auth(String),
    #[error("Not signed in. Run `finalyzer auth login --email <email> --password <password>` first.")]
    NotSignedIn,
    #[error("Signed out while the command was running")]
    SessionEnded,
    #[error("Document ID cannot be empty")]
    EmptyDocumentId,
    #[error("'{0}' is not an analysis path; expected /analysis/<DOCUMENT_ID>")]
    NotAnAnalysisPath(String),
    #[error("Page must be at least 1")]
    InvalidPage,
    #[error("Failed to fetch {what}: {message}")]
    Fetch { what: &'static str, message: String },
}
