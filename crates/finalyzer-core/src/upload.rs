//! Upload submission tracking.
//!
//! An [`UploadTask`] carries exactly one file through a single multipart
//! submission, exposing transfer progress as a monotonic percentage and the
//! server-assigned document id once the transfer completes.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use crate::api::{AnalyzerBackend, ApiError};
use crate::models::{Credential, DocumentId};

/// Largest file the analysis service accepts.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

const GENERIC_UPLOAD_FAILURE: &str = "Upload failed";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Choose a PDF file")]
    NoFileSelected,
    #[error("'{0}' is empty")]
    EmptyFile(String),
    #[error("Unsupported file type {content_type}. Allowed: {}", PDF_CONTENT_TYPE)]
    UnsupportedType { content_type: String },
    #[error("File too large. Maximum size: {}MB", MAX_UPLOAD_BYTES / (1024 * 1024))]
    TooLarge { size: usize },
    #[error("This upload was already submitted; start a new upload to retry")]
    AlreadySubmitted,
    #[error("Not signed in")]
    Unauthenticated,
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("{message}")]
    Transfer {
        message: String,
        #[source]
        source: ApiError,
    },
}

impl UploadError {
    /// Whether the error was raised before any network call.
    pub const fn is_validation(&self) -> bool {
        !matches!(self, Self::Transfer { .. })
    }
}

/// File selected for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Reads a file from disk, guessing its content type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| UploadError::Read {
                path: path.display().to_string(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map_or_else(|| "document".to_string(), |name| name.to_string_lossy().to_string());
        let content_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self::new(file_name, content_type, bytes))
    }

    /// Client-side checks mirroring the server's upload constraints.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.bytes.is_empty() {
            return Err(UploadError::EmptyFile(self.file_name.clone()));
        }
        if !self.content_type.eq_ignore_ascii_case(PDF_CONTENT_TYPE) {
            return Err(UploadError::UnsupportedType {
                content_type: self.content_type.clone(),
            });
        }
        if self.bytes.len() > MAX_UPLOAD_BYTES {
            return Err(UploadError::TooLarge {
                size: self.bytes.len(),
            });
        }
        Ok(())
    }
}

/// Progress channel for one transfer.
///
/// Reported percentages never decrease and never exceed 100.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    sender: Arc<watch::Sender<u8>>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(0);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u8> {
        self.sender.subscribe()
    }

    pub fn percent(&self) -> u8 {
        *self.sender.borrow()
    }

    /// Records `loaded` of `total` bytes transferred.
    pub fn report(&self, loaded: u64, total: u64) {
        let percent = percent_of(loaded, total);
        self.sender.send_if_modified(|current| {
            if percent > *current {
                *current = percent;
                true
            } else {
                false
            }
        });
    }
}

fn percent_of(loaded: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let loaded = u128::from(loaded.min(total));
    let rounded = (loaded * 200 + u128::from(total)) / (u128::from(total) * 2);
    u8::try_from(rounded.min(100)).unwrap_or(100)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    Ready,
    Uploading,
    Completed(DocumentId),
    Failed(String),
}

/// One upload attempt. A retry needs a fresh task.
#[derive(Debug)]
pub struct UploadTask {
    file: Option<UploadFile>,
    progress: ProgressReporter,
    status: watch::Sender<UploadStatus>,
}

impl Default for UploadTask {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadTask {
    pub fn new() -> Self {
        let (status, _) = watch::channel(UploadStatus::Ready);
        Self {
            file: None,
            progress: ProgressReporter::new(),
            status,
        }
    }

    pub fn select_file(&mut self, file: UploadFile) {
        self.file = Some(file);
    }

    pub const fn selected_file(&self) -> Option<&UploadFile> {
        self.file.as_ref()
    }

    pub fn progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    pub fn percent(&self) -> u8 {
        self.progress.percent()
    }

    pub fn status(&self) -> UploadStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadStatus> {
        self.status.subscribe()
    }

    /// Resulting document id once the transfer has completed.
    pub fn document_id(&self) -> Option<DocumentId> {
        match &*self.status.borrow() {
            UploadStatus::Completed(document_id) => Some(document_id.clone()),
            _ => None,
        }
    }

    /// Submits the selected file together with `query`.
    ///
    /// Validation failures return before `backend` is touched. On transfer
    /// failure the progress value is left where the transfer stopped.
    pub async fn submit<B: AnalyzerBackend + ?Sized>(
        &mut self,
        backend: &B,
        credential: Option<&Credential>,
        query: &str,
    ) -> Result<DocumentId, UploadError> {
        if *self.status.borrow() != UploadStatus::Ready {
            return Err(UploadError::AlreadySubmitted);
        }
        let Some(file) = self.file.as_ref() else {
            return Err(UploadError::NoFileSelected);
        };
        file.validate()?;
        let credential = credential.ok_or(UploadError::Unauthenticated)?;

        let file = file.clone();
        let file_name = file.file_name.clone();
        self.status.send_replace(UploadStatus::Uploading);
        tracing::info!("Uploading {} ({} bytes)", file_name, file.bytes.len());

        match backend
            .submit_document(credential, file, query, self.progress.clone())
            .await
        {
            Ok(document_id) => {
                tracing::info!("Upload of {} queued as {}", file_name, document_id);
                self.status
                    .send_replace(UploadStatus::Completed(document_id.clone()));
                Ok(document_id)
            }
            Err(source) => {
                let message = source.user_message(GENERIC_UPLOAD_FAILURE);
                tracing::warn!("Upload of {} failed: {}", file_name, source);
                self.status.send_replace(UploadStatus::Failed(message.clone()));
                Err(UploadError::Transfer { message, source })
            }
        }
    }
}
