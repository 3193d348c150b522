//! Data models for finalyzer-core

mod analysis;
mod credential;
mod document;

pub use analysis::{AnalysisResult, LocalSummary};
pub use credential::{Credential, SessionState};
pub use document::{Document, DocumentId, DocumentIdError, DocumentPage, DocumentStatus};
