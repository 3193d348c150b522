//! finalyzer-core - Core library for Finalyzer
//!
//! This crate contains the client-side session store, route guard, job poller,
//! paginated collection fetcher and upload tracker shared by Finalyzer
//! front-ends, together with the models and HTTP client they drive.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod pagination;
pub mod poller;
pub mod router;
pub mod session;
pub mod shell;
#[cfg(test)]
mod testing;
pub mod upload;
pub mod util;
pub mod views;

pub use error::{Error, Result};
pub use models::{AnalysisResult, Credential, Document, DocumentId, SessionState};
