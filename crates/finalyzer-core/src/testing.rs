//! In-memory backend shared by view and shell tests.

use std::sync::Mutex;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::api::{AnalyzerBackend, ApiError, ApiResult};
use crate::models::{
    AnalysisResult, Credential, Document, DocumentId, DocumentPage, DocumentStatus,
};
use crate::pagination::PageRequest;
use crate::upload::{ProgressReporter, UploadFile};

#[derive(Default)]
pub struct FakeBackend {
    pub documents: Mutex<Vec<Document>>,
    pub list_calls: Mutex<Vec<(String, PageRequest)>>,
    pub analysis_calls: Mutex<Vec<DocumentId>>,
    pub uploads: Mutex<Vec<(String, String)>>,
}

impl FakeBackend {
    pub fn with_documents(count: usize) -> Self {
        let backend = Self::default();
        *backend.documents.lock().unwrap() = (0..count)
            .map(|index| Document {
                id: format!("doc-{index}").parse().unwrap(),
                filename: format!("report-{index}.pdf"),
                status: DocumentStatus::Queued,
            })
            .collect();
        backend
    }

    pub fn list_requests(&self) -> Vec<PageRequest> {
        self.list_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, request)| *request)
            .collect()
    }

    pub fn analysis_count(&self) -> usize {
        self.analysis_calls.lock().unwrap().len()
    }
}

impl AnalyzerBackend for FakeBackend {
    fn list_documents(
        &self,
        credential: &Credential,
        request: PageRequest,
    ) -> BoxFuture<'static, ApiResult<DocumentPage>> {
        self.list_calls
            .lock()
            .unwrap()
            .push((credential.expose().to_string(), request));
        let documents = self.documents.lock().unwrap().clone();
        let total = documents.len();
        let page = documents
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .collect();
        async move {
            Ok(DocumentPage {
                documents: page,
                total,
            })
        }
        .boxed()
    }

    fn fetch_analyses(
        &self,
        _credential: &Credential,
        document_id: &DocumentId,
    ) -> BoxFuture<'static, ApiResult<Vec<AnalysisResult>>> {
        self.analysis_calls.lock().unwrap().push(document_id.clone());
        async move {
            Ok(vec![AnalysisResult {
                id: Some("analysis-1".to_string()),
                status: "processing".to_string(),
                local_summary: None,
                crew_result: None,
                error: None,
            }])
        }
        .boxed()
    }

    fn submit_document(
        &self,
        _credential: &Credential,
        file: UploadFile,
        query: &str,
        progress: ProgressReporter,
    ) -> BoxFuture<'static, ApiResult<DocumentId>> {
        self.uploads
            .lock()
            .unwrap()
            .push((file.file_name.clone(), query.to_string()));
        let total = file.bytes.len() as u64;
        async move {
            progress.report(total / 2, total);
            progress.report(total, total);
            "uploaded-1"
                .parse()
                .map_err(|_| ApiError::InvalidPayload("bad id".to_string()))
        }
        .boxed()
    }
}
