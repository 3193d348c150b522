//! Protected views and the background work each one owns.
//!
//! A view's poller or fetcher lives exactly as long as the view. Every
//! authenticated call reads the credential at call time and fails with
//! [`ApiError::Unauthenticated`] without issuing a request when there is none.

use std::sync::Arc;

use tokio::sync::watch;

use crate::api::{AnalyzerBackend, ApiError};
use crate::config::ClientConfig;
use crate::models::{AnalysisResult, Credential, Document, DocumentId};
use crate::pagination::{CollectionFetcher, Page, PageState, PageWindow};
use crate::poller::{JobPoller, PollState};
use crate::router::Route;
use crate::upload::{UploadError, UploadFile, UploadStatus, UploadTask};

/// What a mounted view needs from its surroundings.
#[derive(Clone)]
pub struct ViewContext {
    pub backend: Arc<dyn AnalyzerBackend>,
    pub credentials: watch::Receiver<Option<Credential>>,
    pub config: ClientConfig,
}

impl ViewContext {
    fn current_credential(&self) -> Option<Credential> {
        self.credentials.borrow().clone()
    }
}

/// Paged document listing with periodic refresh of the current page.
pub struct DashboardView {
    fetcher: CollectionFetcher<Document>,
}

impl DashboardView {
    pub fn mount(context: &ViewContext) -> Self {
        let backend = Arc::clone(&context.backend);
        let credentials = context.credentials.clone();
        let fetcher = CollectionFetcher::start(
            context.config.page_size,
            context.config.dashboard_refresh(),
            move |request| {
                let credential = credentials.borrow().clone();
                let call = credential.map(|credential| backend.list_documents(&credential, request));
                async move {
                    let page = call.ok_or(ApiError::Unauthenticated)?.await?;
                    Ok::<_, ApiError>(Page {
                        items: page.documents,
                        total: page.total,
                    })
                }
            },
        );
        Self { fetcher }
    }

    pub fn snapshot(&self) -> PageState<Document> {
        self.fetcher.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PageState<Document>> {
        self.fetcher.subscribe()
    }

    pub fn window(&self) -> PageWindow {
        self.fetcher.window()
    }

    pub fn next_page(&self) -> bool {
        self.fetcher.next_page()
    }

    pub fn prev_page(&self) -> bool {
        self.fetcher.prev_page()
    }

    pub fn jump_to_page(&self, page: usize) -> bool {
        self.fetcher.jump_to_page(page)
    }

    pub fn refresh(&self) {
        self.fetcher.refresh();
    }

    fn stop(&mut self) {
        self.fetcher.stop();
    }
}

/// Polls the analyses of one document.
pub struct AnalysisView {
    document_id: DocumentId,
    poller: JobPoller<Vec<AnalysisResult>>,
}

impl AnalysisView {
    pub fn mount(document_id: DocumentId, context: &ViewContext) -> Self {
        let backend = Arc::clone(&context.backend);
        let credentials = context.credentials.clone();
        let subject = document_id.clone();
        let poller = JobPoller::start(
            document_id.to_string(),
            context.config.poll_interval(),
            move || {
                let credential = credentials.borrow().clone();
                let call = credential.map(|credential| backend.fetch_analyses(&credential, &subject));
                async move { call.ok_or(ApiError::Unauthenticated)?.await }
            },
        );
        Self {
            document_id,
            poller,
        }
    }

    pub const fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn snapshot(&self) -> PollState<Vec<AnalysisResult>> {
        self.poller.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollState<Vec<AnalysisResult>>> {
        self.poller.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        self.poller.is_stopped()
    }

    fn stop(&mut self) {
        self.poller.stop();
    }
}

/// Single upload attempt.
pub struct UploadView {
    task: UploadTask,
    context: ViewContext,
}

impl UploadView {
    pub fn mount(context: &ViewContext) -> Self {
        Self {
            task: UploadTask::new(),
            context: context.clone(),
        }
    }

    pub fn select_file(&mut self, file: UploadFile) {
        self.task.select_file(file);
    }

    /// Submits the selected file with the configured analysis query.
    pub async fn submit(&mut self) -> Result<DocumentId, UploadError> {
        let credential = self.context.current_credential();
        self.task
            .submit(
                self.context.backend.as_ref(),
                credential.as_ref(),
                &self.context.config.upload_query,
            )
            .await
    }

    pub const fn task(&self) -> &UploadTask {
        &self.task
    }

    pub fn status(&self) -> UploadStatus {
        self.task.status()
    }

    pub fn progress(&self) -> watch::Receiver<u8> {
        self.task.progress()
    }

    /// Route to the analysis of the uploaded document, once there is one.
    pub fn analysis_route(&self) -> Option<Route> {
        self.task.document_id().map(Route::Analysis)
    }
}

/// The view currently shown by a shell.
pub enum MountedView {
    Login,
    Register,
    Dashboard(DashboardView),
    Upload(UploadView),
    Analysis(AnalysisView),
}

impl MountedView {
    /// Builds the view for `route`. Callers must run the route guard first.
    pub fn mount(route: &Route, context: &ViewContext) -> Self {
        match route {
            Route::Login => Self::Login,
            Route::Register => Self::Register,
            Route::Dashboard => Self::Dashboard(DashboardView::mount(context)),
            Route::Upload => Self::Upload(UploadView::mount(context)),
            Route::Analysis(document_id) => {
                Self::Analysis(AnalysisView::mount(document_id.clone(), context))
            }
        }
    }

    pub const fn is_protected(&self) -> bool {
        !matches!(self, Self::Login | Self::Register)
    }

    /// Stops background work before the view goes away.
    pub fn unmount(mut self) {
        match &mut self {
            Self::Dashboard(view) => view.stop(),
            Self::Analysis(view) => view.stop(),
            Self::Login | Self::Register | Self::Upload(_) => {}
        }
    }
}
