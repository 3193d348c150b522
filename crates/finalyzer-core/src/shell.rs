//! One viewing context: current route, mounted view and session.
//!
//! The shell applies navigation requests through the route guard and
//! re-evaluates the guard whenever the session changes, so a logout in any
//! context tears down protected views here as well.

use std::sync::Arc;

use tokio::sync::watch;

use crate::api::AnalyzerBackend;
use crate::config::ClientConfig;
use crate::models::{Credential, SessionState};
use crate::router::{navigation_channel, GuardDecision, NavigationRequests, Route, RouteGuard};
use crate::session::{CredentialStorage, SessionStore};
use crate::views::{MountedView, ViewContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    SessionChanged(SessionState),
    Navigated(Route),
    Closed,
}

pub struct Shell<S> {
    session: SessionStore<S>,
    context: ViewContext,
    requests: NavigationRequests,
    session_changes: watch::Receiver<Option<Credential>>,
    route: Route,
    view: MountedView,
}

impl<S: CredentialStorage> Shell<S> {
    /// Opens the session over `storage` and shows `initial` (or wherever the
    /// guard sends it). Must be called within a Tokio runtime.
    pub fn new(
        storage: S,
        backend: Arc<dyn AnalyzerBackend>,
        config: ClientConfig,
        initial: Route,
    ) -> Self {
        let (navigator, requests) = navigation_channel();
        let session = SessionStore::open(storage, navigator);
        let context = ViewContext {
            backend,
            credentials: session.subscribe(),
            config,
        };

        let mut shell = Self {
            session_changes: session.subscribe(),
            session,
            context,
            requests,
            route: Route::PUBLIC_ENTRY,
            view: MountedView::Login,
        };
        shell.navigate(initial);
        shell
    }

    /// Shows `route`, or the login view if the guard rejects it.
    ///
    /// Navigating to the route already shown keeps the mounted view. The
    /// previous view is unmounted before the next one mounts.
    pub fn navigate(&mut self, route: Route) {
        let state = self.session.state();
        let target = match RouteGuard::evaluate(&route, state) {
            GuardDecision::Allow(target) => target,
            GuardDecision::Redirect(target) => {
                tracing::info!("Redirecting {} to {}", route, target);
                target
            }
        };
        if target == self.route {
            return;
        }

        let previous = std::mem::replace(&mut self.view, MountedView::Login);
        previous.unmount();

        let context = &self.context;
        self.view = RouteGuard::guard(&target, state, |route| MountedView::mount(route, context))
            .unwrap_or(MountedView::Login);
        tracing::debug!("Mounted {}", target);
        self.route = target;
    }

    /// Applies a pending session change, then every queued navigation.
    pub fn process_pending(&mut self) {
        if self.session_changes.has_changed().unwrap_or(false) {
            self.session_changes.borrow_and_update();
            self.enforce_guard();
        }
        while let Some(route) = self.requests.try_recv() {
            self.navigate(route);
        }
    }

    /// Waits for the next session change or navigation request and applies it.
    ///
    /// Session changes win over queued navigation.
    pub async fn next_event(&mut self) -> ShellEvent {
        enum Incoming {
            Session(bool),
            Navigation(Option<Route>),
        }

        let incoming = tokio::select! {
            biased;
            changed = self.session_changes.changed() => Incoming::Session(changed.is_ok()),
            route = self.requests.recv() => Incoming::Navigation(route),
        };

        match incoming {
            Incoming::Session(true) => {
                self.session_changes.borrow_and_update();
                self.enforce_guard();
                ShellEvent::SessionChanged(self.session.state())
            }
            Incoming::Navigation(Some(route)) => {
                self.navigate(route);
                ShellEvent::Navigated(self.route.clone())
            }
            Incoming::Session(false) | Incoming::Navigation(None) => ShellEvent::Closed,
        }
    }

    /// Leaves a protected view when the session is no longer authenticated.
    pub fn enforce_guard(&mut self) {
        if self.route.is_protected() && !self.session.is_authenticated() {
            self.navigate(self.route.clone());
        }
    }
}

impl<S> Shell<S> {
    /// The mounted view if it may be shown right now.
    ///
    /// Checks the live session, so a protected view is hidden as soon as the
    /// credential disappears, even before the shell has processed the change.
    pub fn visible_view(&self) -> Option<&MountedView> {
        if self.view.is_protected() && !self.session.is_authenticated() {
            None
        } else {
            Some(&self.view)
        }
    }

    pub const fn route(&self) -> &Route {
        &self.route
    }

    pub const fn view(&self) -> &MountedView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut MountedView {
        &mut self.view
    }

    pub const fn session(&self) -> &SessionStore<S> {
        &self.session
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.context.config
    }
}
