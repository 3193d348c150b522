//! Routes, navigation requests and the route guard.

use std::fmt;

use tokio::sync::mpsc;

use crate::models::{DocumentId, SessionState};

/// Views the client can show.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Register,
    Dashboard,
    Upload,
    Analysis(DocumentId),
}

impl Route {
    /// Entry view for unauthenticated users.
    pub const PUBLIC_ENTRY: Self = Self::Login;
    /// Default view after login.
    pub const DEFAULT_PROTECTED: Self = Self::Dashboard;

    pub const fn is_protected(&self) -> bool {
        !matches!(self, Self::Login | Self::Register)
    }

    pub fn path(&self) -> String {
        match self {
            Self::Login => "/login".to_string(),
            Self::Register => "/register".to_string(),
            Self::Dashboard => "/dashboard".to_string(),
            Self::Upload => "/upload".to_string(),
            Self::Analysis(document_id) => format!("/analysis/{document_id}"),
        }
    }

    /// Parses a route path; `/` maps to the login view.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.trim().trim_end_matches('/');
        match path {
            "" | "/login" => Some(Self::Login),
            "/register" => Some(Self::Register),
            "/dashboard" => Some(Self::Dashboard),
            "/upload" => Some(Self::Upload),
            _ => path
                .strip_prefix("/analysis/")
                .and_then(|id| id.parse::<DocumentId>().ok())
                .map(Self::Analysis),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Sending half of the navigation queue.
#[derive(Debug, Clone)]
pub struct Navigator {
    tx: mpsc::UnboundedSender<Route>,
}

impl Navigator {
    /// Queues a navigation. Requests made after the shell is gone are dropped.
    pub fn navigate(&self, route: Route) {
        if self.tx.send(route).is_err() {
            tracing::debug!("Navigation requested with no shell attached");
        }
    }
}

/// Receiving half of the navigation queue, owned by the shell.
#[derive(Debug)]
pub struct NavigationRequests {
    rx: mpsc::UnboundedReceiver<Route>,
}

impl NavigationRequests {
    pub async fn recv(&mut self) -> Option<Route> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Route> {
        self.rx.try_recv().ok()
    }
}

pub fn navigation_channel() -> (Navigator, NavigationRequests) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Navigator { tx }, NavigationRequests { rx })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow(Route),
    Redirect(Route),
}

/// Gate in front of every protected view.
pub struct RouteGuard;

impl RouteGuard {
    pub fn evaluate(route: &Route, state: SessionState) -> GuardDecision {
        if route.is_protected() && !state.is_authenticated() {
            GuardDecision::Redirect(Route::PUBLIC_ENTRY)
        } else {
            GuardDecision::Allow(route.clone())
        }
    }

    /// Calls `mount` only when `route` may be shown in `state`.
    ///
    /// On redirect `mount` is never invoked, so no protected view logic runs
    /// without a credential.
    pub fn guard<V>(
        route: &Route,
        state: SessionState,
        mount: impl FnOnce(&Route) -> V,
    ) -> Result<V, Route> {
        match Self::evaluate(route, state) {
            GuardDecision::Allow(route) => Ok(mount(&route)),
            GuardDecision::Redirect(target) => {
                tracing::info!("Redirecting {} to {}", route, target);
                Err(target)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn analysis(id: &str) -> Route {
        Route::Analysis(id.parse().unwrap())
    }

    #[test]
    fn paths_round_trip() {
        for route in [
            Route::Login,
            Route::Register,
            Route::Dashboard,
            Route::Upload,
            analysis("65f0c2"),
        ] {
            assert_eq!(Route::parse(&route.path()), Some(route));
        }
        assert_eq!(Route::parse("/"), Some(Route::Login));
        assert_eq!(Route::parse("/analysis/"), None);
        assert_eq!(Route::parse("/settings"), None);
    }

    #[test]
    fn unauthenticated_protected_routes_redirect_to_login() {
        for route in [Route::Dashboard, Route::Upload, analysis("abc")] {
            assert_eq!(
                RouteGuard::evaluate(&route, SessionState::Unauthenticated),
                GuardDecision::Redirect(Route::Login)
            );
        }
        assert_eq!(
            RouteGuard::evaluate(&Route::Register, SessionState::Unauthenticated),
            GuardDecision::Allow(Route::Register)
        );
    }

    #[test]
    fn guard_never_mounts_when_unauthenticated() {
        let mut mounted = false;
        let outcome = RouteGuard::guard(&Route::Dashboard, SessionState::Unauthenticated, |_| {
            mounted = true;
        });
        assert_eq!(outcome, Err(Route::Login));
        assert!(!mounted);

        let outcome = RouteGuard::guard(&Route::Dashboard, SessionState::Authenticated, |route| {
            route.path()
        });
        assert_eq!(outcome, Ok("/dashboard".to_string()));
    }

    #[tokio::test]
    async fn navigator_queues_routes_in_order() {
        let (navigator, mut requests) = navigation_channel();
        navigator.navigate(Route::Dashboard);
        navigator.clone().navigate(Route::Upload);

        assert_eq!(requests.recv().await, Some(Route::Dashboard));
        assert_eq!(requests.try_recv(), Some(Route::Upload));
        assert_eq!(requests.try_recv(), None);
    }
}
