//! Session-aware navigation guard.
//!
//! SYSTEM CONTEXT
//! ==============
//! Screens live in two groups: the public auth screens and the protected
//! app. The guard keeps signed-out users out of the protected group and
//! signed-in users out of the auth group. It holds no state of its own and
//! does nothing until the session has settled, so a cold start never
//! flashes the login screen before restore completes.

#[cfg(test)]
#[path = "routing_test.rs"]
mod routing_test;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::session::{Session, SessionPhase};

pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_PROTECTED_ROOT: &str = "/(protected)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGroup {
    /// Login, registration and other signed-out screens.
    Auth,
    Protected,
    Other,
}

/// A navigation location such as `/(protected)/(hotel)/12`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    path: String,
}

impl Route {
    #[must_use]
    pub fn new(path: &str) -> Self {
        let trimmed = path.trim().trim_matches('/');
        Self { path: format!("/{trimmed}") }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn first_segment(&self) -> Option<&str> {
        self.segments().next()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
}

/// Where the app is and how to move it. Implemented by the embedding shell.
pub trait Navigator: Send + Sync {
    fn current(&self) -> Route;
    /// Replace the current location without pushing history.
    fn replace(&self, path: &str);
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_path: String,
    protected_root: String,
    auth_segments: Vec<String>,
    protected_segments: Vec<String>,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self {
            login_path: DEFAULT_LOGIN_PATH.to_owned(),
            protected_root: DEFAULT_PROTECTED_ROOT.to_owned(),
            auth_segments: vec!["(auth)".to_owned(), "login".to_owned(), "register".to_owned()],
            protected_segments: vec!["(protected)".to_owned()],
        }
    }
}

impl RouteGuard {
    #[must_use]
    pub fn new(login_path: &str, protected_root: &str) -> Self {
        Self { login_path: login_path.to_owned(), protected_root: protected_root.to_owned(), ..Self::default() }
    }

    /// Group membership is decided by the first path segment, ignoring case.
    #[must_use]
    pub fn group_of(&self, route: &Route) -> RouteGroup {
        let Some(first) = route.first_segment() else {
            return RouteGroup::Other;
        };
        if self.protected_segments.iter().any(|s| s.eq_ignore_ascii_case(first)) {
            RouteGroup::Protected
        } else if self.auth_segments.iter().any(|s| s.eq_ignore_ascii_case(first)) {
            RouteGroup::Auth
        } else {
            RouteGroup::Other
        }
    }

    /// The redirect the session demands at `route`, if any.
    #[must_use]
    pub fn redirect_for(&self, session: &Session, route: &Route) -> Option<Redirect> {
        let target = match (session.phase(), self.group_of(route)) {
            (SessionPhase::Unauthenticated, RouteGroup::Protected) => &self.login_path,
            (SessionPhase::Authenticated, RouteGroup::Auth) => &self.protected_root,
            _ => return None,
        };
        Some(Redirect { to: target.clone() })
    }

    /// Evaluate at the navigator's current location and apply any redirect.
    pub fn enforce<N: Navigator + ?Sized>(&self, session: &Session, navigator: &N) -> Option<Redirect> {
        let route = navigator.current();
        let redirect = self.redirect_for(session, &route)?;
        tracing::debug!(from = route.path(), to = %redirect.to, "route guard redirect");
        navigator.replace(&redirect.to);
        Some(redirect)
    }

    /// Re-evaluate on every session change until the session owner goes away.
    pub async fn follow<N: Navigator + ?Sized>(&self, mut session: watch::Receiver<Session>, navigator: &N) {
        loop {
            let snapshot = session.borrow_and_update().clone();
            self.enforce(&snapshot, navigator);
            if session.changed().await.is_err() {
                tracing::debug!("session closed; route guard stopping");
                return;
            }
        }
    }

    /// Run [`Self::follow`] as a background task.
    pub fn spawn<N>(self, session: watch::Receiver<Session>, navigator: N) -> JoinHandle<()>
    where
        N: Navigator + 'static,
    {
        tokio::spawn(async move { self.follow(session, &navigator).await })
    }
}
