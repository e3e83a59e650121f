//! Auth-session state and lifecycle for the current user.
//!
//! SYSTEM CONTEXT
//! ==============
//! The [`SessionManager`] is the single owner of the session. Route guards
//! and identity-aware views read it through [`SessionManager::subscribe`]
//! and never mutate it directly.
//!
//! ARCHITECTURE
//! ============
//! State lives in a `tokio::sync::watch` channel. Every operation publishes
//! its outcome only after its remote and store calls have completed, and the
//! loading flag is held by a guard that releases on every exit path.
//!
//! TRADE-OFFS
//! ==========
//! Operations are not serialized against each other. Two overlapping
//! mutations race and the later completion wins; callers that care must
//! sequence them. Store writes are: every save or clear happens together
//! with its session update under one persist lock. `refresh_user` re-checks
//! the session under that lock and never writes over a session whose user
//! changed or signed out while its fetch was in flight.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, watch};

use crate::net::auth::{self, AuthApi};
use crate::net::types::{ApiError, Credentials, LoginResponse, RegistrationData, User};
use crate::store::{CredentialStore, SecretStore, StoreError};

// =============================================================================
// SESSION
// =============================================================================

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Nothing restored yet.
    Uninitialized,
    /// An operation is in flight.
    Loading,
    Authenticated,
    Unauthenticated,
}

/// Snapshot of the current identity and flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    /// Set once any operation has settled the session one way or the other.
    pub initialized: bool,
}

impl Session {
    #[must_use]
    pub fn authenticated(user: User) -> Self {
        Self { user: Some(user), is_authenticated: true, is_loading: false, initialized: true }
    }

    #[must_use]
    pub fn unauthenticated() -> Self {
        Self { user: None, is_authenticated: false, is_loading: false, initialized: true }
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.is_loading {
            SessionPhase::Loading
        } else if !self.initialized {
            SessionPhase::Uninitialized
        } else if self.is_authenticated {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Unauthenticated
        }
    }

    fn sign_in(&mut self, user: User) {
        self.user = Some(user);
        self.is_authenticated = true;
        self.initialized = true;
    }

    fn sign_out(&mut self) {
        self.user = None;
        self.is_authenticated = false;
        self.initialized = true;
    }
}

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// True when the backend refused the submitted credentials.
    #[must_use]
    pub fn is_rejected_credentials(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_unauthorized())
    }
}

// =============================================================================
// LOADING GUARD
// =============================================================================

/// Keeps `is_loading` raised while alive. Overlapping guards are counted so
/// the flag drops only when the last operation settles.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<Session>,
    in_flight: &'a AtomicUsize,
}

impl<'a> LoadingGuard<'a> {
    fn hold(state: &'a watch::Sender<Session>, in_flight: &'a AtomicUsize) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        state.send_if_modified(|s| !std::mem::replace(&mut s.is_loading, true));
        Self { state, in_flight }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            self.state.send_if_modified(|s| std::mem::replace(&mut s.is_loading, false));
        }
    }
}

// =============================================================================
// MANAGER
// =============================================================================

/// Owns the session and orchestrates the auth service and credential store.
pub struct SessionManager<A, S> {
    api: A,
    store: CredentialStore<S>,
    state: watch::Sender<Session>,
    in_flight: AtomicUsize,
    /// Held across each store write or clear and the session update it backs.
    persist: Mutex<()>,
}

impl<A: AuthApi, S: SecretStore> SessionManager<A, S> {
    /// Create an empty, uninitialized session. Call [`Self::restore`] next.
    pub fn new(api: A, store: S) -> Self {
        Self {
            api,
            store: CredentialStore::new(store),
            state: watch::Sender::new(Session::default()),
            in_flight: AtomicUsize::new(0),
            persist: Mutex::new(()),
        }
    }

    /// Create a manager and restore any persisted session in one step.
    pub async fn init(api: A, store: S) -> Self {
        let manager = Self::new(api, store);
        manager.restore().await;
        manager
    }

    /// Tear the manager down. Subscribers see the channel close.
    pub fn dispose(self) {
        tracing::debug!("session manager disposed");
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    fn hold_loading(&self) -> LoadingGuard<'_> {
        LoadingGuard::hold(&self.state, &self.in_flight)
    }

    fn current_user_id(&self) -> Option<i64> {
        self.state.borrow().user.as_ref().map(|u| u.id)
    }

    /// Rebuild the session from the persisted credential record.
    ///
    /// A stored token is checked against the backend. Rejection, or failure
    /// to check at all, runs the full [`Self::logout`] sequence. Never fails.
    pub async fn restore(&self) {
        let _loading = self.hold_loading();

        let record = match self.store.load().await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "credential store unreadable; starting signed out");
                None
            }
        };

        let Some(record) = record else {
            self.state.send_modify(Session::sign_out);
            tracing::debug!("no stored session");
            return;
        };

        match self.api.validate_token(&record.token).await {
            Ok(true) => {
                tracing::info!(user_id = record.user.id, "session restored");
                self.state.send_modify(|s| s.sign_in(record.user));
            }
            Ok(false) => {
                tracing::info!(user_id = record.user.id, "stored token rejected; signing out");
                self.logout_logged().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "token validation failed; signing out");
                self.logout_logged().await;
            }
        }
    }

    /// Sign in with a login/password pair and persist the credential record.
    ///
    /// # Errors
    ///
    /// Returns the remote error for unreachable backends or rejected
    /// credentials, or the store error if the record cannot be persisted.
    /// The session is not modified on failure.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, SessionError> {
        let _loading = self.hold_loading();
        let response = self.api.login(credentials).await.inspect_err(|e| {
            tracing::warn!(error = %e, "login failed");
        })?;
        self.establish(response).await
    }

    /// Create a user and its account, then sign in as that user.
    ///
    /// # Errors
    ///
    /// Returns the first remote or store error. Nothing is persisted unless
    /// every step succeeded; a user created before a failed account step is
    /// left on the server.
    pub async fn register(&self, data: &RegistrationData) -> Result<User, SessionError> {
        let _loading = self.hold_loading();
        let response = auth::register(&self.api, data).await.inspect_err(|e| {
            tracing::warn!(error = %e, "registration failed");
        })?;
        self.establish(response).await
    }

    async fn establish(&self, response: LoginResponse) -> Result<User, SessionError> {
        let LoginResponse { user, token } = response;
        let _persist = self.persist.lock().await;
        self.store.save(&user, &token).await?;
        tracing::info!(user_id = user.id, "signed in");
        self.state.send_modify(|s| s.sign_in(user.clone()));
        Ok(user)
    }

    /// End the session.
    ///
    /// The remote logout is best effort. Local credentials are cleared and the
    /// session reset whatever the backend says.
    ///
    /// # Errors
    ///
    /// Returns a store error if the persisted record could not be deleted.
    /// The in-memory session is reset before the error is returned.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let _loading = self.hold_loading();

        let token = self.store.token().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read token for remote logout");
            None
        });
        if let Err(e) = self.api.logout(token.as_deref()).await {
            tracing::warn!(error = %e, "remote logout failed; clearing local session anyway");
        }

        let _persist = self.persist.lock().await;
        let cleared = self.store.clear().await;
        self.state.send_modify(Session::sign_out);
        tracing::info!("signed out");
        cleared.map_err(SessionError::from)
    }

    async fn logout_logged(&self) {
        if let Err(e) = self.logout().await {
            tracing::error!(error = %e, "failed to clear stored credentials");
        }
    }

    /// Re-fetch the signed-in user and persist it with the existing token.
    ///
    /// No-op when signed out. Failures are logged and leave the session as
    /// it was.
    pub async fn refresh_user(&self) {
        let Some(user_id) = self.current_user_id() else {
            return;
        };

        let fresh = match self.api.fetch_user(user_id).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "failed to refresh user");
                return;
            }
        };

        let _persist = self.persist.lock().await;
        let token = match self.store.token().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "failed to read stored token");
                None
            }
        };

        let replaced = self.state.send_if_modified(|s| {
            if s.is_authenticated && s.user.as_ref().map(|u| u.id) == Some(user_id) {
                s.user = Some(fresh.clone());
                true
            } else {
                false
            }
        });
        if !replaced {
            tracing::debug!(user_id, "session changed during refresh; discarding result");
            return;
        }

        match token {
            Some(token) => {
                if let Err(e) = self.store.save(&fresh, &token).await {
                    tracing::warn!(user_id, error = %e, "failed to persist refreshed user");
                }
            }
            None => tracing::warn!(user_id, "no stored token; refreshed user kept in memory only"),
        }
    }
}
