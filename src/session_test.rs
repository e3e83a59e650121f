use super::*;
use crate::net::auth::test_helpers::{MockAuth, Validation, sample_user};
use crate::store::{MemoryStore, TOKEN_KEY, USER_KEY};

fn manager(api: MockAuth) -> (SessionManager<MockAuth, MemoryStore>, MemoryStore) {
    let memory = MemoryStore::new();
    (SessionManager::new(api, memory.clone()), memory)
}

fn credentials() -> Credentials {
    Credentials::new("a@b.com", "x")
}

fn registration() -> RegistrationData {
    RegistrationData {
        first_name: "Alice".into(),
        last_name: "Martin".into(),
        email: "a@b.com".into(),
        password: "pw".into(),
        date_of_birth: Some("1990-04-01".into()),
    }
}

async fn persist(memory: &MemoryStore, user: &User, token: &str) {
    CredentialStore::new(memory.clone()).save(user, token).await.unwrap();
}

fn stored_user(memory: &MemoryStore) -> Option<User> {
    memory.peek(USER_KEY).map(|json| serde_json::from_str(&json).unwrap())
}

/// Store whose deletes always fail.
#[derive(Clone, Default)]
struct UndeletableStore {
    inner: MemoryStore,
}

#[async_trait::async_trait]
impl SecretStore for UndeletableStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set(key, value).await
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("read-only keychain".into()))
    }
}

/// Store that yields to the scheduler around every access, so overlapping
/// operations interleave at each store call.
#[derive(Clone, Default)]
struct YieldingStore {
    inner: MemoryStore,
}

#[async_trait::async_trait]
impl SecretStore for YieldingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self.inner.get(key).await;
        tokio::task::yield_now().await;
        value
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        self.inner.delete(key).await
    }
}

// =============================================================================
// Session / phase
// =============================================================================

#[test]
fn new_session_is_uninitialized() {
    let session = Session::default();
    assert_eq!(session.phase(), SessionPhase::Uninitialized);
    assert!(session.user.is_none());
}

#[test]
fn phase_prefers_loading() {
    let session = Session { is_loading: true, ..Session::authenticated(sample_user(1)) };
    assert_eq!(session.phase(), SessionPhase::Loading);
}

#[test]
fn phase_authenticated_and_unauthenticated() {
    assert_eq!(Session::authenticated(sample_user(1)).phase(), SessionPhase::Authenticated);
    assert_eq!(Session::unauthenticated().phase(), SessionPhase::Unauthenticated);
}

#[test]
fn manager_starts_uninitialized() {
    let (manager, _) = manager(MockAuth::new(sample_user(1), "T"));
    assert_eq!(manager.snapshot().phase(), SessionPhase::Uninitialized);
}

// =============================================================================
// restore
// =============================================================================

#[tokio::test]
async fn restore_without_record_is_signed_out() {
    let (manager, _) = manager(MockAuth::new(sample_user(1), "T"));
    manager.restore().await;

    assert_eq!(manager.snapshot(), Session::unauthenticated());
    assert!(manager.api().calls().is_empty());
}

#[tokio::test]
async fn restore_without_record_is_idempotent() {
    let (manager, _) = manager(MockAuth::new(sample_user(1), "T"));
    manager.restore().await;
    manager.restore().await;

    let session = manager.snapshot();
    assert!(session.user.is_none());
    assert!(!session.is_authenticated);
    assert!(!session.is_loading);
}

#[tokio::test]
async fn restore_with_valid_token_signs_in() {
    let (manager, memory) = manager(MockAuth::new(sample_user(1), "T"));
    persist(&memory, &sample_user(1), "T").await;

    manager.restore().await;

    assert_eq!(manager.snapshot(), Session::authenticated(sample_user(1)));
    assert_eq!(manager.api().calls(), vec!["validate_token"]);
}

#[tokio::test]
async fn restore_with_expired_token_forces_logout() {
    let api = MockAuth { validation: Validation::Rejected, ..MockAuth::new(sample_user(1), "T") };
    let (manager, memory) = manager(api);
    persist(&memory, &sample_user(1), "expired").await;

    manager.restore().await;

    let session = manager.snapshot();
    assert!(session.user.is_none());
    assert!(!session.is_authenticated);
    assert!(!session.is_loading);
    assert!(memory.is_empty());
    assert_eq!(manager.api().calls(), vec!["validate_token", "logout"]);
}

#[tokio::test]
async fn restore_when_validation_unreachable_forces_logout() {
    let api = MockAuth { validation: Validation::Unreachable, ..MockAuth::new(sample_user(1), "T") };
    let (manager, memory) = manager(api);
    persist(&memory, &sample_user(1), "T").await;

    manager.restore().await;

    assert_eq!(manager.snapshot(), Session::unauthenticated());
    assert!(memory.is_empty());
}

#[tokio::test]
async fn restore_discards_half_written_record() {
    let (manager, memory) = manager(MockAuth::new(sample_user(1), "T"));
    memory.set(TOKEN_KEY, "T").await.unwrap();

    manager.restore().await;

    assert_eq!(manager.snapshot(), Session::unauthenticated());
    assert!(memory.is_empty());
    assert!(manager.api().calls().is_empty());
}

#[tokio::test]
async fn init_restores() {
    let memory = MemoryStore::new();
    persist(&memory, &sample_user(1), "T").await;
    let manager = SessionManager::init(MockAuth::new(sample_user(1), "T"), memory).await;
    assert!(manager.snapshot().is_authenticated);
}

// =============================================================================
// login
// =============================================================================

#[tokio::test]
async fn login_persists_record_and_signs_in() {
    let (manager, memory) = manager(MockAuth::new(sample_user(1), "T"));

    let user = manager.login(&credentials()).await.unwrap();

    assert_eq!(user.id, 1);
    assert_eq!(manager.snapshot(), Session::authenticated(sample_user(1)));
    assert_eq!(stored_user(&memory), Some(sample_user(1)));
    assert_eq!(memory.peek(TOKEN_KEY).as_deref(), Some("T"));
}

#[tokio::test]
async fn login_then_restore_reproduces_user() {
    let (manager, memory) = manager(MockAuth::new(sample_user(1), "T"));
    manager.login(&credentials()).await.unwrap();
    manager.dispose();

    let restarted = SessionManager::new(MockAuth::new(sample_user(99), "other"), memory);
    restarted.restore().await;

    assert_eq!(restarted.snapshot().user, Some(sample_user(1)));
    assert!(restarted.snapshot().is_authenticated);
}

#[tokio::test]
async fn login_rejected_stays_signed_out() {
    let api = MockAuth { fail_login: true, ..MockAuth::new(sample_user(1), "T") };
    let (manager, memory) = manager(api);
    manager.restore().await;

    let err = manager.login(&credentials()).await.unwrap_err();

    assert!(err.is_rejected_credentials());
    assert_eq!(manager.snapshot(), Session::unauthenticated());
    assert!(memory.is_empty());
}

#[tokio::test]
async fn login_clears_loading_on_success_and_failure() {
    let (ok, _) = manager(MockAuth::new(sample_user(1), "T"));
    ok.login(&credentials()).await.unwrap();
    assert!(!ok.snapshot().is_loading);

    let (failing, _) = manager(MockAuth { fail_login: true, ..MockAuth::new(sample_user(1), "T") });
    failing.login(&credentials()).await.unwrap_err();
    assert!(!failing.snapshot().is_loading);
}

#[tokio::test]
async fn login_notifies_subscribers() {
    let (manager, _) = manager(MockAuth::new(sample_user(1), "T"));
    let mut rx = manager.subscribe();

    manager.login(&credentials()).await.unwrap();

    assert!(rx.has_changed().unwrap());
    let session = rx.borrow_and_update().clone();
    assert_eq!(session, Session::authenticated(sample_user(1)));
}

#[tokio::test]
async fn login_reports_loading_while_in_flight() {
    let manager = SessionManager::new(MockAuth::new(sample_user(1), "T"), YieldingStore::default());
    let mut rx = manager.subscribe();

    let creds = credentials();
    let (result, mid_flight) = tokio::join!(manager.login(&creds), async {
        rx.changed().await.unwrap();
        rx.borrow_and_update().clone()
    });

    result.unwrap();
    assert_eq!(mid_flight.phase(), SessionPhase::Loading);
    assert!(mid_flight.user.is_none());
    assert_eq!(manager.snapshot().phase(), SessionPhase::Authenticated);
}

// =============================================================================
// register
// =============================================================================

#[tokio::test]
async fn register_signs_in_and_persists() {
    let (manager, memory) = manager(MockAuth::new(sample_user(42), "T"));

    let user = manager.register(&registration()).await.unwrap();

    assert_eq!(user.id, 42);
    assert_eq!(user.accounts.len(), 1);
    let session = manager.snapshot();
    assert!(session.is_authenticated);
    assert!(!session.is_loading);
    assert_eq!(stored_user(&memory), Some(user));
    assert_eq!(memory.peek(TOKEN_KEY).as_deref(), Some("T"));
}

#[tokio::test]
async fn register_account_failure_persists_nothing() {
    let api = MockAuth { fail_create_account: true, ..MockAuth::new(sample_user(42), "T") };
    let (manager, memory) = manager(api);
    manager.restore().await;

    let err = manager.register(&registration()).await.unwrap_err();

    assert!(matches!(err, SessionError::Api(ApiError::Request(_))));
    assert_eq!(manager.api().calls(), vec!["create_user", "create_account"]);
    assert_eq!(manager.snapshot(), Session::unauthenticated());
    assert!(memory.is_empty());
}

#[tokio::test]
async fn register_user_failure_clears_loading() {
    let api = MockAuth { fail_create_user: true, ..MockAuth::new(sample_user(42), "T") };
    let (manager, _) = manager(api);

    manager.register(&registration()).await.unwrap_err();

    assert!(!manager.snapshot().is_loading);
    assert!(!manager.snapshot().is_authenticated);
}

// =============================================================================
// logout
// =============================================================================

#[tokio::test]
async fn logout_clears_store_and_session() {
    let (manager, memory) = manager(MockAuth::new(sample_user(1), "T"));
    manager.login(&credentials()).await.unwrap();

    manager.logout().await.unwrap();

    assert_eq!(manager.snapshot(), Session::unauthenticated());
    assert!(memory.is_empty());
    assert_eq!(*manager.api().logout_tokens.lock().unwrap(), vec![Some("T".to_owned())]);
}

#[tokio::test]
async fn logout_clears_local_state_when_remote_fails() {
    let api = MockAuth { fail_logout: true, ..MockAuth::new(sample_user(1), "T") };
    let (manager, memory) = manager(api);
    manager.login(&credentials()).await.unwrap();

    manager.logout().await.unwrap();

    let session = manager.snapshot();
    assert!(session.user.is_none());
    assert!(!session.is_authenticated);
    assert!(!session.is_loading);
    assert!(memory.is_empty());
}

#[tokio::test]
async fn logout_resets_session_even_if_store_clear_fails() {
    let store = UndeletableStore::default();
    let manager = SessionManager::new(MockAuth::new(sample_user(1), "T"), store);
    manager.login(&credentials()).await.unwrap();

    let err = manager.logout().await.unwrap_err();

    assert!(matches!(err, SessionError::Store(_)));
    assert_eq!(manager.snapshot(), Session::unauthenticated());
}

// =============================================================================
// refresh_user
// =============================================================================

#[tokio::test]
async fn refresh_without_user_is_noop() {
    let (manager, _) = manager(MockAuth::new(sample_user(1), "T"));
    manager.refresh_user().await;
    assert!(manager.api().calls().is_empty());
}

#[tokio::test]
async fn refresh_replaces_user_and_keeps_token() {
    let mut fresh = sample_user(1);
    fresh.first_name = "Alicia".into();
    let api = MockAuth { fetched_user: Some(fresh.clone()), ..MockAuth::new(sample_user(1), "T") };
    let (manager, memory) = manager(api);
    manager.login(&credentials()).await.unwrap();

    manager.refresh_user().await;

    assert_eq!(manager.snapshot().user, Some(fresh.clone()));
    assert_eq!(stored_user(&memory), Some(fresh));
    assert_eq!(memory.peek(TOKEN_KEY).as_deref(), Some("T"));
}

#[tokio::test]
async fn refresh_failure_keeps_existing_session() {
    let (manager, memory) = manager(MockAuth::new(sample_user(1), "T"));
    manager.login(&credentials()).await.unwrap();

    manager.refresh_user().await;

    assert_eq!(manager.snapshot(), Session::authenticated(sample_user(1)));
    assert_eq!(stored_user(&memory), Some(sample_user(1)));
}

#[tokio::test]
async fn refresh_does_not_persist_without_token() {
    let mut fresh = sample_user(1);
    fresh.last_name = "Durand".into();
    let api = MockAuth { fetched_user: Some(fresh.clone()), ..MockAuth::new(sample_user(1), "T") };
    let (manager, memory) = manager(api);
    manager.login(&credentials()).await.unwrap();
    memory.delete(TOKEN_KEY).await.unwrap();

    manager.refresh_user().await;

    assert_eq!(manager.snapshot().user, Some(fresh));
    assert!(memory.peek(TOKEN_KEY).is_none());
    assert_eq!(stored_user(&memory), Some(sample_user(1)));
}

#[tokio::test]
async fn logout_during_refresh_leaves_store_empty() {
    let mut fresh = sample_user(1);
    fresh.first_name = "Alicia".into();
    let api = MockAuth { fetched_user: Some(fresh), ..MockAuth::new(sample_user(1), "T") };
    let store = YieldingStore::default();
    let memory = store.inner.clone();
    let manager = SessionManager::new(api, store);
    manager.login(&credentials()).await.unwrap();

    let ((), logout) = tokio::join!(manager.refresh_user(), manager.logout());

    logout.unwrap();
    assert_eq!(manager.snapshot(), Session::unauthenticated());
    assert!(memory.is_empty());
    manager.restore().await;
    assert!(!manager.snapshot().is_authenticated);
}

#[tokio::test]
async fn refresh_started_after_logout_writes_nothing() {
    let api = MockAuth { fetched_user: Some(sample_user(1)), ..MockAuth::new(sample_user(1), "T") };
    let store = YieldingStore::default();
    let memory = store.inner.clone();
    let manager = SessionManager::new(api, store);
    manager.login(&credentials()).await.unwrap();

    let (logout, ()) = tokio::join!(manager.logout(), manager.refresh_user());

    logout.unwrap();
    assert_eq!(manager.snapshot(), Session::unauthenticated());
    assert!(memory.is_empty());
}

// =============================================================================
// loading guard
// =============================================================================

#[test]
fn overlapping_guards_release_on_last_drop() {
    let state = watch::Sender::new(Session::default());
    let in_flight = AtomicUsize::new(0);

    let outer = LoadingGuard::hold(&state, &in_flight);
    let inner = LoadingGuard::hold(&state, &in_flight);
    drop(inner);
    assert!(state.borrow().is_loading);
    drop(outer);
    assert!(!state.borrow().is_loading);
}

#[tokio::test]
async fn dispose_closes_subscriptions() {
    let (manager, _) = manager(MockAuth::new(sample_user(1), "T"));
    let mut rx = manager.subscribe();
    manager.dispose();
    assert!(rx.changed().await.is_err());
}
