//! SmartDT client library.
//!
//! ARCHITECTURE
//! ============
//! `net` speaks to the SmartDT REST backend, `store` persists the credential
//! record, `session` owns the authenticated identity and orchestrates both,
//! and `routing` turns session state into navigation redirects.

pub mod config;
pub mod net;
pub mod routing;
pub mod session;
pub mod store;

pub use config::{ClientConfig, StoreBackend};
pub use net::auth::AuthApi;
pub use net::http::HttpAuthApi;
pub use net::types::{Account, Address, ApiError, Credentials, RegistrationData, User};
pub use routing::{Navigator, Redirect, Route, RouteGroup, RouteGuard};
pub use session::{Session, SessionError, SessionManager, SessionPhase};
pub use store::{
    CredentialRecord, CredentialStore, FileStore, KeyringStore, MemoryStore, SecretStore, StoreError, StoreKey,
};
