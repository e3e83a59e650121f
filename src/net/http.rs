//! [`AuthApi`] over the SmartDT REST endpoints.

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;

use super::auth::AuthApi;
use super::rest::RestClient;
use super::types::{Account, ApiError, Credentials, LoginResponse, NewAccount, NewUser, User};
use crate::config::ClientConfig;

const LOGIN_PATH: &str = "/accounts/Login";
const LOGOUT_PATH: &str = "/accounts/Logout";
const VALIDATE_PATH: &str = "/accounts/validate";
const USERS_PATH: &str = "/Users";
const ACCOUNTS_PATH: &str = "/Accounts";

fn user_endpoint(user_id: i64) -> String {
    format!("{USERS_PATH}/{user_id}")
}

#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    rest: RestClient,
}

impl HttpAuthApi {
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        Ok(Self { rest: RestClient::new(config)? })
    }

    /// Reuse an existing transport, e.g. one shared with catalog clients.
    #[must_use]
    pub fn from_rest(rest: RestClient) -> Self {
        Self { rest }
    }
}

#[async_trait::async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError> {
        self.rest.post_json(LOGIN_PATH, credentials).await
    }

    async fn create_user(&self, user: &NewUser<'_>) -> Result<User, ApiError> {
        self.rest.post_json(USERS_PATH, user).await
    }

    async fn create_account(&self, account: &NewAccount<'_>) -> Result<Account, ApiError> {
        self.rest.post_json(ACCOUNTS_PATH, account).await
    }

    async fn logout(&self, token: Option<&str>) -> Result<(), ApiError> {
        self.rest.post_empty(LOGOUT_PATH, token).await
    }

    async fn validate_token(&self, token: &str) -> Result<bool, ApiError> {
        match self.rest.get_with_bearer(VALIDATE_PATH, token).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_unauthorized() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn fetch_user(&self, user_id: i64) -> Result<User, ApiError> {
        self.rest.get_json(&user_endpoint(user_id)).await
    }
}
