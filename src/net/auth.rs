//! Remote auth service seam.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session manager only talks to the backend through [`AuthApi`], so
//! tests can drive every session transition with an in-memory double.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use super::types::{Account, ApiError, Credentials, LoginResponse, NewAccount, NewUser, RegistrationData, User};

/// Stateless authentication calls against the backend.
#[async_trait::async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /accounts/Login`.
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError>;

    /// `POST /Users`.
    async fn create_user(&self, user: &NewUser<'_>) -> Result<User, ApiError>;

    /// `POST /Accounts`.
    async fn create_account(&self, account: &NewAccount<'_>) -> Result<Account, ApiError>;

    /// `POST /accounts/Logout`.
    async fn logout(&self, token: Option<&str>) -> Result<(), ApiError>;

    /// `GET /accounts/validate`.
    ///
    /// `Ok(false)` means the backend rejected the token. `Err` means the
    /// check itself could not be completed.
    async fn validate_token(&self, token: &str) -> Result<bool, ApiError>;

    /// `GET /Users/{id}`.
    async fn fetch_user(&self, user_id: i64) -> Result<User, ApiError>;
}

/// Create a user, then its login account, and return the merged identity
/// plus a bearer token.
///
/// The two creates are not transactional. If the account step fails the
/// freshly created user is left behind on the server; the orphaned id is
/// logged so it can be cleaned up out of band. When the account response
/// carries no token, a regular login with the new credentials provides one.
///
/// # Errors
///
/// Returns the first [`ApiError`] raised by any of the steps.
pub async fn register<A>(api: &A, data: &RegistrationData) -> Result<LoginResponse, ApiError>
where
    A: AuthApi + ?Sized,
{
    let mut user = api.create_user(&NewUser::from(data)).await?;
    tracing::info!(user_id = user.id, "user created");

    let new_account = NewAccount { login: &data.email, password: &data.password, user_id: user.id };
    let mut account = match api.create_account(&new_account).await {
        Ok(account) => account,
        Err(e) => {
            tracing::warn!(orphaned_user_id = user.id, error = %e, "account creation failed after user was created");
            return Err(e);
        }
    };

    let token = match account.token.take() {
        Some(token) => token,
        None => {
            let credentials = Credentials::new(data.email.clone(), data.password.clone());
            api.login(&credentials).await?.token
        }
    };

    merge_account(&mut user, account);
    Ok(LoginResponse { user, token })
}

/// Attach a freshly created account to its user unless the server already
/// returned it embedded.
fn merge_account(user: &mut User, account: Account) {
    let already_present = account.id.is_some() && user.accounts.iter().any(|a| a.id == account.id);
    if !already_present {
        user.accounts.push(account);
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
