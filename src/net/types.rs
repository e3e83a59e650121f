//! Wire types shared by the auth and catalog clients.
//!
//! Field names follow the backend's camelCase JSON. Records are explicit:
//! a payload that does not fit its record is rejected as [`ApiError::Decode`]
//! instead of being carried around as untyped JSON.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use serde::{Deserialize, Serialize};

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by remote API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("API request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status.
    #[error("API response error: status {status}")]
    Status { status: u16, body: String },

    /// The response body did not match the expected record.
    #[error("API response decode failed: {0}")]
    Decode(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    ClientBuild(String),
}

impl ApiError {
    /// True when the backend rejected the caller's credentials or token.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

// =============================================================================
// IDENTITY RECORDS
// =============================================================================

/// A login account attached to a user. Passwords are write-only and never
/// deserialized into this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default)]
    pub id: Option<i64>,
    pub login: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// A postal address attached to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// The authenticated identity. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    /// The backend spells this `adresses`; both spellings are accepted.
    #[serde(default, alias = "adresses")]
    pub addresses: Vec<Address>,
}

// =============================================================================
// REQUEST / RESPONSE BODIES
// =============================================================================

/// Login credential pair for `POST /accounts/Login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self { login: login.into(), password: password.into() }
    }
}

/// Everything needed to create a user and its login account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub date_of_birth: Option<String>,
}

/// Body of `POST /accounts/Login`'s response.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

/// Body of `POST /Users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<&'a str>,
}

impl<'a> From<&'a RegistrationData> for NewUser<'a> {
    fn from(data: &'a RegistrationData) -> Self {
        Self {
            first_name: &data.first_name,
            last_name: &data.last_name,
            email: &data.email,
            date_of_birth: data.date_of_birth.as_deref(),
        }
    }
}

/// Body of `POST /Accounts`. The login is always the user's email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount<'a> {
    pub login: &'a str,
    pub password: &'a str,
    pub user_id: i64,
}
