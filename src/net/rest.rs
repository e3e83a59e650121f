//! Shared JSON-over-HTTP transport for the SmartDT backend.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures, non-success statuses and undecodable bodies map to
//! distinct [`ApiError`] variants so callers can tell "backend said no" from
//! "backend unreachable".

#[cfg(test)]
#[path = "rest_test.rs"]
mod rest_test;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::types::ApiError;
use crate::config::ClientConfig;

const USER_AGENT: &str = concat!("smartdt/", env!("CARGO_PKG_VERSION"));

/// Cheap-to-clone handle on a configured `reqwest::Client` and base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    /// Build a client honoring the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ClientBuild`] if the TLS backend fails to initialize.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ApiError::ClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: config.base_url.clone() })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        endpoint(&self.base_url, path)
    }

    /// `GET path` and decode the body as `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        tracing::debug!(%path, "GET");
        let text = send(self.http.get(self.url(path))).await?;
        decode(&text)
    }

    /// `POST path` with a JSON body and decode the response as `T`.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        tracing::debug!(%path, "POST");
        let text = send(self.http.post(self.url(path)).json(body)).await?;
        decode(&text)
    }

    /// `POST path` without a body, ignoring whatever comes back.
    pub async fn post_empty(&self, path: &str, bearer: Option<&str>) -> Result<(), ApiError> {
        tracing::debug!(%path, "POST");
        let request = self.http.post(self.url(path));
        let request = match bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        send(request).await.map(|_| ())
    }

    /// `GET path` with a bearer token, returning only whether it succeeded.
    pub async fn get_with_bearer(&self, path: &str, token: &str) -> Result<(), ApiError> {
        tracing::debug!(%path, "GET");
        send(self.http.get(self.url(path)).bearer_auth(token)).await.map(|_| ())
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

async fn send(request: reqwest::RequestBuilder) -> Result<String, ApiError> {
    let response = request.send().await.map_err(|e| ApiError::Request(e.to_string()))?;
    let status = response.status();
    let text = response.text().await.map_err(|e| ApiError::Request(e.to_string()))?;
    if !status.is_success() {
        tracing::debug!(status = status.as_u16(), "non-success response");
        return Err(ApiError::Status { status: status.as_u16(), body: text });
    }
    Ok(text)
}

pub(crate) fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    serde_json::from_str(text).map_err(|e| ApiError::Decode(e.to_string()))
}
