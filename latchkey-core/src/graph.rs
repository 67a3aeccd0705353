//! HTTP transport for graph-style provider requests.
//!
//! [`GraphClient`] turns a [`GraphRequest`] into
//! `{base_url}/{version}/{path}?{params}&access_token=...` and classifies
//! failures so the session can tell an offline device from a revoked grant:
//!
//! - connect and timeout failures are [`ProviderErrorKind::Network`]
//! - HTTP 401/403, or an `OAuthException` error body, are [`ProviderErrorKind::Auth`]
//! - everything else is [`ProviderErrorKind::Other`]
//!
//! Provider implementations delegate [`IdentityProvider::request`] here.
//!
//! [`IdentityProvider::request`]: crate::provider::IdentityProvider::request
//! [`ProviderErrorKind::Network`]: crate::provider::ProviderErrorKind::Network
//! [`ProviderErrorKind::Auth`]: crate::provider::ProviderErrorKind::Auth
//! [`ProviderErrorKind::Other`]: crate::provider::ProviderErrorKind::Other

use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::config::SessionConfig;
use crate::provider::{GraphRequest, HttpMethod, ProviderError};
use crate::store::Secret;

/// Graph API client.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: Url,
    version: Option<String>,
}

impl GraphClient {
    pub fn new(
        base_url: &str,
        version: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ProviderError::other(format!("invalid graph URL {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::other(format!(
                "graph URL {} cannot be a base",
                base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            version,
        })
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self, ProviderError> {
        Self::new(
            &config.graph_base_url,
            config.graph_version.clone(),
            config.request_timeout(),
        )
    }

    /// Absolute URL of a graph path, without query.
    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty();
            if let Some(version) = &self.version {
                segments.push(version);
            }
            segments.extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    /// Send `request`.
    ///
    /// The request's own token wins; otherwise `current_token` is used.
    /// Returns the decoded JSON body, or `Value::Null` for an empty one.
    pub async fn send(
        &self,
        request: &GraphRequest,
        current_token: Option<&Secret>,
    ) -> Result<Value, ProviderError> {
        let mut url = self.endpoint(&request.path);
        let token = request.token.as_ref().or(current_token);
        if !request.params.is_empty() || token.is_some() {
            let mut query = url.query_pairs_mut();
            for (key, value) in &request.params {
                query.append_pair(key, value);
            }
            if let Some(token) = token {
                query.append_pair("access_token", token.expose());
            }
        }

        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Delete => Method::DELETE,
        };

        tracing::debug!("Graph request {} {}", request.method, request.path);

        let response = self
            .http
            .request(method, url)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(classify_transport_error)?;

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| {
                ProviderError::other(format!("undecodable graph response: {}", e))
            });
        }

        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        Err(classify_status(status, &body))
    }
}

fn classify_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_connect() || e.is_timeout() {
        ProviderError::network(e.to_string())
    } else {
        ProviderError::other(e.to_string())
    }
}

fn classify_status(status: StatusCode, body: &Value) -> ProviderError {
    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("graph request failed with status {}", status));

    let oauth_exception =
        body.pointer("/error/type").and_then(Value::as_str) == Some("OAuthException");

    if oauth_exception || status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ProviderError::auth(message)
    } else {
        ProviderError::other(message)
    }
}
