//! Identity provider boundary.
//!
//! This module provides:
//! - [`IdentityProvider`] - The capabilities the session needs from a provider SDK
//! - [`ProviderToken`] - The provider's access token as an owned value type
//! - [`Profile`] - The signed-in user's provider profile
//! - [`LoginOutcome`] - Result of an interactive login
//! - [`GraphRequest`] - A graph-style API request (profile fetch, grant revocation)
//! - [`ProviderError`] - Opaque provider failure with a transient/authoritative triage
//!
//! Nothing outside this module depends on a concrete SDK type, so another
//! provider can sit behind the same session and credential contracts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::store::Secret;

/// Coarse classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Connectivity problem; the user may simply be offline.
    Network,

    /// The provider rejected the grant (expired, revoked, invalid token).
    Auth,

    /// Anything else the provider reported.
    Other,
}

/// Error reported by the identity provider.
#[derive(Debug, Clone, Error)]
#[error("{kind:?} provider error: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Auth, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Other, message)
    }

    /// Whether the failure says nothing about the grant itself.
    ///
    /// Only [`ProviderErrorKind::Auth`] is authoritative.
    pub fn is_transient(&self) -> bool {
        self.kind != ProviderErrorKind::Auth
    }
}

/// The provider's access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderToken {
    /// The bearer token string.
    pub token_string: Secret,

    /// Provider user id the token was issued to.
    pub user_id: String,

    /// Provider application id the token was issued for.
    #[serde(default)]
    pub app_id: Option<String>,

    /// Permissions granted with this token.
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Permissions the user declined.
    #[serde(default)]
    pub declined_permissions: Vec<String>,

    /// When this token expires (None if unknown).
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// When the provider last refreshed this token.
    pub refreshed_at: DateTime<Utc>,
}

impl ProviderToken {
    /// Create a token for `user_id`, refreshed now, with no expiry.
    pub fn new(token_string: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token_string: Secret::new(token_string),
            user_id: user_id.into(),
            app_id: None,
            permissions: Vec::new(),
            declined_permissions: Vec::new(),
            expires_at: None,
            refreshed_at: Utc::now(),
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Returns `false` if no expiration is set.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| exp < Utc::now()).unwrap_or(false)
    }
}

/// A provider user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub name: Option<String>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn new(user_id: impl Into<String>, name: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name,
            refreshed_at: Some(Utc::now()),
        }
    }
}

/// Outcome of an interactive provider login.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    /// The provider reported an error.
    Failed(ProviderError),

    /// The user backed out of the login flow.
    Cancelled,

    /// The user logged in; the provider now holds a current token.
    Success {
        granted: Vec<String>,
        declined: Vec<String>,
    },
}

/// HTTP method of a graph request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// A graph-style API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRequest {
    /// Path relative to the versioned graph root, e.g. `me`.
    pub path: String,

    /// Query or form parameters.
    pub params: BTreeMap<String, String>,

    pub method: HttpMethod,

    /// Token to authenticate with; `None` uses the provider's current token.
    pub token: Option<Secret>,
}

impl GraphRequest {
    pub fn new(path: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            path: path.into(),
            params: BTreeMap::new(),
            method,
            token: None,
        }
    }

    /// `GET me?fields=...`: the signed-in user's profile.
    pub fn me(fields: &[String]) -> Self {
        Self::new("me", HttpMethod::Get).with_param("fields", fields.join(","))
    }

    /// `DELETE me/permissions`: revoke every permission granted to the app.
    pub fn revoke_permissions(token: Option<Secret>) -> Self {
        let mut request = Self::new("me/permissions", HttpMethod::Delete);
        request.token = token;
        request
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Capabilities the session needs from the identity provider SDK.
///
/// Implementations may complete their futures on any runtime thread; the
/// session controller sequences every resulting state change itself.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Tag identifying this provider's tokens to the host's server,
    /// e.g. `FacebookToken`.
    fn auth_token_type(&self) -> &str;

    /// The SDK's current access token, if any.
    fn current_token(&self) -> Option<ProviderToken>;

    /// The SDK's current profile, if loaded.
    fn current_profile(&self) -> Option<Profile>;

    /// Ask the provider to refresh its current token.
    async fn refresh_current_token(&self) -> Result<(), ProviderError>;

    /// Run the provider's interactive login.
    async fn login(&self, permissions: &[String]) -> LoginOutcome;

    /// Drop the SDK's current token and profile.
    fn logout(&self);

    /// Perform a graph-style request and return the decoded JSON body.
    async fn request(&self, request: GraphRequest) -> Result<serde_json::Value, ProviderError>;
}
