//! The host's generic credential contract and this provider's implementation.
//!
//! The host's networking layer only ever sees [`GenericCredentials`]; it
//! never learns which identity provider produced them.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Weak;
use thiserror::Error;

use crate::saved::SavedCredential;
use crate::session::{SessionController, SessionError};

/// Request header naming the kind of token carried by the request.
pub const TOKEN_TYPE_HEADER: &str = "X-token-type";

/// Request header carrying the bearer token string.
pub const ACCESS_TOKEN_HEADER: &str = "access_token";

/// Cloud storage backends a sign-in can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudStorageType {
    Dropbox,
    Google,
}

/// Error type for credential operations.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// This credential cannot be refreshed outside its provider session.
    #[error("no refresh available for these credentials")]
    NoRefreshAvailable,

    /// The provider session failed to refresh.
    #[error("refresh failed: {0}")]
    Session(#[from] SessionError),
}

/// Credential contract consumed by the host's networking layer.
#[async_trait]
pub trait GenericCredentials: Send + Sync {
    fn user_id(&self) -> String;

    fn username(&self) -> Option<String>;

    fn display_name(&self) -> Option<String>;

    /// Headers that authenticate a request to the host's server.
    fn auth_headers(&self) -> HashMap<String, String>;

    /// Storage this sign-in owns, if any.
    fn cloud_storage_type(&self) -> Option<CloudStorageType>;

    /// Obtain fresh credentials from the provider.
    async fn refresh_credentials(&self) -> Result<(), CredentialsError>;
}

/// [`GenericCredentials`] backed by a [`SavedCredential`].
///
/// A successful [`refresh_credentials`](GenericCredentials::refresh_credentials)
/// replaces the record, so the same handle carries the refreshed token.
pub struct ProviderCredentials {
    record: RwLock<SavedCredential>,
    token_type: String,
    session: Weak<SessionController>,
}

impl ProviderCredentials {
    pub(crate) fn new(
        record: SavedCredential,
        token_type: impl Into<String>,
        session: Weak<SessionController>,
    ) -> Self {
        Self {
            record: RwLock::new(record),
            token_type: token_type.into(),
            session,
        }
    }

    /// The record these credentials are currently derived from.
    pub fn record(&self) -> SavedCredential {
        self.record.read().clone()
    }
}

impl Clone for ProviderCredentials {
    fn clone(&self) -> Self {
        Self::new(self.record(), self.token_type.clone(), self.session.clone())
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let record = self.record.read();
        f.debug_struct("ProviderCredentials")
            .field("user_id", &record.user_id)
            .field("username", &record.username)
            .field("token_type", &self.token_type)
            .finish()
    }
}

#[async_trait]
impl GenericCredentials for ProviderCredentials {
    fn user_id(&self) -> String {
        let record = self.record.read();
        if record.user_id.is_empty() {
            tracing::error!("Saved credentials carry no user id");
        }
        record.user_id.clone()
    }

    fn username(&self) -> Option<String> {
        self.record.read().username.clone()
    }

    fn display_name(&self) -> Option<String> {
        self.record.read().username.clone()
    }

    fn auth_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(TOKEN_TYPE_HEADER.to_string(), self.token_type.clone());
        if let Some(token) = self.record.read().access_token() {
            headers.insert(
                ACCESS_TOKEN_HEADER.to_string(),
                token.token_string.expose().to_string(),
            );
        }
        headers
    }

    fn cloud_storage_type(&self) -> Option<CloudStorageType> {
        None
    }

    async fn refresh_credentials(&self) -> Result<(), CredentialsError> {
        let session = self
            .session
            .upgrade()
            .ok_or(CredentialsError::NoRefreshAvailable)?;
        session.refresh().await?;

        if let Some(record) = session.saved_credential().await {
            *self.record.write() = record;
        }
        Ok(())
    }
}
