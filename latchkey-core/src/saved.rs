//! The persisted sign-in record and its store.
//!
//! [`SavedCredential`] keeps the provider token as an archived byte blob so
//! the record's own encoding never depends on the token's shape.
//! [`SavedCredentialStore`] reads and writes the record through a
//! [`SecretStore`]; a missing or unreadable record loads as `None`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::provider::ProviderToken;
use crate::store::{SecretStore, StoreError};

/// Current version of the token archive envelope.
const TOKEN_ARCHIVE_VERSION: u32 = 1;

#[derive(Serialize)]
struct TokenArchiveRef<'a> {
    version: u32,
    token: &'a ProviderToken,
}

#[derive(Deserialize)]
struct TokenArchive {
    version: u32,
    token: ProviderToken,
}

/// Archive a provider token to bytes.
pub fn archive_token(token: &ProviderToken) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&TokenArchiveRef {
        version: TOKEN_ARCHIVE_VERSION,
        token,
    })
}

/// Decode an archive produced by [`archive_token`].
///
/// Returns `None` (and logs) for corrupt or incompatible archives.
pub fn unarchive_token(data: &[u8]) -> Option<ProviderToken> {
    match serde_json::from_slice::<TokenArchive>(data) {
        Ok(archive) if archive.version == TOKEN_ARCHIVE_VERSION => Some(archive.token),
        Ok(archive) => {
            tracing::error!(
                "Unsupported token archive version {} (expected {})",
                archive.version,
                TOKEN_ARCHIVE_VERSION
            );
            None
        }
        Err(e) => {
            tracing::error!("Failed to decode archived access token: {}", e);
            None
        }
    }
}

/// The persisted sign-in record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedCredential {
    /// Provider-assigned user id.
    pub user_id: String,

    /// Display name, if the provider supplied one.
    pub username: Option<String>,

    /// Archived [`ProviderToken`]; see [`archive_token`].
    access_token: Vec<u8>,
}

impl SavedCredential {
    /// Create a record, archiving `token`.
    pub fn new(
        user_id: impl Into<String>,
        username: Option<String>,
        token: &ProviderToken,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            user_id: user_id.into(),
            username,
            access_token: archive_token(token)?,
        })
    }

    /// Build a record around an already archived token.
    pub fn from_archive(
        user_id: impl Into<String>,
        username: Option<String>,
        access_token: Vec<u8>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            username,
            access_token,
        }
    }

    /// Decode the stored token; `None` if the archive is unreadable.
    pub fn access_token(&self) -> Option<ProviderToken> {
        unarchive_token(&self.access_token)
    }

    /// The same user and name with a new token.
    pub fn with_token(&self, token: &ProviderToken) -> Result<Self, serde_json::Error> {
        Self::new(self.user_id.clone(), self.username.clone(), token)
    }
}

impl PartialEq for SavedCredential {
    fn eq(&self, other: &Self) -> bool {
        self.user_id == other.user_id
            && self.username == other.username
            && self.access_token() == other.access_token()
    }
}

/// Persists a single [`SavedCredential`] under one storage key.
#[derive(Clone)]
pub struct SavedCredentialStore {
    store: Arc<dyn SecretStore>,
    key: String,
}

impl SavedCredentialStore {
    pub fn new(store: Arc<dyn SecretStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persist `record`, or clear the stored record when `None`.
    pub async fn save(&self, record: Option<&SavedCredential>) -> Result<(), StoreError> {
        match record {
            Some(record) => {
                let bytes = serde_json::to_vec(record)?;
                self.store.set(&self.key, &bytes).await?;
                tracing::debug!("Saved credentials for user {}", record.user_id);
            }
            None => {
                self.store.delete(&self.key).await?;
                tracing::debug!("Cleared saved credentials");
            }
        }
        Ok(())
    }

    /// Load the last saved record.
    ///
    /// Absence, backend failures and undecodable data all yield `None`.
    pub async fn load(&self) -> Option<SavedCredential> {
        let bytes = match self.store.get(&self.key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!("No saved credentials at {}", self.key);
                return None;
            }
            Err(e) => {
                tracing::warn!("Could not read saved credentials: {}", e);
                return None;
            }
        };

        match serde_json::from_slice::<SavedCredential>(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Discarding corrupt saved credentials: {}", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for SavedCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavedCredentialStore")
            .field("key", &self.key)
            .finish()
    }
}
