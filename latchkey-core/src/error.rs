//! Top-level error types for Latchkey.

use thiserror::Error;

use crate::config::ConfigError;
use crate::credentials::CredentialsError;
use crate::provider::ProviderError;
use crate::session::SessionError;
use crate::store::StoreError;

/// Top-level error type encompassing all Latchkey errors.
#[derive(Debug, Error)]
pub enum LatchkeyError {
    /// Error from secure storage operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from session transitions.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error from the generic credential contract.
    #[error("credentials error: {0}")]
    Credentials(#[from] CredentialsError),

    /// Error reported by the identity provider.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
