//! # Latchkey Core
//!
//! Sign-in adapter for a third-party identity provider.
//!
//! This crate provides:
//! - A session state machine that restores, silently refreshes and signs out
//!   a provider sign-in ([`SessionController`])
//! - Secure persistence of the sign-in record across launches
//!   ([`SavedCredentialStore`] over a [`SecretStore`])
//! - The host's generic credential contract ([`GenericCredentials`]) so the
//!   rest of the host never needs provider-specific knowledge
//! - A graph-style HTTP transport for provider implementations ([`GraphClient`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use latchkey_core::{create_store, SavedCredentialStore, SessionConfig, SessionController};
//!
//! let config = SessionConfig::load()?;
//! let store = SavedCredentialStore::new(
//!     create_store(&config.keyring_service, config.prefer_keyring),
//!     config.storage_key.clone(),
//! );
//! let session = SessionController::new(provider, store, config);
//!
//! session.app_launch_setup(user_was_signed_in).await.ok();
//! if let Some(credentials) = session.credentials().await {
//!     let headers = credentials.auth_headers();
//! }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod graph;
pub mod provider;
pub mod saved;
pub mod session;
pub mod store;
pub mod trigger;

pub use config::{ConfigError, SessionConfig};

pub use credentials::{
    CloudStorageType,
    CredentialsError,
    GenericCredentials,
    ProviderCredentials,
    ACCESS_TOKEN_HEADER,
    TOKEN_TYPE_HEADER,
};

pub use error::LatchkeyError;

pub use graph::GraphClient;

pub use provider::{
    GraphRequest,
    HttpMethod,
    IdentityProvider,
    LoginOutcome,
    Profile,
    ProviderError,
    ProviderErrorKind,
    ProviderToken,
};

pub use saved::{SavedCredential, SavedCredentialStore};

pub use session::{
    GenericSignIn,
    SessionController,
    SessionDelegate,
    SessionError,
    SessionPhase,
    SessionState,
    UserType,
};

pub use store::{
    Secret,
    SecretStore,
    StoreError,
    MemoryStore,
    create_store,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use trigger::SignInTrigger;
