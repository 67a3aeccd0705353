//! Sign-in session state machine.
//!
//! [`SessionController`] owns the sticky sign-in flag and the saved
//! credential record, and is the only writer of either. It moves between
//! three phases:
//!
//! - [`SessionPhase::SignedOut`]
//! - [`SessionPhase::SignedInPending`]: sticky, refresh in flight or last refresh failed
//! - [`SessionPhase::SignedIn`]: sticky, credential refreshed or freshly obtained
//!
//! # Sequencing
//!
//! All state lives behind one async mutex. Every transition applies its flag
//! changes and store writes while holding it; provider calls are never
//! awaited under it. Sign-out advances an epoch, and a refresh whose epoch
//! no longer matches when its provider call returns is discarded, so a late
//! refresh cannot bring back a credential that sign-out cleared.
//!
//! At most one provider refresh runs at a time. A [`SessionController::refresh`]
//! call that finds one in flight waits for it and shares its result instead
//! of starting another.
//!
//! Revoking the provider grant on sign-out is spawned on the current Tokio
//! runtime; without one the revocation is skipped and logged.
//!
//! # Failure triage
//!
//! A silent refresh failure (launch or connectivity) is logged and leaves the
//! sticky flag alone; the user may just be offline. Sign-out only happens on
//! explicit request or when an interactive sign-in fails.

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, Notify};

use crate::config::SessionConfig;
use crate::credentials::{CloudStorageType, GenericCredentials, ProviderCredentials};
use crate::error::LatchkeyError;
use crate::provider::{GraphRequest, IdentityProvider, Profile, ProviderError, ProviderToken};
use crate::saved::{SavedCredential, SavedCredentialStore};
use crate::store::{create_store, Secret, StoreError};

/// Error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Refresh succeeded at the provider but there is no saved record to update.
    #[error("no saved credentials")]
    NoSavedCredentials,

    /// The saved record (or the signed-in profile) has no username.
    #[error("no username")]
    NoUsername,

    /// The provider exposes no current access token.
    #[error("no access token")]
    NoAccessToken,

    /// The user's profile could not be fetched after login.
    #[error("profile fetch failed: {message}")]
    ProfileFetchFailed { message: String },

    /// The operation needs a signed-in session.
    #[error("not signed in")]
    NotSignedIn,

    /// A sign-out happened while the operation was in flight; its result was discarded.
    #[error("superseded by sign-out")]
    Superseded,

    /// The provider reported an error.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Persisting the credential record failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(StoreError::from(e))
    }
}

/// Phase of the sign-in session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    SignedOut,
    SignedInPending,
    SignedIn,
}

impl SessionPhase {
    pub fn is_sticky(&self) -> bool {
        !matches!(self, Self::SignedOut)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SignedOut => write!(f, "Signed Out"),
            Self::SignedInPending => write!(f, "Signed In (refresh pending)"),
            Self::SignedIn => write!(f, "Signed In"),
        }
    }
}

/// Snapshot of the session's mutable state.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// The process believes the user is signed in.
    pub sticky_sign_in: bool,

    pub phase: SessionPhase,

    /// In-memory mirror of the persisted record.
    pub saved: Option<SavedCredential>,

    /// Advanced by every sign-out.
    pub epoch: u64,

    pub refresh_in_flight: bool,
}

/// Kind of user a sign-in creates on the host's server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    /// Owns cloud storage.
    Owning,

    /// Joins another user's storage by invitation.
    Sharing,
}

/// Notifications the session sends to the host.
///
/// Every method defaults to a no-op. Methods are called after the session's
/// state has been updated and its lock released.
pub trait SessionDelegate: Send + Sync {
    fn sign_in_started(&self) {}

    fn sign_in_completed(&self, _auto_sign_in: bool) {}

    fn sign_in_cancelled(&self) {}

    fn user_is_signed_out(&self) {}

    /// Show a user-visible failure.
    fn alert(&self, _title: &str, _message: &str) {}
}

/// Sign-in contract shared by every identity provider adapter.
#[async_trait]
pub trait GenericSignIn: Send + Sync {
    fn sign_in_name(&self) -> &str;

    fn user_type(&self) -> UserType;

    fn cloud_storage_type(&self) -> Option<CloudStorageType>;

    /// Restore the session at launch; `user_signed_in` is the host's memory
    /// of the previous launch.
    async fn app_launch_setup(&self, user_signed_in: bool);

    async fn network_changed_state(&self, network_is_online: bool);

    async fn user_is_signed_in(&self) -> bool;

    async fn credentials(&self) -> Option<Box<dyn GenericCredentials>>;

    async fn sign_user_out(&self);
}

/// Owner of the sign-in session.
pub struct SessionController {
    provider: Arc<dyn IdentityProvider>,
    store: SavedCredentialStore,
    config: SessionConfig,
    state: Mutex<SessionState>,
    refresh_finished: Notify,
    delegate: parking_lot::RwLock<Option<Arc<dyn SessionDelegate>>>,
    this: Weak<SessionController>,
}

impl SessionController {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: SavedCredentialStore,
        config: SessionConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            provider,
            store,
            config,
            state: Mutex::new(SessionState::default()),
            refresh_finished: Notify::new(),
            delegate: parking_lot::RwLock::new(None),
            this: this.clone(),
        })
    }

    /// Build a session from the configuration file at `path`, storing the
    /// sign-in record in the configured secret store.
    pub fn from_config_file(
        provider: Arc<dyn IdentityProvider>,
        path: &Path,
    ) -> Result<Arc<Self>, LatchkeyError> {
        let config = SessionConfig::load_from_path(path)?;
        let store = SavedCredentialStore::new(
            create_store(&config.keyring_service, config.prefer_keyring),
            config.storage_key.clone(),
        );
        Ok(Self::new(provider, store, config))
    }

    pub fn set_delegate(&self, delegate: Arc<dyn SessionDelegate>) {
        *self.delegate.write() = Some(delegate);
    }

    pub(crate) fn delegate(&self) -> Option<Arc<dyn SessionDelegate>> {
        self.delegate.read().clone()
    }

    fn notify(&self, f: impl FnOnce(&dyn SessionDelegate)) {
        if let Some(delegate) = self.delegate() {
            f(delegate.as_ref());
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn state(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    pub async fn user_is_signed_in(&self) -> bool {
        self.state.lock().await.sticky_sign_in
    }

    /// The in-memory copy of the saved record.
    pub async fn saved_credential(&self) -> Option<SavedCredential> {
        self.state.lock().await.saved.clone()
    }

    /// Credentials for the host, present iff signed in with a saved record.
    ///
    /// The record may be stale when the last silent refresh failed.
    pub async fn credentials(&self) -> Option<ProviderCredentials> {
        let state = self.state.lock().await;
        if !state.sticky_sign_in {
            return None;
        }
        let record = state.saved.clone()?;
        Some(ProviderCredentials::new(
            record,
            self.provider.auth_token_type(),
            self.this.clone(),
        ))
    }

    /// Restore the session at launch.
    ///
    /// Loads the saved record. When `user_signed_in` is set, marks the
    /// session sticky and silently refreshes; a refresh failure is returned
    /// but does not sign the user out.
    pub async fn app_launch_setup(&self, user_signed_in: bool) -> Result<(), SessionError> {
        let saved = self.store.load().await;

        let epoch = {
            let mut state = self.state.lock().await;
            state.saved = saved;
            if !user_signed_in {
                tracing::debug!("Launch without prior sign-in");
                return Ok(());
            }
            state.sticky_sign_in = true;
            state.phase = SessionPhase::SignedInPending;
            if self.config.extension_context {
                drop(state);
                return self.trust_saved_credentials().await;
            }
            state.refresh_in_flight = true;
            state.epoch
        };

        tracing::info!("Restoring {} sign-in", self.config.sign_in_name);
        self.run_refresh(epoch).await.inspect_err(|e| {
            tracing::warn!("Silent sign-in at launch failed, staying signed in: {}", e);
        })
    }

    /// React to a connectivity change by retrying silent refresh if the
    /// session is sticky but has no live credential yet.
    pub async fn network_changed_state(&self, network_is_online: bool) {
        let epoch = {
            let mut state = self.state.lock().await;
            let retry = network_is_online
                && state.sticky_sign_in
                && state.phase != SessionPhase::SignedIn
                && !state.refresh_in_flight;
            if !retry {
                return;
            }
            if self.config.extension_context {
                drop(state);
                let _ = self.trust_saved_credentials().await;
                return;
            }
            state.refresh_in_flight = true;
            state.epoch
        };

        tracing::info!("Network is back, trying silent sign-in");
        if let Err(e) = self.run_refresh(epoch).await {
            tracing::warn!("Silent sign-in after network change failed: {}", e);
        }
    }

    /// Silently refresh the provider token and persist it.
    ///
    /// In an extension context the provider is not called and the saved
    /// record is trusted as-is. If a refresh is already in flight this waits
    /// for it; only when that one fails does it start its own.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let mut joined = false;
        let epoch = loop {
            let mut state = self.state.lock().await;
            if !state.sticky_sign_in {
                return Err(SessionError::NotSignedIn);
            }
            if self.config.extension_context {
                drop(state);
                return self.trust_saved_credentials().await;
            }
            if joined && state.phase == SessionPhase::SignedIn {
                return Ok(());
            }
            if !state.refresh_in_flight {
                state.phase = SessionPhase::SignedInPending;
                state.refresh_in_flight = true;
                break state.epoch;
            }

            let epoch = state.epoch;
            let finished = self.refresh_finished.notified();
            tokio::pin!(finished);
            finished.as_mut().enable();
            drop(state);

            tracing::debug!("Refresh already in flight, waiting for it");
            finished.await;
            if self.state.lock().await.epoch != epoch {
                return Err(SessionError::Superseded);
            }
            joined = true;
        };

        self.run_refresh(epoch).await
    }

    async fn trust_saved_credentials(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if state.sticky_sign_in && state.saved.is_some() {
            state.phase = SessionPhase::SignedIn;
        }
        tracing::debug!("Extension context, using saved credentials without refresh");
        Ok(())
    }

    async fn run_refresh(&self, epoch: u64) -> Result<(), SessionError> {
        let result = self.provider.refresh_current_token().await;
        let outcome = self.finish_refresh(epoch, result).await;
        self.refresh_finished.notify_waiters();
        outcome
    }

    async fn finish_refresh(
        &self,
        epoch: u64,
        result: Result<(), ProviderError>,
    ) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            tracing::info!("Signed out while refreshing, discarding refreshed token");
            return Err(SessionError::Superseded);
        }
        state.refresh_in_flight = false;

        if let Err(e) = result {
            if e.is_transient() {
                tracing::warn!("Error refreshing access token: {}", e);
            } else {
                tracing::error!("Provider rejected access token refresh: {}", e);
            }
            return Err(e.into());
        }

        let saved = state.saved.as_ref().ok_or_else(|| {
            tracing::error!("Refreshed access token but found no saved credentials");
            SessionError::NoSavedCredentials
        })?;
        if saved.username.is_none() {
            tracing::error!("Refreshed access token but saved credentials have no username");
            return Err(SessionError::NoUsername);
        }
        let token = self.provider.current_token().ok_or_else(|| {
            tracing::error!("Refreshed access token but provider has no current token");
            SessionError::NoAccessToken
        })?;
        if token.is_expired() {
            tracing::warn!("Provider refreshed to an access token that has already expired");
        }

        let refreshed = saved.with_token(&token)?;
        self.store.save(Some(&refreshed)).await?;
        state.saved = Some(refreshed);
        state.sticky_sign_in = true;
        state.phase = SessionPhase::SignedIn;
        drop(state);

        tracing::info!("Successfully refreshed current access token");
        self.notify(|d| d.sign_in_completed(true));
        Ok(())
    }

    /// Finish an interactive sign-in: persist the record and enter `SignedIn`.
    pub async fn complete_sign_in(
        &self,
        profile: Profile,
        token: ProviderToken,
    ) -> Result<(), SessionError> {
        let username = profile.name.ok_or(SessionError::NoUsername)?;
        let record = SavedCredential::new(profile.user_id, Some(username), &token)?;

        let mut state = self.state.lock().await;
        self.store.save(Some(&record)).await?;
        tracing::info!("Signed in as user {}", record.user_id);
        state.saved = Some(record);
        state.sticky_sign_in = true;
        state.phase = SessionPhase::SignedIn;
        drop(state);

        self.notify(|d| d.sign_in_completed(false));
        Ok(())
    }

    /// Explicit sign-out. Safe to call when already signed out.
    pub async fn sign_user_out(&self) {
        self.sign_out(false).await;
    }

    /// Sign-out after the user backed out of an interactive sign-in.
    pub async fn cancel_sign_in(&self) {
        self.sign_out(true).await;
    }

    async fn sign_out(&self, cancel_only: bool) {
        let token = {
            let mut state = self.state.lock().await;
            state.sticky_sign_in = false;
            state.phase = SessionPhase::SignedOut;
            state.refresh_in_flight = false;
            state.epoch += 1;

            let token = state
                .saved
                .take()
                .and_then(|record| record.access_token())
                .or_else(|| self.provider.current_token())
                .map(|token| token.token_string.clone());

            if let Err(e) = self.store.save(None).await {
                tracing::warn!("Failed to clear saved credentials: {}", e);
            }
            token
        };
        self.refresh_finished.notify_waiters();

        // Revoke before logout so the grant is dropped with a still-valid token.
        self.revoke_grant(token);
        self.provider.logout();

        if cancel_only {
            tracing::info!("Sign-in cancelled");
            self.notify(|d| d.sign_in_cancelled());
        } else {
            tracing::info!("Signed out");
            self.notify(|d| d.user_is_signed_out());
        }
    }

    fn revoke_grant(&self, token: Option<Secret>) {
        let Some(token) = token else {
            tracing::debug!("No access token, skipping permission revocation");
            return;
        };

        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("No Tokio runtime, skipping permission revocation");
            return;
        };

        let provider = Arc::clone(&self.provider);
        runtime.spawn(async move {
            match provider
                .request(GraphRequest::revoke_permissions(Some(token)))
                .await
            {
                Ok(_) => tracing::info!("Revoked provider permissions"),
                Err(e) => tracing::warn!("Failed revoking provider permissions: {}", e),
            }
        });
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("sign_in_name", &self.config.sign_in_name)
            .field("store", &self.store)
            .finish()
    }
}

#[async_trait]
impl GenericSignIn for SessionController {
    fn sign_in_name(&self) -> &str {
        &self.config.sign_in_name
    }

    fn user_type(&self) -> UserType {
        UserType::Sharing
    }

    fn cloud_storage_type(&self) -> Option<CloudStorageType> {
        None
    }

    async fn app_launch_setup(&self, user_signed_in: bool) {
        let _ = SessionController::app_launch_setup(self, user_signed_in).await;
    }

    async fn network_changed_state(&self, network_is_online: bool) {
        SessionController::network_changed_state(self, network_is_online).await;
    }

    async fn user_is_signed_in(&self) -> bool {
        SessionController::user_is_signed_in(self).await
    }

    async fn credentials(&self) -> Option<Box<dyn GenericCredentials>> {
        SessionController::credentials(self)
            .await
            .map(|c| Box::new(c) as Box<dyn GenericCredentials>)
    }

    async fn sign_user_out(&self) {
        SessionController::sign_user_out(self).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LoginOutcome;
    use crate::store::MemoryStore;

    /// Provider that counts graph requests and otherwise does nothing.
    #[derive(Default)]
    struct CountingProvider {
        requests: parking_lot::Mutex<usize>,
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        fn auth_token_type(&self) -> &str {
            "TestToken"
        }

        fn current_token(&self) -> Option<ProviderToken> {
            None
        }

        fn current_profile(&self) -> Option<Profile> {
            None
        }

        async fn refresh_current_token(&self) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn login(&self, _permissions: &[String]) -> LoginOutcome {
            LoginOutcome::Cancelled
        }

        fn logout(&self) {}

        async fn request(&self, _request: GraphRequest) -> Result<serde_json::Value, ProviderError> {
            *self.requests.lock() += 1;
            Ok(serde_json::Value::Null)
        }
    }

    #[test]
    fn test_revoke_without_runtime_is_skipped() {
        let provider = Arc::new(CountingProvider::default());
        let store = SavedCredentialStore::new(Arc::new(MemoryStore::new()), "test");
        let session = SessionController::new(provider.clone(), store, SessionConfig::default());

        session.revoke_grant(Some(Secret::new("T1")));

        assert_eq!(*provider.requests.lock(), 0);
    }

    #[test]
    fn test_phase_stickiness() {
        assert!(!SessionPhase::SignedOut.is_sticky());
        assert!(SessionPhase::SignedInPending.is_sticky());
        assert!(SessionPhase::SignedIn.is_sticky());
        assert_eq!(SessionPhase::default(), SessionPhase::SignedOut);
    }

    #[test]
    fn test_missing_data_errors_display() {
        assert_eq!(SessionError::NoSavedCredentials.to_string(), "no saved credentials");
        assert_eq!(SessionError::NoUsername.to_string(), "no username");
        assert_eq!(SessionError::NoAccessToken.to_string(), "no access token");
    }

    #[test]
    fn test_default_state_is_signed_out() {
        let state = SessionState::default();
        assert!(!state.sticky_sign_in);
        assert!(state.saved.is_none());
        assert_eq!(state.epoch, 0);
    }
}
