//! Sign-in/sign-out control.
//!
//! [`SignInTrigger`] is what a host's sign-in button calls on tap. It runs
//! the provider's interactive login, fetches the user's profile and hands
//! the outcome to the [`SessionController`]. Every failure here is
//! authoritative: the user was never established, so the session is signed
//! out.

use serde_json::Value;
use std::sync::Arc;

use crate::provider::{GraphRequest, IdentityProvider, LoginOutcome, Profile};
use crate::session::{SessionController, SessionError};

const ALERT_TITLE: &str = "Alert!";

/// Drives interactive sign-in and explicit sign-out.
pub struct SignInTrigger {
    session: Arc<SessionController>,
    provider: Arc<dyn IdentityProvider>,
}

impl SignInTrigger {
    pub fn new(session: Arc<SessionController>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self { session, provider }
    }

    /// Handle a tap: sign out when signed in, otherwise run a login.
    pub async fn tap(&self) {
        if self.session.user_is_signed_in().await {
            tracing::info!("Explicit request to sign out");
            self.session.sign_user_out().await;
            return;
        }

        if let Some(delegate) = self.session.delegate() {
            delegate.sign_in_started();
        }

        // Drop any half-finished provider session before starting a new one.
        self.provider.logout();
        let outcome = self
            .provider
            .login(&self.session.config().permissions)
            .await;
        self.handle_login_outcome(outcome).await;
    }

    /// Apply the outcome of an interactive login to the session.
    pub async fn handle_login_outcome(&self, outcome: LoginOutcome) {
        match outcome {
            LoginOutcome::Failed(e) => {
                tracing::error!("Login failed during explicit sign-in: {}", e);
                self.alert(&format!("Error signing in: {}", e));
                self.session.sign_user_out().await;
            }
            LoginOutcome::Cancelled => {
                tracing::info!("User cancelled login");
                self.session.cancel_sign_in().await;
            }
            LoginOutcome::Success { granted, declined } => {
                tracing::info!(
                    "Logged in ({} permissions granted, {} declined)",
                    granted.len(),
                    declined.len()
                );
                if let Err(e) = self.finish_sign_in().await {
                    let message = format!("Error completing sign-in: {}", e);
                    tracing::error!("{}", message);
                    self.alert(&message);
                    self.session.sign_user_out().await;
                }
            }
        }
    }

    fn alert(&self, message: &str) {
        if let Some(delegate) = self.session.delegate() {
            delegate.alert(ALERT_TITLE, message);
        }
    }

    async fn finish_sign_in(&self) -> Result<(), SessionError> {
        let profile = match self.provider.current_profile() {
            Some(profile) if profile.name.is_some() => profile,
            _ => self.fetch_profile().await?,
        };
        let token = self
            .provider
            .current_token()
            .ok_or(SessionError::NoAccessToken)?;

        self.session.complete_sign_in(profile, token).await
    }

    /// Fetch the user's id and name from the graph API.
    async fn fetch_profile(&self) -> Result<Profile, SessionError> {
        let request = GraphRequest::me(&self.session.config().profile_fields);
        let result = self
            .provider
            .request(request)
            .await
            .map_err(|e| SessionError::ProfileFetchFailed {
                message: e.to_string(),
            })?;

        tracing::debug!("Fetched user profile");
        profile_from_graph(&result)
    }
}

fn profile_from_graph(result: &Value) -> Result<Profile, SessionError> {
    let field = |name: &str| result.get(name).and_then(Value::as_str).map(str::to_string);

    match (field("id"), field("name")) {
        (Some(id), Some(name)) => Ok(Profile::new(id, Some(name))),
        _ => Err(SessionError::ProfileFetchFailed {
            message: "no user attributes in profile response".to_string(),
        }),
    }
}
