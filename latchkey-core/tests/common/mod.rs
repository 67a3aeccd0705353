//! Shared fakes for the session integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use latchkey_core::{
    GraphRequest, IdentityProvider, LoginOutcome, MemoryStore, Profile, ProviderError,
    ProviderToken, SavedCredential, SavedCredentialStore, SessionConfig, SessionController,
    SessionDelegate,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const STORAGE_KEY: &str = "latchkey/test-credentials";

/// What the fake provider does when asked to refresh.
#[derive(Clone)]
pub enum RefreshBehavior {
    /// The call succeeds and the current token becomes the given one.
    Succeed(Option<ProviderToken>),
    /// The call fails.
    Fail(ProviderError),
}

/// Scriptable stand-in for a provider SDK.
pub struct FakeProvider {
    pub current_token: Mutex<Option<ProviderToken>>,
    pub current_profile: Mutex<Option<Profile>>,
    pub refresh: Mutex<RefreshBehavior>,
    pub login_outcome: Mutex<LoginOutcome>,
    pub login_token: Mutex<Option<ProviderToken>>,
    pub graph_responses: Mutex<HashMap<String, Result<Value, ProviderError>>>,
    pub requests: Mutex<Vec<GraphRequest>>,
    pub calls: Mutex<Vec<String>>,
    pub refresh_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            current_token: Mutex::new(None),
            current_profile: Mutex::new(None),
            refresh: Mutex::new(RefreshBehavior::Fail(ProviderError::network("offline"))),
            login_outcome: Mutex::new(LoginOutcome::Cancelled),
            login_token: Mutex::new(None),
            graph_responses: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            refresh_gate: Mutex::new(None),
        }
    }

    pub fn set_refresh(&self, behavior: RefreshBehavior) {
        *self.refresh.lock() = behavior;
    }

    pub fn set_login(&self, outcome: LoginOutcome, token: Option<ProviderToken>) {
        *self.login_outcome.lock() = outcome;
        *self.login_token.lock() = token;
    }

    pub fn respond(&self, path: &str, response: Result<Value, ProviderError>) {
        self.graph_responses.lock().insert(path.to_string(), response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn requests_to(&self, path: &str) -> Vec<GraphRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn auth_token_type(&self) -> &str {
        "FacebookToken"
    }

    fn current_token(&self) -> Option<ProviderToken> {
        self.current_token.lock().clone()
    }

    fn current_profile(&self) -> Option<Profile> {
        self.current_profile.lock().clone()
    }

    async fn refresh_current_token(&self) -> Result<(), ProviderError> {
        self.calls.lock().push("refresh".to_string());

        let gate = self.refresh_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let behavior = self.refresh.lock().clone();
        match behavior {
            RefreshBehavior::Succeed(token) => {
                *self.current_token.lock() = token;
                Ok(())
            }
            RefreshBehavior::Fail(e) => Err(e),
        }
    }

    async fn login(&self, _permissions: &[String]) -> LoginOutcome {
        self.calls.lock().push("login".to_string());

        let outcome = self.login_outcome.lock().clone();
        if let LoginOutcome::Success { .. } = outcome {
            *self.current_token.lock() = self.login_token.lock().clone();
        }
        outcome
    }

    fn logout(&self) {
        self.calls.lock().push("logout".to_string());
        *self.current_token.lock() = None;
        *self.current_profile.lock() = None;
    }

    async fn request(&self, request: GraphRequest) -> Result<Value, ProviderError> {
        self.calls.lock().push(format!("request:{}", request.path));
        let response = self
            .graph_responses
            .lock()
            .get(&request.path)
            .cloned()
            .unwrap_or_else(|| Ok(serde_json::json!({})));
        self.requests.lock().push(request);
        response
    }
}

/// Records delegate notifications in order.
#[derive(Default)]
pub struct RecordingDelegate {
    pub events: Mutex<Vec<String>>,
    pub alerts: Mutex<Vec<String>>,
}

impl RecordingDelegate {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().clone()
    }
}

impl SessionDelegate for RecordingDelegate {
    fn sign_in_started(&self) {
        self.events.lock().push("started".to_string());
    }

    fn sign_in_completed(&self, auto_sign_in: bool) {
        self.events
            .lock()
            .push(format!("completed(auto={})", auto_sign_in));
    }

    fn sign_in_cancelled(&self) {
        self.events.lock().push("cancelled".to_string());
    }

    fn user_is_signed_out(&self) {
        self.events.lock().push("signed_out".to_string());
    }

    fn alert(&self, _title: &str, message: &str) {
        self.alerts.lock().push(message.to_string());
    }
}

/// A session wired to fakes.
pub struct Harness {
    pub provider: Arc<FakeProvider>,
    pub backend: Arc<MemoryStore>,
    pub store: SavedCredentialStore,
    pub session: Arc<SessionController>,
    pub delegate: Arc<RecordingDelegate>,
}

pub fn harness() -> Harness {
    harness_with(SessionConfig::default())
}

pub fn harness_with(config: SessionConfig) -> Harness {
    init_tracing();

    let provider = Arc::new(FakeProvider::new());
    let backend = Arc::new(MemoryStore::new());
    let store = SavedCredentialStore::new(backend.clone(), STORAGE_KEY);
    let session = SessionController::new(provider.clone(), store.clone(), config);
    let delegate = Arc::new(RecordingDelegate::default());
    session.set_delegate(delegate.clone());

    Harness {
        provider,
        backend,
        store,
        session,
        delegate,
    }
}

pub fn token(value: &str) -> ProviderToken {
    ProviderToken::new(value, "42")
}

pub fn record(username: Option<&str>, token_value: &str) -> SavedCredential {
    SavedCredential::new("42", username.map(str::to_string), &token(token_value)).unwrap()
}

/// Wait for a spawned task to make `check` true.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("latchkey_core=debug"))
        .with_test_writer()
        .try_init();
}
