//! Integration tests for Board Coupon.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p board-coupon-integration-tests
//! ```
//!
//! No external services are needed: each test starts a [`FakeBackend`], an
//! axum server on `127.0.0.1:0` that answers scripted envelopes per
//! `action` and records every request it receives. [`unreachable_config`]
//! points a client at a closed port for the offline paths.
//!
//! # Test Categories
//!
//! - `catalog` - Shop catalog and board cell loading
//! - `coupons` - Coupon save, listing and redemption
//! - `registration` - Registration gate and profile completion
//! - `bootstrap` - Identity resolution and page bootstrap

#![allow(clippy::expect_used, clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use board_coupon_client::{
    ClientConfig, IdentityError, IdentityProvider, KeyValueStore, MemoryStore, Navigator,
    Redirect, Session,
};
use board_coupon_core::UserIdentity;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use url::Url;

/// Identity SDK app id used by every test configuration.
pub const TEST_LIFF_ID: &str = "2000000000-test";

// ============================================================================
// Fake backend
// ============================================================================

/// A scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// `200 OK` with a JSON body.
    Json(Value),
    /// Arbitrary status and raw body.
    Status(u16, String),
}

/// One request as seen by the fake backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub action: String,
    pub params: HashMap<String, String>,
}

impl RecordedRequest {
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

#[derive(Default)]
struct FakeState {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeState {
    fn handle(&self, method: &'static str, mut params: HashMap<String, String>) -> Response {
        let action = params.remove("action").unwrap_or_default();
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&action)
            .cloned();

        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                method,
                action: action.clone(),
                params,
            });

        match reply {
            Some(Reply::Json(body)) => Json(body).into_response(),
            Some(Reply::Status(status, body)) => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body,
            )
                .into_response(),
            None => Json(json!({
                "success": false,
                "message": format!("unknown action: {action}"),
            }))
            .into_response(),
        }
    }
}

async fn handle_get(
    State(state): State<Arc<FakeState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.handle("GET", params)
}

async fn handle_post(
    State(state): State<Arc<FakeState>>,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    state.handle("POST", params)
}

/// In-process stand-in for the spreadsheet backend.
///
/// Stops when dropped.
pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<FakeState>,
    server: JoinHandle<()>,
}

impl FakeBackend {
    /// Start a backend with no scripted replies.
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new()
            .route("/exec", get(handle_get).post(handle_post))
            .route("/sheet", get(handle_sheet))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake backend");
        let addr = listener.local_addr().expect("Fake backend has no address");

        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Fake backend stopped");
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// Endpoint URL of the backend.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}/exec", self.addr)
    }

    /// URL serving the published-sheet export scripted for `"sheet"`.
    #[must_use]
    pub fn sheet_url(&self) -> Url {
        Url::parse(&format!("http://{}/sheet", self.addr)).expect("Invalid sheet URL")
    }

    /// Reply to `action` with `body`.
    pub fn reply(&self, action: &str, body: Value) {
        self.script(action, Reply::Json(body));
    }

    /// Reply to `action` with a raw status and body.
    pub fn reply_status(&self, action: &str, status: u16, body: &str) {
        self.script(action, Reply::Status(status, body.to_string()));
    }

    fn script(&self, action: &str, reply: Reply) {
        self.state
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(action.to_string(), reply);
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Requests received for `action`.
    #[must_use]
    pub fn requests_for(&self, action: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.action == action)
            .collect()
    }

    /// Client configuration pointing at this backend.
    #[must_use]
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(&self.url(), TEST_LIFF_ID).expect("Invalid test configuration")
    }

    /// Fresh session over an empty in-memory store.
    #[must_use]
    pub fn session(&self) -> Session<MemoryStore> {
        Session::new(self.config(), MemoryStore::new()).expect("Failed to create session")
    }

    /// Session over shared stores, standing in for one page load of a tab
    /// whose local and session storage outlive it.
    #[must_use]
    pub fn page_load(&self, tab: &Tab) -> Session<Arc<MemoryStore>, Arc<MemoryStore>> {
        Session::with_flags(
            self.config(),
            Arc::clone(&tab.local),
            Arc::clone(&tab.session),
        )
        .expect("Failed to create session")
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle_sheet(State(state): State<Arc<FakeState>>) -> Response {
    state.handle("GET", HashMap::from([("action".to_string(), "sheet".to_string())]))
}

/// Browser tab storage shared by successive page loads.
#[derive(Debug, Default)]
pub struct Tab {
    pub local: Arc<MemoryStore>,
    pub session: Arc<MemoryStore>,
}

impl Tab {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Configuration pointing at a port nothing listens on.
pub async fn unreachable_config() -> ClientConfig {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port listener");
    let addr = listener.local_addr().expect("Port listener has no address");
    drop(listener);

    ClientConfig::new(&format!("http://{addr}/exec"), TEST_LIFF_ID)
        .expect("Invalid test configuration")
}

/// Session over an empty in-memory store whose backend is unreachable.
pub async fn offline_session() -> Session<MemoryStore> {
    Session::new(unreachable_config().await, MemoryStore::new()).expect("Failed to create session")
}

/// Store `user_id` as the logged-in user of `session`.
pub fn log_in<S: KeyValueStore, F: KeyValueStore>(
    session: &Session<S, F>,
    user_id: &str,
) -> UserIdentity {
    let identity = UserIdentity::new(user_id, "Tester", "https://img.test/avatar.png");
    session
        .store()
        .set_identity(&identity)
        .expect("Failed to store identity");
    identity
}

// ============================================================================
// Host doubles
// ============================================================================

/// Navigator that records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<Redirect>>,
    locations: Mutex<Vec<Url>>,
    alerts: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn redirects(&self) -> Vec<Redirect> {
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn locations(&self) -> Vec<Url> {
        self.locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn alerts(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, target: &Redirect) {
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target.clone());
    }

    fn replace_location(&self, url: &Url) {
        self.locations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.clone());
    }

    fn alert(&self, message: &str) {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}

/// Scripted identity SDK.
#[derive(Debug, Default)]
pub struct FakeSdk {
    /// Profile returned when logged in; `None` means logged out.
    profile: Option<UserIdentity>,
    fail_init: bool,
    login_calls: Mutex<usize>,
}

impl FakeSdk {
    #[must_use]
    pub fn logged_in(identity: UserIdentity) -> Self {
        Self {
            profile: Some(identity),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn logged_out() -> Self {
        Self::default()
    }

    /// Make `init` fail.
    #[must_use]
    pub fn with_failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    #[must_use]
    pub fn login_calls(&self) -> usize {
        *self.login_calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IdentityProvider for FakeSdk {
    async fn init(&self, liff_id: &str) -> Result<(), IdentityError> {
        if self.fail_init {
            return Err(IdentityError::Sdk(format!("init failed for {liff_id}")));
        }
        Ok(())
    }

    fn is_logged_in(&self) -> bool {
        self.profile.is_some()
    }

    fn login(&self) -> Result<(), IdentityError> {
        *self.login_calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }

    async fn get_profile(&self) -> Result<UserIdentity, IdentityError> {
        self.profile.clone().ok_or(IdentityError::NotInitialized)
    }
}
