//! Remote gateway to the spreadsheet-backed HTTP backend.
//!
//! # Architecture
//!
//! - One endpoint, one query/form parameter (`action`) selecting the operation
//! - Read-only actions are sent as `GET` with a query string, everything else
//!   as a form-encoded `POST`
//! - Replies are parsed into an [`Envelope`]; transport errors, non-2xx
//!   statuses and malformed bodies become failure envelopes, so callers never
//!   see an `Err` from [`Gateway::call`]
//! - Each [`Action`] has exactly one wire name; there is no probing of
//!   alternative names

mod envelope;

pub use envelope::{Envelope, Failure};

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::ClientConfig;

/// Maximum number of body characters copied into logs and failure messages.
const BODY_EXCERPT_CHARS: usize = 200;

/// Errors that can occur when talking to the backend.
///
/// These only surface from [`Gateway::new`] and [`Gateway::fetch_text`];
/// [`Gateway::call`] folds them into failure envelopes.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned a status outside 200-299.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Reply body was not JSON.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Reply body was JSON but not an object.
    #[error("Reply is not a JSON object")]
    NotAnObject,
}

impl GatewayError {
    const fn failure(&self) -> Failure {
        match self {
            Self::Http(_) => Failure::Transport,
            Self::Status { status, .. } => Failure::Status(*status),
            Self::Parse(_) | Self::NotAnObject => Failure::Malformed,
        }
    }
}

/// Backend operations, each pinned to a single wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    GetShops,
    GetCellConfigs,
    GetUserCoupons,
    SaveCoupon,
    VerifyCoupon,
    AbandonCoupon,
    VerifyRegistration,
    CompleteRegistration,
}

impl Action {
    /// Wire name sent as the `action` parameter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetShops => "getShops",
            Self::GetCellConfigs => "getCellConfigs",
            Self::GetUserCoupons => "getUserCoupons",
            Self::SaveCoupon => "saveCoupon",
            Self::VerifyCoupon => "verifyCoupon",
            Self::AbandonCoupon => "abandonCoupon",
            Self::VerifyRegistration => "verifyRegistration",
            Self::CompleteRegistration => "completeRegistration",
        }
    }

    /// Whether the action is sent as a `GET`.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(
            self,
            Self::GetShops | Self::GetCellConfigs | Self::GetUserCoupons
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered request fields. Absent optional values are never sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    fields: Vec<(String, String)>,
}

impl Form {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    #[must_use]
    pub fn field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    /// Add a field only when `value` is present.
    #[must_use]
    pub fn optional(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.field(key, value),
            None => self,
        }
    }

    /// The fields in insertion order.
    #[must_use]
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    fn with_action(&self, action: Action) -> Vec<(&str, &str)> {
        std::iter::once(("action", action.as_str()))
            .chain(self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .collect()
    }
}

/// Client for the backend endpoint.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    client: reqwest::Client,
    endpoint: Url,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("endpoint", &self.inner.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Create a gateway for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &ClientConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("board-coupon/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner: Arc::new(GatewayInner {
                client,
                endpoint: config.api_url.clone(),
            }),
        })
    }

    /// The backend endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    /// Send `action` with `form` and interpret the reply.
    ///
    /// Never fails: anything that prevents a well-formed reply is returned as
    /// a failure envelope carrying the error description.
    #[instrument(skip(self, form), fields(action = %action))]
    pub async fn call(&self, action: Action, form: Form) -> Envelope {
        match self.execute(action, &form).await {
            Ok(envelope) => {
                debug!(success = envelope.is_success(), "Backend replied");
                envelope
            }
            Err(e) => {
                warn!(error = %e, "Backend call failed");
                Envelope::failed(e.failure(), e.to_string())
            }
        }
    }

    async fn execute(&self, action: Action, form: &Form) -> Result<Envelope, GatewayError> {
        let pairs = form.with_action(action);

        let request = if action.is_read_only() {
            let mut url = self.inner.endpoint.clone();
            url.query_pairs_mut().extend_pairs(pairs.iter().copied());
            self.inner.client.get(url)
        } else {
            self.inner.client.post(self.inner.endpoint.clone()).form(&pairs)
        };

        let body = self.read_body(request).await?;
        let value: serde_json::Value = serde_json::from_str(&body).inspect_err(|e| {
            warn!(
                error = %e,
                body = %excerpt(&body),
                "Failed to parse backend reply"
            );
        })?;

        Envelope::from_body(value).ok_or(GatewayError::NotAnObject)
    }

    /// Fetch `url` and return its body as text.
    ///
    /// Used for published sheet exports that live outside the backend.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a status outside 200-299.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch_text(&self, url: &Url) -> Result<String, GatewayError> {
        self.read_body(self.inner.client.get(url.clone())).await
    }

    async fn read_body(&self, request: reqwest::RequestBuilder) -> Result<String, GatewayError> {
        let response = request.send().await?;
        let status = response.status();

        // Get response body as text first for better error diagnostics
        let body = response.text().await?;

        if !status.is_success() {
            warn!(
                status = %status,
                body = %excerpt(&body),
                "Backend returned non-success status"
            );
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        Ok(body)
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}
