//! Identity adapter over the messaging-platform login SDK.
//!
//! Identity reaches the client one of two ways:
//!
//! - the SDK (`init`, `isLoggedIn`, `login`, `getProfile`), modelled by
//!   [`IdentityProvider`]
//! - login query parameters (`lineUserId`, `lineDisplayName`,
//!   `linePictureUrl`) appended by an external login page, consumed once and
//!   then stripped from the address
//!
//! Either way the identity is written to the store, replacing any previous
//! one, and read back from there by every other component.

use std::future::Future;

use board_coupon_core::UserIdentity;
use thiserror::Error;
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::navigator::Navigator;
use crate::store::{KeyValueStore, ProfileStore, keys};

/// Alert shown when login is requested but the SDK never loaded.
pub const SDK_MISSING_ALERT: &str = "LINE LIFF SDK 未載入，請確認網路連線";

/// Errors reported by an identity SDK.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// A call was made before `init` completed.
    #[error("Identity SDK not initialized")]
    NotInitialized,

    /// The SDK reported a failure.
    #[error("Identity SDK error: {0}")]
    Sdk(String),
}

/// The messaging-platform login SDK.
pub trait IdentityProvider {
    /// Initialize the SDK for the app `liff_id`.
    fn init(&self, liff_id: &str) -> impl Future<Output = Result<(), IdentityError>> + Send;

    /// Whether the user is logged in to the host app.
    fn is_logged_in(&self) -> bool;

    /// Start the SDK's login flow. The host usually navigates away.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError` if the SDK refuses to start the flow.
    fn login(&self) -> Result<(), IdentityError>;

    /// The logged-in user's profile.
    fn get_profile(&self) -> impl Future<Output = Result<UserIdentity, IdentityError>> + Send;
}

/// Provider type for hosts where the SDK is never available.
///
/// Uninhabited; only `None::<&NoSdk>` can be passed.
#[derive(Debug, Clone, Copy)]
pub enum NoSdk {}

impl IdentityProvider for NoSdk {
    async fn init(&self, _liff_id: &str) -> Result<(), IdentityError> {
        match *self {}
    }

    fn is_logged_in(&self) -> bool {
        match *self {}
    }

    fn login(&self) -> Result<(), IdentityError> {
        match *self {}
    }

    async fn get_profile(&self) -> Result<UserIdentity, IdentityError> {
        match *self {}
    }
}

/// What [`IdentityAdapter::start_login`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The SDK is not available; an alert was shown.
    SdkMissing,
    /// The SDK login flow was started.
    LoginStarted,
    /// The user was already logged in; identity was refreshed.
    Refreshed(Option<UserIdentity>),
    /// The SDK failed; an alert was shown.
    Failed(String),
}

/// Resolves and records the current user's identity.
#[derive(Debug)]
pub struct IdentityAdapter<'a, S> {
    store: &'a ProfileStore<S>,
    config: &'a ClientConfig,
}

impl<'a, S: KeyValueStore> IdentityAdapter<'a, S> {
    pub const fn new(store: &'a ProfileStore<S>, config: &'a ClientConfig) -> Self {
        Self { store, config }
    }

    /// The stored identity.
    pub fn current_user(&self) -> Option<UserIdentity> {
        self.store.identity()
    }

    /// Initialize the SDK and, if the user is logged in, record their profile.
    ///
    /// SDK failures are logged and leave any stored identity untouched.
    #[instrument(skip_all)]
    pub async fn initialize<P: IdentityProvider>(&self, provider: &P) -> Option<UserIdentity> {
        if let Err(e) = provider.init(&self.config.liff_id).await {
            warn!(error = %e, "Identity SDK initialization failed");
            return self.current_user();
        }

        if !provider.is_logged_in() {
            info!("Identity SDK reports no logged-in user");
            return self.current_user();
        }

        match provider.get_profile().await {
            Ok(identity) => {
                if let Err(e) = self.store.set_identity(&identity) {
                    warn!(error = %e, "Failed to store identity");
                }
                info!(user_id = %identity.user_id, display_name = %identity.display_name, "User logged in");
                Some(identity)
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch profile from identity SDK");
                self.current_user()
            }
        }
    }

    /// Handle an explicit login request.
    #[instrument(skip_all)]
    pub async fn start_login<P: IdentityProvider, N: Navigator>(
        &self,
        provider: Option<&P>,
        navigator: &N,
    ) -> LoginOutcome {
        let Some(provider) = provider else {
            warn!("Login requested but the identity SDK is not loaded");
            navigator.alert(SDK_MISSING_ALERT);
            return LoginOutcome::SdkMissing;
        };

        if provider.is_logged_in() {
            return LoginOutcome::Refreshed(self.initialize(provider).await);
        }

        match provider.login() {
            Ok(()) => LoginOutcome::LoginStarted,
            Err(e) => {
                warn!(error = %e, "Identity SDK login failed");
                navigator.alert(&format!("登入失敗：{e}"));
                LoginOutcome::Failed(e.to_string())
            }
        }
    }

    /// Record an identity passed as query parameters and strip them from the
    /// address.
    ///
    /// Returns `None` (and touches nothing) when `lineUserId` is absent or
    /// blank.
    #[instrument(skip_all)]
    pub fn consume_query_login<N: Navigator>(
        &self,
        page_url: &Url,
        navigator: &N,
    ) -> Option<UserIdentity> {
        let (identity, stripped) = parse_query_login(page_url)?;

        if let Err(e) = self.store.set_identity(&identity) {
            warn!(error = %e, "Failed to store identity from query parameters");
        }
        navigator.replace_location(&stripped);
        info!(user_id = %identity.user_id, "User logged in from query parameters");

        Some(identity)
    }
}

const QUERY_LOGIN_KEYS: [&str; 3] = [
    keys::LINE_USER_ID,
    keys::LINE_DISPLAY_NAME,
    keys::LINE_PICTURE_URL,
];

/// Extract a login identity from `url` and return it with the URL minus the
/// login parameters.
fn parse_query_login(url: &Url) -> Option<(UserIdentity, Url)> {
    let mut user_id = None;
    let mut display_name = String::new();
    let mut picture_url = String::new();

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            keys::LINE_USER_ID => user_id = Some(value.trim().to_string()),
            keys::LINE_DISPLAY_NAME => display_name = value.into_owned(),
            keys::LINE_PICTURE_URL => picture_url = value.into_owned(),
            _ => {}
        }
    }

    let user_id = user_id.filter(|id| !id.is_empty())?;

    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !QUERY_LOGIN_KEYS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut stripped = url.clone();
    if remaining.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(remaining);
    }

    Some((
        UserIdentity::new(user_id, display_name, picture_url),
        stripped,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_login_decodes_and_strips() {
        let url = Url::parse(
            "https://game.test/index.html?lineUserId=U42&lineDisplayName=%E5%B0%8F%E6%98%8E&linePictureUrl=https%3A%2F%2Fimg.test%2Fa.png&ref=share",
        )
        .unwrap();

        let (identity, stripped) = parse_query_login(&url).unwrap();

        assert_eq!(identity.user_id.as_str(), "U42");
        assert_eq!(identity.display_name, "小明");
        assert_eq!(identity.picture_url, "https://img.test/a.png");
        assert_eq!(stripped.as_str(), "https://game.test/index.html?ref=share");
    }

    #[test]
    fn test_parse_query_login_removes_empty_query() {
        let url = Url::parse("https://game.test/?lineUserId=U1").unwrap();
        let (_, stripped) = parse_query_login(&url).unwrap();
        assert_eq!(stripped.query(), None);
    }

    #[test]
    fn test_parse_query_login_requires_user_id() {
        let url = Url::parse("https://game.test/?lineDisplayName=Mika").unwrap();
        assert!(parse_query_login(&url).is_none());

        let url = Url::parse("https://game.test/?lineUserId=%20").unwrap();
        assert!(parse_query_login(&url).is_none());
    }
}
