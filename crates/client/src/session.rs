//! Per-page session state.

use tracing::{info, instrument};
use url::Url;

use board_coupon_core::{CouponState, UserIdentity, UserProfile};

use crate::config::ClientConfig;
use crate::gateway::{Gateway, GatewayError};
use crate::identity::{IdentityAdapter, IdentityProvider};
use crate::navigator::Navigator;
use crate::services::{CellLoader, CouponManager, RegistrationGate, ShopCatalog};
use crate::store::{KeyValueStore, MemoryStore, ProfileStore, StorageError};

/// Everything one page load needs: configuration, the persistent profile
/// store, session-scoped flags, the gateway and the cell cache.
///
/// `S` is persistent storage and `F` the host's session-scoped storage,
/// which outlives a page load but not the browsing session. Services borrow
/// from the session; nothing is global.
#[derive(Debug)]
pub struct Session<S, F = MemoryStore> {
    config: ClientConfig,
    store: ProfileStore<S>,
    flags: F,
    gateway: Gateway,
    cells: CellLoader,
}

/// How [`Session::bootstrap`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootOutcome {
    /// A registered user is present.
    Ready(UserIdentity),
    /// No identity is available; the host should show its login screen.
    NeedsLogin,
    /// The user is not registered. The host was redirected, unless they had
    /// just come back from the registration page.
    Unregistered(UserIdentity),
}

/// Snapshot of the locally known state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub identity: Option<UserIdentity>,
    pub profile: Option<UserProfile>,
    /// The local index has an entry for the current user.
    pub registered_locally: bool,
    pub local_coupons: usize,
    pub used_coupons: usize,
    pub abandoned_coupons: usize,
}

impl<S: KeyValueStore> Session<S> {
    /// Create a session over `backend` whose session flags live only as long
    /// as this value. Hosts that reload between pages should use
    /// [`Session::with_flags`].
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: ClientConfig, backend: S) -> Result<Self, GatewayError> {
        Self::with_flags(config, backend, MemoryStore::new())
    }
}

impl<S: KeyValueStore, F: KeyValueStore> Session<S, F> {
    /// Create a session over persistent `backend` and session-scoped `flags`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn with_flags(config: ClientConfig, backend: S, flags: F) -> Result<Self, GatewayError> {
        let gateway = Gateway::new(&config)?;
        let cells = CellLoader::new(gateway.clone(), config.cell_source.clone());

        Ok(Self {
            config,
            store: ProfileStore::new(backend),
            flags,
            gateway,
            cells,
        })
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub const fn store(&self) -> &ProfileStore<S> {
        &self.store
    }

    pub const fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Session-scoped flags.
    pub const fn flags(&self) -> &F {
        &self.flags
    }

    pub const fn identity(&self) -> IdentityAdapter<'_, S> {
        IdentityAdapter::new(&self.store, &self.config)
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.store.identity()
    }

    pub const fn shops(&self) -> ShopCatalog<'_> {
        ShopCatalog::new(&self.gateway)
    }

    pub const fn cells(&self) -> &CellLoader {
        &self.cells
    }

    pub const fn coupons(&self) -> CouponManager<'_, S> {
        CouponManager::new(&self.gateway, &self.store)
    }

    pub const fn registration(&self) -> RegistrationGate<'_, S, F> {
        RegistrationGate::new(&self.gateway, &self.store, &self.flags, &self.config)
    }

    /// Resolve identity and enforce registration for a page load.
    ///
    /// Order: login query parameters on `page_url`, then the SDK (when
    /// present), then the registration gate.
    #[instrument(skip_all)]
    pub async fn bootstrap<P, N>(
        &self,
        provider: Option<&P>,
        navigator: &N,
        page_url: Option<&Url>,
    ) -> BootOutcome
    where
        P: IdentityProvider,
        N: Navigator,
    {
        let identity = self.identity();

        if let Some(url) = page_url {
            identity.consume_query_login(url, navigator);
        }

        let user = match provider {
            Some(provider) => identity.initialize(provider).await,
            None => identity.current_user(),
        };

        let Some(user) = user else {
            info!("No identity available, login required");
            return BootOutcome::NeedsLogin;
        };

        if self.registration().enforce_registration(navigator).await {
            info!(user_id = %user.user_id, "Session ready");
            BootOutcome::Ready(user)
        } else {
            BootOutcome::Unregistered(user)
        }
    }

    /// Summarize what is stored locally.
    pub fn status(&self) -> SessionStatus {
        let identity = self.store.identity();
        let registered_locally = identity.as_ref().is_some_and(|user| {
            self.store
                .registration(&user.user_id)
                .is_some_and(|record| record.registered)
        });
        let usage = self.store.used_coupons();
        let count = |state: CouponState| usage.values().filter(|e| e.used == state).count();

        SessionStatus {
            profile: self.store.profile(),
            registered_locally,
            local_coupons: self.store.local_coupons().len(),
            used_coupons: count(CouponState::Used),
            abandoned_coupons: count(CouponState::Abandoned),
            identity,
        }
    }

    /// Remove every stored document and session flag.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend rejects a removal.
    pub fn clear_all(&self) -> Result<(), StorageError> {
        self.store.clear_all()?;
        for key in self.flags.keys() {
            self.flags.remove(&key)?;
        }
        Ok(())
    }
}
