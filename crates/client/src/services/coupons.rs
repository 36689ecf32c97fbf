//! Coupon lifecycle: save, list, redeem and abandon.
//!
//! The backend is the system of record when it answers. When it does not, the
//! operation is compensated locally and still reported as done:
//!
//! - a coupon that cannot be saved remotely is kept in the local list under a
//!   `LOCAL_` id
//! - a redemption or abandonment that cannot be confirmed remotely is still
//!   written to the local usage index
//!
//! The usage index only ever holds terminal entries and an entry, once
//! written, is never replaced. Listing merges it into remote coupons so a
//! coupon redeemed offline stays redeemed.

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use board_coupon_core::{CouponId, CouponRecord, CouponState, ShopRecord, UsageEntry};

use crate::gateway::{Action, Form, Gateway};
use crate::store::{KeyValueStore, ProfileStore, StorageError};

/// Where a saved coupon was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOrigin {
    /// The backend stored the coupon; the local record is an echo.
    Backend,
    /// The coupon only exists on this device.
    Local,
}

/// Result of [`CouponManager::save_coupon`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCoupon {
    pub coupon: CouponRecord,
    pub origin: SaveOrigin,
}

/// How a redemption or abandonment was settled.
///
/// Every variant means the coupon is now in the requested terminal state as
/// far as the player is concerned, except [`Redemption::AlreadyFinal`] which
/// reports the state the coupon was already in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redemption {
    /// The backend accepted the request.
    Confirmed,
    /// The backend had already applied it.
    AlreadyProcessed,
    /// The backend could not confirm; only the local index was updated.
    RecordedLocally,
    /// The coupon was already terminal locally; nothing was sent.
    AlreadyFinal(CouponState),
}

impl Redemption {
    /// Whether the backend acknowledged the request.
    #[must_use]
    pub const fn is_backend_confirmed(self) -> bool {
        matches!(self, Self::Confirmed | Self::AlreadyProcessed)
    }
}

/// Coupon operations for the current user.
#[derive(Debug)]
pub struct CouponManager<'a, S> {
    gateway: &'a Gateway,
    store: &'a ProfileStore<S>,
}

impl<'a, S: KeyValueStore> CouponManager<'a, S> {
    pub const fn new(gateway: &'a Gateway, store: &'a ProfileStore<S>) -> Self {
        Self { gateway, store }
    }

    /// Save a coupon for `shop`.
    ///
    /// Always succeeds unless the local store cannot be written: without an
    /// identity, or when the backend does not accept the coupon, it is kept
    /// locally under a `LOCAL_` id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the local list cannot be written.
    #[instrument(skip(self, shop), fields(shop = %shop.name))]
    pub async fn save_coupon(&self, shop: &ShopRecord) -> Result<SavedCoupon, StorageError> {
        let Some(identity) = self.store.identity() else {
            warn!("Saving coupon without a logged-in user, keeping it locally");
            return self.keep(shop, CouponId::generate_local(), SaveOrigin::Local);
        };

        let form = Form::new()
            .field("userId", identity.user_id.as_str())
            .field("shopName", shop.name.as_str())
            .field("discount", shop.discount_text.as_str())
            .field("imageUrl", shop.image_url.as_str())
            .optional("lineUrl", shop.line_url.as_deref())
            .optional("addressUrl", shop.address_url.as_deref())
            .field("category", shop.category.as_str());

        let envelope = self.gateway.call(Action::SaveCoupon, form).await;

        if envelope.is_success() {
            let coupon_id = envelope
                .get("couponId")
                .and_then(id_text)
                .map_or_else(CouponId::generate_echo, CouponId::new);
            info!(user_id = %identity.user_id, coupon_id = %coupon_id, "Coupon saved");
            self.keep(shop, coupon_id, SaveOrigin::Backend)
        } else {
            warn!(
                user_id = %identity.user_id,
                message = envelope.message().unwrap_or("unknown error"),
                "Backend did not save coupon, keeping it locally"
            );
            self.keep(shop, CouponId::generate_local(), SaveOrigin::Local)
        }
    }

    /// The user's coupons with locally recorded usage applied.
    ///
    /// Falls back to the local list without an identity or when the remote
    /// list cannot be loaded.
    #[instrument(skip(self))]
    pub async fn load_coupons(&self) -> Vec<CouponRecord> {
        let Some(identity) = self.store.identity() else {
            debug!("No logged-in user, listing local coupons");
            return self.local_coupons();
        };

        let form = Form::new().field("userId", identity.user_id.as_str());
        let envelope = self.gateway.call(Action::GetUserCoupons, form).await;

        if !envelope.is_success() {
            warn!(
                user_id = %identity.user_id,
                message = envelope.message().unwrap_or("unknown error"),
                "Failed to load coupons, listing local coupons"
            );
            return self.local_coupons();
        }

        let Some(remote) = envelope.first_field::<Vec<CouponRecord>>(&["coupons", "data"]) else {
            warn!(user_id = %identity.user_id, "Coupon reply has no coupon list, listing local coupons");
            return self.local_coupons();
        };

        info!(user_id = %identity.user_id, count = remote.len(), "Loaded coupons");
        self.apply_usage(remote)
    }

    /// Redeem a coupon.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the usage index cannot be written.
    #[instrument(skip(self), fields(coupon_id = %coupon_id))]
    pub async fn verify_coupon(&self, coupon_id: &CouponId) -> Result<Redemption, StorageError> {
        self.settle(coupon_id, Action::VerifyCoupon, UsageEntry::redeemed)
            .await
    }

    /// Give up a coupon.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the usage index cannot be written.
    #[instrument(skip(self), fields(coupon_id = %coupon_id))]
    pub async fn abandon_coupon(&self, coupon_id: &CouponId) -> Result<Redemption, StorageError> {
        self.settle(coupon_id, Action::AbandonCoupon, UsageEntry::abandoned)
            .await
    }

    async fn settle(
        &self,
        coupon_id: &CouponId,
        action: Action,
        entry: fn(DateTime<Utc>) -> UsageEntry,
    ) -> Result<Redemption, StorageError> {
        if let Some(existing) = self.store.usage(coupon_id)
            && existing.used.is_terminal()
        {
            info!(state = ?existing.used, "Coupon already settled");
            return Ok(Redemption::AlreadyFinal(existing.used));
        }

        let outcome = match self.store.identity() {
            None => {
                warn!(%action, "No logged-in user, recording locally only");
                Redemption::RecordedLocally
            }
            Some(identity) => {
                let form = Form::new()
                    .field("userId", identity.user_id.as_str())
                    .field("couponId", coupon_id.as_str());
                let envelope = self.gateway.call(action, form).await;

                if envelope.is_success() {
                    Redemption::Confirmed
                } else if envelope.is_already_processed() {
                    info!(%action, "Backend had already processed the coupon");
                    Redemption::AlreadyProcessed
                } else {
                    warn!(
                        %action,
                        message = envelope.message().unwrap_or("unknown error"),
                        "Backend did not confirm, recording locally"
                    );
                    Redemption::RecordedLocally
                }
            }
        };

        // The index is re-read here; another operation may have settled the
        // coupon while the request was in flight.
        let wanted = entry(Utc::now());
        let target = wanted.used;
        let recorded = self.store.record_usage(coupon_id, wanted)?;
        if recorded.used != target {
            info!(state = ?recorded.used, "Coupon was settled concurrently");
            return Ok(Redemption::AlreadyFinal(recorded.used));
        }

        Ok(outcome)
    }

    fn keep(
        &self,
        shop: &ShopRecord,
        coupon_id: CouponId,
        origin: SaveOrigin,
    ) -> Result<SavedCoupon, StorageError> {
        let coupon = CouponRecord::obtained(coupon_id, shop);
        let count = self.store.push_local_coupon(coupon.clone())?;
        debug!(coupon_id = %coupon.coupon_id, count, "Stored coupon locally");
        Ok(SavedCoupon { coupon, origin })
    }

    fn local_coupons(&self) -> Vec<CouponRecord> {
        self.apply_usage(self.store.local_coupons())
    }

    fn apply_usage(&self, coupons: Vec<CouponRecord>) -> Vec<CouponRecord> {
        let usage = self.store.used_coupons();
        coupons
            .into_iter()
            .map(|mut coupon| {
                let local = usage.get(&coupon.coupon_id).map(|entry| entry.used);
                coupon.used = coupon.used.merge(local);
                coupon
            })
            .collect()
    }
}

/// Backend coupon ids may arrive as strings or numbers.
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
