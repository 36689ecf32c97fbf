//! Shop catalog loading.

use board_coupon_core::ShopRecord;
use tracing::{info, instrument, warn};

use crate::gateway::{Action, Form, Gateway};

/// Loads the merchant catalog, falling back to the built-in list.
#[derive(Debug, Clone, Copy)]
pub struct ShopCatalog<'a> {
    gateway: &'a Gateway,
}

impl<'a> ShopCatalog<'a> {
    pub const fn new(gateway: &'a Gateway) -> Self {
        Self { gateway }
    }

    /// Every shop in the catalog.
    ///
    /// Returns [`ShopRecord::fallback_list`] when the backend is unreachable,
    /// reports failure, or replies without a non-empty `data` array.
    #[instrument(skip(self))]
    pub async fn load_shops(&self) -> Vec<ShopRecord> {
        let envelope = self.gateway.call(Action::GetShops, Form::new()).await;

        if !envelope.is_success() {
            warn!(
                message = envelope.message().unwrap_or("unknown error"),
                "Failed to load shops, using built-in list"
            );
            return ShopRecord::fallback_list();
        }

        match envelope.field::<Vec<ShopRecord>>("data") {
            Some(shops) if !shops.is_empty() => {
                info!(count = shops.len(), "Loaded shops");
                shops
            }
            _ => {
                warn!("Shop reply has no shops, using built-in list");
                ShopRecord::fallback_list()
            }
        }
    }

    /// Shops whose category equals `category`.
    #[instrument(skip(self))]
    pub async fn load_shops_by_category(&self, category: &str) -> Vec<ShopRecord> {
        let shops: Vec<ShopRecord> = self
            .load_shops()
            .await
            .into_iter()
            .filter(|shop| shop.category == category)
            .collect();

        if shops.is_empty() {
            warn!(category, "No shops in category");
        } else {
            info!(category, count = shops.len(), "Found shops in category");
        }
        shops
    }
}
