//! Coupon commands.

use board_coupon_client::services::{Redemption, SaveOrigin};
use board_coupon_core::{CouponId, CouponState};
use tracing::{info, warn};

use super::{CliSession, CommandError};

/// Save a coupon for the shop named `shop_name`.
///
/// # Errors
///
/// Returns `CommandError` if no shop has that name or the state file cannot
/// be written.
pub async fn save(session: &CliSession, shop_name: &str) -> Result<(), CommandError> {
    let shop = session
        .shops()
        .load_shops()
        .await
        .into_iter()
        .find(|shop| shop.name == shop_name)
        .ok_or_else(|| CommandError::ShopNotFound(shop_name.to_string()))?;

    let saved = session.coupons().save_coupon(&shop).await?;
    match saved.origin {
        SaveOrigin::Backend => info!(coupon_id = %saved.coupon.coupon_id, "Coupon saved"),
        SaveOrigin::Local => {
            warn!(coupon_id = %saved.coupon.coupon_id, "Coupon saved on this device only");
        }
    }
    Ok(())
}

/// List coupons.
pub async fn list(session: &CliSession) {
    let coupons = session.coupons().load_coupons().await;

    for coupon in &coupons {
        let state = match coupon.used {
            CouponState::Obtained => "available",
            CouponState::Used => "used",
            CouponState::Abandoned => "abandoned",
        };
        info!(
            coupon_id = %coupon.coupon_id,
            shop = %coupon.shop_name,
            discount = %coupon.discount,
            state,
            "Coupon"
        );
    }
    info!(count = coupons.len(), "Coupons listed");
}

/// Redeem a coupon.
///
/// # Errors
///
/// Returns `CommandError` if the state file cannot be written.
pub async fn verify(session: &CliSession, coupon_id: &str) -> Result<(), CommandError> {
    let outcome = session
        .coupons()
        .verify_coupon(&CouponId::new(coupon_id))
        .await?;
    report(coupon_id, "redeemed", outcome);
    Ok(())
}

/// Give up a coupon.
///
/// # Errors
///
/// Returns `CommandError` if the state file cannot be written.
pub async fn abandon(session: &CliSession, coupon_id: &str) -> Result<(), CommandError> {
    let outcome = session
        .coupons()
        .abandon_coupon(&CouponId::new(coupon_id))
        .await?;
    report(coupon_id, "abandoned", outcome);
    Ok(())
}

fn report(coupon_id: &str, verb: &str, outcome: Redemption) {
    match outcome {
        Redemption::Confirmed | Redemption::AlreadyProcessed => {
            info!(coupon_id, "Coupon {verb}");
        }
        Redemption::RecordedLocally => {
            warn!(coupon_id, "Coupon {verb} on this device; the backend did not confirm");
        }
        Redemption::AlreadyFinal(state) => {
            info!(coupon_id, ?state, "Coupon was already settled");
        }
    }
}
