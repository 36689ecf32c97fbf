//! Integration tests for the coupon lifecycle.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use board_coupon_client::services::{Redemption, SaveOrigin};
use board_coupon_core::{CouponId, CouponState, ShopRecord, UsageEntry};
use board_coupon_integration_tests::{FakeBackend, log_in, offline_session};
use chrono::Utc;
use serde_json::json;

fn cafe() -> ShopRecord {
    serde_json::from_value(json!({"店家名稱": "Cafe A", "優惠內容": "10% off"})).unwrap()
}

// ============================================================================
// Save
// ============================================================================

#[tokio::test]
async fn test_offline_save_is_kept_locally() {
    let session = offline_session().await;
    log_in(&session, "U1");
    let before = session.store().local_coupons().len();

    let saved = session.coupons().save_coupon(&cafe()).await.unwrap();

    assert_eq!(saved.origin, SaveOrigin::Local);
    assert!(saved.coupon.coupon_id.as_str().starts_with("LOCAL_"));
    let coupons = session.store().local_coupons();
    assert_eq!(coupons.len(), before + 1);
    assert_eq!(coupons[0].shop_name, "Cafe A");
    assert_eq!(coupons[0].discount, "10% off");
}

#[tokio::test]
async fn test_save_posts_canonical_fields_and_echoes_backend_id() {
    let backend = FakeBackend::start().await;
    backend.reply("saveCoupon", json!({"success": true, "couponId": "C100"}));
    let session = backend.session();
    log_in(&session, "U1");

    let shop: ShopRecord = serde_json::from_value(json!({
        "店家名稱": "Canonical",
        "shopName": "Alias",
        "discount": "free tea",
        "店家分類": "美食",
    }))
    .unwrap();
    let saved = session.coupons().save_coupon(&shop).await.unwrap();

    assert_eq!(saved.origin, SaveOrigin::Backend);
    assert_eq!(saved.coupon.coupon_id.as_str(), "C100");

    let requests = backend.requests_for("saveCoupon");
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.param("userId"), Some("U1"));
    assert_eq!(request.param("shopName"), Some("Canonical"));
    assert_eq!(request.param("discount"), Some("free tea"));
    assert_eq!(request.param("category"), Some("美食"));
    assert_eq!(request.param("lineUrl"), None);

    assert_eq!(session.store().local_coupons().len(), 1);
}

#[tokio::test]
async fn test_save_without_backend_id_generates_echo_id() {
    let backend = FakeBackend::start().await;
    backend.reply("saveCoupon", json!({"status": "success"}));
    let session = backend.session();
    log_in(&session, "U1");

    let saved = session.coupons().save_coupon(&cafe()).await.unwrap();

    assert_eq!(saved.origin, SaveOrigin::Backend);
    assert!(saved.coupon.coupon_id.as_str().starts_with("COUPON_"));
}

#[tokio::test]
async fn test_save_rejected_by_backend_is_kept_locally() {
    let backend = FakeBackend::start().await;
    backend.reply("saveCoupon", json!({"success": false, "message": "sheet locked"}));
    let session = backend.session();
    log_in(&session, "U1");

    let saved = session.coupons().save_coupon(&cafe()).await.unwrap();

    assert_eq!(saved.origin, SaveOrigin::Local);
    assert!(saved.coupon.coupon_id.is_local());
}

#[tokio::test]
async fn test_save_without_identity_never_calls_backend() {
    let backend = FakeBackend::start().await;
    let session = backend.session();

    let saved = session.coupons().save_coupon(&cafe()).await.unwrap();

    assert_eq!(saved.origin, SaveOrigin::Local);
    assert!(backend.requests().is_empty());
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_load_merges_local_usage_by_or() {
    let backend = FakeBackend::start().await;
    backend.reply(
        "getUserCoupons",
        json!({
            "status": "success",
            "coupons": [
                {"couponId": "C1", "shopName": "Cafe A", "used": false},
                {"couponId": "C2", "shopName": "Cafe B", "used": true},
                {"couponId": "C3", "shopName": "Cafe C", "used": "FALSE"},
            ]
        }),
    );
    let session = backend.session();
    log_in(&session, "U1");
    session
        .store()
        .record_usage(&CouponId::new("C1"), UsageEntry::redeemed(Utc::now()))
        .unwrap();

    let coupons = session.coupons().load_coupons().await;

    assert_eq!(coupons.len(), 3);
    assert_eq!(coupons[0].used, CouponState::Used);
    assert_eq!(coupons[1].used, CouponState::Used);
    assert_eq!(coupons[2].used, CouponState::Obtained);

    let request = &backend.requests_for("getUserCoupons")[0];
    assert_eq!(request.method, "GET");
    assert_eq!(request.param("userId"), Some("U1"));
}

#[tokio::test]
async fn test_load_accepts_data_field() {
    let backend = FakeBackend::start().await;
    backend.reply(
        "getUserCoupons",
        json!({"success": true, "data": [{"id": "C9", "店家名稱": "Cafe Z"}]}),
    );
    let session = backend.session();
    log_in(&session, "U1");

    let coupons = session.coupons().load_coupons().await;

    assert_eq!(coupons.len(), 1);
    assert_eq!(coupons[0].coupon_id.as_str(), "C9");
}

#[tokio::test]
async fn test_load_falls_back_to_local_list_on_server_error() {
    let backend = FakeBackend::start().await;
    backend.reply_status("getUserCoupons", 500, "internal error");
    let session = backend.session();
    log_in(&session, "U1");
    backend.reply("saveCoupon", json!({"success": false}));
    session.coupons().save_coupon(&cafe()).await.unwrap();

    let coupons = session.coupons().load_coupons().await;

    assert_eq!(coupons.len(), 1);
    assert!(coupons[0].coupon_id.is_local());
}

#[tokio::test]
async fn test_load_with_malformed_body_falls_back() {
    let backend = FakeBackend::start().await;
    backend.reply_status("getUserCoupons", 200, "<html>quota exceeded</html>");
    let session = backend.session();
    log_in(&session, "U1");

    assert!(session.coupons().load_coupons().await.is_empty());
}

// ============================================================================
// Redemption
// ============================================================================

#[tokio::test]
async fn test_verify_already_processed_counts_as_success() {
    let backend = FakeBackend::start().await;
    backend.reply(
        "verifyCoupon",
        json!({"success": false, "message": "Coupon already processed"}),
    );
    let session = backend.session();
    log_in(&session, "U1");
    let coupon = CouponId::new("C7");

    let outcome = session.coupons().verify_coupon(&coupon).await.unwrap();

    assert_eq!(outcome, Redemption::AlreadyProcessed);
    assert_eq!(
        session.store().usage(&coupon).unwrap().used,
        CouponState::Used
    );

    let request = &backend.requests_for("verifyCoupon")[0];
    assert_eq!(request.param("couponId"), Some("C7"));
    assert_eq!(request.param("userId"), Some("U1"));
}

#[tokio::test]
async fn test_verify_uses_single_action_name() {
    let backend = FakeBackend::start().await;
    backend.reply("verifyCoupon", json!({"success": false, "message": "not found"}));
    let session = backend.session();
    log_in(&session, "U1");

    let outcome = session
        .coupons()
        .verify_coupon(&CouponId::new("C8"))
        .await
        .unwrap();

    assert_eq!(outcome, Redemption::RecordedLocally);
    let actions: Vec<String> = backend.requests().into_iter().map(|r| r.action).collect();
    assert_eq!(actions, vec!["verifyCoupon".to_string()]);
}

#[tokio::test]
async fn test_abandon_offline_records_locally() {
    let session = offline_session().await;
    log_in(&session, "U1");
    let coupon = CouponId::new("C3");

    let outcome = session.coupons().abandon_coupon(&coupon).await.unwrap();

    assert_eq!(outcome, Redemption::RecordedLocally);
    let entry = session.store().usage(&coupon).unwrap();
    assert_eq!(entry.used, CouponState::Abandoned);
    assert!(entry.abandoned_at.is_some());
}

#[tokio::test]
async fn test_terminal_state_is_idempotent() {
    let backend = FakeBackend::start().await;
    backend.reply("verifyCoupon", json!({"success": true}));
    backend.reply("abandonCoupon", json!({"success": true}));
    let session = backend.session();
    log_in(&session, "U1");
    let coupon = CouponId::new("C5");

    let first = session.coupons().verify_coupon(&coupon).await.unwrap();
    let second = session.coupons().verify_coupon(&coupon).await.unwrap();
    let third = session.coupons().abandon_coupon(&coupon).await.unwrap();

    assert_eq!(first, Redemption::Confirmed);
    assert_eq!(second, Redemption::AlreadyFinal(CouponState::Used));
    assert_eq!(third, Redemption::AlreadyFinal(CouponState::Used));
    assert_eq!(
        session.store().usage(&coupon).unwrap().used,
        CouponState::Used
    );
    assert_eq!(backend.requests_for("verifyCoupon").len(), 1);
    assert!(backend.requests_for("abandonCoupon").is_empty());
}

#[tokio::test]
async fn test_concurrent_redemptions_keep_one_terminal_state() {
    let backend = FakeBackend::start().await;
    backend.reply("verifyCoupon", json!({"success": true}));
    backend.reply("abandonCoupon", json!({"success": true}));
    let session = backend.session();
    log_in(&session, "U1");
    let coupon = CouponId::new("C6");
    let coupons = session.coupons();

    let (verified, abandoned) = tokio::join!(
        coupons.verify_coupon(&coupon),
        coupons.abandon_coupon(&coupon)
    );
    let verified = verified.unwrap();
    let abandoned = abandoned.unwrap();

    let state = session.store().usage(&coupon).unwrap().used;
    assert!(state.is_terminal());
    let settled_first = [verified, abandoned]
        .iter()
        .filter(|outcome| !matches!(outcome, Redemption::AlreadyFinal(_)))
        .count();
    assert_eq!(settled_first, 1);
}
