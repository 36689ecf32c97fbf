//! Integration tests for the registration gate.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use board_coupon_client::services::{
    FROM_REGISTRATION_FLAG, ProfileUpdate, RegistrationCheck, RegistrationError,
    RegistrationForm,
};
use board_coupon_client::{KeyValueStore, Redirect};
use board_coupon_core::{RegistrationRecord, UserId, UserProfile};
use board_coupon_integration_tests::{
    FakeBackend, RecordingNavigator, Tab, log_in, offline_session,
};
use serde_json::json;

fn form(nickname: &str, county: &str) -> RegistrationForm {
    RegistrationForm {
        nickname: nickname.to_string(),
        county: county.to_string(),
        status_message: String::new(),
    }
}

// ============================================================================
// Check
// ============================================================================

#[tokio::test]
async fn test_complete_profile_repairs_missing_index_entry() {
    let session = offline_session().await;
    log_in(&session, "U1");
    let user = UserId::new("U1");
    session
        .store()
        .set_profile(&UserProfile::new(user.clone(), "Mika", "Taipei"))
        .unwrap();
    assert!(session.store().registration(&user).is_none());

    let check = session.registration().check_registration(&user).await;

    assert_eq!(check, RegistrationCheck::Repaired);
    let record = session.store().registration(&user).unwrap();
    assert!(record.registered);
    assert_eq!(record.auto_added, Some(true));
}

#[tokio::test]
async fn test_profile_of_another_user_does_not_count() {
    let session = offline_session().await;
    let user = UserId::new("U1");
    session
        .store()
        .set_profile(&UserProfile::new(UserId::new("U2"), "Ren", "Tainan"))
        .unwrap();

    assert!(!session.registration().is_profile_complete(&user));
    assert_eq!(
        session.registration().check_registration(&user).await,
        RegistrationCheck::Unregistered
    );
    assert!(session.store().registration(&user).is_none());
}

#[tokio::test]
async fn test_offline_index_entry_counts() {
    let session = offline_session().await;
    let user = UserId::new("U1");
    let profile = UserProfile::new(user.clone(), "Mika", "Taipei");
    session
        .store()
        .record_registration(&user, RegistrationRecord::completed(&profile))
        .unwrap();

    assert_eq!(
        session.registration().check_registration(&user).await,
        RegistrationCheck::LocalIndex
    );
}

#[tokio::test]
async fn test_backend_denial_overrides_local_entry() {
    let backend = FakeBackend::start().await;
    backend.reply(
        "verifyRegistration",
        json!({"success": true, "registered": false}),
    );
    let session = backend.session();
    let user = UserId::new("U1");
    let profile = UserProfile::new(user.clone(), "Mika", "Taipei");
    session.store().set_profile(&profile).unwrap();
    session
        .store()
        .record_registration(&user, RegistrationRecord::completed(&profile))
        .unwrap();

    let check = session.registration().check_registration(&user).await;

    assert_eq!(check, RegistrationCheck::Denied { revoked: true });
    assert!(session.store().registration(&user).is_none());

    let request = &backend.requests_for("verifyRegistration")[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.param("userId"), Some("U1"));
}

#[tokio::test]
async fn test_backend_confirmation_is_mirrored_locally() {
    let backend = FakeBackend::start().await;
    backend.reply(
        "verifyRegistration",
        json!({"success": true, "registered": true}),
    );
    let session = backend.session();
    let user = UserId::new("U1");

    let check = session.registration().check_registration(&user).await;

    assert_eq!(check, RegistrationCheck::Verified);
    let record = session.store().registration(&user).unwrap();
    assert_eq!(record.backend_verified, Some(true));
}

#[tokio::test]
async fn test_backend_failure_uses_local_heuristic() {
    let backend = FakeBackend::start().await;
    backend.reply(
        "verifyRegistration",
        json!({"success": false, "message": "script error"}),
    );
    let session = backend.session();
    let user = UserId::new("U1");

    assert_eq!(
        session.registration().check_registration(&user).await,
        RegistrationCheck::Unregistered
    );
}

// ============================================================================
// Enforce
// ============================================================================

#[tokio::test]
async fn test_enforce_without_identity_redirects_to_login() {
    let session = offline_session().await;
    let navigator = RecordingNavigator::new();

    assert!(!session.registration().enforce_registration(&navigator).await);
    assert_eq!(
        navigator.redirects(),
        vec![Redirect::Login("index.html".to_string())]
    );
}

#[tokio::test]
async fn test_enforce_redirects_unregistered_user() {
    let session = offline_session().await;
    log_in(&session, "U1");
    let navigator = RecordingNavigator::new();

    assert!(!session.registration().enforce_registration(&navigator).await);
    assert_eq!(
        navigator.redirects(),
        vec![Redirect::Registration("register.html".to_string())]
    );
}

#[tokio::test]
async fn test_return_from_registration_page_redirects_at_most_once() {
    let backend = FakeBackend::start().await;
    backend.reply("completeRegistration", json!({"success": true}));
    backend.reply(
        "verifyRegistration",
        json!({"success": true, "registered": false}),
    );
    let tab = Tab::new();

    let register_page = backend.page_load(&tab);
    log_in(&register_page, "U1");
    register_page
        .registration()
        .complete_registration(form("Mika", "Taipei"))
        .await
        .unwrap();
    drop(register_page);

    let navigator = RecordingNavigator::new();
    let game_page = backend.page_load(&tab);
    assert!(!game_page.registration().enforce_registration(&navigator).await);
    assert!(navigator.redirects().is_empty());
    drop(game_page);

    let next_page = backend.page_load(&tab);
    assert!(!next_page.registration().enforce_registration(&navigator).await);
    assert_eq!(
        navigator.redirects(),
        vec![Redirect::Registration("register.html".to_string())]
    );
}

#[tokio::test]
async fn test_marked_return_is_consumed_by_next_page() {
    let backend = FakeBackend::start().await;
    backend.reply(
        "verifyRegistration",
        json!({"success": true, "registered": false}),
    );
    let tab = Tab::new();
    let navigator = RecordingNavigator::new();

    let first = backend.page_load(&tab);
    log_in(&first, "U1");
    first.registration().mark_from_registration().unwrap();
    drop(first);

    let second = backend.page_load(&tab);
    assert!(!second.registration().enforce_registration(&navigator).await);
    assert!(navigator.redirects().is_empty());
    assert!(tab.session.get(FROM_REGISTRATION_FLAG).is_none());

    assert!(!second.registration().enforce_registration(&navigator).await);
    assert_eq!(navigator.redirects().len(), 1);
}

#[tokio::test]
async fn test_enforce_passes_registered_user() {
    let backend = FakeBackend::start().await;
    backend.reply(
        "verifyRegistration",
        json!({"success": true, "registered": true}),
    );
    let session = backend.session();
    log_in(&session, "U1");
    let navigator = RecordingNavigator::new();

    assert!(session.registration().enforce_registration(&navigator).await);
    assert!(navigator.redirects().is_empty());
}

// ============================================================================
// Complete and update
// ============================================================================

#[tokio::test]
async fn test_complete_registration_writes_profile_and_posts() {
    let backend = FakeBackend::start().await;
    backend.reply("completeRegistration", json!({"success": true}));
    let session = backend.session();
    log_in(&session, "U1");

    let completed = session
        .registration()
        .complete_registration(form("Mika", "臺北市"))
        .await
        .unwrap();

    assert!(completed.backend_confirmed);
    assert_eq!(completed.profile.level, 1);
    assert_eq!(completed.profile.coins, 0);

    let user = UserId::new("U1");
    assert!(session.registration().is_profile_complete(&user));
    let record = session.store().registration(&user).unwrap();
    assert_eq!(record.backend_verified, Some(true));
    assert_eq!(record.county.as_deref(), Some("臺北市"));

    let request = &backend.requests_for("completeRegistration")[0];
    assert_eq!(request.param("nickname"), Some("Mika"));
    assert_eq!(request.param("county"), Some("臺北市"));
    assert_eq!(request.param("displayName"), Some("Tester"));
}

#[tokio::test]
async fn test_complete_registration_offline_is_kept_locally() {
    let session = offline_session().await;
    log_in(&session, "U1");

    let completed = session
        .registration()
        .complete_registration(form("Mika", "Taipei"))
        .await
        .unwrap();

    assert!(!completed.backend_confirmed);
    let navigator = RecordingNavigator::new();
    assert!(session.registration().enforce_registration(&navigator).await);
    assert!(navigator.redirects().is_empty());
}

#[tokio::test]
async fn test_complete_registration_rejects_blank_fields() {
    let session = offline_session().await;
    log_in(&session, "U1");

    let result = session
        .registration()
        .complete_registration(form("Mika", "  "))
        .await;

    assert!(matches!(result, Err(RegistrationError::MissingField("county"))));
    assert!(session.store().profile().is_none());
}

#[tokio::test]
async fn test_complete_registration_requires_identity() {
    let session = offline_session().await;

    let result = session
        .registration()
        .complete_registration(form("Mika", "Taipei"))
        .await;

    assert!(matches!(result, Err(RegistrationError::NotLoggedIn)));
}

#[tokio::test]
async fn test_update_profile_patches_fields() {
    let session = offline_session().await;
    log_in(&session, "U1");
    session
        .registration()
        .complete_registration(form("Mika", "Taipei"))
        .await
        .unwrap();

    let updated = session
        .registration()
        .update_profile(ProfileUpdate {
            coins: Some(120),
            level: Some(3),
            ..ProfileUpdate::default()
        })
        .unwrap()
        .unwrap();

    assert_eq!(updated.nickname, "Mika");
    assert_eq!(updated.coins, 120);
    assert_eq!(session.store().profile().unwrap().level, 3);
}
