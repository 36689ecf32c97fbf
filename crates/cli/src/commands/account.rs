//! Identity, registration and profile commands.

use board_coupon_client::services::{ProfileUpdate, RegistrationForm};
use board_coupon_client::{BootOutcome, NoSdk};
use tracing::{info, warn};
use url::Url;

use super::{CliSession, CommandError, TerminalNavigator};

/// Record the identity carried by a login page URL.
///
/// # Errors
///
/// Returns `CommandError` if `url` is not a URL or carries no user id.
pub fn login(session: &CliSession, url: &str) -> Result<(), CommandError> {
    let url = Url::parse(url)?;
    let identity = session
        .identity()
        .consume_query_login(&url, &TerminalNavigator)
        .ok_or(CommandError::NoLoginParameters)?;

    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(identity.user_id.to_string()),
            ..Default::default()
        }));
    });

    info!(
        user_id = %identity.user_id,
        display_name = %identity.display_name,
        "Logged in"
    );
    Ok(())
}

/// Run the page bootstrap: identity resolution and the registration gate.
pub async fn check(session: &CliSession) {
    match session
        .bootstrap(None::<&NoSdk>, &TerminalNavigator, None)
        .await
    {
        BootOutcome::Ready(user) => info!(user_id = %user.user_id, "Ready to play"),
        BootOutcome::NeedsLogin => warn!("Not logged in; run `bc-cli login <url>`"),
        BootOutcome::Unregistered(user) => {
            warn!(user_id = %user.user_id, "Not registered");
        }
    }
}

/// Print what is stored locally.
pub fn status(session: &CliSession) {
    let status = session.status();

    match &status.identity {
        Some(identity) => info!(
            user_id = %identity.user_id,
            display_name = %identity.display_name,
            registered = status.registered_locally,
            "Logged in"
        ),
        None => info!("Not logged in"),
    }

    if let Some(profile) = &status.profile {
        info!(
            nickname = %profile.nickname,
            county = %profile.county,
            level = profile.level,
            coins = profile.coins,
            "Profile"
        );
    }

    info!(
        saved = status.local_coupons,
        used = status.used_coupons,
        abandoned = status.abandoned_coupons,
        "Coupons on this device"
    );
}

/// Complete registration for the logged-in user.
///
/// # Errors
///
/// Returns `CommandError` if nobody is logged in, a field is blank, or the
/// state file cannot be written.
pub async fn register(
    session: &CliSession,
    nickname: String,
    county: String,
    status_message: String,
) -> Result<(), CommandError> {
    let completed = session
        .registration()
        .complete_registration(RegistrationForm {
            nickname,
            county,
            status_message,
        })
        .await?;

    if completed.backend_confirmed {
        info!(nickname = %completed.profile.nickname, "Registered");
    } else {
        warn!(
            nickname = %completed.profile.nickname,
            "Registered on this device; the backend did not confirm"
        );
    }
    Ok(())
}

/// Change profile fields.
///
/// # Errors
///
/// Returns `CommandError` if there is no profile or it cannot be written.
pub fn update_profile(
    session: &CliSession,
    nickname: Option<String>,
    county: Option<String>,
    level: Option<u32>,
    coins: Option<u64>,
) -> Result<(), CommandError> {
    let profile = session
        .registration()
        .update_profile(ProfileUpdate {
            nickname,
            county,
            level,
            coins,
            status_message: None,
        })?
        .ok_or(CommandError::NoProfile)?;

    info!(
        nickname = %profile.nickname,
        county = %profile.county,
        level = profile.level,
        coins = profile.coins,
        "Profile updated"
    );
    Ok(())
}

/// Delete all local data.
///
/// # Errors
///
/// Returns `CommandError` if the state file cannot be written.
pub fn reset(session: &CliSession) -> Result<(), CommandError> {
    session.clear_all()?;
    info!("Local data cleared");
    Ok(())
}
