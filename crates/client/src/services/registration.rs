//! Registration gate.
//!
//! The backend decides whether a user is registered. Its answer is mirrored
//! into the local registered-users index, including removal of entries it
//! denies. When the backend cannot answer, the local heuristic applies: an
//! index entry, or a complete profile for the user (which recreates the
//! missing index entry).

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use board_coupon_core::{RegistrationRecord, UserId, UserIdentity, UserProfile};

use crate::config::ClientConfig;
use crate::gateway::{Action, Form, Gateway};
use crate::navigator::{Navigator, Redirect};
use crate::store::{KeyValueStore, MemoryStore, ProfileStore, StorageError};

/// Session flag set when the user arrives from the registration page.
pub const FROM_REGISTRATION_FLAG: &str = "fromRegistration";

/// Errors from completing registration.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("No logged-in user")]
    NotLoggedIn,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Outcome of [`RegistrationGate::check_registration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationCheck {
    /// The backend confirmed the registration.
    Verified,
    /// The backend denied it; `revoked` tells whether a stale local entry
    /// was removed.
    Denied { revoked: bool },
    /// Backend unavailable; the local index has an entry.
    LocalIndex,
    /// Backend unavailable; a complete profile was found and the index entry
    /// recreated from it.
    Repaired,
    /// Backend unavailable and nothing local indicates registration.
    Unregistered,
}

impl RegistrationCheck {
    #[must_use]
    pub const fn is_registered(self) -> bool {
        matches!(self, Self::Verified | Self::LocalIndex | Self::Repaired)
    }
}

/// Fields collected by the registration form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    pub nickname: String,
    pub county: String,
    pub status_message: String,
}

/// Result of [`RegistrationGate::complete_registration`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedRegistration {
    pub profile: UserProfile,
    /// Whether the backend accepted the registration.
    pub backend_confirmed: bool,
}

/// Partial profile change. `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub nickname: Option<String>,
    pub county: Option<String>,
    pub level: Option<u32>,
    pub coins: Option<u64>,
    pub status_message: Option<String>,
}

impl ProfileUpdate {
    fn apply(self, profile: &mut UserProfile) {
        if let Some(nickname) = self.nickname {
            profile.nickname = nickname;
        }
        if let Some(county) = self.county {
            profile.county = county;
        }
        if let Some(level) = self.level {
            profile.level = level;
        }
        if let Some(coins) = self.coins {
            profile.coins = coins;
        }
        if let Some(status_message) = self.status_message {
            profile.status_message = status_message;
        }
    }
}

/// Decides whether the current user may play.
///
/// `flags` is the host's session-scoped store (tab lifetime, not page
/// lifetime): the return-from-registration flag must survive the page load
/// between the registration page and the game.
#[derive(Debug)]
pub struct RegistrationGate<'a, S, F = MemoryStore> {
    gateway: &'a Gateway,
    store: &'a ProfileStore<S>,
    flags: &'a F,
    config: &'a ClientConfig,
}

impl<'a, S: KeyValueStore, F: KeyValueStore> RegistrationGate<'a, S, F> {
    pub const fn new(
        gateway: &'a Gateway,
        store: &'a ProfileStore<S>,
        flags: &'a F,
        config: &'a ClientConfig,
    ) -> Self {
        Self {
            gateway,
            store,
            flags,
            config,
        }
    }

    /// Whether the stored profile belongs to `user_id` and has every
    /// required field.
    pub fn is_profile_complete(&self, user_id: &UserId) -> bool {
        self.store
            .profile()
            .is_some_and(|profile| profile.is_complete_for(user_id))
    }

    /// Ask the backend whether `user_id` is registered, falling back to local
    /// records when it cannot answer.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn check_registration(&self, user_id: &UserId) -> RegistrationCheck {
        let form = Form::new().field("userId", user_id.as_str());
        let envelope = self.gateway.call(Action::VerifyRegistration, form).await;

        if envelope.is_success() {
            match envelope.field::<bool>("registered") {
                Some(true) => {
                    self.mirror_verified(user_id);
                    info!("Backend confirmed registration");
                    return RegistrationCheck::Verified;
                }
                Some(false) => {
                    let revoked = self.store.remove_registration(user_id).unwrap_or_else(|e| {
                        warn!(error = %e, "Failed to remove stale registration entry");
                        false
                    });
                    info!(revoked, "Backend reports user is not registered");
                    return RegistrationCheck::Denied { revoked };
                }
                None => warn!("Registration reply has no registered flag, checking locally"),
            }
        } else {
            warn!(
                message = envelope.message().unwrap_or("unknown error"),
                "Registration check failed, checking locally"
            );
        }

        self.check_locally(user_id)
    }

    /// Make sure a registered user is present, redirecting otherwise.
    ///
    /// Returns `true` when play may continue. Without an identity the host is
    /// sent to the login page. An unregistered user is sent to the
    /// registration page, unless they just came from it, in which case the
    /// flag is consumed and no redirect happens.
    #[instrument(skip_all)]
    pub async fn enforce_registration<N: Navigator>(&self, navigator: &N) -> bool {
        let Some(identity) = self.store.identity() else {
            warn!("No logged-in user, redirecting to login");
            navigator.redirect(&Redirect::Login(self.config.login_url.clone()));
            return false;
        };

        let check = self.check_registration(&identity.user_id).await;
        let from_registration = self.take_from_registration();

        if check.is_registered() {
            debug!(user_id = %identity.user_id, ?check, "Registration satisfied");
            return true;
        }

        if from_registration {
            warn!(
                user_id = %identity.user_id,
                "Still unregistered right after registration, not redirecting again"
            );
            return false;
        }

        info!(user_id = %identity.user_id, "Redirecting to registration");
        navigator.redirect(&Redirect::Registration(
            self.config.registration_url.clone(),
        ));
        false
    }

    /// Register the logged-in user with `form`.
    ///
    /// The profile and index entry are written locally first; the backend
    /// call is best-effort.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError` if no user is logged in, a required field
    /// is blank, or local storage cannot be written.
    #[instrument(skip_all)]
    pub async fn complete_registration(
        &self,
        form: RegistrationForm,
    ) -> Result<CompletedRegistration, RegistrationError> {
        let identity = self.store.identity().ok_or(RegistrationError::NotLoggedIn)?;

        let mut profile = UserProfile::new(
            identity.user_id.clone(),
            form.nickname.trim(),
            form.county.trim(),
        );
        if let Some(field) = profile.missing_fields().first().copied() {
            return Err(RegistrationError::MissingField(field));
        }
        profile.display_name.clone_from(&identity.display_name);
        profile.picture_url.clone_from(&identity.picture_url);
        profile.status_message = form.status_message;

        self.store.set_profile(&profile)?;
        self.store
            .record_registration(&identity.user_id, RegistrationRecord::completed(&profile))?;

        let backend_confirmed = self.post_registration(&identity, &profile).await;
        if backend_confirmed {
            self.store
                .record_registration(&identity.user_id, RegistrationRecord::verified(Some(&profile)))?;
        }

        self.flags.set(FROM_REGISTRATION_FLAG, "true")?;
        info!(user_id = %identity.user_id, backend_confirmed, "Registration completed");

        Ok(CompletedRegistration {
            profile,
            backend_confirmed,
        })
    }

    /// Patch the stored profile. Returns `None` when there is no profile.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the profile cannot be written.
    pub fn update_profile(&self, update: ProfileUpdate) -> Result<Option<UserProfile>, StorageError> {
        self.store.update_profile(|profile| update.apply(profile))
    }

    /// Note that the user is arriving from the registration page.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the flag cannot be written.
    pub fn mark_from_registration(&self) -> Result<(), StorageError> {
        self.flags.set(FROM_REGISTRATION_FLAG, "true")
    }

    fn take_from_registration(&self) -> bool {
        let set = self.flags.get(FROM_REGISTRATION_FLAG).is_some();
        if set && let Err(e) = self.flags.remove(FROM_REGISTRATION_FLAG) {
            warn!(error = %e, "Failed to clear registration flag");
        }
        set
    }

    fn check_locally(&self, user_id: &UserId) -> RegistrationCheck {
        if self
            .store
            .registration(user_id)
            .is_some_and(|record| record.registered)
        {
            return RegistrationCheck::LocalIndex;
        }

        match self.store.profile() {
            Some(profile) if profile.is_complete_for(user_id) => {
                if let Err(e) = self
                    .store
                    .record_registration(user_id, RegistrationRecord::repaired_from(&profile))
                {
                    warn!(error = %e, "Failed to repair registration entry");
                }
                info!("Recreated registration entry from complete profile");
                RegistrationCheck::Repaired
            }
            _ => RegistrationCheck::Unregistered,
        }
    }

    fn mirror_verified(&self, user_id: &UserId) {
        if self
            .store
            .registration(user_id)
            .is_some_and(|record| record.backend_verified == Some(true))
        {
            return;
        }

        let profile = self
            .store
            .profile()
            .filter(|profile| profile.line_user_id == *user_id);
        if let Err(e) = self
            .store
            .record_registration(user_id, RegistrationRecord::verified(profile.as_ref()))
        {
            warn!(error = %e, "Failed to record verified registration");
        }
    }

    async fn post_registration(&self, identity: &UserIdentity, profile: &UserProfile) -> bool {
        let form = Form::new()
            .field("userId", identity.user_id.as_str())
            .field("displayName", identity.display_name.as_str())
            .field("pictureUrl", identity.picture_url.as_str())
            .field("nickname", profile.nickname.as_str())
            .field("county", profile.county.as_str())
            .field("statusMessage", profile.status_message.as_str());

        let envelope = self.gateway.call(Action::CompleteRegistration, form).await;
        if !envelope.is_success() {
            warn!(
                message = envelope.message().unwrap_or("unknown error"),
                "Backend did not confirm registration, kept locally"
            );
        }
        envelope.is_success()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_update_only_touches_given_fields() {
        let mut profile = UserProfile::new(UserId::new("U1"), "Mika", "Taipei");
        ProfileUpdate {
            coins: Some(30),
            county: Some("Tainan".into()),
            ..ProfileUpdate::default()
        }
        .apply(&mut profile);

        assert_eq!(profile.nickname, "Mika");
        assert_eq!(profile.county, "Tainan");
        assert_eq!(profile.coins, 30);
        assert_eq!(profile.level, 1);
    }

    #[test]
    fn test_registered_checks() {
        assert!(RegistrationCheck::Verified.is_registered());
        assert!(RegistrationCheck::Repaired.is_registered());
        assert!(!RegistrationCheck::Denied { revoked: true }.is_registered());
        assert!(!RegistrationCheck::Unregistered.is_registered());
    }
}
