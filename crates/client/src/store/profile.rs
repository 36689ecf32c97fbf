//! Typed documents kept in the key-value store.

use std::collections::BTreeMap;

use board_coupon_core::{
    CouponId, CouponRecord, RegistrationRecord, UsageEntry, UserId, UserIdentity, UserProfile,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{KeyValueStore, StorageError};

/// Storage keys.
pub mod keys {
    /// Platform user id of the signed-in user.
    pub const LINE_USER_ID: &str = "lineUserId";

    /// Display name of the signed-in user.
    pub const LINE_DISPLAY_NAME: &str = "lineDisplayName";

    /// Avatar URL of the signed-in user.
    pub const LINE_PICTURE_URL: &str = "linePictureUrl";

    /// JSON [`UserProfile`](board_coupon_core::UserProfile).
    pub const USER_PROFILE: &str = "userProfile";

    /// JSON map of user id to registration record.
    pub const REGISTERED_USERS: &str = "registeredUsers";

    /// JSON array of coupons saved on this device.
    pub const LOCAL_COUPONS: &str = "localCoupons";

    /// JSON map of coupon id to usage entry.
    pub const USED_COUPONS: &str = "usedCoupons";

    /// Every key owned by the profile store.
    pub const ALL: &[&str] = &[
        LINE_USER_ID,
        LINE_DISPLAY_NAME,
        LINE_PICTURE_URL,
        USER_PROFILE,
        REGISTERED_USERS,
        LOCAL_COUPONS,
        USED_COUPONS,
    ];
}

/// Identity, profile, registration index and coupon documents over a
/// key-value backend.
///
/// Every mutation is a synchronous read-modify-write of one key, so two
/// operations interleaving at network awaits cannot lose each other's
/// updates to the same document.
#[derive(Debug)]
pub struct ProfileStore<S> {
    backend: S,
}

impl<S: KeyValueStore> ProfileStore<S> {
    pub const fn new(backend: S) -> Self {
        Self { backend }
    }

    /// The underlying key-value backend.
    pub const fn backend(&self) -> &S {
        &self.backend
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// The stored identity, if a user id is present.
    pub fn identity(&self) -> Option<UserIdentity> {
        let user_id = self
            .backend
            .get(keys::LINE_USER_ID)
            .filter(|id| !id.trim().is_empty())?;

        Some(UserIdentity::new(
            user_id,
            self.backend.get(keys::LINE_DISPLAY_NAME).unwrap_or_default(),
            self.backend.get(keys::LINE_PICTURE_URL).unwrap_or_default(),
        ))
    }

    /// Replace the stored identity wholesale.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend rejects a write.
    pub fn set_identity(&self, identity: &UserIdentity) -> Result<(), StorageError> {
        self.backend
            .set(keys::LINE_USER_ID, identity.user_id.as_str())?;
        self.backend
            .set(keys::LINE_DISPLAY_NAME, &identity.display_name)?;
        self.backend
            .set(keys::LINE_PICTURE_URL, &identity.picture_url)
    }

    // =========================================================================
    // Profile
    // =========================================================================

    /// The stored profile document.
    pub fn profile(&self) -> Option<UserProfile> {
        self.read_json(keys::USER_PROFILE)
    }

    /// Replace the stored profile document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if serialization or the write fails.
    pub fn set_profile(&self, profile: &UserProfile) -> Result<(), StorageError> {
        self.write_json(keys::USER_PROFILE, profile)
    }

    /// Apply `change` to the stored profile, if there is one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if serialization or the write fails.
    pub fn update_profile<F>(&self, change: F) -> Result<Option<UserProfile>, StorageError>
    where
        F: FnOnce(&mut UserProfile),
    {
        let Some(mut profile) = self.profile() else {
            return Ok(None);
        };
        change(&mut profile);
        self.set_profile(&profile)?;
        Ok(Some(profile))
    }

    // =========================================================================
    // Registration index
    // =========================================================================

    /// The full registered-users index.
    pub fn registered_users(&self) -> BTreeMap<UserId, RegistrationRecord> {
        self.read_json(keys::REGISTERED_USERS).unwrap_or_default()
    }

    /// The index entry for `user_id`.
    pub fn registration(&self, user_id: &UserId) -> Option<RegistrationRecord> {
        self.registered_users().remove(user_id)
    }

    /// Insert or replace the index entry for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the stored index is unreadable, or if
    /// serialization or the write fails.
    pub fn record_registration(
        &self,
        user_id: &UserId,
        record: RegistrationRecord,
    ) -> Result<(), StorageError> {
        let mut index: BTreeMap<UserId, RegistrationRecord> =
            self.load_json(keys::REGISTERED_USERS)?.unwrap_or_default();
        index.insert(user_id.clone(), record);
        self.write_json(keys::REGISTERED_USERS, &index)
    }

    /// Delete the index entry for `user_id`, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the stored index is unreadable, or if
    /// serialization or the write fails.
    pub fn remove_registration(&self, user_id: &UserId) -> Result<bool, StorageError> {
        let mut index: BTreeMap<UserId, RegistrationRecord> =
            self.load_json(keys::REGISTERED_USERS)?.unwrap_or_default();
        if index.remove(user_id).is_none() {
            return Ok(false);
        }
        self.write_json(keys::REGISTERED_USERS, &index)?;
        Ok(true)
    }

    // =========================================================================
    // Coupons
    // =========================================================================

    /// Coupons saved on this device, oldest first.
    pub fn local_coupons(&self) -> Vec<CouponRecord> {
        self.read_json(keys::LOCAL_COUPONS).unwrap_or_default()
    }

    /// Append a coupon to the local list, returning the new list length.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Json` if the stored list is unreadable; it is
    /// left untouched. Also fails if serialization or the write fails.
    pub fn push_local_coupon(&self, coupon: CouponRecord) -> Result<usize, StorageError> {
        let mut coupons: Vec<CouponRecord> =
            self.load_json(keys::LOCAL_COUPONS)?.unwrap_or_default();
        coupons.push(coupon);
        self.write_json(keys::LOCAL_COUPONS, &coupons)?;
        Ok(coupons.len())
    }

    /// The full coupon-usage index.
    pub fn used_coupons(&self) -> BTreeMap<CouponId, UsageEntry> {
        self.read_json(keys::USED_COUPONS).unwrap_or_default()
    }

    /// The usage entry for `coupon_id`.
    pub fn usage(&self, coupon_id: &CouponId) -> Option<UsageEntry> {
        self.used_coupons().remove(coupon_id)
    }

    /// Record a terminal usage entry for `coupon_id`.
    ///
    /// An existing terminal entry is kept as-is and returned instead, so a
    /// coupon never moves between `used` and `abandoned`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Json` if the stored index is unreadable; it is
    /// left untouched. Also fails if serialization or the write fails.
    pub fn record_usage(
        &self,
        coupon_id: &CouponId,
        entry: UsageEntry,
    ) -> Result<UsageEntry, StorageError> {
        let mut index: BTreeMap<CouponId, UsageEntry> =
            self.load_json(keys::USED_COUPONS)?.unwrap_or_default();
        if let Some(existing) = index.get(coupon_id)
            && existing.used.is_terminal()
        {
            return Ok(existing.clone());
        }
        index.insert(coupon_id.clone(), entry.clone());
        self.write_json(keys::USED_COUPONS, &index)?;
        Ok(entry)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Remove every document this store owns.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend rejects a removal.
    pub fn clear_all(&self) -> Result<(), StorageError> {
        for key in keys::ALL {
            self.backend.remove(key)?;
        }
        tracing::info!("Cleared all local data");
        Ok(())
    }

    /// Lenient read for queries: an unreadable document reads as absent.
    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.load_json(key).unwrap_or_else(|e| {
            tracing::warn!(key, error = %e, "Ignoring unreadable stored document");
            None
        })
    }

    /// Strict read for read-modify-write paths, so an unreadable document is
    /// never replaced by a fresh one.
    fn load_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        self.backend
            .get(key)
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(StorageError::from)
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.backend.set(key, &raw)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use board_coupon_core::{CouponState, ShopRecord};

    use super::*;
    use crate::store::MemoryStore;

    fn store() -> ProfileStore<MemoryStore> {
        ProfileStore::new(MemoryStore::new())
    }

    #[test]
    fn test_identity_requires_user_id() {
        let store = store();
        assert_eq!(store.identity(), None);

        store.backend().set(keys::LINE_DISPLAY_NAME, "Mika").unwrap();
        assert_eq!(store.identity(), None);

        let identity = UserIdentity::new("U1", "Mika", "https://img/u1.png");
        store.set_identity(&identity).unwrap();
        assert_eq!(store.identity(), Some(identity));
    }

    #[test]
    fn test_identity_is_replaced_wholesale() {
        let store = store();
        store
            .set_identity(&UserIdentity::new("U1", "Mika", "https://img/u1.png"))
            .unwrap();
        store.set_identity(&UserIdentity::new("U2", "Ren", "")).unwrap();

        let identity = store.identity().unwrap();
        assert_eq!(identity.user_id.as_str(), "U2");
        assert_eq!(identity.picture_url, "");
    }

    #[test]
    fn test_update_profile_without_profile_is_noop() {
        let store = store();
        let updated = store.update_profile(|p| p.coins += 10).unwrap();
        assert!(updated.is_none());
        assert!(store.profile().is_none());
    }

    #[test]
    fn test_update_profile_persists() {
        let store = store();
        store
            .set_profile(&UserProfile::new(UserId::new("U1"), "Mika", "Taipei"))
            .unwrap();

        store.update_profile(|p| p.coins += 10).unwrap();
        assert_eq!(store.profile().unwrap().coins, 10);
    }

    #[test]
    fn test_registration_index_insert_and_remove() {
        let store = store();
        let user = UserId::new("U1");
        let profile = UserProfile::new(user.clone(), "Mika", "Taipei");

        store
            .record_registration(&user, RegistrationRecord::completed(&profile))
            .unwrap();
        assert!(store.registration(&user).is_some());

        assert!(store.remove_registration(&user).unwrap());
        assert!(!store.remove_registration(&user).unwrap());
        assert!(store.registration(&user).is_none());
    }

    #[test]
    fn test_terminal_usage_is_never_overwritten() {
        let store = store();
        let coupon = CouponId::new("C1");

        store
            .record_usage(&coupon, UsageEntry::redeemed(Utc::now()))
            .unwrap();
        let kept = store
            .record_usage(&coupon, UsageEntry::abandoned(Utc::now()))
            .unwrap();

        assert_eq!(kept.used, CouponState::Used);
        assert_eq!(store.usage(&coupon).unwrap().used, CouponState::Used);
    }

    #[test]
    fn test_corrupt_document_reads_as_empty() {
        let store = store();
        store.backend().set(keys::LOCAL_COUPONS, "{oops").unwrap();
        assert!(store.local_coupons().is_empty());
    }

    #[test]
    fn test_corrupt_coupon_list_is_not_overwritten() {
        let store = store();
        store.backend().set(keys::LOCAL_COUPONS, "{oops").unwrap();

        let shop = ShopRecord::fallback_list().remove(0);
        let result =
            store.push_local_coupon(CouponRecord::obtained(CouponId::generate_local(), &shop));

        assert!(matches!(result, Err(StorageError::Json(_))));
        assert_eq!(store.backend().get(keys::LOCAL_COUPONS).as_deref(), Some("{oops"));
    }

    #[test]
    fn test_corrupt_usage_index_is_not_overwritten() {
        let store = store();
        store.backend().set(keys::USED_COUPONS, "[1,").unwrap();

        let result = store.record_usage(&CouponId::new("C1"), UsageEntry::redeemed(Utc::now()));

        assert!(matches!(result, Err(StorageError::Json(_))));
        assert_eq!(store.backend().get(keys::USED_COUPONS).as_deref(), Some("[1,"));
        assert!(store.usage(&CouponId::new("C1")).is_none());
    }

    #[test]
    fn test_corrupt_registration_index_is_not_overwritten() {
        let store = store();
        store.backend().set(keys::REGISTERED_USERS, "nope").unwrap();
        let user = UserId::new("U1");
        let profile = UserProfile::new(user.clone(), "Mika", "Taipei");

        assert!(store
            .record_registration(&user, RegistrationRecord::completed(&profile))
            .is_err());
        assert!(store.remove_registration(&user).is_err());
        assert_eq!(store.backend().get(keys::REGISTERED_USERS).as_deref(), Some("nope"));
    }

    #[test]
    fn test_clear_all_removes_every_key() {
        let store = store();
        store
            .set_identity(&UserIdentity::new("U1", "Mika", ""))
            .unwrap();
        store
            .set_profile(&UserProfile::new(UserId::new("U1"), "Mika", "Taipei"))
            .unwrap();
        store.backend().set("unrelated", "kept").unwrap();

        store.clear_all().unwrap();

        assert!(store.identity().is_none());
        assert!(store.profile().is_none());
        assert_eq!(store.backend().keys(), vec!["unrelated".to_string()]);
    }
}
