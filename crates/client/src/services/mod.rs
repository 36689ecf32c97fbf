//! Game-facing operations built on the gateway and the profile store.

pub mod cells;
pub mod coupons;
pub mod registration;
pub mod shops;

pub use cells::CellLoader;
pub use coupons::{CouponManager, Redemption, SaveOrigin, SavedCoupon};
pub use registration::{
    CompletedRegistration, FROM_REGISTRATION_FLAG, ProfileUpdate, RegistrationCheck,
    RegistrationError, RegistrationForm, RegistrationGate,
};
pub use shops::ShopCatalog;
