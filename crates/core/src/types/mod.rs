//! Core types for the Board Coupon client.
//!
//! This module provides type-safe wrappers for the game's domain records.

pub mod cell;
pub mod coupon;
pub mod id;
pub mod identity;
pub mod profile;
pub mod shop;

pub use cell::{CellConfig, CellType, SpecialEvent, category_for};
pub use coupon::{CouponRecord, CouponState, UsageEntry};
pub use id::*;
pub use identity::UserIdentity;
pub use profile::{RegistrationRecord, UserProfile};
pub use shop::{SHOP_CATEGORIES, ShopRecord};
