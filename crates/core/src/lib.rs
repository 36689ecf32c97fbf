//! Board Coupon Core - Shared types library.
//!
//! This crate provides the domain records used across all Board Coupon
//! components:
//! - `client` - Session, remote gateway, local store and the coupon/registration logic
//! - `cli` - Command-line driver for the client
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no storage access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Identities, profiles, shops, coupons and board cells

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
