//! Board Coupon client library.
//!
//! Client side of the promotional board game: players roll across a board of
//! merchant cells, collect coupons and redeem them in store.
//!
//! # Architecture
//!
//! - [`gateway`] - One HTTP endpoint selected by an `action` parameter;
//!   every reply becomes an [`Envelope`](gateway::Envelope), never an error
//! - [`store`] - Key-value persistence and the typed profile documents
//! - [`services`] - Shops, board cells, coupons and the registration gate
//! - [`identity`] - Login SDK adapter and query-string login
//! - [`session`] - Per-page context tying the above together
//!
//! Remote failures are compensated locally (built-in shop list, synthesized
//! cells, locally held coupons and usage) so the game keeps working when the
//! backend does not answer.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod gateway;
pub mod identity;
pub mod navigator;
pub mod services;
pub mod session;
pub mod store;

pub use config::{CellSource, ClientConfig, ConfigError};
pub use gateway::{Action, Envelope, Form, Gateway, GatewayError};
pub use identity::{IdentityAdapter, IdentityError, IdentityProvider, LoginOutcome, NoSdk};
pub use navigator::{Navigator, Redirect};
pub use session::{BootOutcome, Session, SessionStatus};
pub use store::{FileStore, KeyValueStore, MemoryStore, ProfileStore, StorageError};
