//! User identity as reported by the messaging-platform login SDK.

use serde::{Deserialize, Serialize};

use crate::types::id::UserId;

/// The signed-in user's identity.
///
/// Sourced from the identity SDK profile or from login query parameters.
/// Immutable for the lifetime of a session; a re-login replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    /// Stable platform user id.
    pub user_id: UserId,
    /// Display name shown in the host app.
    #[serde(default)]
    pub display_name: String,
    /// Avatar URL, empty when the user has none.
    #[serde(default)]
    pub picture_url: String,
}

impl UserIdentity {
    /// Create an identity from its three parts.
    #[must_use]
    pub fn new(
        user_id: impl Into<UserId>,
        display_name: impl Into<String>,
        picture_url: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            picture_url: picture_url.into(),
        }
    }
}
