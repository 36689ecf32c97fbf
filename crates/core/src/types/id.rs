//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. All identifiers in
//! this system are opaque strings issued by the identity SDK or the backend.

use chrono::Utc;

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Display` implementations
///
/// # Example
///
/// ```rust
/// # use board_coupon_core::define_id;
/// define_id!(ShopId);
/// define_id!(TicketId);
///
/// let shop_id = ShopId::new("S1");
/// let ticket_id = TicketId::new("S1");
///
/// // These are different types, so this won't compile:
/// // let _: ShopId = ticket_id;
/// assert_eq!(shop_id.as_str(), ticket_id.as_str());
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Whether the ID is the empty string.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id!(UserId);
define_id!(CouponId);

impl CouponId {
    /// Prefix of coupon ids generated on the device when the backend did not
    /// issue one.
    pub const LOCAL_PREFIX: &'static str = "LOCAL_";

    /// Prefix of coupon ids echoed locally after a backend save that did not
    /// return an id.
    pub const ECHO_PREFIX: &'static str = "COUPON_";

    /// Generate a device-local coupon id.
    ///
    /// The id is `LOCAL_<unix millis>_<8 hex chars>`; the random suffix keeps
    /// two saves in the same millisecond apart.
    #[must_use]
    pub fn generate_local() -> Self {
        Self::generate(Self::LOCAL_PREFIX)
    }

    /// Generate an id for a backend-accepted coupon the backend did not name.
    #[must_use]
    pub fn generate_echo() -> Self {
        Self::generate(Self::ECHO_PREFIX)
    }

    fn generate(prefix: &str) -> Self {
        let millis = Utc::now().timestamp_millis();
        let suffix: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(8)
            .collect();
        Self(format!("{prefix}{millis}_{suffix}"))
    }

    /// Whether this id was generated on the device rather than by the backend.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(Self::LOCAL_PREFIX)
    }
}
