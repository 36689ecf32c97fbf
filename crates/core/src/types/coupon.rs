//! Coupon records and redemption state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::types::id::CouponId;
use crate::types::shop::{RawShopFields, ShopRecord, first_text};

/// Lifecycle state of a coupon.
///
/// `Obtained` moves to exactly one of the terminal states and never leaves it.
///
/// On the wire the state is the `used` field: `false`, `true`, or the string
/// `"abandoned"`. Spreadsheet backends also send strings such as `"TRUE"` or
/// `"used"`, which are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CouponState {
    #[default]
    Obtained,
    Used,
    Abandoned,
}

impl CouponState {
    /// Whether the coupon can no longer change state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Used | Self::Abandoned)
    }

    /// Combine a remote state with the locally recorded one.
    ///
    /// Any terminal record wins; the remote state is preferred when both are
    /// terminal.
    #[must_use]
    pub fn merge(self, local: Option<Self>) -> Self {
        if self.is_terminal() {
            return self;
        }
        local.filter(|state| state.is_terminal()).unwrap_or(self)
    }

    fn from_wire(value: &Value) -> Self {
        match value {
            Value::Bool(true) => Self::Used,
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "abandoned" | "已放棄" => Self::Abandoned,
                "true" | "used" | "yes" | "1" | "已使用" | "已核銷" => Self::Used,
                _ => Self::Obtained,
            },
            Value::Number(n) if n.as_i64() == Some(1) => Self::Used,
            _ => Self::Obtained,
        }
    }
}

impl Serialize for CouponState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Obtained => serializer.serialize_bool(false),
            Self::Used => serializer.serialize_bool(true),
            Self::Abandoned => serializer.serialize_str("abandoned"),
        }
    }
}

impl<'de> Deserialize<'de> for CouponState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_wire(&value))
    }
}

/// A coupon held by the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawCouponRecord")]
pub struct CouponRecord {
    pub coupon_id: CouponId,
    pub shop_name: String,
    pub discount: String,
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address_url: Option<String>,
    pub category: String,
    /// When the coupon was obtained. Kept as text because spreadsheet
    /// backends format dates freely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obtained_date: Option<String>,
    pub used: CouponState,
}

impl CouponRecord {
    /// A freshly obtained coupon for `shop`, stamped with the current time.
    #[must_use]
    pub fn obtained(coupon_id: CouponId, shop: &ShopRecord) -> Self {
        Self {
            coupon_id,
            shop_name: shop.name.clone(),
            discount: shop.discount_text.clone(),
            image_url: shop.image_url.clone(),
            line_url: shop.line_url.clone(),
            address_url: shop.address_url.clone(),
            category: shop.category.clone(),
            obtained_date: Some(Utc::now().to_rfc3339()),
            used: CouponState::Obtained,
        }
    }
}

/// Wire shape of a coupon with every accepted alias.
#[derive(Debug, Default, Deserialize)]
struct RawCouponRecord {
    #[serde(rename = "couponId")]
    coupon_id: Option<Value>,
    id: Option<Value>,
    #[serde(flatten)]
    shop: RawShopFields,
    #[serde(rename = "obtainedDate")]
    obtained_date: Option<Value>,
    #[serde(rename = "obtainedAt")]
    obtained_at: Option<Value>,
    used: Option<Value>,
}

impl From<RawCouponRecord> for CouponRecord {
    fn from(raw: RawCouponRecord) -> Self {
        let shop = ShopRecord::from(raw.shop);
        Self {
            coupon_id: CouponId::new(first_text([raw.coupon_id, raw.id]).unwrap_or_default()),
            shop_name: shop.name,
            discount: shop.discount_text,
            image_url: shop.image_url,
            line_url: shop.line_url,
            address_url: shop.address_url,
            category: shop.category,
            obtained_date: first_text([raw.obtained_date, raw.obtained_at]),
            used: raw
                .used
                .as_ref()
                .map_or(CouponState::Obtained, CouponState::from_wire),
        }
    }
}

/// Entry in the local coupon-usage index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEntry {
    /// Always a terminal state.
    pub used: CouponState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abandoned_at: Option<DateTime<Utc>>,
}

impl UsageEntry {
    /// Entry for a coupon redeemed at `at`.
    #[must_use]
    pub const fn redeemed(at: DateTime<Utc>) -> Self {
        Self {
            used: CouponState::Used,
            verified_at: Some(at),
            used_at: None,
            abandoned_at: None,
        }
    }

    /// Entry for a coupon abandoned at `at`.
    #[must_use]
    pub const fn abandoned(at: DateTime<Utc>) -> Self {
        Self {
            used: CouponState::Abandoned,
            verified_at: None,
            used_at: None,
            abandoned_at: Some(at),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wire_values() {
        assert_eq!(serde_json::to_value(CouponState::Obtained).unwrap(), false);
        assert_eq!(serde_json::to_value(CouponState::Used).unwrap(), true);
        assert_eq!(
            serde_json::to_value(CouponState::Abandoned).unwrap(),
            "abandoned"
        );
    }

    #[test]
    fn test_state_tolerates_spreadsheet_strings() {
        let parse = |json: &str| serde_json::from_str::<CouponState>(json).unwrap();
        assert_eq!(parse("true"), CouponState::Used);
        assert_eq!(parse("\"TRUE\""), CouponState::Used);
        assert_eq!(parse("\"used\""), CouponState::Used);
        assert_eq!(parse("\"abandoned\""), CouponState::Abandoned);
        assert_eq!(parse("\"FALSE\""), CouponState::Obtained);
        assert_eq!(parse("null"), CouponState::Obtained);
    }

    #[test]
    fn test_merge_is_logical_or() {
        use CouponState::{Abandoned, Obtained, Used};
        for remote in [Obtained, Used, Abandoned] {
            for local in [None, Some(Used), Some(Abandoned)] {
                let merged = remote.merge(local);
                let expected = remote.is_terminal() || local.is_some_and(CouponState::is_terminal);
                assert_eq!(merged.is_terminal(), expected, "{remote:?} + {local:?}");
            }
        }
        assert_eq!(Obtained.merge(Some(Abandoned)), Abandoned);
        assert_eq!(Used.merge(Some(Abandoned)), Used);
    }

    #[test]
    fn test_coupon_accepts_local_canonical_shape() {
        let json = r#"{"couponId":"LOCAL_1","店家名稱":"Cafe A","優惠內容":"10% off","obtainedDate":"2024-05-01T00:00:00Z","used":false}"#;
        let coupon: CouponRecord = serde_json::from_str(json).unwrap();

        assert_eq!(coupon.coupon_id.as_str(), "LOCAL_1");
        assert_eq!(coupon.shop_name, "Cafe A");
        assert_eq!(coupon.discount, "10% off");
        assert_eq!(coupon.used, CouponState::Obtained);
    }

    #[test]
    fn test_coupon_accepts_backend_shape() {
        let json = r#"{"id":"C9","shopName":"Cafe B","discount":"free tea","category":"美食","used":"TRUE"}"#;
        let coupon: CouponRecord = serde_json::from_str(json).unwrap();

        assert_eq!(coupon.coupon_id.as_str(), "C9");
        assert_eq!(coupon.shop_name, "Cafe B");
        assert_eq!(coupon.used, CouponState::Used);
    }

    #[test]
    fn test_usage_entry_round_trips_abandoned_marker() {
        let entry = UsageEntry::abandoned(Utc::now());
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["used"], "abandoned");
        assert!(value.get("abandonedAt").is_some());
    }
}
