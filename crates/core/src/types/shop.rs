//! Merchant ("shop") records and the alias normalization applied to them.
//!
//! Shop rows come from a spreadsheet whose column headers are the canonical
//! field names (`店家名稱`, `優惠內容`, `圖片網址`, `F`, `G`, `店家分類`).
//! Callers and older backends also send English names. Both are accepted on
//! input; the canonical name wins when both are present and non-empty.
//! Output always uses the canonical names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shop categories, in the order used to assign categories to board cells.
pub const SHOP_CATEGORIES: [&str; 6] = ["美食", "購物", "服務", "娛樂", "美容", "教育"];

/// A merchant offering a coupon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawShopFields")]
pub struct ShopRecord {
    #[serde(rename = "店家名稱")]
    pub name: String,
    #[serde(rename = "優惠內容")]
    pub discount_text: String,
    #[serde(rename = "圖片網址")]
    pub image_url: String,
    /// Link to the shop's messaging account (sheet column F).
    #[serde(rename = "F", skip_serializing_if = "Option::is_none")]
    pub line_url: Option<String>,
    /// Map link for the shop's address (sheet column G).
    #[serde(rename = "G", skip_serializing_if = "Option::is_none")]
    pub address_url: Option<String>,
    #[serde(rename = "店家分類")]
    pub category: String,
}

impl ShopRecord {
    /// Built-in catalog used when the remote catalog cannot be loaded.
    #[must_use]
    pub fn fallback_list() -> Vec<Self> {
        vec![
            Self {
                name: "美味咖啡廳".to_string(),
                discount_text: "買一送一。美式咖啡。限時優惠".to_string(),
                image_url: "https://developers-resource.landpress.line.me/fx/img/01_1_cafe.png"
                    .to_string(),
                line_url: Some("https://line.me/ti/p/~example1".to_string()),
                address_url: Some("https://maps.app.goo.gl/example1".to_string()),
                category: "美食".to_string(),
            },
            Self {
                name: "幸福餐廳".to_string(),
                discount_text: "9折優惠。全品項。限平日使用".to_string(),
                image_url:
                    "https://developers-resource.landpress.line.me/fx/img/01_2_restaurant.png"
                        .to_string(),
                line_url: Some("https://line.me/ti/p/~example2".to_string()),
                address_url: Some("https://maps.app.goo.gl/example2".to_string()),
                category: "美食".to_string(),
            },
        ]
    }
}

/// Wire shape of a shop row with every accepted alias.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawShopFields {
    #[serde(rename = "店家名稱")]
    canonical_name: Option<Value>,
    name: Option<Value>,
    #[serde(rename = "shopName")]
    shop_name: Option<Value>,
    #[serde(rename = "優惠內容")]
    canonical_discount: Option<Value>,
    discount: Option<Value>,
    #[serde(rename = "discountText")]
    discount_text: Option<Value>,
    #[serde(rename = "圖片網址")]
    canonical_image: Option<Value>,
    #[serde(rename = "imageUrl")]
    image_url: Option<Value>,
    #[serde(rename = "F")]
    canonical_line: Option<Value>,
    #[serde(rename = "lineUrl")]
    line_url: Option<Value>,
    #[serde(rename = "G")]
    canonical_address: Option<Value>,
    #[serde(rename = "addressUrl")]
    address_url: Option<Value>,
    #[serde(rename = "店家分類")]
    canonical_category: Option<Value>,
    category: Option<Value>,
}

impl From<RawShopFields> for ShopRecord {
    fn from(raw: RawShopFields) -> Self {
        Self {
            name: first_text([raw.canonical_name, raw.name, raw.shop_name]).unwrap_or_default(),
            discount_text: first_text([raw.canonical_discount, raw.discount, raw.discount_text])
                .unwrap_or_default(),
            image_url: first_text([raw.canonical_image, raw.image_url]).unwrap_or_default(),
            line_url: first_text([raw.canonical_line, raw.line_url]),
            address_url: first_text([raw.canonical_address, raw.address_url]),
            category: first_text([raw.canonical_category, raw.category]).unwrap_or_default(),
        }
    }
}

/// Render a loosely-typed cell as text; null and blank cells count as absent.
fn cell_text(value: Option<Value>) -> Option<String> {
    let text = match value? {
        Value::Null => return None,
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// First non-blank value among the candidates, in priority order.
pub(crate) fn first_text<const N: usize>(candidates: [Option<Value>; N]) -> Option<String> {
    candidates.into_iter().find_map(cell_text)
}
