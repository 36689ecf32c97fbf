//! Board cell configuration.

use serde::{Deserialize, Serialize};

use crate::types::shop::SHOP_CATEGORIES;

/// What landing on a cell does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellType {
    /// Awards a coupon from a shop in the cell's category.
    #[serde(alias = "店家")]
    Shop,
    #[serde(alias = "獎勵")]
    Bonus,
    #[serde(alias = "懲罰")]
    Penalty,
    #[serde(alias = "機會")]
    Chance,
    #[serde(alias = "起點")]
    Start,
}

impl CellType {
    /// Label shown on the board.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Shop => "店家",
            Self::Bonus => "獎勵",
            Self::Penalty => "懲罰",
            Self::Chance => "機會",
            Self::Start => "起點",
        }
    }
}

/// Movement triggered by landing on a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialEvent {
    #[serde(alias = "前進")]
    Advance,
    #[serde(alias = "後退")]
    Retreat,
}

/// Configuration of one board cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellConfig {
    #[serde(alias = "格子編號")]
    pub index: u32,
    /// Board column, when the source provides a layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    /// Board row, when the source provides a layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    #[serde(alias = "格子類型", alias = "type")]
    pub cell_type: CellType,
    /// Category of shops drawn on this cell; only meaningful for shop cells.
    #[serde(default, alias = "店家分類", skip_serializing_if = "Option::is_none")]
    pub shop_category: Option<String>,
    #[serde(default, alias = "特殊事件", skip_serializing_if = "Option::is_none")]
    pub special_event: Option<SpecialEvent>,
    #[serde(default, alias = "事件參數", skip_serializing_if = "Option::is_none")]
    pub event_param: Option<i32>,
    #[serde(default, alias = "格子名稱")]
    pub name: String,
}

impl CellConfig {
    /// Synthesize a cell when no configuration table is available.
    ///
    /// `roll` is a uniform sample from `[0, 1)` and selects the cell type:
    ///
    /// | roll        | type    | event         |
    /// |-------------|---------|---------------|
    /// | `< 0.60`    | shop    |               |
    /// | `< 0.75`    | bonus   | advance 3     |
    /// | `< 0.85`    | penalty | retreat 2     |
    /// | `< 0.95`    | chance  |               |
    /// | otherwise   | start   |               |
    ///
    /// Shop cells take their category from [`SHOP_CATEGORIES`] by
    /// `index mod 6`.
    #[must_use]
    pub fn fallback(index: u32, roll: f64) -> Self {
        let (cell_type, special_event, event_param) = if roll < 0.60 {
            (CellType::Shop, None, None)
        } else if roll < 0.75 {
            (CellType::Bonus, Some(SpecialEvent::Advance), Some(3))
        } else if roll < 0.85 {
            (CellType::Penalty, Some(SpecialEvent::Retreat), Some(2))
        } else if roll < 0.95 {
            (CellType::Chance, None, None)
        } else {
            (CellType::Start, None, None)
        };

        let shop_category = (cell_type == CellType::Shop).then(|| category_for(index).to_string());

        Self {
            index,
            x: None,
            y: None,
            cell_type,
            shop_category,
            special_event,
            event_param,
            name: format!("{}格 {index}", cell_type.label()),
        }
    }
}

/// Category assigned to shop cell `index`.
#[must_use]
pub fn category_for(index: u32) -> &'static str {
    let slot = usize::try_from(index).unwrap_or(0) % SHOP_CATEGORIES.len();
    SHOP_CATEGORIES.get(slot).copied().unwrap_or("美食")
}
