//! Board cell configuration loading.
//!
//! The first lookup fetches the whole configuration table and caches every
//! row with `moka` for the rest of the session (no TTL: the layout is static
//! for a page load). Concurrent first lookups share one fetch, and a failed
//! fetch is retried by the next lookup.
//!
//! Cells are synthesized from the fallback probability table in
//! [`CellConfig::fallback`] when they are missing. Once a table has loaded,
//! a synthesized cell is cached like a configured one; while no table can be
//! loaded, nothing is cached.

use board_coupon_core::CellConfig;
use moka::future::Cache;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::config::CellSource;
use crate::gateway::{Action, Form, Gateway, GatewayError};

/// Upper bound on cached cells; boards are far smaller.
const MAX_CACHED_CELLS: u64 = 1024;

/// Reasons a configuration table could not be loaded.
#[derive(Debug, Error)]
enum CellTableError {
    #[error("backend reported failure: {0}")]
    Backend(String),
    #[error("sheet export unreadable: {0}")]
    Sheet(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("table has no usable rows")]
    Empty,
}

/// Cell configuration lookup with a session-lifetime cache.
pub struct CellLoader {
    gateway: Gateway,
    source: CellSource,
    cache: Cache<u32, CellConfig>,
    table: OnceCell<()>,
}

impl std::fmt::Debug for CellLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellLoader")
            .field("source", &self.source)
            .field("cached", &self.cache.entry_count())
            .field("table_loaded", &self.table.initialized())
            .finish()
    }
}

impl CellLoader {
    #[must_use]
    pub fn new(gateway: Gateway, source: CellSource) -> Self {
        Self {
            gateway,
            source,
            cache: Cache::builder().max_capacity(MAX_CACHED_CELLS).build(),
            table: OnceCell::new(),
        }
    }

    /// Configuration of cell `index`.
    ///
    /// Never fails: a cell missing from the table, or any cell when the table
    /// cannot be loaded, is synthesized at random.
    #[instrument(skip(self), fields(cell_index = index))]
    pub async fn get_cell_config(&self, index: u32) -> CellConfig {
        if let Some(cell) = self.cache.get(&index).await {
            debug!("Cache hit for cell");
            return cell;
        }

        let loaded = self
            .table
            .get_or_try_init(|| async move {
                let cells = self.load_table().await?;
                info!(count = cells.len(), "Loaded cell configuration table");
                for cell in cells {
                    self.cache.insert(cell.index, cell).await;
                }
                Ok::<_, CellTableError>(())
            })
            .await;

        if let Err(e) = loaded {
            warn!(error = %e, "Failed to load cell table, synthesizing cell");
            return CellConfig::fallback(index, rand::random::<f64>());
        }

        self.cache
            .get_with(index, async {
                warn!("No configuration for cell, synthesizing");
                CellConfig::fallback(index, rand::random::<f64>())
            })
            .await
    }

    /// Whether a configuration table has been loaded this session.
    #[must_use]
    pub fn is_table_loaded(&self) -> bool {
        self.table.initialized()
    }

    async fn load_table(&self) -> Result<Vec<CellConfig>, CellTableError> {
        let rows = match &self.source {
            CellSource::Backend => {
                let envelope = self.gateway.call(Action::GetCellConfigs, Form::new()).await;
                if !envelope.is_success() {
                    return Err(CellTableError::Backend(
                        envelope.message().unwrap_or("unknown error").to_string(),
                    ));
                }
                envelope
                    .field::<Vec<Value>>("data")
                    .ok_or_else(|| CellTableError::Backend("reply has no data array".into()))?
                    .into_iter()
                    .map(normalize_row)
                    .collect()
            }
            CellSource::Sheet(url) => {
                let body = self.gateway.fetch_text(url).await?;
                parse_sheet_export(&body)?
            }
        };

        let cells: Vec<CellConfig> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<CellConfig>(row) {
                Ok(cell) => Some(cell),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable cell row");
                    None
                }
            })
            .collect();

        if cells.is_empty() {
            return Err(CellTableError::Empty);
        }
        Ok(cells)
    }
}

/// Turn a Google Visualization JSON export into one JSON object per row,
/// keyed by column label.
///
/// The export is `google.visualization.Query.setResponse({...});`, possibly
/// preceded by a comment. Blank cells are omitted, numeric cells with no
/// fractional part become integers, and `-` means "not applicable".
fn parse_sheet_export(body: &str) -> Result<Vec<Value>, CellTableError> {
    let start = body
        .find("setResponse(")
        .map(|i| i + "setResponse(".len())
        .ok_or_else(|| CellTableError::Sheet("missing setResponse wrapper".into()))?;
    let end = body
        .rfind(')')
        .filter(|end| *end >= start)
        .ok_or_else(|| CellTableError::Sheet("unterminated setResponse wrapper".into()))?;
    let json = body
        .get(start..end)
        .ok_or_else(|| CellTableError::Sheet("invalid wrapper bounds".into()))?;

    let payload: Value =
        serde_json::from_str(json).map_err(|e| CellTableError::Sheet(e.to_string()))?;
    let table = payload
        .get("table")
        .ok_or_else(|| CellTableError::Sheet("missing table".into()))?;

    let labels: Vec<String> = table
        .get("cols")
        .and_then(Value::as_array)
        .ok_or_else(|| CellTableError::Sheet("missing cols".into()))?
        .iter()
        .map(|col| {
            ["label", "id"]
                .iter()
                .filter_map(|key| col.get(*key).and_then(Value::as_str))
                .find(|s| !s.trim().is_empty())
                .unwrap_or_default()
                .trim()
                .to_string()
        })
        .collect();

    let rows = table
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(|| CellTableError::Sheet("missing rows".into()))?;

    Ok(rows
        .iter()
        .filter_map(|row| row.get("c").and_then(Value::as_array))
        .map(|cells| {
            let object: Map<String, Value> = labels
                .iter()
                .zip(cells)
                .filter(|(label, _)| !label.is_empty())
                .filter_map(|(label, cell)| {
                    normalize_value(cell.get("v")?).map(|v| (label.clone(), v))
                })
                .collect();
            Value::Object(object)
        })
        .collect())
}

/// Drop blank and `-` columns from a backend row, as the sheet path does.
fn normalize_row(row: Value) -> Value {
    match row {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .filter_map(|(key, value)| normalize_value(&value).map(|v| (key, v)))
                .collect(),
        ),
        other => other,
    }
}

fn normalize_value(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() || s.trim() == "-" => None,
        Value::String(s) => Some(Value::String(s.trim().to_string())),
        Value::Number(n) => match n.as_f64() {
            #[allow(clippy::cast_possible_truncation)] // checked to be integral and in range
            Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Some(Value::from(f as i64)),
            _ => Some(value.clone()),
        },
        other => Some(other.clone()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use board_coupon_core::{CellType, SpecialEvent};

    use super::*;

    const EXPORT: &str = r#"/*O_o*/
google.visualization.Query.setResponse({"version":"0.6","status":"ok","table":{"cols":[{"id":"A","label":"格子編號","type":"number"},{"id":"B","label":"x","type":"number"},{"id":"C","label":"y","type":"number"},{"id":"D","label":"格子類型","type":"string"},{"id":"E","label":"店家分類","type":"string"},{"id":"F","label":"特殊事件","type":"string"},{"id":"G","label":"事件參數","type":"number"},{"id":"H","label":"格子名稱","type":"string"}],"rows":[{"c":[{"v":0.0},{"v":0.0},{"v":0.0},{"v":"起點"},{"v":"-"},null,null,{"v":"Start"}]},{"c":[{"v":1.0},{"v":1.0},{"v":0.0},{"v":"獎勵"},{"v":""},{"v":"前進"},{"v":3.0},{"v":"Lucky"}]}]}});"#;

    fn parse_cells(body: &str) -> Vec<CellConfig> {
        parse_sheet_export(body)
            .unwrap()
            .into_iter()
            .map(|row| serde_json::from_value(row).unwrap())
            .collect()
    }

    #[test]
    fn test_parse_sheet_export() {
        let cells = parse_cells(EXPORT);
        assert_eq!(cells.len(), 2);

        let start = &cells[0];
        assert_eq!(start.index, 0);
        assert_eq!(start.cell_type, CellType::Start);
        assert_eq!(start.shop_category, None);
        assert_eq!(start.name, "Start");

        let bonus = &cells[1];
        assert_eq!(bonus.x, Some(1));
        assert_eq!(bonus.special_event, Some(SpecialEvent::Advance));
        assert_eq!(bonus.event_param, Some(3));
    }

    #[test]
    fn test_parse_sheet_export_rejects_plain_json() {
        assert!(matches!(
            parse_sheet_export(r#"{"table":{}}"#),
            Err(CellTableError::Sheet(_))
        ));
    }

    #[test]
    fn test_normalize_value() {
        assert_eq!(normalize_value(&Value::from(2.0)), Some(Value::from(2)));
        assert_eq!(normalize_value(&Value::from(2.5)), Some(Value::from(2.5)));
        assert_eq!(normalize_value(&Value::from(" - ")), None);
        assert_eq!(normalize_value(&Value::Null), None);
    }

    #[test]
    fn test_backend_row_with_blank_event_columns() {
        let row = serde_json::json!({
            "格子編號": 0,
            "格子類型": "店家",
            "店家分類": "美食",
            "特殊事件": "",
            "事件參數": "",
            "格子名稱": "Food",
        });

        let cell: CellConfig = serde_json::from_value(normalize_row(row)).unwrap();

        assert_eq!(cell.cell_type, CellType::Shop);
        assert_eq!(cell.shop_category.as_deref(), Some("美食"));
        assert_eq!(cell.special_event, None);
        assert_eq!(cell.event_param, None);
        assert_eq!(cell.name, "Food");
    }
}
