use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Warehouse-feed code -> ledger warehouse code. Unmapped codes pass through
/// unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WarehouseCodeMap(BTreeMap<String, String>);

impl WarehouseCodeMap {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self(entries)
    }

    pub fn translate(&self, code: &str) -> String {
        self.0
            .get(code)
            .cloned()
            .unwrap_or_else(|| code.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for WarehouseCodeMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// How one sale line should be matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineContext {
    /// Catalog material code; `None` when the catalog had no entry.
    pub material_code: Option<String>,
    /// Card-split order: matching requires equal signed quantity.
    pub card_split: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferLine {
    pub movement_id: String,
    pub material_code: String,
    pub quantity: i64,
    pub batch: Option<String>,
    pub serial: Option<String>,
    pub from_warehouse: String,
    pub to_warehouse: Option<String>,
}

/// All transfer movements of one order, posted together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub order_code: String,
    pub lines: Vec<TransferLine>,
}
