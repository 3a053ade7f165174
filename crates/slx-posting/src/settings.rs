//! Typed engine configuration read from the merged config JSON.
//!
//! Every section has serde defaults, so an empty config document yields a
//! working engine.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slx_ingest::PrefetchSettings;
use slx_reconcile::WarehouseCodeMap;
use slx_rules::RuleTables;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::outcome::default_duplicate_patterns;

/// Ledger document a payment method settles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Cash,
    Bank,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Cash => "cash",
            DocumentType::Bank => "bank",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Orders driven at once; also the lookup pre-fetch ceiling.
    pub concurrency: usize,
    pub lookup_timeout_ms: u64,
    pub posting_timeout_ms: u64,
    /// Bound on `{order_code, error}` entries in a batch summary.
    pub error_list_limit: usize,
    pub duplicate_patterns: Vec<String>,
    /// Payment method code -> document type. Unlisted methods fail the order.
    pub payment_doc_types: BTreeMap<String, DocumentType>,
    pub currency: String,
    pub fx_rate: f64,
    pub channel_code: Option<String>,
    /// Orders with stock lines but no resolved warehouse code fail validation
    /// unless this is off. Cancellation orders are always allowed through.
    pub require_stock_codes: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            lookup_timeout_ms: 3_000,
            posting_timeout_ms: 30_000,
            error_list_limit: 50,
            duplicate_patterns: default_duplicate_patterns(),
            payment_doc_types: BTreeMap::new(),
            currency: "VND".to_string(),
            fx_rate: 1.0,
            channel_code: None,
            require_stock_codes: false,
        }
    }
}

impl PipelineSettings {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn posting_timeout(&self) -> Duration {
        Duration::from_millis(self.posting_timeout_ms)
    }

    pub fn prefetch(&self) -> PrefetchSettings {
        PrefetchSettings {
            concurrency: self.concurrency.max(1),
            timeout: self.lookup_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub rules: RuleTables,
    pub pipeline: PipelineSettings,
    pub warehouse_map: WarehouseCodeMap,
}

impl EngineConfig {
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        Ok(Self {
            rules: slx_config::section(config_json, "/rules")?,
            pipeline: slx_config::section(config_json, "/pipeline")?,
            warehouse_map: slx_config::section(config_json, "/warehouse_map")?,
        })
    }
}
