//! slx-ledger-http
//!
//! reqwest adapter for the external ledger API.
//!
//! - Posting endpoints (`POST`, JSON body) implement [`LedgerClient`] and use
//!   the long posting timeout. The raw JSON body is returned whatever the HTTP
//!   status; outcome normalisation is the pipeline's job.
//! - Master-data lookups (`GET ?code=`) implement the `slx-ingest` lookup
//!   traits with the short lookup timeout. `404` means not found.
//!
//! The bearer token is passed in by the caller; it is never logged.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slx_ingest::{BranchDirectory, Catalog, PromotionDirectory};
use slx_posting::{
    CustomerPayload, LedgerCallError, LedgerClient, LedgerOrderPayload, PaymentPayload,
    StockIssuePayload, TransferPayload,
};
use slx_schemas::{BranchInfo, ProductCategory, ProductInfo, ProductType, PromotionInfo};
use tracing::debug;

pub const PATH_CUSTOMERS: &str = "/customers";
pub const PATH_SALES_ORDERS: &str = "/sales-orders";
pub const PATH_INVOICES: &str = "/invoices";
pub const PATH_CASH_RECEIPTS: &str = "/cash-receipts";
pub const PATH_BANK_RECEIPTS: &str = "/bank-receipts";
pub const PATH_STOCK_ISSUES: &str = "/stock-issues";
pub const PATH_TRANSFERS: &str = "/transfers";
pub const PATH_MATERIALS: &str = "/materials";
pub const PATH_BRANCHES: &str = "/branches";
pub const PATH_PROMOTIONS: &str = "/promotions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerTimeouts {
    pub lookup: Duration,
    pub posting: Duration,
}

impl Default for LedgerTimeouts {
    fn default() -> Self {
        Self {
            lookup: Duration::from_secs(3),
            posting: Duration::from_secs(30),
        }
    }
}

#[derive(Clone)]
pub struct HttpLedger {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeouts: LedgerTimeouts,
}

impl std::fmt::Debug for HttpLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLedger")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "REDACTED"))
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl HttpLedger {
    pub fn new(base_url: String, token: Option<String>, timeouts: LedgerTimeouts) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("build ledger http client failed")?;
        Ok(Self {
            http,
            base_url,
            token,
            timeouts,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn post_json<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<Value, LedgerCallError> {
        let req = self
            .http
            .post(self.url(path))
            .timeout(self.timeouts.posting)
            .json(body);
        let resp = self
            .authorized(req)
            .send()
            .await
            .map_err(|e| LedgerCallError::Transport(format!("POST {path} failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| LedgerCallError::Transport(format!("POST {path} body read failed: {e}")))?;
        debug!(path, status = status.as_u16(), "ledger response");

        serde_json::from_str::<Value>(&text).map_err(|_| {
            LedgerCallError::Transport(format!(
                "POST {path} http status={} non-json body",
                status.as_u16()
            ))
        })
    }

    async fn get_lookup<T: DeserializeOwned>(&self, path: &str, code: &str) -> Result<Option<T>> {
        let req = self
            .http
            .get(self.url(path))
            .timeout(self.timeouts.lookup)
            .query(&[("code", code)]);
        let resp = self
            .authorized(req)
            .send()
            .await
            .with_context(|| format!("GET {path} code={code} failed"))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(anyhow!("GET {path} code={code} http error status={}", status.as_u16()));
        }
        let body = resp
            .json::<T>()
            .await
            .with_context(|| format!("GET {path} code={code} json decode failed"))?;
        Ok(Some(body))
    }
}

#[async_trait::async_trait]
impl LedgerClient for HttpLedger {
    async fn create_customer(&self, p: &CustomerPayload) -> Result<Value, LedgerCallError> {
        self.post_json(PATH_CUSTOMERS, p).await
    }

    async fn submit_sales_order(&self, p: &LedgerOrderPayload) -> Result<Value, LedgerCallError> {
        self.post_json(PATH_SALES_ORDERS, p).await
    }

    async fn submit_invoice(&self, p: &LedgerOrderPayload) -> Result<Value, LedgerCallError> {
        self.post_json(PATH_INVOICES, p).await
    }

    async fn submit_cash_receipt(&self, p: &PaymentPayload) -> Result<Value, LedgerCallError> {
        self.post_json(PATH_CASH_RECEIPTS, p).await
    }

    async fn submit_bank_receipt(&self, p: &PaymentPayload) -> Result<Value, LedgerCallError> {
        self.post_json(PATH_BANK_RECEIPTS, p).await
    }

    async fn post_stock_issue(&self, p: &StockIssuePayload) -> Result<Value, LedgerCallError> {
        self.post_json(PATH_STOCK_ISSUES, p).await
    }

    async fn post_transfer(&self, p: &TransferPayload) -> Result<Value, LedgerCallError> {
        self.post_json(PATH_TRANSFERS, p).await
    }
}

// ---------------------------------------------------------------------------
// Lookup wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MaterialWire {
    material_code: String,
    unit: String,
    product_type: String,
    #[serde(default)]
    track_batch: bool,
    #[serde(default)]
    track_serial: bool,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    sub_category: Option<String>,
    #[serde(default)]
    is_ecode: bool,
}

impl MaterialWire {
    fn into_product(self) -> Result<ProductInfo> {
        let product_type = ProductType::parse(&self.product_type).ok_or_else(|| {
            anyhow!(
                "material {} has unknown product type '{}'",
                self.material_code,
                self.product_type
            )
        })?;
        Ok(ProductInfo {
            material_code: self.material_code,
            unit: self.unit,
            product_type,
            track_batch: self.track_batch,
            track_serial: self.track_serial,
            category: self
                .category
                .as_deref()
                .map(ProductCategory::parse)
                .unwrap_or(ProductCategory::Other),
            sub_category: self.sub_category,
            is_ecode: self.is_ecode,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BranchWire {
    #[serde(default)]
    ledger_company_code: Option<String>,
    #[serde(default)]
    ledger_branch_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromotionWire {
    #[serde(default)]
    discount_account: Option<String>,
    #[serde(default)]
    expense_account: Option<String>,
    #[serde(default)]
    fee_code: Option<String>,
}

#[async_trait::async_trait]
impl Catalog for HttpLedger {
    async fn get_material(&self, code: &str) -> Result<Option<ProductInfo>> {
        match self.get_lookup::<MaterialWire>(PATH_MATERIALS, code).await? {
            Some(w) => w.into_product().map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl BranchDirectory for HttpLedger {
    async fn get_branch(&self, code: &str) -> Result<Option<BranchInfo>> {
        Ok(self
            .get_lookup::<BranchWire>(PATH_BRANCHES, code)
            .await?
            .map(|w| BranchInfo {
                ledger_company_code: w.ledger_company_code,
                ledger_branch_code: w.ledger_branch_code,
            }))
    }
}

#[async_trait::async_trait]
impl PromotionDirectory for HttpLedger {
    async fn get_promotion(&self, code: &str) -> Result<Option<PromotionInfo>> {
        Ok(self
            .get_lookup::<PromotionWire>(PATH_PROMOTIONS, code)
            .await?
            .map(|w| PromotionInfo {
                discount_account: w.discount_account,
                expense_account: w.expense_account,
                fee_code: w.fee_code,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let l = HttpLedger::new(
            "http://ledger.local/".to_string(),
            Some("s3cr3t".to_string()),
            LedgerTimeouts::default(),
        )
        .unwrap();
        let dbg = format!("{l:?}");
        assert!(!dbg.contains("s3cr3t"));
        assert_eq!(l.url(PATH_INVOICES), "http://ledger.local/invoices");
    }

    #[test]
    fn material_wire_maps_letters_and_categories() {
        let w: MaterialWire = serde_json::from_value(serde_json::json!({
            "materialCode": "M01", "unit": "EA", "productType": "S", "category": "TPCN"
        }))
        .unwrap();
        let p = w.into_product().unwrap();
        assert_eq!(p.product_type, ProductType::Service);
        assert_eq!(p.category, ProductCategory::Supplements);

        let bad: MaterialWire = serde_json::from_value(serde_json::json!({
            "materialCode": "M02", "unit": "EA", "productType": "Z"
        }))
        .unwrap();
        assert!(bad.into_product().is_err());
    }
}
