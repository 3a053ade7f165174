//! Ledger client seam.
//!
//! Implementations return the ledger's raw JSON body whenever the ledger
//! answered, whatever its `status`; the pipeline normalises it. Only calls
//! that produced no answer return [`LedgerCallError::Transport`].

use serde_json::Value;

use crate::outcome::LedgerCallError;
use crate::payload::{
    CustomerPayload, LedgerOrderPayload, PaymentPayload, StockIssuePayload, TransferPayload,
};

#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    async fn create_customer(&self, p: &CustomerPayload) -> Result<Value, LedgerCallError>;

    async fn submit_sales_order(&self, p: &LedgerOrderPayload) -> Result<Value, LedgerCallError>;

    async fn submit_invoice(&self, p: &LedgerOrderPayload) -> Result<Value, LedgerCallError>;

    async fn submit_cash_receipt(&self, p: &PaymentPayload) -> Result<Value, LedgerCallError>;

    async fn submit_bank_receipt(&self, p: &PaymentPayload) -> Result<Value, LedgerCallError>;

    async fn post_stock_issue(&self, p: &StockIssuePayload) -> Result<Value, LedgerCallError>;

    async fn post_transfer(&self, p: &TransferPayload) -> Result<Value, LedgerCallError>;
}
