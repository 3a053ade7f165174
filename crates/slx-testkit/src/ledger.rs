use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use slx_posting::{
    CustomerPayload, LedgerCallError, LedgerClient, LedgerOrderPayload, PaymentPayload,
    StockIssuePayload, TransferPayload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Endpoint {
    Customer,
    SalesOrder,
    Invoice,
    CashReceipt,
    BankReceipt,
    StockIssue,
    Transfer,
}

/// What the ledger answers for one scripted (endpoint, key).
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    Reply(Value),
    Transport(String),
    /// Answer `status: 1` after a pause.
    Slow(Duration),
}

/// One call as the ledger saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerCall {
    pub endpoint: Endpoint,
    /// Customer code for customers, order code for everything else.
    pub key: String,
    pub body: Value,
}

/// Ledger double. Unscripted calls succeed with `{"status":1}`.
#[derive(Default)]
pub struct ScriptedLedger {
    script: Mutex<BTreeMap<(Endpoint, String), Scripted>>,
    calls: Mutex<Vec<LedgerCall>>,
}

impl ScriptedLedger {
    pub fn script(&self, endpoint: Endpoint, key: &str, answer: Scripted) {
        if let Ok(mut s) = self.script.lock() {
            s.insert((endpoint, key.to_string()), answer);
        }
    }

    pub fn unscript(&self, endpoint: Endpoint, key: &str) {
        if let Ok(mut s) = self.script.lock() {
            s.remove(&(endpoint, key.to_string()));
        }
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, key: &str) -> Vec<LedgerCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.key == key)
            .collect()
    }

    /// Endpoints hit for `key`, in call order.
    pub fn endpoints_for(&self, key: &str) -> Vec<Endpoint> {
        self.calls_for(key).into_iter().map(|c| c.endpoint).collect()
    }

    async fn answer<T: Serialize>(
        &self,
        endpoint: Endpoint,
        key: &str,
        body: &T,
    ) -> Result<Value, LedgerCallError> {
        if let Ok(mut c) = self.calls.lock() {
            c.push(LedgerCall {
                endpoint,
                key: key.to_string(),
                body: serde_json::to_value(body).unwrap_or(Value::Null),
            });
        }
        let scripted = self
            .script
            .lock()
            .ok()
            .and_then(|s| s.get(&(endpoint, key.to_string())).cloned());
        match scripted {
            None => Ok(json!({"status": 1, "message": "ok"})),
            Some(Scripted::Reply(v)) => Ok(v),
            Some(Scripted::Transport(msg)) => Err(LedgerCallError::Transport(msg)),
            Some(Scripted::Slow(pause)) => {
                tokio::time::sleep(pause).await;
                Ok(json!({"status": 1, "message": "ok"}))
            }
        }
    }
}

#[async_trait::async_trait]
impl LedgerClient for ScriptedLedger {
    async fn create_customer(&self, p: &CustomerPayload) -> Result<Value, LedgerCallError> {
        self.answer(Endpoint::Customer, &p.customer_code, p).await
    }

    async fn submit_sales_order(&self, p: &LedgerOrderPayload) -> Result<Value, LedgerCallError> {
        self.answer(Endpoint::SalesOrder, &p.header.document_number, p).await
    }

    async fn submit_invoice(&self, p: &LedgerOrderPayload) -> Result<Value, LedgerCallError> {
        self.answer(Endpoint::Invoice, &p.header.document_number, p).await
    }

    async fn submit_cash_receipt(&self, p: &PaymentPayload) -> Result<Value, LedgerCallError> {
        self.answer(Endpoint::CashReceipt, &p.document_number, p).await
    }

    async fn submit_bank_receipt(&self, p: &PaymentPayload) -> Result<Value, LedgerCallError> {
        self.answer(Endpoint::BankReceipt, &p.document_number, p).await
    }

    async fn post_stock_issue(&self, p: &StockIssuePayload) -> Result<Value, LedgerCallError> {
        self.answer(Endpoint::StockIssue, &p.document_number, p).await
    }

    async fn post_transfer(&self, p: &TransferPayload) -> Result<Value, LedgerCallError> {
        self.answer(Endpoint::Transfer, &p.request.order_code, p).await
    }
}
