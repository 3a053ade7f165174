//! Order source and posting tracker seams.

use anyhow::Result;
use chrono::NaiveDate;
use slx_schemas::{CanonicalSale, OrderFee, OrderPayment, WarehouseMovement};

use crate::pipeline::OrderReport;

/// Everything stored for one order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBundle {
    pub order_code: String,
    /// In line order.
    pub sales: Vec<CanonicalSale>,
    pub movements: Vec<WarehouseMovement>,
    pub payments: Vec<OrderPayment>,
    pub fees: Vec<OrderFee>,
}

impl OrderBundle {
    pub fn order_date(&self) -> Option<NaiveDate> {
        self.sales.first().map(|s| s.order_date)
    }
}

#[async_trait::async_trait]
pub trait OrderSource: Send + Sync {
    /// Orders dated in `[from, to]` with at least one unposted sale.
    async fn orders_in_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<String>>;

    /// Bundles for `codes`; unknown codes are left out.
    async fn load_orders(&self, codes: &[String]) -> Result<Vec<OrderBundle>>;

    /// Flag every sale of the order as posted. Returns rows changed.
    async fn mark_posted(&self, order_code: &str) -> Result<u64>;
}

#[async_trait::async_trait]
pub trait PostingTracker: Send + Sync {
    /// Upsert the furthest state reached by one order.
    async fn record_outcome(&self, report: &OrderReport) -> Result<()>;

    /// Orders dated in `[from, to]` whose last recorded state is `FAILED`.
    async fn failed_orders(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<String>>;
}
